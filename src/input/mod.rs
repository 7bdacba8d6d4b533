pub mod csv;
pub mod json;

pub use csv::{load_csv, save_csv};
pub use json::{load_json, save_json};

use crate::recording::Recording;
use anyhow::Result;
use std::path::Path;

/// Input format detection result
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    Json,
    Csv,
    Unknown,
}

/// Detect the format of an input file from its first bytes
pub fn detect_format(data: &[u8]) -> InputFormat {
    if is_json(data) {
        return InputFormat::Json;
    }

    if is_csv(data) {
        return InputFormat::Csv;
    }

    InputFormat::Unknown
}

fn is_json(data: &[u8]) -> bool {
    data.iter()
        .find(|byte| !byte.is_ascii_whitespace())
        .is_some_and(|byte| *byte == b'{')
}

fn is_csv(data: &[u8]) -> bool {
    if data.len() < 10 {
        return false;
    }

    // Look for a line with commas in the first 500 bytes
    let sample = std::str::from_utf8(&data[..data.len().min(500)]);
    match sample {
        Ok(text) => text
            .lines()
            .take(5)
            .any(|line| line.chars().filter(|&c| c == ',').count() >= 2),
        // The cut may land inside a multi-byte character
        Err(e) if e.valid_up_to() > 0 => {
            let text = String::from_utf8_lossy(&data[..e.valid_up_to()]);
            text.lines()
                .take(5)
                .any(|line| line.chars().filter(|&c| c == ',').count() >= 2)
        }
        Err(_) => false,
    }
}

/// Load a recording from a file, auto-detecting the format
pub fn load_file(path: &str) -> Result<Recording> {
    let data = std::fs::read(path)?;

    match detect_format(&data) {
        InputFormat::Json => load_json(path),
        InputFormat::Csv => load_csv(path),
        InputFormat::Unknown => anyhow::bail!("Unknown input format: {}", path),
    }
}

/// Save a recording, as CSV for `.csv` paths and JSON otherwise
pub fn save_file(recording: &Recording, path: &str) -> Result<()> {
    let is_csv = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
    if is_csv {
        save_csv(recording, path)
    } else {
        save_json(recording, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::fixtures::simple_recording;

    #[test]
    fn test_detect_format() {
        assert_eq!(detect_format(b"  \n{\"name\": \"x\"}"), InputFormat::Json);
        assert_eq!(detect_format(b"kind,cycle,time\ngame,0,0.0\n"), InputFormat::Csv);
        assert_eq!(detect_format(b"\x00\x01\x02binary data here"), InputFormat::Unknown);
        assert_eq!(detect_format(b""), InputFormat::Unknown);
    }

    #[test]
    fn test_load_file_picks_format() {
        let recording = simple_recording();
        let dir = tempfile::tempdir().unwrap();

        for name in ["fixture.json", "fixture.csv"] {
            let path = dir.path().join(name);
            let path = path.to_str().unwrap();
            save_file(&recording, path).unwrap();
            assert_eq!(load_file(path).unwrap(), recording);
        }
    }

    #[test]
    fn test_unknown_format_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("junk.bin");
        std::fs::write(&path, [0u8, 1, 2, 3]).unwrap();
        assert!(load_file(path.to_str().unwrap()).is_err());
    }
}
