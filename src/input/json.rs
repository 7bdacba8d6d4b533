use crate::recording::Recording;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};

/// Load a recording saved with [`save_json`]
pub fn load_json(path: &str) -> Result<Recording> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path))?;
    let recording = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path))?;
    Ok(recording)
}

pub fn save_json(recording: &Recording, path: &str) -> Result<()> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer(&mut writer, recording)?;
    writer.flush()?;
    Ok(())
}
