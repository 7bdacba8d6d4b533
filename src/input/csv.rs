use crate::core::{GameFrame, ParticleState, SolverFrame, SolverStage};
use crate::recording::{Recording, SolverInfo};
use anyhow::{anyhow, bail, Context, Result};
use csv::StringRecord;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;
use std::str::FromStr;

/// Load a recording from a CSV file
///
/// Every row has a `kind`:
/// - `game`: one game frame
/// - `solver`: one particle of one stage of a solver frame. Consecutive rows
///   with the same solver and cycle make up a frame, consecutive rows with
///   the same stage name make up a stage. Rows without a particle id give an
///   empty stage, rows without a stage name a frame without stages.
/// - `solver_info`: name, server flag and tick offset of a solver
///
/// Column names are matched case-insensitively against common aliases and
/// only `kind` is required.
pub fn load_csv(path: &str) -> Result<Recording> {
    let file_path = Path::new(path);
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(file_path)
        .with_context(|| format!("Failed to open {}", path))?;

    let columns = Columns::detect(rdr.headers()?)?;
    let name = file_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("recording");
    let mut recording = Recording::new(name);
    let mut current: Option<(i32, SolverFrame)> = None;

    for (index, result) in rdr.records().enumerate() {
        let line = index + 2;
        let record = result.with_context(|| format!("Failed to read CSV row {}", line))?;
        let row = Row {
            record: &record,
            columns: &columns,
            line,
        };

        match row.text(Some(columns.kind)).unwrap_or("").to_lowercase().as_str() {
            "game" | "game_frame" => recording.push_game_frame(row.game_frame()?),
            "solver_info" | "info" => recording.add_solver(row.solver_info()?),
            "solver" | "solver_frame" => {
                let solver_id: i32 = row.required(columns.solver, "solver")?;
                let cycle: u64 = row.required(columns.start_cycle, "cycle")?;
                let starts_frame = current
                    .as_ref()
                    .map_or(true, |(id, frame)| *id != solver_id || frame.cycle != cycle);
                if starts_frame {
                    flush(&mut recording, current.take());
                    current = Some((solver_id, row.solver_frame(cycle)?));
                }
                if let Some((_, frame)) = current.as_mut() {
                    row.add_to_stage(frame)?;
                }
            }
            other => bail!("Row {}: unknown row kind '{}'", line, other),
        }
    }
    flush(&mut recording, current);

    Ok(recording)
}

fn flush(recording: &mut Recording, frame: Option<(i32, SolverFrame)>) {
    if let Some((solver_id, frame)) = frame {
        recording.push_solver_frame(solver_id, frame);
    }
}

/// Column indices detected from the header
struct Columns {
    kind: usize,
    solver: Option<usize>,
    name: Option<usize>,
    server: Option<usize>,
    tick_offset: Option<usize>,
    start_cycle: Option<usize>,
    end_cycle: Option<usize>,
    start_time: Option<usize>,
    end_time: Option<usize>,
    keyframe: Option<usize>,
    resimulated: Option<usize>,
    network_frame: Option<usize>,
    stage: Option<usize>,
    particle: Option<usize>,
    position: [Option<usize>; 3],
    velocity: [Option<usize>; 3],
    sleeping: Option<usize>,
    destroyed: Option<usize>,
}

impl Columns {
    fn detect(headers: &StringRecord) -> Result<Self> {
        let optional = |names: &[&str]| find_column(headers, names).ok();
        Ok(Self {
            kind: find_column(headers, &["kind", "type", "row"])?,
            solver: optional(&["solver", "solver_id", "track", "track_id"]),
            name: optional(&["name", "solver_name"]),
            server: optional(&["server", "is_server"]),
            tick_offset: optional(&["tick_offset", "network_tick_offset", "offset"]),
            start_cycle: optional(&["start_cycle", "cycle"]),
            end_cycle: optional(&["end_cycle"]),
            start_time: optional(&["start_time", "time", "timestamp", "t"]),
            end_time: optional(&["end_time"]),
            keyframe: optional(&["keyframe", "is_keyframe", "key"]),
            resimulated: optional(&["resimulated", "is_resimulated", "resim"]),
            network_frame: optional(&["network_frame", "network_tick", "tick"]),
            stage: optional(&["stage", "stage_name", "step"]),
            particle: optional(&["particle", "particle_id", "pid"]),
            position: [optional(&["x", "px"]), optional(&["y", "py"]), optional(&["z", "pz"])],
            velocity: [optional(&["vx"]), optional(&["vy"]), optional(&["vz"])],
            sleeping: optional(&["sleeping", "asleep"]),
            destroyed: optional(&["destroyed", "removed"]),
        })
    }
}

/// Find a column by checking possible names
fn find_column(headers: &StringRecord, names: &[&str]) -> Result<usize> {
    for (idx, header) in headers.iter().enumerate() {
        let header_lower = header.to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(idx);
        }
    }

    bail!("Could not find column with names: {:?}", names)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" => Some(true),
        "0" | "false" | "no" | "n" => Some(false),
        _ => None,
    }
}

struct Row<'r> {
    record: &'r StringRecord,
    columns: &'r Columns,
    line: usize,
}

impl<'r> Row<'r> {
    fn text(&self, column: Option<usize>) -> Option<&'r str> {
        column
            .and_then(|idx| self.record.get(idx))
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, column: Option<usize>, what: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.text(column)
            .map(|value| {
                value
                    .parse::<T>()
                    .map_err(|e| anyhow!("Row {}: invalid {} '{}': {}", self.line, what, value, e))
            })
            .transpose()
    }

    fn required<T>(&self, column: Option<usize>, what: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.parse(column, what)?
            .ok_or_else(|| anyhow!("Row {}: missing {}", self.line, what))
    }

    fn flag(&self, column: Option<usize>, what: &str) -> Result<bool> {
        match self.text(column) {
            Some(value) => {
                parse_bool(value).ok_or_else(|| anyhow!("Row {}: invalid {} '{}'", self.line, what, value))
            }
            None => Ok(false),
        }
    }

    fn vector(&self, columns: [Option<usize>; 3], what: &str) -> Result<[f64; 3]> {
        let mut out = [0.0; 3];
        for (slot, column) in out.iter_mut().zip(columns) {
            *slot = self.parse(column, what)?.unwrap_or(0.0);
        }
        Ok(out)
    }

    fn game_frame(&self) -> Result<GameFrame> {
        let start_cycle: u64 = self.required(self.columns.start_cycle, "start cycle")?;
        let start_time: f64 = self.parse(self.columns.start_time, "start time")?.unwrap_or(0.0);
        Ok(GameFrame {
            start_cycle,
            end_cycle: self.parse(self.columns.end_cycle, "end cycle")?.unwrap_or(start_cycle),
            start_time,
            end_time: self.parse(self.columns.end_time, "end time")?.unwrap_or(start_time),
        })
    }

    fn solver_info(&self) -> Result<SolverInfo> {
        let id: i32 = self.required(self.columns.solver, "solver")?;
        let mut info = SolverInfo::new(id, self.text(self.columns.name).unwrap_or(""));
        if info.name.is_empty() {
            info.name = format!("Solver {}", id);
        }
        info.is_server = self.flag(self.columns.server, "server flag")?;
        info.network_tick_offset = self.parse(self.columns.tick_offset, "tick offset")?.unwrap_or(0);
        Ok(info)
    }

    fn solver_frame(&self, cycle: u64) -> Result<SolverFrame> {
        let start_time: f64 = self.parse(self.columns.start_time, "start time")?.unwrap_or(0.0);
        Ok(SolverFrame {
            cycle,
            start_time,
            end_time: self.parse(self.columns.end_time, "end time")?.unwrap_or(start_time),
            is_keyframe: self.flag(self.columns.keyframe, "keyframe flag")?,
            is_resimulated: self.flag(self.columns.resimulated, "resimulated flag")?,
            network_frame: self.parse(self.columns.network_frame, "network frame")?,
            stages: Vec::new(),
        })
    }

    fn add_to_stage(&self, frame: &mut SolverFrame) -> Result<()> {
        let Some(stage_name) = self.text(self.columns.stage) else {
            return Ok(());
        };
        if frame.stages.last().map_or(true, |stage| stage.name != stage_name) {
            frame.stages.push(SolverStage::new(stage_name));
        }
        let Some(stage) = frame.stages.last_mut() else {
            return Ok(());
        };

        let Some(particle) = self.parse::<i32>(self.columns.particle, "particle")? else {
            return Ok(());
        };
        if self.flag(self.columns.destroyed, "destroyed flag")? {
            stage.destroyed.push(particle);
        } else {
            stage.particles.insert(
                particle,
                ParticleState {
                    position: self.vector(self.columns.position, "position")?,
                    velocity: self.vector(self.columns.velocity, "velocity")?,
                    sleeping: self.flag(self.columns.sleeping, "sleeping flag")?,
                },
            );
        }
        Ok(())
    }
}

#[derive(Debug, Default, Serialize)]
struct CsvRow<'a> {
    kind: &'a str,
    solver: Option<i32>,
    name: Option<&'a str>,
    server: Option<bool>,
    tick_offset: Option<i32>,
    start_cycle: Option<u64>,
    end_cycle: Option<u64>,
    start_time: Option<f64>,
    end_time: Option<f64>,
    keyframe: Option<bool>,
    resimulated: Option<bool>,
    network_frame: Option<i32>,
    stage: Option<&'a str>,
    particle: Option<i32>,
    x: Option<f64>,
    y: Option<f64>,
    z: Option<f64>,
    vx: Option<f64>,
    vy: Option<f64>,
    vz: Option<f64>,
    sleeping: Option<bool>,
    destroyed: Option<bool>,
}

/// Write a recording in the layout [`load_csv`] reads
pub fn save_csv(recording: &Recording, path: &str) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path))?;

    for record in recording.solvers.values() {
        wtr.serialize(CsvRow {
            kind: "solver_info",
            solver: Some(record.info.id),
            name: Some(record.info.name.as_str()),
            server: Some(record.info.is_server),
            tick_offset: Some(record.info.network_tick_offset),
            ..Default::default()
        })?;
    }

    for frame in &recording.game_frames {
        wtr.serialize(CsvRow {
            kind: "game",
            start_cycle: Some(frame.start_cycle),
            end_cycle: Some(frame.end_cycle),
            start_time: Some(frame.start_time),
            end_time: Some(frame.end_time),
            ..Default::default()
        })?;
    }

    for (solver_id, record) in &recording.solvers {
        for frame in &record.frames {
            let base = || CsvRow {
                kind: "solver",
                solver: Some(*solver_id),
                start_cycle: Some(frame.cycle),
                start_time: Some(frame.start_time),
                end_time: Some(frame.end_time),
                keyframe: Some(frame.is_keyframe),
                resimulated: Some(frame.is_resimulated),
                network_frame: frame.network_frame,
                ..Default::default()
            };

            if frame.stages.is_empty() {
                wtr.serialize(base())?;
            }
            for stage in &frame.stages {
                if stage.particles.is_empty() && stage.destroyed.is_empty() {
                    wtr.serialize(CsvRow {
                        stage: Some(stage.name.as_str()),
                        ..base()
                    })?;
                }
                for (particle, state) in &stage.particles {
                    wtr.serialize(CsvRow {
                        stage: Some(stage.name.as_str()),
                        particle: Some(*particle),
                        x: Some(state.position[0]),
                        y: Some(state.position[1]),
                        z: Some(state.position[2]),
                        vx: Some(state.velocity[0]),
                        vy: Some(state.velocity[1]),
                        vz: Some(state.velocity[2]),
                        sleeping: Some(state.sleeping),
                        ..base()
                    })?;
                }
                for particle in &stage.destroyed {
                    wtr.serialize(CsvRow {
                        stage: Some(stage.name.as_str()),
                        particle: Some(*particle),
                        destroyed: Some(true),
                        ..base()
                    })?;
                }
            }
        }
    }

    wtr.flush()?;
    Ok(())
}
