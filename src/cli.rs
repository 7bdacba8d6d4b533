use crate::capture::{CaptureConfig, CaptureManager, SyntheticCapture};
use crate::config::PlaybackSettings;
use crate::core::{Instigator, Lookup, PlaybackState, SyncMode, TrackKind};
use crate::input::{load_file, save_file};
use crate::playback::{landing_stage, LoggingObserver, PlaybackController};
use crate::recording::{Recording, RecordingStore};
use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "tracksync",
    about = "Play back and follow recorded simulation sessions",
    version
)]
pub struct Cli {
    /// Settings file to use instead of the one in the user config directory
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Play a recording from start to end.
    Replay(ReplayArgs),

    /// Capture a session and follow it while it grows.
    Live(LiveArgs),

    /// Print the tracks of a recording.
    Inspect(InspectArgs),

    /// Convert a recording between JSON and CSV.
    Convert(ConvertArgs),

    /// Write the default settings file.
    #[command(name = "init-settings")]
    InitSettings(InitSettingsArgs),
}

#[derive(Debug, Args)]
pub struct ReplayArgs {
    pub input: PathBuf,

    /// Track to play: `game`, `solver:<id>` or a bare solver id
    #[arg(long, default_value = "game")]
    pub track: TrackKind,

    #[arg(long)]
    pub sync: Option<SyncMode>,

    /// Fixed playback rate instead of recorded frame times
    #[arg(long)]
    pub fps: Option<f32>,

    /// Frame of `--track` to start from
    #[arg(long, default_value_t = 0)]
    pub start: usize,

    #[arg(long, default_value_t = 60)]
    pub tick_rate: u32,

    /// Sleep between ticks instead of simulating time
    #[arg(long)]
    pub realtime: bool,

    #[arg(long)]
    pub loop_playback: bool,

    #[arg(long)]
    pub max_ticks: Option<u64>,
}

#[derive(Debug, Args)]
pub struct LiveArgs {
    /// Recording to stream as if it were captured. Without one a synthetic
    /// particle is generated.
    pub input: Option<PathBuf>,

    /// Frames to generate when no input is given
    #[arg(long, default_value_t = 600)]
    pub frames: u64,

    #[arg(long, default_value_t = 60)]
    pub tick_rate: u32,

    #[arg(long, default_value_t = 256)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 5)]
    pub poll_interval_ms: u64,

    #[arg(long)]
    pub sync: Option<SyncMode>,

    /// Save the captured session when done
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct InspectArgs {
    pub input: PathBuf,

    /// Navigate to this frame and print where every track lands
    #[arg(long)]
    pub frame: Option<usize>,

    #[arg(long, default_value = "game")]
    pub track: TrackKind,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    pub input: PathBuf,

    /// Written as CSV for a `.csv` extension, JSON otherwise
    pub output: PathBuf,
}

#[derive(Debug, Args)]
pub struct InitSettingsArgs {
    /// Replace an existing settings file
    #[arg(long)]
    pub force: bool,
}

pub async fn run_from_env() -> Result<()> {
    let cli = Cli::parse();
    run(cli).await
}

pub async fn run(cli: Cli) -> Result<()> {
    let settings_path = cli.settings;
    match cli.command {
        Commands::Replay(args) => run_replay(load_settings(settings_path.as_deref())?, args).await,
        Commands::Live(args) => run_live(load_settings(settings_path.as_deref())?, args).await,
        Commands::Inspect(args) => run_inspect(load_settings(settings_path.as_deref())?, args),
        Commands::Convert(args) => run_convert(args),
        Commands::InitSettings(args) => run_init_settings(settings_path, args),
    }
}

fn load_settings(path: Option<&Path>) -> Result<PlaybackSettings> {
    match path {
        Some(path) => PlaybackSettings::load_from(path),
        None => Ok(PlaybackSettings::load()),
    }
}

fn path_str(path: &Path) -> Result<&str> {
    path.to_str()
        .with_context(|| format!("Path is not valid UTF-8: {}", path.display()))
}

fn tick_period(tick_rate: u32) -> Result<Duration> {
    if tick_rate == 0 {
        bail!("--tick-rate must be at least 1");
    }
    Ok(Duration::from_secs_f64(1.0 / tick_rate as f64))
}

fn any_playing<S: crate::scene::SceneSink>(controller: &PlaybackController<S>) -> bool {
    controller
        .all_tracks()
        .iter()
        .any(|track| track.state == PlaybackState::Playing)
}

fn print_tracks<S: crate::scene::SceneSink>(controller: &PlaybackController<S>) {
    for track in controller.all_tracks() {
        println!(
            "  {:<10} frame {:>6}/{:<6} stage {:>3}  {:?}{}",
            track.kind.to_string(),
            track.current_frame,
            track.max_frames,
            track.current_stage,
            track.state,
            if track.sync_enabled { "" } else { "  (sync off)" }
        );
    }
}

async fn run_replay(mut settings: PlaybackSettings, args: ReplayArgs) -> Result<()> {
    if let Some(mode) = args.sync {
        settings.sync_mode = mode;
    }
    if let Some(fps) = args.fps {
        settings.frame_rate_override = Some(fps);
        settings.use_frame_rate_override = true;
    }
    settings.loop_playback = args.loop_playback;
    if settings.loop_playback && !args.realtime && args.max_ticks.is_none() {
        bail!("--loop-playback needs --max-ticks unless --realtime is set");
    }
    let period = tick_period(args.tick_rate)?;

    let recording = load_file(path_str(&args.input)?)?;
    let mut controller = PlaybackController::new(settings);
    controller.add_observer(Box::new(LoggingObserver));
    controller.load_recording(Arc::new(RecordingStore::new(recording)));

    if controller.track(args.track).is_none() {
        bail!("{} is not in {}", args.track, args.input.display());
    }
    if args.start > 0 {
        controller.go_to_frame(args.track, args.start, landing_stage(args.track), Instigator::new())?;
    }
    controller.play(args.track)?;

    let mut ticks = 0u64;
    let mut interval = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    while any_playing(&controller) && args.max_ticks.map_or(true, |max| ticks < max) {
        if args.realtime {
            tokio::select! {
                _ = interval.tick() => {}
                _ = &mut ctrl_c => {
                    info!("Interrupted");
                    break;
                }
            }
        }
        controller.tick(period);
        ticks += 1;
    }
    controller.broadcast_pending_updates();

    println!("Replayed {} ticks", ticks);
    print_tracks(&controller);
    Ok(())
}

async fn run_live(mut settings: PlaybackSettings, args: LiveArgs) -> Result<()> {
    if let Some(mode) = args.sync {
        settings.sync_mode = mode;
    }
    let period = tick_period(args.tick_rate)?;

    let source = match &args.input {
        Some(path) => SyntheticCapture::from_recording(&load_file(path_str(path)?)?),
        None => {
            let mut source = SyntheticCapture::new("synthetic");
            source.set_auto_generate(true, Some(args.frames));
            source
        }
    };
    let config = CaptureConfig {
        session_name: "live".to_string(),
        poll_interval_ms: args.poll_interval_ms,
        batch_size: args.batch_size,
    };

    let store = Arc::new(RecordingStore::live(&config.session_name));
    let mut controller = PlaybackController::new(settings);
    controller.add_observer(Box::new(LoggingObserver));
    controller.load_recording(store.clone());

    let mut manager = CaptureManager::new(store.clone());
    manager.connect(source, config).await;

    let mut interval = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
        controller.tick(period);
        if manager.is_finished() && !any_playing(&controller) {
            break;
        }
    }

    manager.disconnect().await;
    controller.tick(Duration::ZERO);

    let stats = manager.stats();
    println!(
        "Captured {} events ({} game frames, {} solver frames) in {} batches",
        stats.events_received.load(Ordering::SeqCst),
        stats.game_frames.load(Ordering::SeqCst),
        stats.solver_frames.load(Ordering::SeqCst),
        stats.batches_written.load(Ordering::SeqCst)
    );
    let errors = stats.errors.load(Ordering::SeqCst);
    if errors > 0 {
        warn!("{} capture errors", errors);
    }
    print_tracks(&controller);

    if let Some(path) = &args.save {
        let recording = store.read().to_recording();
        save_file(&recording, path_str(path)?)?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn describe(recording: &Recording) {
    println!("Recording '{}'", recording.name);
    println!("  Game       {} frames", recording.game_frames.len());
    for (id, solver) in &recording.solvers {
        let keyframes = solver.frames.iter().filter(|frame| frame.is_keyframe).count();
        println!(
            "  Solver {:<3} {} frames, {} keyframes{}{}  '{}'",
            id,
            solver.frames.len(),
            keyframes,
            if solver.info.is_server { ", server" } else { "" },
            if solver.has_network_sync_data() { ", network ticks" } else { "" },
            solver.info.name
        );
    }
}

fn run_inspect(settings: PlaybackSettings, args: InspectArgs) -> Result<()> {
    let recording = load_file(path_str(&args.input)?)?;
    describe(&recording);

    let Some(frame) = args.frame else {
        return Ok(());
    };
    let mut controller = PlaybackController::new(settings);
    controller.load_recording(Arc::new(RecordingStore::new(recording)));
    controller.go_to_frame(args.track, frame, landing_stage(args.track), Instigator::new())?;
    controller.broadcast_pending_updates();

    println!("After moving {} to frame {}:", args.track, frame);
    print_tracks(&controller);
    if let Lookup::Found(stages) = controller.stages_at_frame(args.track, frame) {
        println!("  Stages: {}", stages.join(", "));
    }
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let recording = load_file(path_str(&args.input)?)?;
    save_file(&recording, path_str(&args.output)?)?;
    println!("Wrote {}", args.output.display());
    Ok(())
}

fn run_init_settings(path: Option<PathBuf>, args: InitSettingsArgs) -> Result<()> {
    let path = match path.or_else(PlaybackSettings::config_path) {
        Some(path) => path,
        None => bail!("No config directory; pass --settings"),
    };
    if path.exists() && !args.force {
        bail!("{} already exists, use --force to replace it", path.display());
    }
    PlaybackSettings::default().save_to(&path)?;
    println!("Wrote {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::fixtures::{simple_recording, RecordingBuilder, SolverFixture};
    use tempfile::tempdir;

    fn write_fixture(dir: &Path, name: &str, recording: &Recording) -> PathBuf {
        let path = dir.join(name);
        save_file(recording, path.to_str().unwrap()).unwrap();
        path
    }

    fn settings_file(dir: &Path) -> PathBuf {
        let path = dir.join("settings.json");
        PlaybackSettings::default().save_to(&path).unwrap();
        path
    }

    #[test]
    fn test_parse_replay_args() {
        let cli = Cli::try_parse_from([
            "tracksync",
            "replay",
            "session.json",
            "--track",
            "solver:2",
            "--sync",
            "network-tick",
            "--fps",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.track, TrackKind::Solver(2));
                assert_eq!(args.sync, Some(SyncMode::NetworkTick));
                assert_eq!(args.fps, Some(30.0));
                assert_eq!(args.tick_rate, 60);
                assert!(!args.realtime);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_rejects_unknown_track() {
        assert!(Cli::try_parse_from(["tracksync", "replay", "a.json", "--track", "camera"]).is_err());
    }

    #[tokio::test]
    async fn test_replay_runs_to_the_end() {
        let dir = tempdir().unwrap();
        let input = write_fixture(dir.path(), "session.json", &simple_recording());
        let result = run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Replay(ReplayArgs {
                input,
                track: TrackKind::Game,
                sync: None,
                fps: None,
                start: 0,
                tick_rate: 10,
                realtime: false,
                loop_playback: false,
                max_ticks: Some(1_000),
            }),
        })
        .await;
        assert!(result.is_ok(), "{:?}", result);
    }

    #[tokio::test]
    async fn test_replay_missing_track_fails() {
        let dir = tempdir().unwrap();
        let input = write_fixture(dir.path(), "session.json", &simple_recording());
        let result = run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Replay(ReplayArgs {
                input,
                track: TrackKind::Solver(42),
                sync: None,
                fps: None,
                start: 0,
                tick_rate: 60,
                realtime: false,
                loop_playback: false,
                max_ticks: Some(10),
            }),
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_replay_network_tick_on_game_is_an_error() {
        let dir = tempdir().unwrap();
        let recording = RecordingBuilder::new(5, 0.1)
            .solver(SolverFixture::new(1, 5).network(0, 0))
            .build();
        let input = write_fixture(dir.path(), "session.json", &recording);
        let result = run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Replay(ReplayArgs {
                input,
                track: TrackKind::Game,
                sync: Some(SyncMode::NetworkTick),
                fps: None,
                start: 0,
                tick_rate: 60,
                realtime: false,
                loop_playback: false,
                max_ticks: Some(10),
            }),
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_loop_without_limit_is_rejected() {
        let dir = tempdir().unwrap();
        let input = write_fixture(dir.path(), "session.json", &simple_recording());
        let result = run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Replay(ReplayArgs {
                input,
                track: TrackKind::Game,
                sync: None,
                fps: None,
                start: 0,
                tick_rate: 60,
                realtime: false,
                loop_playback: true,
                max_ticks: None,
            }),
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_live_synthetic_session_is_saved() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("captured.json");
        let result = run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Live(LiveArgs {
                input: None,
                frames: 20,
                tick_rate: 1_000,
                batch_size: 8,
                poll_interval_ms: 1,
                sync: None,
                save: Some(output.clone()),
            }),
        })
        .await;
        assert!(result.is_ok(), "{:?}", result);

        let captured = load_file(output.to_str().unwrap()).unwrap();
        assert_eq!(captured.game_frames.len(), 20);
        assert_eq!(captured.solvers[&0].frames.len(), 20);
    }

    #[tokio::test]
    async fn test_inspect_and_convert() {
        let dir = tempdir().unwrap();
        let input = write_fixture(dir.path(), "session.json", &simple_recording());
        let output = dir.path().join("session.csv");

        run(Cli {
            settings: Some(settings_file(dir.path())),
            command: Commands::Inspect(InspectArgs {
                input: input.clone(),
                frame: Some(4),
                track: TrackKind::Game,
            }),
        })
        .await
        .unwrap();

        run(Cli {
            settings: None,
            command: Commands::Convert(ConvertArgs {
                input,
                output: output.clone(),
            }),
        })
        .await
        .unwrap();
        assert_eq!(load_file(output.to_str().unwrap()).unwrap(), simple_recording());
    }

    #[tokio::test]
    async fn test_init_settings_refuses_to_overwrite() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let first = run(Cli {
            settings: Some(path.clone()),
            command: Commands::InitSettings(InitSettingsArgs { force: false }),
        })
        .await;
        assert!(first.is_ok(), "{:?}", first);
        assert_eq!(PlaybackSettings::load_from(&path).unwrap(), PlaybackSettings::default());

        let second = run(Cli {
            settings: Some(path.clone()),
            command: Commands::InitSettings(InitSettingsArgs { force: false }),
        })
        .await;
        assert!(second.is_err());

        let forced = run(Cli {
            settings: Some(path),
            command: Commands::InitSettings(InitSettingsArgs { force: true }),
        })
        .await;
        assert!(forced.is_ok());
    }
}
