//! camview - terminal control surface
//!
//! Loads the config, sets up logging and runs one of the subcommands:
//! an interactive (or timed) viewing session, a connection test, or a
//! config dump.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;

use camview_core::config::{ConfigManager, ConfigSection};
use camview_core::decoder::FfmpegBackend;
use camview_core::logging::{init_tracing, init_tracing_with_file};
use camview_core::models::{ConnectionTestResult, SessionMode, SourceId, TestOutcome};
use camview_core::surface::fps_label;
use camview_core::{ConnectionTester, StreamSession};

mod cli;
mod commands;
mod terminal;

use cli::{Args, Command};
use commands::{ConsoleCommand, HELP};
use terminal::{LineReader, TerminalSurface};

fn main() -> Result<ExitCode> {
    let args = Args::parse();

    let mut config = ConfigManager::new(&args.config);
    if let Err(e) = config.load_or_create() {
        eprintln!("Warning: Failed to load config: {}. Using defaults.", e);
    }

    let logging = config.settings().logging.clone();
    let level = args.log_level.unwrap_or(logging.level);
    let _log_guard = if logging.file_logging {
        init_tracing_with_file(level, &config.logs_folder())
    } else {
        init_tracing(level);
        None
    };

    tracing::info!("camview starting");
    tracing::info!("Config: {}", config.path().display());
    tracing::info!("Core version: {}", camview_core::version());

    match args.command {
        Command::Run {
            mode,
            primary,
            secondary,
            dual_view,
            seconds,
        } => {
            save_addresses(&mut config, primary, secondary)?;
            let mode = mode.unwrap_or(config.settings().cameras.mode);
            run_session(&mut config, mode, dual_view, seconds)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Test {
            primary,
            secondary,
            json,
        } => {
            save_addresses(&mut config, primary, secondary)?;
            run_tests(&config, json)
        }
        Command::Config => {
            show_config(&config)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Store addresses given on the command line in the cameras section.
fn save_addresses(
    config: &mut ConfigManager,
    primary: Option<String>,
    secondary: Option<String>,
) -> Result<()> {
    let mut changed = false;
    for (id, address) in [(SourceId::PRIMARY, primary), (SourceId::SECONDARY, secondary)] {
        if let Some(address) = address {
            config.settings_mut().set_address(id, &address);
            changed = true;
        }
    }
    if changed {
        config
            .update_section(ConfigSection::Cameras)
            .context("saving camera addresses")?;
    }
    Ok(())
}

fn backend_for(config: &ConfigManager) -> Arc<FfmpegBackend> {
    let backend = FfmpegBackend::new(config.settings().decoder.program_path());
    if !backend.is_available() {
        tracing::warn!(
            "Decoder '{}' could not be run; starts and tests will fail",
            backend.program().display()
        );
    }
    Arc::new(backend)
}

fn run_session(
    config: &mut ConfigManager,
    mode: SessionMode,
    dual_view: bool,
    seconds: Option<u64>,
) -> Result<()> {
    let settings = config.settings().clone();
    let surface = Arc::new(TerminalSurface::new());
    let session = StreamSession::new(
        mode,
        settings.camera_settings(),
        backend_for(config),
        surface.clone(),
    );

    for source in session.sources() {
        session.set_address(source.id, settings.address(source.id))?;
    }
    if dual_view {
        session
            .set_dual_view(true)
            .context("--dual-view needs tabbed mode")?;
    }

    tracing::info!("Session mode: {}", mode);

    if let Some(secs) = seconds {
        session.start()?;
        let deadline = Instant::now() + Duration::from_secs(secs);
        while Instant::now() < deadline && session.is_running() {
            thread::sleep(Duration::from_millis(100));
        }
        print_status(&session, &surface);
        session.stop();
        return Ok(());
    }

    let reader = LineReader::spawn_stdin().context("starting stdin reader")?;
    println!("{}", HELP);
    if let Err(e) = session.start() {
        eprintln!("{}", e);
    }

    loop {
        let line = match reader.lines().recv_timeout(Duration::from_millis(500)) {
            Ok(line) => line,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };

        let command = match ConsoleCommand::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                eprintln!("{}", e);
                continue;
            }
        };

        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(e) = handle_command(&session, &surface, config, &reader, command) {
            eprintln!("{:#}", e);
        }
    }

    session.stop();
    tracing::info!("camview exiting");
    Ok(())
}

fn handle_command(
    session: &StreamSession,
    surface: &TerminalSurface,
    config: &mut ConfigManager,
    reader: &LineReader,
    command: ConsoleCommand,
) -> Result<()> {
    match command {
        ConsoleCommand::Start => session.start()?,
        ConsoleCommand::Stop => session.stop(),
        ConsoleCommand::Test(Some(id)) => {
            // Reports through the surface when done.
            session.spawn_test(id)?;
        }
        ConsoleCommand::Test(None) => {
            let all = session.sources().iter().map(|s| s.id).collect::<Vec<_>>();
            for id in all {
                session.spawn_test(id)?;
            }
        }
        ConsoleCommand::Url(id, address) => {
            let changed = match address {
                Some(address) => session.set_address(id, &address)?,
                None => session.change_address(id, reader)?,
            };
            if changed {
                let address = session.source(id)?.address;
                config.settings_mut().set_address(id, &address);
                config.update_section(ConfigSection::Cameras)?;
            }
        }
        ConsoleCommand::Switch(id) => session.switch_active(id)?,
        ConsoleCommand::Dual(enabled) => {
            session.set_dual_view(enabled)?;
            println!("dual view {} (applies on next start)", if enabled { "on" } else { "off" });
        }
        ConsoleCommand::Status => print_status(session, surface),
        ConsoleCommand::Help => println!("{}", HELP),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn print_status(session: &StreamSession, surface: &TerminalSurface) {
    println!(
        "session: {:?} ({} mode, {})",
        session.state(),
        session.mode(),
        if session.is_running() { "running" } else { "not running" }
    );
    for source in session.sources() {
        let address = if source.is_configured() {
            source.address.as_str()
        } else {
            "<no address>"
        };
        let size = surface
            .last_frame_size(source.id)
            .map(|(w, h)| format!(", last frame {}x{}", w, h))
            .unwrap_or_default();
        let mean = surface
            .last_frame_mean(source.id)
            .map(|[r, g, b]| format!(", mean rgb({}, {}, {})", r, g, b))
            .unwrap_or_default();
        println!(
            "  {} [{}] {} - {} frames{}{}",
            fps_label(&source.name, source.current_fps),
            source.connection_state,
            address,
            source.total_frames,
            size,
            mean
        );
    }
}

fn run_tests(config: &ConfigManager, json: bool) -> Result<ExitCode> {
    let settings = config.settings();
    let tester = ConnectionTester::new(backend_for(config), &settings.camera_settings());

    let results: Vec<ConnectionTestResult> = thread::scope(|scope| {
        let probes: Vec<_> = SourceId::all()
            .into_iter()
            .map(|id| {
                let tester = &tester;
                let address = settings.address(id);
                scope.spawn(move || tester.test(id, address))
            })
            .collect();
        probes
            .into_iter()
            .filter_map(|probe| probe.join().ok())
            .collect()
    });

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        let summary = results
            .iter()
            .map(ConnectionTestResult::summary)
            .collect::<Vec<_>>()
            .join(" | ");
        println!("{}", summary);
        for result in &results {
            if !result.diagnostic_excerpt.is_empty() {
                println!("  {}: {}", result.source_id, result.diagnostic_excerpt);
            }
        }
    }

    let failed = results
        .iter()
        .any(|r| matches!(r.outcome, TestOutcome::Failure(_)));
    Ok(if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

fn show_config(config: &ConfigManager) -> Result<()> {
    let path: PathBuf = config.path().to_path_buf();
    println!("# {}", path.display());
    let content = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
    print!("{}", content);
    Ok(())
}
