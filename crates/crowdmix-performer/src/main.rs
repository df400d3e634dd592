//! Crowdmix performer - energy-responsive stem mixing
//!
//! Entry point for the headless performer. It:
//! 1. Loads the YAML config and indexes the stem library
//! 2. Starts the audio output (silent fallback if no device opens)
//! 3. Runs the decision loop on its own thread
//! 4. Reads console commands on stdin while OSC feeds the same channel
//!
//! ## Command line
//!
//! ```text
//! crowdmix [CONFIG_PATH] [--write-config]
//! ```
//!
//! `--write-config` saves the effective configuration (defaults filled in)
//! back to the config path and exits.

mod audio;
mod config;
mod performer;
mod settings;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crowdmix_control::{
    parse_command, CommandError, ConsoleCommand, ControlMessage, ControlSurface, HELP_TEXT,
};
use crowdmix_core::catalog::Catalog;
use crowdmix_core::config::{load_config, save_config};
use crowdmix_core::types::StemRole;

use config::PerformerConfig;
use performer::Performer;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut config_path = None;
    let mut write_config = false;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--write-config" => write_config = true,
            _ => config_path = Some(PathBuf::from(arg)),
        }
    }
    let config_path = config_path.unwrap_or_else(config::default_performer_config_path);
    let config: PerformerConfig = load_config(&config_path);

    if write_config {
        save_config(&config, &config_path)?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    // Build the pool up front so the first tempo change does not pay for it
    match rayon::ThreadPoolBuilder::new()
        .num_threads(StemRole::MIXED.len())
        .thread_name(|i| format!("rayon-prepare-{}", i))
        .build_global()
    {
        Ok(()) => log::info!("Rayon thread pool initialized with {} threads", StemRole::MIXED.len()),
        Err(e) => log::warn!("Rayon thread pool already initialized: {}", e),
    }

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                  Crowdmix Performance Mixer                  ║");
    println!("║             energy-responsive stem mixing                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();

    let catalog = Catalog::load_all(&config.library.stems_dir, &config.library.structures_dir)
        .context("Failed to load the stem library")?;
    println!("Loaded {} songs", catalog.len());

    let output = audio::start_output(&config.audio).context("Failed to start audio output")?;
    if output.handle.is_silent() {
        println!("No audio device available, running silent");
    } else {
        println!(
            "Audio output started on {} ({} Hz, {:.1} ms latency)",
            output.handle.device_name().unwrap_or("unknown device"),
            output.sample_rate,
            output.latency_ms
        );
    }

    let (mut surface, control_rx) = ControlSurface::new(config.mixing.control_limits());
    if let Err(e) = surface.start_osc(&config.osc) {
        log::error!("OSC: {}", e);
        eprintln!("Warning: OSC control unavailable ({}), console only", e);
    } else if let Some(server) = surface.osc_server() {
        println!("OSC control listening on {}", server.local_addr());
    }

    let mut performer = Performer::new(
        Arc::new(catalog),
        &config,
        output.command_sender,
        output.atomics,
        output.sample_rate,
        StdRng::from_entropy(),
    );
    performer.start().context("Failed to build the opening mix")?;

    let performer_thread = std::thread::Builder::new()
        .name("performer".to_string())
        .spawn(move || performer.run(control_rx))
        .context("Failed to spawn the performer thread")?;

    println!();
    println!("{}", HELP_TEXT);

    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                log::error!("Console: failed to read stdin: {}", e);
                break;
            }
        };
        match parse_command(&line) {
            Ok(ConsoleCommand::Control(message)) => {
                surface.submit(message);
            }
            Ok(ConsoleCommand::Help) => println!("{}", HELP_TEXT),
            Ok(ConsoleCommand::Quit) => break,
            Err(CommandError::Empty) => {}
            Err(e) => eprintln!("{}", e),
        }
        if performer_thread.is_finished() {
            break;
        }
    }

    println!("Stopping performance...");
    surface.submit(ControlMessage::Shutdown);
    // Dropping the last sender also ends the loop if Shutdown was dropped
    drop(surface);
    if performer_thread.join().is_err() {
        log::error!("Performer thread panicked");
    }

    drop(output.handle);
    println!("Crowdmix stopped.");
    Ok(())
}
