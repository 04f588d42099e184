//! dvbrec: record DVB channels from a Linux DVB adapter.
//!
//! Tunes the adapter to a channel's bouquet, demultiplexes its video and
//! audio PIDs and writes them to files and/or UDP destinations.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use dvbrec::{Device, FileWriter, OutputPlugin, PluginChain, PluginError, Remux, UdpSend, NO_PID};
use log::{error, info, warn};

mod config;
mod context;
mod event_loop;
mod logging;

use config::{config_path, load_config, ConfigFile, Settings};
use context::{Cli, Commands};
use event_loop::PollNotifier;

/// Build `[Remux?] -> sink` for one destination.
fn build_chain(
    remux: bool,
    sink: Box<dyn OutputPlugin>,
) -> Result<Box<dyn OutputPlugin>, PluginError> {
    let mut stages: Vec<Box<dyn OutputPlugin>> = Vec::new();
    if remux {
        stages.push(Box::new(Remux::new()));
    }
    stages.push(sink);
    Ok(Box::new(PluginChain::new(stages)?))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let file_config = match config_path(cli.config.as_deref()) {
        Some(path) => match load_config(&path) {
            Ok(c) => {
                eprintln!("Loaded config from: {}", path.display());
                c
            }
            Err(e) => {
                eprintln!("Failed to load config file: {}", e);
                return Err(e);
            }
        },
        None => ConfigFile::default(),
    };
    let settings = Settings::resolve(&cli, &file_config)?;
    logging::init_logging(&settings.logging)?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            info!("Received stop signal");
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    let mut device = Device::open(
        &settings.adapter,
        &settings.channels,
        PollNotifier::default(),
        settings.device,
    )?;

    match cli.command {
        Commands::List => {
            for (i, bouquet) in device.bouquet_list().iter().enumerate() {
                println!("Bouquet {}: {}", i, bouquet.join(", "));
            }
        }
        Commands::Pids { channel } => match device.pids(&channel) {
            Some(pids) => {
                let show = |pid: u16| {
                    if pid == NO_PID {
                        "-".to_string()
                    } else {
                        pid.to_string()
                    }
                };
                println!("{}: video {} audio {}", channel, show(pids.video), show(pids.audio));
            }
            None => {
                error!("Unknown channel {:?}", channel);
                return Err(format!("unknown channel {:?}", channel).into());
            }
        },
        Commands::Record {
            channel,
            output,
            udp,
            duration,
            ..
        } => {
            record(
                &mut device,
                &settings,
                &channel,
                output,
                udp,
                duration,
                &stop,
            )?;
        }
    }
    Ok(())
}

fn record(
    device: &mut Device<dvbrec::tuner::LinuxAdapter, PollNotifier>,
    settings: &Settings,
    channel: &str,
    output: Option<PathBuf>,
    udp: Option<String>,
    duration: Option<u64>,
    stop: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut sinks: Vec<Box<dyn OutputPlugin>> = Vec::new();
    if let Some(path) = output {
        sinks.push(Box::new(FileWriter::create(path, settings.max_chunk_size)?));
    }
    if let Some(address) = udp {
        sinks.push(Box::new(UdpSend::connect(&address)?));
    }

    // One recording per destination; they share the channel's PIDs.
    let mut ids = Vec::new();
    for sink in sinks {
        let chain = build_chain(settings.remux, sink)?;
        match device.start_recording(channel, chain) {
            Ok(id) => ids.push(id),
            Err(e) => {
                for id in ids {
                    device.stop_recording(id);
                }
                return Err(e.into());
            }
        }
    }

    let until = duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    info!(
        "Recording {:?}{}",
        channel,
        duration.map_or(String::new(), |secs| format!(" for {}s", secs))
    );
    let result = event_loop::run(device, stop, until);

    for id in ids {
        device.stop_recording(id);
    }
    let stats = device.demux_stats();
    info!(
        "Done: {} frames, {} transport errors, {} discontinuities, {} resyncs",
        stats.frames, stats.transport_errors, stats.discontinuities, stats.resyncs
    );
    if stats.scrambled > 0 {
        warn!("{} scrambled frames recorded as-is", stats.scrambled);
    }
    result?;
    Ok(())
}
