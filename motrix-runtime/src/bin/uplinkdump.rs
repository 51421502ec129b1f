// Copyright (C) 2026 Motrix Robotics
// All rights reserved.
//
// This software may be modified and distributed under the terms
// of the included license.  See the LICENSE file for details.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use motrix::bus::Bus;
use motrix::telemetry::Channel;
use motrix::unit::{Drive, Unit};

#[macro_use]
extern crate log;

#[derive(Parser)]
#[command(author = "Copyright (C) 2026 Motrix Robotics")]
#[command(version, about = "Telemetry uplink diagnostics tool", long_about = None)]
struct Args {
    /// Uplink bridge hostname or ip address.
    host: Option<String>,

    /// Uplink bridge TCP port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run as systemd service.
    #[arg(long)]
    systemd: bool,

    /// Level of verbosity.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut log_config = simplelog::ConfigBuilder::new();
    if args.systemd {
        log_config.set_time_level(log::LevelFilter::Off);
        log_config.set_thread_level(log::LevelFilter::Off);
    }
    log_config.set_target_level(log::LevelFilter::Off);
    log_config.set_location_level(log::LevelFilter::Off);

    let log_level = if args.systemd {
        log::LevelFilter::Info
    } else {
        match args.verbose {
            0 => log::LevelFilter::Info,
            1 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    let color_choice = if args.systemd {
        simplelog::ColorChoice::Never
    } else {
        simplelog::ColorChoice::Auto
    };

    simplelog::TermLogger::init(
        log_level,
        log_config.build(),
        simplelog::TerminalMode::Mixed,
        color_choice,
    )?;

    let mut config = match &args.config {
        Some(path) => motrix::Config::try_from_file(vec![path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("invalid configuration path"))?])?,
        None => motrix::Config::try_from_file(vec!["/etc/motrix/motrix.toml"])?,
    };

    if let Some(host) = args.host {
        config.uplink.host = host;
    }
    if let Some(port) = args.port {
        config.uplink.port = port;
    }

    trace!("{}", config);

    // The channel catalog is fixed per unit kind, so a simulated
    // drive is enough to decode the stream.
    let drive = Drive::new(Arc::new(Bus::simulated()), config.drive.address)?;
    let channels: BTreeMap<u8, Channel> = drive
        .channels()
        .into_iter()
        .map(|channel| (channel.index(), channel))
        .collect();

    info!(
        "Connect to {}:{}",
        config.uplink.host, config.uplink.port
    );

    let client = motrix::uplink::Client::connect(
        (config.uplink.host.as_str(), config.uplink.port),
        move |index, payload| match channels.get(&index) {
            Some(channel) => match channel.decode(payload) {
                Ok(packet) => info!("{}: {}", channel.name(), packet),
                Err(e) => warn!("{}: {}", channel.name(), e),
            },
            None => warn!("Frame for unknown channel {}", index),
        },
    )?;

    while client.is_alive() {
        std::thread::sleep(std::time::Duration::from_millis(500));
    }

    info!("Uplink closed");

    Ok(())
}
