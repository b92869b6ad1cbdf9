/*
 *  main.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	This program is free software: you can redistribute it and/or modify
 *	it under the terms of the GNU General Public License as published by
 *	the Free Software Foundation, either version 3 of the License, or
 *	(at your option) any later version.
 *
 *	This program is distributed in the hope that it will be useful,
 *	but WITHOUT ANY WARRANTY; without even the implied warranty of
 *	MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *	GNU General Public License for more details.
 *
 *	See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *	Public License.
 *
 */

use std::sync::Arc;
use anyhow::{anyhow, Context};
use chrono::Local;
use clap::Parser;
use env_logger::Env;
use log::{error, info};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

use lyspot::app::App;
use lyspot::config::{self, Cli};
use lyspot::serial::SerialPort;
use lyspot::spotify::SpotifyClient;

include!(concat!(env!("OUT_DIR"), "/build_info.rs"));

/// Waits for SIGINT, SIGTERM, or SIGHUP.
#[cfg(unix)]
async fn signal_handler() -> std::io::Result<()> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("SIGINT received. Initiating graceful shutdown.");
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received. Initiating graceful shutdown.");
        }
        _ = sighup.recv() => {
            info!("SIGHUP received. Initiating graceful shutdown.");
        }
    }
    Ok(())
}

#[cfg(not(unix))]
async fn signal_handler() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Ctrl-C received. Initiating graceful shutdown.");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = config::load(&cli).context("loading configuration")?;

    if cli.dump_config {
        if config.spotify.access_token.is_some() {
            config.spotify.access_token = Some("********".to_string());
        }
        print!("{}", serde_yaml::to_string(&config)?);
        return Ok(());
    }

    env_logger::Builder::from_env(Env::default().default_filter_or(config.log_level.as_str()))
        .format_timestamp_secs()
        .init();

    info!("This {} worth the Squeeze", env!("CARGO_PKG_NAME"));
    info!("v.{} built {}", env!("CARGO_PKG_VERSION"), BUILD_DATE);
    info!("Started {}", Local::now().format("%a %b %d %H:%M:%S"));

    let token = config
        .spotify
        .access_token
        .clone()
        .ok_or_else(|| anyhow!("no Spotify access token, use --access-token or SPOTIFY_ACCESS_TOKEN"))?;
    let client = Arc::new(SpotifyClient::new(&token, &config.spotify.api_base)?);

    info!("Controller on {} @ {} baud", config.serial.port, config.serial.baud_rate);
    let (port, lines_rx, serial_task) = SerialPort::open(&config.serial);

    let mut app = App::new(port, client.clone(), client, &config);
    app.run(lines_rx, async {
        if let Err(e) = signal_handler().await {
            error!("Signal handler failed: {}", e);
        }
    })
    .await;

    serial_task.abort();
    info!("Shutdown complete.");
    Ok(())
}
