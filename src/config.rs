/*
 *  config.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Defaults, YAML file and command line, layered in that order
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
use clap::{ArgAction, Parser, ValueHint};
use dirs_next::home_dir;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::{fs, path::{Path, PathBuf}};
use thiserror::Error;

use crate::lcd::UPDATE_FREQ;
use crate::remote::REMOTE_BUTTON_TIMEOUT;
use crate::spotify::API_BASE;
use crate::timeout::DEFAULT_TIMEOUT_MS;

/// Error type for config loading/validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Validation error: {0}")]
    Validation(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub serial: SerialConfig,
    pub spotify: SpotifyConfig,
    pub display: DisplayConfig,
    pub player: PlayerConfig,
    pub remote: RemoteConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            log_level: "info".to_string(),
            serial: SerialConfig::default(),
            spotify: SpotifyConfig::default(),
            display: DisplayConfig::default(),
            player: PlayerConfig::default(),
            remote: RemoteConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// delay between attempts to (re)open the port
    pub reconnect_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        SerialConfig {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: 57600,
            reconnect_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotifyConfig {
    pub access_token: Option<String>,
    pub api_base: String,
}

impl Default for SpotifyConfig {
    fn default() -> Self {
        SpotifyConfig { access_token: None, api_base: API_BASE.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// cap on display pushes per second
    pub max_update_freq: u32,
    pub overlay_timeout_ms: u64,
    /// render ticks per second
    pub frame_rate: u32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            max_update_freq: UPDATE_FREQ,
            overlay_timeout_ms: DEFAULT_TIMEOUT_MS,
            frame_rate: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub refresh_ms: u64,
    /// percent per volume button press
    pub volume_step: u8,
    /// ms per jump button press
    pub seek_step_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        PlayerConfig { refresh_ms: 1000, volume_step: 8, seek_step_ms: 5000 }
    }
}

/// Things a remote button can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteAction {
    VolumeUp,
    VolumeDown,
    Previous,
    Next,
    PlayPause,
    JumpForward,
    JumpBackward,
    ToggleShuffle,
    CycleRepeat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub command: u8,
    pub throttle_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub default_throttle_ms: u64,
    /// merged over the built-in bindings, per action
    pub bindings: HashMap<RemoteAction, Binding>,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            default_throttle_ms: REMOTE_BUTTON_TIMEOUT,
            bindings: default_bindings(),
        }
    }
}

/// Codes for the common 21-key NEC remote.
pub fn default_bindings() -> HashMap<RemoteAction, Binding> {
    let b = |command: u8, throttle: u64| Binding { command, throttle_ms: Some(throttle) };
    HashMap::from([
        (RemoteAction::VolumeUp, b(0x46, 150)),
        (RemoteAction::VolumeDown, b(0x15, 150)),
        (RemoteAction::Previous, b(0x44, 500)),
        (RemoteAction::Next, b(0x43, 500)),
        (RemoteAction::PlayPause, b(0x40, 500)),
        (RemoteAction::JumpForward, b(0x09, 150)),
        (RemoteAction::JumpBackward, b(0x07, 150)),
    ])
}

/// CLI overrides. All fields are Options so we can layer them over YAML.
#[derive(Debug, Parser, Clone, Default)]
#[command(name = "lyspot", about = "Spotify on a 16x2 LCD with an IR remote", disable_help_flag = false)]
pub struct Cli {
    /// Path to a YAML config file (overrides search)
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,
    /// force debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub debug: bool,
    #[arg(long)]
    pub log_level: Option<String>,
    /// Serial device of the LCD controller, e.g. /dev/ttyACM0
    #[arg(short, long)]
    pub port: Option<String>,
    #[arg(long)]
    pub baud_rate: Option<u32>,
    /// Spotify Web API access token
    #[arg(long, env = "SPOTIFY_ACCESS_TOKEN", hide_env_values = true)]
    pub access_token: Option<String>,
    #[arg(long)]
    pub max_update_freq: Option<u32>,
    #[arg(long)]
    pub refresh_ms: Option<u64>,
    /// dump fully merged config (after overrides) and exit
    #[arg(long, action = ArgAction::SetTrue)]
    pub dump_config: bool,
}

/// Public entry point: read YAML, merge CLI, validate.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    // 1) YAML file (explicit path or search) over defaults
    let mut cfg = if let Some(p) = cli.config.as_ref() {
        if p.exists() {
            read_yaml(p)?
        } else {
            return Err(ConfigError::Validation(format!(
                "Config file not found: {}",
                p.display()
            )));
        }
    } else if let Some(p) = find_config_file() {
        read_yaml(&p)?
    } else {
        Config::default()
    };

    // 2) CLI overrides (highest precedence)
    apply_cli_overrides(&mut cfg, cli);

    // 3) Validate
    validate(&cfg)?;

    Ok(cfg)
}

/// Try common locations in order (first hit wins).
fn find_config_file() -> Option<PathBuf> {
    // XDG-style: ~/.config/lyspot/config.yaml
    if let Some(home) = home_dir() {
        let p = home.join(".config/lyspot/config.yaml");
        if p.exists() { return Some(p) }
        let p = home.join(".config/lyspot.yaml");
        if p.exists() { return Some(p) }
    }
    // project local
    for candidate in &["lyspot.yaml", "config.yaml", "config/lyspot.yaml"] {
        let p = PathBuf::from(candidate);
        if p.exists() { return Some(p) }
    }
    None
}

fn read_yaml(path: &Path) -> Result<Config, ConfigError> {
    let s = fs::read_to_string(path)?;
    parse_yaml(&s)
}

/// Parse a YAML document; missing keys keep their defaults and listed
/// bindings replace the built-in ones per action.
pub fn parse_yaml(s: &str) -> Result<Config, ConfigError> {
    let mut cfg: Config = serde_yaml::from_str(s)?;
    let mut bindings = default_bindings();
    bindings.extend(cfg.remote.bindings.drain());
    cfg.remote.bindings = bindings;
    Ok(cfg)
}

fn apply_cli_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(level) = cli.log_level.as_ref() { cfg.log_level = level.clone(); }
    if cli.debug                                { cfg.log_level = "debug".to_string(); }
    if let Some(port) = cli.port.as_ref()       { cfg.serial.port = port.clone(); }
    if let Some(baud) = cli.baud_rate           { cfg.serial.baud_rate = baud; }
    if cli.access_token.is_some()               { cfg.spotify.access_token = cli.access_token.clone(); }
    if let Some(freq) = cli.max_update_freq     { cfg.display.max_update_freq = freq; }
    if let Some(ms) = cli.refresh_ms            { cfg.player.refresh_ms = ms; }
}

/// Put any invariants here (required fields, ranges, etc.)
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    let fail = |msg: &str| Err(ConfigError::Validation(msg.to_string()));

    if cfg.serial.port.trim().is_empty() {
        return fail("serial port must be set");
    }
    if cfg.serial.baud_rate == 0 {
        return fail("serial baud_rate must be > 0");
    }
    if !(1..=1000).contains(&cfg.display.max_update_freq) {
        return fail("display max_update_freq must be 1..=1000");
    }
    if cfg.display.overlay_timeout_ms == 0 {
        return fail("display overlay_timeout_ms must be > 0");
    }
    if !(1..=240).contains(&cfg.display.frame_rate) {
        return fail("display frame_rate must be 1..=240");
    }
    if cfg.player.refresh_ms == 0 {
        return fail("player refresh_ms must be > 0");
    }
    if !(1..=100).contains(&cfg.player.volume_step) {
        return fail("player volume_step must be 1..=100");
    }

    let mut seen: HashMap<u8, RemoteAction> = HashMap::new();
    for (action, binding) in &cfg.remote.bindings {
        if let Some(other) = seen.insert(binding.command, *action) {
            return Err(ConfigError::Validation(format!(
                "remote command 0x{:02x} bound to both {:?} and {:?}",
                binding.command, other, action
            )));
        }
    }
    Ok(())
}
