/*
 *  spotify.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Spotify Web API player status and playback control
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
use async_trait::async_trait;
use log::{debug, error};
use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub const API_BASE: &str = "https://api.spotify.com/v1";

#[derive(Debug, Error)]
pub enum SpotifyError {
    /// Network issues, timeouts, non-success status codes
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON deserialization error: {0}")]
    Json(#[from] serde_json::Error),
    /// Token expired or revoked, a new one has to be configured
    #[error("Spotify rejected the access token")]
    Unauthorized,
    /// 204 from /me/player, nothing is playing on any device
    #[error("No active playback")]
    NoActivePlayback,
    #[error("Unexpected HTTP status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Track,
    Context,
    #[default]
    Off,
}

impl RepeatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatMode::Track => "track",
            RepeatMode::Context => "context",
            RepeatMode::Off => "off",
        }
    }

    /// off -> context -> track -> off
    pub fn next(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::Context,
            RepeatMode::Context => RepeatMode::Track,
            RepeatMode::Track => RepeatMode::Off,
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player state as reported by the API, fields the API may omit stay optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackStatus {
    pub is_playing: bool,
    pub track_name: Option<String>,
    pub duration_ms: Option<u64>,
    pub position_ms: Option<u64>,
    pub volume_percent: Option<u8>,
    pub shuffle: Option<bool>,
    pub repeat: Option<RepeatMode>,
}

#[derive(Debug, Deserialize)]
struct CurrentPlayback {
    #[serde(default)]
    is_playing: bool,
    progress_ms: Option<u64>,
    item: Option<PlaybackItem>,
    device: Option<PlaybackDevice>,
    shuffle_state: Option<bool>,
    repeat_state: Option<RepeatMode>,
}

#[derive(Debug, Deserialize)]
struct PlaybackItem {
    name: Option<String>,
    duration_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct PlaybackDevice {
    volume_percent: Option<u8>,
}

impl From<CurrentPlayback> for PlaybackStatus {
    fn from(cp: CurrentPlayback) -> Self {
        PlaybackStatus {
            is_playing: cp.is_playing,
            track_name: cp.item.as_ref().and_then(|i| i.name.clone()),
            duration_ms: cp.item.as_ref().and_then(|i| i.duration_ms),
            position_ms: cp.progress_ms,
            volume_percent: cp.device.and_then(|d| d.volume_percent),
            shuffle: cp.shuffle_state,
            repeat: cp.repeat_state,
        }
    }
}

/// Where player status comes from.
#[async_trait]
pub trait StatusSource: Send + Sync {
    async fn fetch_status(&self) -> Result<PlaybackStatus, SpotifyError>;
}

/// Where playback commands go.
#[async_trait]
pub trait CommandSink: Send + Sync {
    async fn play(&self) -> Result<(), SpotifyError>;
    async fn pause(&self) -> Result<(), SpotifyError>;
    async fn skip_next(&self) -> Result<(), SpotifyError>;
    async fn skip_previous(&self) -> Result<(), SpotifyError>;
    async fn set_position(&self, position_ms: u64) -> Result<(), SpotifyError>;
    async fn set_volume(&self, volume_percent: u8) -> Result<(), SpotifyError>;
    async fn set_shuffle(&self, shuffle: bool) -> Result<(), SpotifyError>;
    async fn set_repeat(&self, repeat: RepeatMode) -> Result<(), SpotifyError>;
}

/// Thin client over the Spotify Web API player endpoints.
#[derive(Debug, Clone)]
pub struct SpotifyClient {
    client: Client,
    api_base: String,
    access_token: String,
}

impl SpotifyClient {
    /// Creates a client with default headers and timeouts; the access token
    /// is obtained elsewhere and handed in.
    pub fn new(access_token: &str, api_base: &str) -> Result<Self, SpotifyError> {
        const VERSION: &str = concat!(env!("CARGO_PKG_NAME"), " v", env!("CARGO_PKG_VERSION"));

        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(VERSION));
        headers.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .connect_timeout(Duration::from_millis(2000))
            .timeout(Duration::from_millis(5000))
            .default_headers(headers)
            .build()?;

        Ok(SpotifyClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
        })
    }

    async fn api_request(
        &self,
        method: Method,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<Response, SpotifyError> {
        let url = format!("{}{}", self.api_base, endpoint);
        debug!("{} {} {:?}", method, url, query);

        let mut request = self.client
            .request(method.clone(), &url)
            .bearer_auth(&self.access_token);
        if !query.is_empty() {
            request = request.query(query);
        }
        if method != Method::GET {
            // the API wants an explicit empty body on PUT/POST
            request = request.header(header::CONTENT_LENGTH, "0");
        }

        let response = request.send().await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            error!("Spotify access token rejected on {}, configure a fresh token", endpoint);
            return Err(SpotifyError::Unauthorized);
        }
        Ok(response.error_for_status()?)
    }

    async fn command(&self, method: Method, endpoint: &str, query: &[(&str, String)]) -> Result<(), SpotifyError> {
        self.api_request(method, endpoint, query).await.map(|_| ())
    }
}

#[async_trait]
impl StatusSource for SpotifyClient {
    async fn fetch_status(&self) -> Result<PlaybackStatus, SpotifyError> {
        let response = self.api_request(Method::GET, "/me/player", &[]).await?;
        match response.status() {
            StatusCode::NO_CONTENT => Err(SpotifyError::NoActivePlayback),
            StatusCode::OK => {
                let body = response.text().await?;
                let current: CurrentPlayback = serde_json::from_str(&body)?;
                Ok(current.into())
            }
            other => Err(SpotifyError::Status(other.as_u16())),
        }
    }
}

#[async_trait]
impl CommandSink for SpotifyClient {
    async fn play(&self) -> Result<(), SpotifyError> {
        self.command(Method::PUT, "/me/player/play", &[]).await
    }

    async fn pause(&self) -> Result<(), SpotifyError> {
        self.command(Method::PUT, "/me/player/pause", &[]).await
    }

    async fn skip_next(&self) -> Result<(), SpotifyError> {
        self.command(Method::POST, "/me/player/next", &[]).await
    }

    async fn skip_previous(&self) -> Result<(), SpotifyError> {
        self.command(Method::POST, "/me/player/previous", &[]).await
    }

    async fn set_position(&self, position_ms: u64) -> Result<(), SpotifyError> {
        self.command(Method::PUT, "/me/player/seek", &[("position_ms", position_ms.to_string())]).await
    }

    async fn set_volume(&self, volume_percent: u8) -> Result<(), SpotifyError> {
        let volume = volume_percent.min(100);
        self.command(Method::PUT, "/me/player/volume", &[("volume_percent", volume.to_string())]).await
    }

    async fn set_shuffle(&self, shuffle: bool) -> Result<(), SpotifyError> {
        self.command(Method::PUT, "/me/player/shuffle", &[("state", shuffle.to_string())]).await
    }

    async fn set_repeat(&self, repeat: RepeatMode) -> Result<(), SpotifyError> {
        self.command(Method::PUT, "/me/player/repeat", &[("state", repeat.to_string())]).await
    }
}
