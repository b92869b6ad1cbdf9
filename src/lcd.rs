/*
 *  lcd.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	16x2 character LCD controller, also keeps track of player state
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
use log::trace;

use crate::glyphs::{
    write_string,
    GLYPH_BAR,
    GLYPH_NOTE,
    GLYPH_PAUSE,
    GLYPH_PLAY,
    GLYPH_SPEAKER,
    GLYPH_THUMB,
    GLYPH_VOLUME_HIGH,
    GLYPH_VOLUME_LOW,
    SPACE,
};
use crate::serial::SerialLink;
use crate::spotify::PlaybackStatus;
use crate::timeout::{TimeoutTimer, DEFAULT_TIMEOUT_MS};

pub const LINE_WIDTH: usize = 16;
/// Frame sync byte, the controller reads up to this
pub const FRAME_TERMINATOR: u8 = 0xFF;
/// Maximum number of times per second the display is pushed
pub const UPDATE_FREQ: u32 = 10;

const NO_TRACK: &str = "Not playing";

/// What the display believes the player is doing.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSnapshot {
    pub has_status: bool,
    pub playing: bool,
    pub song_name: String,
    /// ms, never below 1
    pub duration: u64,
    /// ms, never beyond `duration`
    pub position: u64,
    /// percent 0..=100
    pub volume: u8,
    /// absolute ms at which `position` was last brought up to date
    pub last_update: u64,
}

impl Default for PlayerSnapshot {
    fn default() -> Self {
        PlayerSnapshot {
            has_status: false,
            playing: false,
            song_name: String::new(),
            duration: 1,
            position: 0,
            volume: 0,
            last_update: 0,
        }
    }
}

/// `m:ss`, rounded to the nearest second, minutes unbounded.
pub fn format_time(ms: u64) -> String {
    let total_secs = (ms + 500) / 1000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

pub struct LcdDisplay<L> {
    link: L,
    player: PlayerSnapshot,
    line1: [u8; LINE_WIDTH],
    line2: [u8; LINE_WIDTH],
    volume_timeout: TimeoutTimer,
    position_timeout: TimeoutTimer,
    flush_timeout: TimeoutTimer,
}

impl<L: SerialLink> LcdDisplay<L> {
    pub fn new(link: L) -> Self {
        Self::with_timing(link, DEFAULT_TIMEOUT_MS, UPDATE_FREQ)
    }

    pub fn with_timing(link: L, overlay_ms: u64, max_update_freq: u32) -> Self {
        LcdDisplay {
            link,
            player: PlayerSnapshot::default(),
            line1: [SPACE; LINE_WIDTH],
            line2: [SPACE; LINE_WIDTH],
            volume_timeout: TimeoutTimer::new(overlay_ms),
            position_timeout: TimeoutTimer::new(overlay_ms),
            flush_timeout: TimeoutTimer::from_frequency(max_update_freq),
        }
    }

    pub fn player(&self) -> &PlayerSnapshot {
        &self.player
    }

    pub fn lines(&self) -> (&[u8; LINE_WIDTH], &[u8; LINE_WIDTH]) {
        (&self.line1, &self.line2)
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    /// Interval between transmissions, ms
    pub fn flush_interval(&self) -> u64 {
        self.flush_timeout.duration()
    }

    /// Display the volume level temporarily
    pub fn show_volume(&mut self) {
        self.volume_timeout.reset();
    }

    /// Display the numeric position and duration temporarily
    pub fn show_position(&mut self) {
        self.position_timeout.reset();
    }

    pub fn volume_overlay_active(&self) -> bool {
        self.volume_timeout.active()
    }

    pub fn position_overlay_active(&self) -> bool {
        self.position_timeout.active()
    }

    /// Replace the snapshot with freshly fetched state, all fields at once.
    pub fn apply_status(&mut self, status: &PlaybackStatus, now: u64) {
        let duration = status.duration_ms.unwrap_or(1).max(1);
        self.player = PlayerSnapshot {
            has_status: true,
            playing: status.is_playing,
            song_name: status.track_name.clone().unwrap_or_else(|| NO_TRACK.to_string()),
            duration,
            position: status.position_ms.unwrap_or(0).min(duration),
            volume: status.volume_percent.unwrap_or(0).min(100),
            last_update: now,
        };
    }

    /// Fall back to the "play a song" screen.
    pub fn clear_status(&mut self) {
        self.player.has_status = false;
    }

    /// Nudge the volume by `delta` percent, clamped. Returns the new level.
    pub fn adjust_volume(&mut self, delta: i16) -> u8 {
        let volume = (self.player.volume as i16 + delta).clamp(0, 100);
        self.player.volume = volume as u8;
        self.player.volume
    }

    /// Move the play head by `delta` ms, clamped to the track. Returns the
    /// new position.
    pub fn seek_by(&mut self, delta: i64, now: u64) -> u64 {
        let target = (self.player.position as i64).saturating_add(delta).max(0) as u64;
        self.player.position = target.min(self.player.duration);
        self.player.last_update = now;
        self.player.position
    }

    /// Flip play/pause. Returns whether we are now playing.
    pub fn toggle_playing(&mut self, now: u64) -> bool {
        self.player.playing = !self.player.playing;
        // otherwise a resume would credit the paused time to the position
        self.player.last_update = now;
        self.player.playing
    }

    /// Step the controller forward in time; call once per frame.
    ///
    /// Buffers are rebuilt every call but only pushed to the link at the
    /// configured rate.
    pub fn tic(&mut self, delta_ms: u64, now: u64) {
        self.volume_timeout.tic(delta_ms);
        self.position_timeout.tic(delta_ms);
        self.flush_timeout.tic(delta_ms);

        if self.player.has_status && self.player.playing {
            let elapsed = now.saturating_sub(self.player.last_update);
            self.player.position = (self.player.position + elapsed).min(self.player.duration);
            self.player.last_update = now;
        }

        self.construct();
        if !self.flush_timeout.active() {
            self.flush_timeout.reset();
            self.flush();
        }
    }

    /// Rebuild, but do not send the display contents.
    pub fn construct(&mut self) {
        if !self.player.has_status {
            self.line1[0] = GLYPH_NOTE;
            write_string(&mut self.line1, " Play a song", 1, Some(LINE_WIDTH - 1));
            self.line2.fill(GLYPH_BAR);
            return;
        }

        if self.position_timeout.active() {
            let text = format!(
                "{} / {}",
                format_time(self.player.position),
                format_time(self.player.duration)
            );
            write_string(&mut self.line1, &text, 0, Some(LINE_WIDTH));
        } else {
            self.line1[0] = if self.player.playing { GLYPH_PLAY } else { GLYPH_PAUSE };
            self.line1[1] = SPACE;
            write_string(&mut self.line1, &self.player.song_name, 2, Some(LINE_WIDTH - 2));
        }

        self.line2.fill(GLYPH_BAR);
        if self.volume_timeout.active() {
            let volume = self.player.volume.min(100) as usize;
            self.line2[0] = GLYPH_SPEAKER;
            self.line2[1] = match volume {
                0 => SPACE,
                1..=49 => GLYPH_VOLUME_LOW,
                _ => GLYPH_VOLUME_HIGH,
            };
            self.line2[2 + volume * 13 / 100] = GLYPH_THUMB;
        } else {
            let duration = self.player.duration.max(1);
            let idx = (self.player.position * LINE_WIDTH as u64 / duration).min(LINE_WIDTH as u64 - 1);
            self.line2[idx as usize] = GLYPH_THUMB;
        }
    }

    /// Send the display contents to the controller, if it is there.
    pub fn flush(&mut self) {
        if !self.link.is_connected() {
            return;
        }
        trace!("flush {:?} {:?}", self.line1, self.line2);
        self.link.write(&self.line1);
        self.link.write(&self.line2);
        self.link.write(&[FRAME_TERMINATOR]);
    }
}
