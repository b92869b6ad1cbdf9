/*
 *  timeout.rs
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

/// Minimum time (ms) an overlay screen stays up before reverting
pub const DEFAULT_TIMEOUT_MS: u64 = 4000;

/// Countdown driven by frame deltas rather than the wall clock.
///
/// Overlays and the flush pacer share this: `reset()` arms it for the full
/// duration, every `tic()` eats into it and it stops at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutTimer {
    remaining: u64,
    duration: u64,
}

impl Default for TimeoutTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_MS)
    }
}

impl TimeoutTimer {
    /// New, inactive timer. A zero duration is bumped to 1ms so `reset()`
    /// always activates it.
    pub fn new(duration_ms: u64) -> Self {
        Self { remaining: 0, duration: duration_ms.max(1) }
    }

    /// Timer whose duration paces `freq` events per second.
    pub fn from_frequency(freq: u32) -> Self {
        Self::new(1000u64.div_ceil(freq.max(1) as u64))
    }

    #[inline]
    pub fn tic(&mut self, delta_ms: u64) {
        if self.remaining > 0 {
            self.remaining = self.remaining.saturating_sub(delta_ms);
        }
    }

    #[inline]
    pub fn reset(&mut self) {
        self.remaining = self.duration;
    }

    #[inline]
    pub fn cancel(&mut self) {
        self.remaining = 0;
    }

    #[inline]
    pub fn active(&self) -> bool {
        self.remaining > 0
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    pub fn duration(&self) -> u64 {
        self.duration
    }
}
