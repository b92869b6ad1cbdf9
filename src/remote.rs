/*
 *  remote.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	IR remote button throttling
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
use log::debug;

/// Default minimum gap (ms) between two honoured presses of one button
pub const REMOTE_BUTTON_TIMEOUT: u64 = 200;
const COMMAND_SLOTS: usize = u8::MAX as usize + 1;

pub type RemoteCallback = Box<dyn FnMut(u64) + Send>;

#[derive(Default)]
struct ThrottleEntry {
    last_fired: u64,
    min_interval: u64,
    callback: Option<RemoteCallback>,
}

/// Held IR buttons repeat every ~110ms; this turns that stream into
/// discrete presses, rate limited per command code.
pub struct RemoteThrottler {
    entries: Vec<ThrottleEntry>,
    default_interval: u64,
}

impl Default for RemoteThrottler {
    fn default() -> Self {
        Self::new(REMOTE_BUTTON_TIMEOUT)
    }
}

impl RemoteThrottler {
    pub fn new(default_interval: u64) -> Self {
        let mut entries = Vec::with_capacity(COMMAND_SLOTS);
        entries.resize_with(COMMAND_SLOTS, ThrottleEntry::default);
        RemoteThrottler { entries, default_interval }
    }

    /// Register `callback` for `command` with the default interval.
    pub fn on<F>(&mut self, command: u8, callback: F)
    where
        F: FnMut(u64) + Send + 'static,
    {
        self.on_with_interval(command, callback, self.default_interval);
    }

    /// Register or replace the handler for `command`. The time of the last
    /// honoured press is kept across re-registration.
    pub fn on_with_interval<F>(&mut self, command: u8, callback: F, min_interval: u64)
    where
        F: FnMut(u64) + Send + 'static,
    {
        let entry = &mut self.entries[command as usize];
        entry.callback = Some(Box::new(callback));
        entry.min_interval = min_interval;
    }

    #[cfg(test)]
    pub fn is_registered(&self, command: u8) -> bool {
        self.entries[command as usize].callback.is_some()
    }

    /// Feed one received button code. Returns true if the handler ran.
    pub fn dispatch(&mut self, command: u8, time: u64) -> bool {
        debug!("[remote] receive: {:02x} @ {}", command, time);
        let entry = &mut self.entries[command as usize];
        let Some(callback) = entry.callback.as_mut() else {
            return false;
        };

        // a time at or before the last fire never clears the interval
        if time.saturating_sub(entry.last_fired) > entry.min_interval {
            debug!("[remote] DISPATCH {:02x}", command);
            entry.last_fired = time;
            callback(time);
            true
        } else {
            false
        }
    }
}
