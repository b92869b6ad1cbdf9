/*
 *  updater.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Player status polling and command round trips
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
use log::{debug, error, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::lcd::LcdDisplay;
use crate::serial::SerialLink;
use crate::spotify::{PlaybackStatus, SpotifyError, StatusSource};

/// How often to fetch player status
pub const REFRESH_INTERVAL: Duration = Duration::from_millis(1000);

pub type Generation = u64;

/// Which update cycle is allowed to touch the snapshot.
///
/// Starting or cancelling bumps the generation; anything still carrying an
/// older number resolves into nothing.
#[derive(Debug, Default)]
pub struct UpdateCycle {
    generation: Generation,
}

impl UpdateCycle {
    pub fn begin(&mut self) -> Generation {
        self.generation += 1;
        self.generation
    }

    pub fn cancel(&mut self) {
        self.generation += 1;
    }

    pub fn is_live(&self, generation: Generation) -> bool {
        generation == self.generation
    }
}

/// Completion messages from spawned network work.
#[derive(Debug)]
pub enum UpdateEvent {
    Fetched {
        generation: Generation,
        result: Result<PlaybackStatus, SpotifyError>,
    },
    /// A user command finished (or failed); refresh after the delay
    CommandDone { refresh_in: Duration },
}

#[derive(Debug, PartialEq)]
pub enum CycleOutcome {
    Applied(PlaybackStatus),
    Failed,
    /// Superseded while in flight, nothing applied, nothing scheduled
    Canceled,
}

/// Drives the fetch → apply → reschedule loop.
pub struct PlaybackUpdater {
    source: Arc<dyn StatusSource>,
    cycle: UpdateCycle,
    refresh: Duration,
    pending: Option<(Instant, Generation)>,
    events_tx: mpsc::UnboundedSender<UpdateEvent>,
}

impl PlaybackUpdater {
    pub fn new(
        source: Arc<dyn StatusSource>,
        refresh: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<UpdateEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let updater = PlaybackUpdater {
            source,
            cycle: UpdateCycle::default(),
            refresh,
            pending: None,
            events_tx,
        };
        (updater, events_rx)
    }

    /// Request an update `delay` from now, superseding anything pending or
    /// in flight.
    pub fn schedule(&mut self, delay: Duration) {
        let generation = self.cycle.begin();
        self.pending = Some((Instant::now() + delay, generation));
    }

    /// Drop the pending update and orphan any fetch in flight.
    pub fn cancel(&mut self) {
        self.cycle.cancel();
        self.pending = None;
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|(at, _)| at)
    }

    /// Kick off the pending fetch. Call when `next_deadline()` has passed.
    pub fn start_pending(&mut self) -> Option<Generation> {
        let (_, generation) = self.pending.take()?;
        if !self.cycle.is_live(generation) {
            return None;
        }
        let source = Arc::clone(&self.source);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = source.fetch_status().await;
            let _ = tx.send(UpdateEvent::Fetched { generation, result });
        });
        Some(generation)
    }

    /// Run a user command in the background; the pending cycle is cancelled
    /// now and a fresh one scheduled `refresh_in` after the command returns.
    pub fn issue<F>(&mut self, what: &'static str, command: F, refresh_in: Duration)
    where
        F: Future<Output = Result<(), SpotifyError>> + Send + 'static,
    {
        self.cancel();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = command.await {
                warn!("Spotify {} failed: {}", what, e);
            }
            let _ = tx.send(UpdateEvent::CommandDone { refresh_in });
        });
    }

    /// Apply a completion message to the display state.
    pub fn handle<L: SerialLink>(
        &mut self,
        event: UpdateEvent,
        lcd: &mut LcdDisplay<L>,
        now: u64,
    ) -> Option<CycleOutcome> {
        match event {
            UpdateEvent::Fetched { generation, result } => Some(self.complete(generation, result, lcd, now)),
            UpdateEvent::CommandDone { refresh_in } => {
                self.schedule(refresh_in);
                None
            }
        }
    }

    fn complete<L: SerialLink>(
        &mut self,
        generation: Generation,
        result: Result<PlaybackStatus, SpotifyError>,
        lcd: &mut LcdDisplay<L>,
        now: u64,
    ) -> CycleOutcome {
        if !self.cycle.is_live(generation) {
            debug!("Discarding status from superseded update {}", generation);
            return CycleOutcome::Canceled;
        }
        let outcome = match result {
            Ok(status) => {
                lcd.apply_status(&status, now);
                CycleOutcome::Applied(status)
            }
            Err(SpotifyError::NoActivePlayback) => {
                debug!("No active playback");
                lcd.clear_status();
                CycleOutcome::Failed
            }
            Err(e) => {
                error!("Error fetching player status: {}", e);
                lcd.clear_status();
                CycleOutcome::Failed
            }
        };
        self.schedule(self.refresh);
        outcome
    }
}
