/*
 *  app.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Application loop: frames, serial input, remote actions, status updates
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
use log::{debug, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::{Config, PlayerConfig, RemoteAction};
use crate::lcd::LcdDisplay;
use crate::remote::RemoteThrottler;
use crate::serial::{parse_record, InboundRecord, SerialLink};
use crate::spotify::{CommandSink, RepeatMode, StatusSource};
use crate::updater::{CycleOutcome, PlaybackUpdater, UpdateEvent};

// settle time before re-reading status after a command
const VOLUME_SETTLE: Duration = Duration::from_millis(200);
const TRACK_SETTLE: Duration = Duration::from_millis(100);
const SEEK_SETTLE: Duration = Duration::from_millis(500);

/// Millisecond frame clock, deltas and absolute time since start.
#[derive(Debug)]
pub struct FrameClock {
    origin: Instant,
    last: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        FrameClock { origin: Instant::now(), last: 0 }
    }

    pub fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    /// (delta since previous tick, now)
    pub fn tick(&mut self) -> (u64, u64) {
        let now = self.now_ms();
        let delta = now.saturating_sub(self.last);
        self.last = now;
        (delta, now)
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct App<L> {
    lcd: LcdDisplay<L>,
    remote: RemoteThrottler,
    updater: PlaybackUpdater,
    events_rx: mpsc::UnboundedReceiver<UpdateEvent>,
    actions_rx: mpsc::UnboundedReceiver<RemoteAction>,
    sink: Arc<dyn CommandSink>,
    clock: FrameClock,
    player: PlayerConfig,
    frame_period: Duration,
    shuffle: bool,
    repeat: RepeatMode,
}

impl<L: SerialLink> App<L> {
    pub fn new(
        link: L,
        source: Arc<dyn StatusSource>,
        sink: Arc<dyn CommandSink>,
        config: &Config,
    ) -> Self {
        let lcd = LcdDisplay::with_timing(
            link,
            config.display.overlay_timeout_ms,
            config.display.max_update_freq,
        );
        let (updater, events_rx) = PlaybackUpdater::new(
            source,
            Duration::from_millis(config.player.refresh_ms),
        );

        // remote callbacks only queue the action, it is performed on the loop
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let mut remote = RemoteThrottler::new(config.remote.default_throttle_ms);
        for (action, binding) in &config.remote.bindings {
            let tx = actions_tx.clone();
            let action = *action;
            let interval = binding.throttle_ms.unwrap_or(config.remote.default_throttle_ms);
            debug!("Binding remote 0x{:02x} to {:?} ({}ms)", binding.command, action, interval);
            remote.on_with_interval(binding.command, move |_| { let _ = tx.send(action); }, interval);
        }

        App {
            lcd,
            remote,
            updater,
            events_rx,
            actions_rx,
            sink,
            clock: FrameClock::new(),
            player: config.player.clone(),
            frame_period: Duration::from_micros(1_000_000 / config.display.frame_rate.max(1) as u64),
            shuffle: false,
            repeat: RepeatMode::Off,
        }
    }

    pub fn lcd(&self) -> &LcdDisplay<L> {
        &self.lcd
    }

    /// Run until `shutdown` resolves.
    pub async fn run<F>(&mut self, mut lines_rx: mpsc::UnboundedReceiver<String>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut frames = tokio::time::interval(self.frame_period);
        frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        // first status straight away
        self.updater.schedule(Duration::ZERO);

        info!("Entering main display loop");
        loop {
            let deadline = self.updater.next_deadline();
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Closed Application Loop.");
                    break;
                }
                _ = frames.tick() => {
                    let (delta, now) = self.clock.tick();
                    self.lcd.tic(delta, now);
                }
                Some(line) = lines_rx.recv() => {
                    self.handle_line(&line);
                    self.process_actions();
                }
                Some(event) = self.events_rx.recv() => {
                    self.on_update_event(event);
                }
                _ = until(deadline) => {
                    self.updater.start_pending();
                }
            }
        }
    }

    /// One line from the controller.
    pub fn handle_line(&mut self, line: &str) {
        match parse_record(line) {
            Ok(InboundRecord::IrCommand { command, time }) => {
                self.remote.dispatch(command, time);
            }
            Ok(InboundRecord::Debug(value)) => warn!("[controller] {}", value),
            Err(e) => warn!("[serial] dropped '{}': {}", line, e),
        }
    }

    /// Perform whatever the remote callbacks queued.
    pub fn process_actions(&mut self) {
        while let Ok(action) = self.actions_rx.try_recv() {
            self.perform(action);
        }
    }

    fn on_update_event(&mut self, event: UpdateEvent) {
        let now = self.clock.now_ms();
        if let Some(CycleOutcome::Applied(status)) = self.updater.handle(event, &mut self.lcd, now) {
            if let Some(shuffle) = status.shuffle {
                self.shuffle = shuffle;
            }
            if let Some(repeat) = status.repeat {
                self.repeat = repeat;
            }
        }
    }

    /// Optimistically update the display, then tell Spotify.
    pub fn perform(&mut self, action: RemoteAction) {
        let now = self.clock.now_ms();
        let sink = Arc::clone(&self.sink);
        info!("Remote action {:?}", action);

        match action {
            RemoteAction::VolumeUp | RemoteAction::VolumeDown => {
                let step = self.player.volume_step as i16;
                let delta = if action == RemoteAction::VolumeUp { step } else { -step };
                self.lcd.show_volume();
                let volume = self.lcd.adjust_volume(delta);
                self.updater.issue("set_volume", async move { sink.set_volume(volume).await }, VOLUME_SETTLE);
            }
            RemoteAction::Previous => {
                self.updater.issue("skip_previous", async move { sink.skip_previous().await }, TRACK_SETTLE);
            }
            RemoteAction::Next => {
                self.updater.issue("skip_next", async move { sink.skip_next().await }, TRACK_SETTLE);
            }
            RemoteAction::PlayPause => {
                if self.lcd.toggle_playing(now) {
                    self.updater.issue("play", async move { sink.play().await }, TRACK_SETTLE);
                } else {
                    self.updater.issue("pause", async move { sink.pause().await }, TRACK_SETTLE);
                }
            }
            RemoteAction::JumpForward | RemoteAction::JumpBackward => {
                let step = self.player.seek_step_ms as i64;
                let delta = if action == RemoteAction::JumpForward { step } else { -step };
                self.lcd.show_position();
                let position = self.lcd.seek_by(delta, now);
                self.updater.issue("seek", async move { sink.set_position(position).await }, SEEK_SETTLE);
            }
            RemoteAction::ToggleShuffle => {
                self.shuffle = !self.shuffle;
                let shuffle = self.shuffle;
                self.updater.issue("shuffle", async move { sink.set_shuffle(shuffle).await }, TRACK_SETTLE);
            }
            RemoteAction::CycleRepeat => {
                self.repeat = self.repeat.next();
                let repeat = self.repeat;
                self.updater.issue("repeat", async move { sink.set_repeat(repeat).await }, TRACK_SETTLE);
            }
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glyphs::GLYPH_SPEAKER;
    use crate::lcd::tests::MockLink;
    use crate::spotify::{PlaybackStatus, SpotifyError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Canned(PlaybackStatus);

    #[async_trait]
    impl StatusSource for Canned {
        async fn fetch_status(&self) -> Result<PlaybackStatus, SpotifyError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<String>>);

    impl Recorder {
        fn log(&self, s: String) -> Result<(), SpotifyError> {
            self.0.lock().unwrap().push(s);
            Ok(())
        }

        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandSink for Recorder {
        async fn play(&self) -> Result<(), SpotifyError> { self.log("play".into()) }
        async fn pause(&self) -> Result<(), SpotifyError> { self.log("pause".into()) }
        async fn skip_next(&self) -> Result<(), SpotifyError> { self.log("next".into()) }
        async fn skip_previous(&self) -> Result<(), SpotifyError> { self.log("previous".into()) }
        async fn set_position(&self, ms: u64) -> Result<(), SpotifyError> { self.log(format!("seek {}", ms)) }
        async fn set_volume(&self, v: u8) -> Result<(), SpotifyError> { self.log(format!("volume {}", v)) }
        async fn set_shuffle(&self, s: bool) -> Result<(), SpotifyError> { self.log(format!("shuffle {}", s)) }
        async fn set_repeat(&self, r: RepeatMode) -> Result<(), SpotifyError> { self.log(format!("repeat {}", r)) }
    }

    fn status() -> PlaybackStatus {
        PlaybackStatus {
            is_playing: true,
            track_name: Some("Live".to_string()),
            duration_ms: Some(180_000),
            position_ms: Some(60_000),
            volume_percent: Some(50),
            shuffle: Some(false),
            repeat: Some(RepeatMode::Context),
        }
    }

    fn app() -> (App<MockLink>, Arc<Recorder>) {
        let sink = Arc::new(Recorder::default());
        let app = App::new(
            MockLink::connected(),
            Arc::new(Canned(status())),
            sink.clone(),
            &Config::default(),
        );
        (app, sink)
    }

    fn ir(command: u8, time: u64) -> String {
        format!(r#"{{"type":"ircommand","command":{},"time":{}}}"#, command, time)
    }

    async fn settle(app: &mut App<MockLink>) {
        let event = app.events_rx.recv().await.unwrap();
        app.on_update_event(event);
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_button_is_throttled() {
        let (mut app, sink) = app();
        app.lcd.apply_status(&status(), 0);

        app.handle_line(&ir(0x46, 1_000));
        app.handle_line(&ir(0x46, 1_100));
        app.process_actions();
        assert_eq!(app.lcd.player().volume, 58);
        assert!(app.lcd.volume_overlay_active());

        settle(&mut app).await;
        assert_eq!(sink.calls(), vec!["volume 58"]);
        assert!(app.updater.next_deadline().is_some());

        app.handle_line(&ir(0x15, 1_200));
        app.process_actions();
        settle(&mut app).await;
        assert_eq!(app.lcd.player().volume, 50);
        app.lcd.construct();
        assert_eq!(app.lcd.lines().1[0], GLYPH_SPEAKER);
    }

    #[tokio::test(start_paused = true)]
    async fn test_play_pause_and_seek() {
        let (mut app, sink) = app();
        app.lcd.apply_status(&status(), 0);

        app.handle_line(&ir(0x40, 1_000));
        app.process_actions();
        assert!(!app.lcd.player().playing);
        settle(&mut app).await;

        app.handle_line(&ir(0x09, 1_000));
        app.process_actions();
        assert!(app.lcd.position_overlay_active());
        assert_eq!(app.lcd.player().position, 65_000);
        settle(&mut app).await;

        app.handle_line(&ir(0x07, 1_200));
        app.handle_line(&ir(0x07, 1_400));
        app.process_actions();
        assert_eq!(app.lcd.player().position, 55_000);
        settle(&mut app).await;
        settle(&mut app).await;

        assert_eq!(sink.calls(), vec!["pause", "seek 65000", "seek 60000", "seek 55000"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbound_debug_and_garbage_lines() {
        let (mut app, sink) = app();
        app.handle_line(&ir(0xFF, 5_000));
        app.handle_line(r#"{"type":"debug","message":"expected 33; got only 3 bytes of data"}"#);
        app.handle_line("{not json");
        app.handle_line(r#"{"type":"ircommand","command":999,"time":5000}"#);
        app.process_actions();
        assert!(app.events_rx.try_recv().is_err());
        assert!(sink.calls().is_empty());
        assert!(!app.lcd.player().has_status);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shuffle_and_repeat_follow_status() {
        let mut config = Config::default();
        config.remote.bindings.insert(RemoteAction::ToggleShuffle, crate::config::Binding { command: 0x47, throttle_ms: None });
        config.remote.bindings.insert(RemoteAction::CycleRepeat, crate::config::Binding { command: 0x45, throttle_ms: None });
        let sink = Arc::new(Recorder::default());
        let mut app = App::new(MockLink::connected(), Arc::new(Canned(status())), sink.clone(), &config);

        app.updater.schedule(Duration::ZERO);
        app.updater.start_pending();
        settle(&mut app).await;
        assert_eq!(app.repeat, RepeatMode::Context);

        app.handle_line(&ir(0x47, 1_000));
        app.handle_line(&ir(0x45, 1_000));
        app.process_actions();
        settle(&mut app).await;
        settle(&mut app).await;
        assert_eq!(sink.calls(), vec!["shuffle true", "repeat track"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_loop_renders_and_polls() {
        let (mut app, _sink) = app();
        let (_lines_tx, lines_rx) = mpsc::unbounded_channel();
        app.run(lines_rx, tokio::time::sleep(Duration::from_millis(2_500))).await;

        let player = app.lcd().player();
        assert!(player.has_status);
        assert_eq!(player.song_name, "Live");
        assert!(app.lcd().link().frames() >= 15);
        assert!(app.updater.next_deadline().is_some());
    }
}
