/*
 *  tests/controller_integration.rs
 *
 *  End to end: controller serial stream, remote, display frames
 *
 *  LySpot - worth the squeeze
 *  (c) 2020-26 Stuart Hunter
 */

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use lyspot::app::App;
use lyspot::config::{parse_yaml, Config};
use lyspot::glyphs::{GLYPH_NOTE, GLYPH_PLAY};
use lyspot::lcd::{LcdDisplay, FRAME_TERMINATOR, LINE_WIDTH};
use lyspot::serial::{run_session, SerialLink};
use lyspot::spotify::{CommandSink, PlaybackStatus, RepeatMode, SpotifyError, StatusSource};

const FRAME_LEN: usize = LINE_WIDTH * 2 + 1;

/// Hands frames to the serial session like `SerialPort` does.
struct ChannelLink(mpsc::UnboundedSender<Vec<u8>>);

impl SerialLink for ChannelLink {
    fn is_connected(&self) -> bool {
        true
    }

    fn write(&mut self, bytes: &[u8]) {
        let _ = self.0.send(bytes.to_vec());
    }
}

struct Playing;

#[async_trait]
impl StatusSource for Playing {
    async fn fetch_status(&self) -> Result<PlaybackStatus, SpotifyError> {
        Ok(PlaybackStatus {
            is_playing: true,
            track_name: Some("Teardrop".to_string()),
            duration_ms: Some(330_000),
            position_ms: Some(1_000),
            volume_percent: Some(30),
            ..Default::default()
        })
    }
}

#[derive(Default)]
struct Recorder(Mutex<Vec<String>>);

impl Recorder {
    fn log(&self, s: &str) -> Result<(), SpotifyError> {
        self.0.lock().unwrap().push(s.to_string());
        Ok(())
    }
}

#[async_trait]
impl CommandSink for Recorder {
    async fn play(&self) -> Result<(), SpotifyError> { self.log("play") }
    async fn pause(&self) -> Result<(), SpotifyError> { self.log("pause") }
    async fn skip_next(&self) -> Result<(), SpotifyError> { self.log("next") }
    async fn skip_previous(&self) -> Result<(), SpotifyError> { self.log("previous") }
    async fn set_position(&self, _ms: u64) -> Result<(), SpotifyError> { self.log("seek") }
    async fn set_volume(&self, _v: u8) -> Result<(), SpotifyError> { self.log("volume") }
    async fn set_shuffle(&self, _s: bool) -> Result<(), SpotifyError> { self.log("shuffle") }
    async fn set_repeat(&self, _r: RepeatMode) -> Result<(), SpotifyError> { self.log("repeat") }
}

#[tokio::test]
async fn test_idle_frame_layout() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut lcd = LcdDisplay::new(ChannelLink(tx));
    lcd.construct();
    lcd.flush();

    let mut frame = Vec::new();
    while let Ok(bytes) = rx.try_recv() {
        frame.extend(bytes);
    }
    assert_eq!(frame.len(), FRAME_LEN);
    assert_eq!(frame[0], GLYPH_NOTE);
    assert_eq!(&frame[1..13], b" Play a song");
    assert_eq!(frame[FRAME_LEN - 1], FRAME_TERMINATOR);
}

#[tokio::test(start_paused = true)]
async fn test_remote_press_reaches_spotify_and_frames_reach_controller() {
    let (host, mut controller) = duplex(64 * 1024);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel();
    let (line_tx, line_rx) = mpsc::unbounded_channel();
    let session = tokio::spawn(async move { run_session(host, &mut out_rx, &line_tx).await });

    // next track, then a debug record and some line noise
    controller
        .write_all(b"{\"type\":\"ircommand\",\"command\":67,\"time\":1000}\r\n")
        .await
        .unwrap();
    controller
        .write_all(b"{\"type\":\"debug\",\"message\":\"expected 33\"}\r\n\xfe\xff\r\n")
        .await
        .unwrap();

    let sink = Arc::new(Recorder::default());
    let mut app = App::new(ChannelLink(out_tx), Arc::new(Playing), sink.clone(), &Config::default());
    app.run(line_rx, tokio::time::sleep(Duration::from_millis(1_500))).await;

    assert_eq!(*sink.0.lock().unwrap(), vec!["next"]);
    assert_eq!(app.lcd().player().song_name, "Teardrop");

    let mut frame = [0u8; FRAME_LEN];
    controller.read_exact(&mut frame).await.unwrap();
    assert_eq!(frame[FRAME_LEN - 1], FRAME_TERMINATOR);

    drop(app);
    assert!(session.await.unwrap().is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_rebound_button_from_yaml() {
    let config = parse_yaml("remote:\n  bindings:\n    play_pause:\n      command: 13\n").unwrap();
    let sink = Arc::new(Recorder::default());
    let (tx, _rx) = mpsc::unbounded_channel();
    let mut app = App::new(ChannelLink(tx), Arc::new(Playing), sink.clone(), &config);

    // old play code is free now
    app.handle_line(r#"{"type":"ircommand","command":64,"time":1000}"#);
    app.handle_line(r#"{"type":"ircommand","command":13,"time":1000}"#);
    app.process_actions();
    assert!(app.lcd().player().playing);

    app.run(mpsc::unbounded_channel().1, tokio::time::sleep(Duration::from_millis(500))).await;
    assert_eq!(*sink.0.lock().unwrap(), vec!["play"]);
    let (line1, _) = app.lcd().lines();
    assert_eq!(line1[0], GLYPH_PLAY);
}
