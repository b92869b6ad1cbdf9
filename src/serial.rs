/*
 *  serial.rs
 *
 *  LySpot - worth the squeeze
 *	(c) 2020-26 Stuart Hunter
 *
 *	Serial link to the LCD / IR receiver controller
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
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;

use crate::config::SerialConfig;

/// Byte sink the display engine flushes into.
pub trait SerialLink {
    fn is_connected(&self) -> bool;
    /// Fire-and-forget; a write on a dead link is dropped.
    fn write(&mut self, bytes: &[u8]);
}

#[derive(Debug, Error)]
pub enum SerialError {
    #[error("Serial port error: {0}")]
    Port(#[from] tokio_serial::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serial link closed by peer")]
    Closed,
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("record has no 'type' field")]
    MissingType,
    #[error("unknown record type '{0}'")]
    UnknownType(String),
    #[error("remote command {0} outside 0..=255")]
    CommandOutOfRange(i64),
}

/// One line of input from the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundRecord {
    /// IR remote button, `time` is the controller's millis() at decode
    IrCommand { command: u8, time: u64 },
    /// Controller diagnostics, e.g. short display frames
    Debug(Value),
}

#[derive(Debug, Deserialize)]
struct IrCommandFields {
    command: i64,
    time: f64,
}

/// Parse one newline-delimited JSON record.
pub fn parse_record(line: &str) -> Result<InboundRecord, RecordError> {
    let value: Value = serde_json::from_str(line)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(RecordError::MissingType)?;
    match kind {
        "ircommand" => {
            let fields: IrCommandFields = serde_json::from_value(value)?;
            let command = u8::try_from(fields.command)
                .map_err(|_| RecordError::CommandOutOfRange(fields.command))?;
            // negative or NaN times saturate to 0
            let time = fields.time as u64;
            Ok(InboundRecord::IrCommand { command, time })
        }
        "debug" => Ok(InboundRecord::Debug(value)),
        other => Err(RecordError::UnknownType(other.to_string())),
    }
}

/// Handle to the controller's serial port.
///
/// Writes are queued to a background task; the connected flag follows the
/// supervisor, which reopens the port after any I/O failure.
#[derive(Debug, Clone)]
pub struct SerialPort {
    connected: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
}

impl SerialLink for SerialPort {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn write(&mut self, bytes: &[u8]) {
        let _ = self.tx.send(bytes.to_vec());
    }
}

impl SerialPort {
    /// Start the port supervisor. Returns the write handle, the stream of
    /// inbound lines and the supervisor task.
    pub fn open(config: &SerialConfig) -> (Self, mpsc::UnboundedReceiver<String>, JoinHandle<()>) {
        let connected = Arc::new(AtomicBool::new(false));
        let (tx, out_rx) = mpsc::unbounded_channel();
        let (line_tx, line_rx) = mpsc::unbounded_channel();

        let handle = tokio::spawn(supervise(
            config.port.clone(),
            config.baud_rate,
            Duration::from_millis(config.reconnect_ms),
            Arc::clone(&connected),
            out_rx,
            line_tx,
        ));

        (SerialPort { connected, tx }, line_rx, handle)
    }
}

async fn supervise(
    port: String,
    baud_rate: u32,
    reconnect: Duration,
    connected: Arc<AtomicBool>,
    mut out_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    line_tx: mpsc::UnboundedSender<String>,
) {
    let mut reported = false;
    loop {
        if line_tx.is_closed() {
            debug!("Serial supervisor for {} shutting down", port);
            break;
        }
        match tokio_serial::new(&port, baud_rate).open_native_async() {
            Ok(stream) => {
                info!("Serial port {} open at {} baud", port, baud_rate);
                reported = false;
                // anything queued while we were away is stale
                while out_rx.try_recv().is_ok() {}
                connected.store(true, Ordering::Release);
                let result = run_session(stream, &mut out_rx, &line_tx).await;
                connected.store(false, Ordering::Release);
                match result {
                    Ok(()) => {
                        debug!("Serial session on {} ended", port);
                        break;
                    }
                    Err(e) => warn!("Serial port {} disconnected: {}", port, e),
                }
            }
            Err(e) => {
                if !reported {
                    warn!("Unable to open serial port {}: {} (retrying)", port, e);
                    reported = true;
                }
            }
        }
        tokio::time::sleep(reconnect).await;
    }
}

/// Longest inbound line kept; anything longer is noise and is skipped up to
/// the next newline.
pub const MAX_LINE: usize = 1024;

async fn read_line_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<usize>
where
    R: AsyncBufRead + AsyncRead + Unpin,
{
    let room = MAX_LINE.saturating_sub(buf.len()).max(1) as u64;
    reader.take(room).read_until(b'\n', buf).await
}

/// Pump one connected stream until it fails or the application hangs up.
///
/// `Ok(())` means the application side went away; errors mean the port did.
pub async fn run_session<S>(
    stream: S,
    out_rx: &mut mpsc::UnboundedReceiver<Vec<u8>>,
    line_tx: &mpsc::UnboundedSender<String>,
) -> Result<(), SerialError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (reader, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(128);
    let mut overlong = false;

    loop {
        tokio::select! {
            read = read_line_capped(&mut reader, &mut buf) => {
                if read? == 0 {
                    return Err(SerialError::Closed);
                }
                if buf.last() != Some(&b'\n') {
                    // cap hit without a line break
                    if !overlong {
                        warn!("[serial] line exceeds {} bytes, skipping to next newline", MAX_LINE);
                    }
                    overlong = true;
                    buf.clear();
                    continue;
                }
                if overlong {
                    overlong = false;
                    buf.clear();
                    continue;
                }
                let line = String::from_utf8_lossy(&buf)
                    .trim_end_matches(['\r', '\n'])
                    .to_string();
                buf.clear();
                if !line.is_empty() && line_tx.send(line).is_err() {
                    return Ok(());
                }
            }
            out = out_rx.recv() => {
                match out {
                    Some(bytes) => {
                        writer.write_all(&bytes).await?;
                        writer.flush().await?;
                    }
                    None => return Ok(()),
                }
            }
        }
    }
}
