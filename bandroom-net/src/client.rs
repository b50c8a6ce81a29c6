//! Thin synchronous client for bandroom's event-stream protocol.
//!
//! No particular frontend is part of this crate's scope — this is the
//! connect/send/receive primitive a frontend (or a test harness) builds on:
//! just the framing and a background reader thread, since bandroom has no
//! client-side state to reconcile.

use std::io::{self, BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use log::warn;

use crate::framing::{read_message, write_message};
use crate::protocol::{ClientEvent, ServerEvent, WRITE_TIMEOUT};

/// A connected client. Owns the write half directly for `send`; inbound
/// events arrive via a background reader thread and are drained with
/// `recv`/`recv_matching`.
pub struct RoomClient {
    writer: BufWriter<TcpStream>,
    events: Receiver<ServerEvent>,
}

impl RoomClient {
    pub fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr)?;
        let write_stream = stream.try_clone()?;
        write_stream.set_write_timeout(Some(WRITE_TIMEOUT))?;
        let read_stream = stream;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(read_stream);
            loop {
                match read_message::<_, ServerEvent>(&mut reader) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        if e.kind() != io::ErrorKind::UnexpectedEof {
                            warn!(target: "client", "read error: {}", e);
                        }
                        break;
                    }
                }
            }
        });

        Ok(Self {
            writer: BufWriter::new(write_stream),
            events: rx,
        })
    }

    pub fn send(&mut self, event: ClientEvent) -> io::Result<()> {
        write_message(&mut self.writer, &event)
    }

    /// Wait up to `timeout` for the next inbound event, or `None` on
    /// timeout or disconnect.
    pub fn recv(&self, timeout: Duration) -> Option<ServerEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Wait for the next event matching `pred` within `timeout`, discarding
    /// anything else — used when a connection is also subscribed to
    /// high-frequency channels like metronome ticks and only one event kind
    /// under test matters.
    pub fn recv_matching(&self, timeout: Duration, pred: impl Fn(&ServerEvent) -> bool) -> Option<ServerEvent> {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            match self.events.recv_timeout(remaining) {
                Ok(event) if pred(&event) => return Some(event),
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
    }
}
