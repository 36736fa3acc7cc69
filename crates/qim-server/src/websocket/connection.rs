//! Socket client connection state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use qim_core::Frame;
use tokio::sync::mpsc;
use tracing::warn;

/// Lifecycle of one socket connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Upgraded, session not yet opened.
    Unopened,
    /// Session open; calls are accepted.
    Open,
    /// Terminal. Nothing is sent after this point.
    Closed,
}

/// A connected socket client.
pub struct ClientConnection {
    /// Unique connection ID.
    pub id: String,
    state: Mutex<ConnectionState>,
    /// Send channel to the client's socket write task.
    tx: mpsc::Sender<String>,
    /// When the session was opened; `None` until `Open`.
    opened_at: Mutex<Option<Instant>>,
    /// Whether the client has responded since the last heartbeat check.
    is_alive: AtomicBool,
    /// When the last pong (or any inbound frame) was received.
    last_pong: Mutex<Instant>,
}

impl ClientConnection {
    /// Create a connection in the `Unopened` state.
    pub fn new(id: String, tx: mpsc::Sender<String>) -> Self {
        let now = Instant::now();
        Self {
            id,
            state: Mutex::new(ConnectionState::Unopened),
            tx,
            opened_at: Mutex::new(None),
            is_alive: AtomicBool::new(true),
            last_pong: Mutex::new(now),
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// `Unopened → Open`. Returns `false` from any other state.
    pub fn open(&self) -> bool {
        let mut state = self.state.lock();
        if *state == ConnectionState::Unopened {
            *state = ConnectionState::Open;
            *self.opened_at.lock() = Some(Instant::now());
            true
        } else {
            false
        }
    }

    /// Move to `Closed`. Returns `false` if already closed.
    pub fn close(&self) -> bool {
        let mut state = self.state.lock();
        let was_open = *state != ConnectionState::Closed;
        *state = ConnectionState::Closed;
        was_open
    }

    /// Whether the connection has reached `Closed`.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Queue a text frame for the client.
    ///
    /// Returns `false` once the connection is closed or the write task is gone.
    pub async fn send(&self, text: String) -> bool {
        if self.is_closed() {
            return false;
        }
        self.tx.send(text).await.is_ok()
    }

    /// Serialize `frame` and queue it.
    pub async fn send_frame(&self, frame: &Frame) -> bool {
        match frame.to_json() {
            Ok(json) => self.send(json).await,
            Err(e) => {
                warn!(conn_id = %self.id, error = %e, "failed to serialize frame");
                false
            }
        }
    }

    /// Mark the connection as alive (pong or inbound frame received).
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
        *self.last_pong.lock() = Instant::now();
    }

    /// Duration since the last pong (or connection establishment).
    pub fn last_pong_elapsed(&self) -> Duration {
        self.last_pong.lock().elapsed()
    }

    /// Check and reset the alive flag.
    ///
    /// Returns `true` if the client was heard from since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Time spent since `Open`, or `None` if the session never opened.
    pub fn open_duration(&self) -> Option<Duration> {
        self.opened_at.lock().as_ref().map(Instant::elapsed)
    }
}
