//! Transport bridges.
//!
//! The server core only talks to `ClientBridge`; it never touches sockets.
//! `RemoteBridge` feeds a socket writer task through a channel, so bridge
//! calls never block the update thread. `LoopbackBridge` serves the
//! in-process client (listen server / split screen) and is trusted: joining
//! through it bypasses the auth and precache stages.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;
use vanguard_shared::net::ServerMessage;

/// One client's outbound half, as seen by the server core.
pub trait ClientBridge: Send {
    /// Queues a message toward the client. Must not block.
    fn send(&mut self, msg: &ServerMessage) -> anyhow::Result<()>;

    /// True for trusted in-process bridges.
    fn is_local(&self) -> bool;
}

/// Bridge to a remote peer: messages go to the connection's writer task.
pub struct RemoteBridge {
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl RemoteBridge {
    pub fn new(tx: mpsc::UnboundedSender<ServerMessage>) -> Self {
        Self { tx }
    }
}

impl ClientBridge for RemoteBridge {
    fn send(&mut self, msg: &ServerMessage) -> anyhow::Result<()> {
        // A closed channel means the writer task is gone; the reader side
        // will surface the disconnect, so this is not an error here.
        if self.tx.send(msg.clone()).is_err() {
            debug!("remote bridge send after writer shutdown");
        }
        Ok(())
    }

    fn is_local(&self) -> bool {
        false
    }
}

/// Bridge to an in-process client. Sent messages land in a shared queue the
/// local client drains on its own schedule.
pub struct LoopbackBridge {
    queue: Arc<Mutex<VecDeque<ServerMessage>>>,
}

/// Drain handle for the local client half of a loopback pair.
#[derive(Clone)]
pub struct LoopbackReceiver {
    queue: Arc<Mutex<VecDeque<ServerMessage>>>,
}

impl LoopbackBridge {
    pub fn pair() -> (Self, LoopbackReceiver) {
        let queue = Arc::new(Mutex::new(VecDeque::new()));
        (
            Self {
                queue: Arc::clone(&queue),
            },
            LoopbackReceiver { queue },
        )
    }
}

impl ClientBridge for LoopbackBridge {
    fn send(&mut self, msg: &ServerMessage) -> anyhow::Result<()> {
        self.queue
            .lock()
            .expect("loopback queue poisoned")
            .push_back(msg.clone());
        Ok(())
    }

    fn is_local(&self) -> bool {
        true
    }
}

impl LoopbackReceiver {
    /// Removes and returns all queued messages.
    pub fn drain(&self) -> Vec<ServerMessage> {
        self.queue
            .lock()
            .expect("loopback queue poisoned")
            .drain(..)
            .collect()
    }

    /// Removes and returns the oldest queued message.
    pub fn pop(&self) -> Option<ServerMessage> {
        self.queue
            .lock()
            .expect("loopback queue poisoned")
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().expect("loopback queue poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
