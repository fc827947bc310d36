//! Wire: the in-process, multi-subscriber event bus.
//!
//! A single producer (the owning Engine) publishes [`WireMessage`]s; any
//! number of subscribers (UIs, recorders, sub-agent bridges) drain them
//! independently. `send` never blocks the producer: subscribers that fall
//! behind a configured high-water mark simply miss the oldest events they
//! haven't read yet, signalled to them as a lag rather than stalling anyone.

use std::sync::Mutex;

use jimi_protocol::WireMessage;
use tokio::sync::broadcast;

/// Default number of buffered events per subscriber before older ones are
/// dropped for that (lagging) subscriber only.
const DEFAULT_CAPACITY: usize = 1024;

pub struct Wire {
    sender: Mutex<broadcast::Sender<WireMessage>>,
    capacity: usize,
}

impl Wire {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self {
            sender: Mutex::new(sender),
            capacity,
        }
    }

    /// Publishes `msg`. Non-blocking; if there are currently no subscribers
    /// the event is simply discarded.
    pub fn send(&self, msg: WireMessage) {
        let sender = self.sender.lock().expect("wire sender mutex poisoned");
        let _ = sender.send(msg);
    }

    /// Registers a new subscriber. Dropping the returned handle unsubscribes.
    pub fn subscribe(&self) -> WireSubscription {
        let receiver = self
            .sender
            .lock()
            .expect("wire sender mutex poisoned")
            .subscribe();
        WireSubscription { receiver }
    }

    /// Discards existing subscribers and reinitializes the channel. Used
    /// when a new task starts in an existing engine.
    pub fn reset(&self) {
        let mut sender = self.sender.lock().expect("wire sender mutex poisoned");
        let (new_sender, _receiver) = broadcast::channel(self.capacity);
        *sender = new_sender;
    }

    /// Ends the stream: every live subscriber's next `recv()` returns `None`.
    pub fn complete(&self) {
        self.reset();
    }
}

impl Default for Wire {
    fn default() -> Self {
        Self::new()
    }
}

/// A lazy, infinite handle onto the Wire's event stream, until [`Wire::complete`]
/// or [`Wire::reset`] is called.
pub struct WireSubscription {
    receiver: broadcast::Receiver<WireMessage>,
}

impl WireSubscription {
    /// Awaits the next event. Returns `None` once the stream has ended.
    /// A lagging subscriber's skipped events are dropped and logged; `recv`
    /// transparently resumes from the next available event rather than
    /// surfacing the lag as an error.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(msg) => return Some(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "wire subscriber lagged; dropping skipped events");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
