#[cfg(test)]
mod forward_test;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::message::{Message, MessagePriority};

/// Forwarder decides whether an accepted message re-enters the mesh.
///
/// A message is rebroadcast when forwarding is enabled and it either carries
/// the repeat flag or is urgent/emergency priority. The rebroadcast always
/// forces `repeat = true`, so downstream peers re-forward at most once before
/// their own history suppresses it.
#[derive(Debug)]
pub struct Forwarder {
    enabled: AtomicBool,
}

impl Default for Forwarder {
    fn default() -> Self {
        Forwarder::new(true)
    }
}

impl Forwarder {
    pub fn new(enabled: bool) -> Self {
        Forwarder {
            enabled: AtomicBool::new(enabled),
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn should_forward(&self, message: &Message) -> bool {
        if !self.is_enabled() {
            return false;
        }
        message.repeat()
            || matches!(
                message.priority(),
                MessagePriority::Urgent | MessagePriority::Emergency
            )
    }

    /// The logical message to rebroadcast: the same content with the repeat
    /// flag forced on. Part numbering is recomputed by the splitter, which
    /// normalizes propagation regardless of how the fragments arrived.
    pub fn prepare(&self, message: &Message) -> Message {
        let mut rebroadcast = message.clone();
        rebroadcast.set_repeat(true);
        rebroadcast
    }
}
