//! Newest-wins frame hand-off
//!
//! A capacity-1 crossbeam channel where the sender evicts a pending item
//! instead of blocking or dropping the new one. The consumer always sees
//! the most recent frame and at most one frame waits at a time.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

pub struct NewestSender<T> {
    tx: Sender<T>,
    /// Used only to evict the pending item
    evict: Receiver<T>,
}

/// Outcome of a send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sent {
    Queued,
    /// Queued after dropping an older pending item
    Replaced,
    /// Channel closed, item discarded
    Dropped,
}

pub fn newest_wins<T>() -> (NewestSender<T>, Receiver<T>) {
    let (tx, rx) = bounded(1);
    (
        NewestSender {
            tx,
            evict: rx.clone(),
        },
        rx,
    )
}

impl<T> NewestSender<T> {
    /// Queue `item`, replacing whatever is still pending
    pub fn send(&self, item: T) -> Sent {
        let mut item = item;
        let mut replaced = false;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return if replaced { Sent::Replaced } else { Sent::Queued },
                Err(TrySendError::Full(back)) => {
                    item = back;
                    replaced |= self.evict.try_recv().is_ok();
                }
                Err(TrySendError::Disconnected(_)) => return Sent::Dropped,
            }
        }
    }

    /// Discard the pending item, if any
    pub fn clear(&self) {
        while self.evict.try_recv().is_ok() {}
    }
}
