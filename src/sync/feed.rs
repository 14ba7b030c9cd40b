//! Fan-out change feed
//!
//! Every subscriber gets its own unbounded flume channel. Dropping the
//! receiver is the unsubscribe: the next publish prunes the dead sender.

use std::sync::Mutex;

pub struct ChangeFeed<T> {
    subscribers: Mutex<Vec<flume::Sender<T>>>,
}

impl<T: Clone> ChangeFeed<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self) -> flume::Receiver<T> {
        let (tx, rx) = flume::unbounded();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    pub fn publish(&self, event: T) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .map(|mut subscribers| {
                subscribers.retain(|tx| !tx.is_disconnected());
                subscribers.len()
            })
            .unwrap_or(0)
    }
}

impl<T: Clone> Default for ChangeFeed<T> {
    fn default() -> Self {
        Self::new()
    }
}
