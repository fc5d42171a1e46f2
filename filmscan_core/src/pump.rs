//! Background event delivery.
//!
//! The control loop must not block on slow sinks (stdout, JSON files), so
//! events are handed to a thread over a bounded channel. Each `EventPump`
//! spawns exactly one thread, which drains what is left and exits when the
//! pump is dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crossbeam_channel as xch;

use crate::protocol::Event;

/// An event stamped with the loop time it was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRecord {
    pub at_ms: u64,
    pub event: Event,
}

pub struct EventPump {
    tx: Option<xch::Sender<EventRecord>>,
    delivered: Arc<AtomicU64>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl EventPump {
    /// Spawn the delivery thread. `sink` runs on that thread for every record.
    pub fn spawn<W>(capacity: usize, mut sink: W) -> Self
    where
        W: FnMut(&EventRecord) + Send + 'static,
    {
        let (tx, rx) = xch::bounded::<EventRecord>(capacity.max(1));
        let delivered = Arc::new(AtomicU64::new(0));
        let delivered_clone = delivered.clone();

        let join_handle = std::thread::spawn(move || {
            // Ends once every sender is gone and the queue is empty.
            for rec in rx.iter() {
                sink(&rec);
                delivered_clone.fetch_add(1, Ordering::Relaxed);
            }
            tracing::trace!("event pump thread exiting cleanly");
        });

        Self {
            tx: Some(tx),
            delivered,
            join_handle: Some(join_handle),
        }
    }

    /// Queue a record, waiting if the sink is behind. Returns `false` if the
    /// delivery thread is gone.
    pub fn publish(&self, rec: EventRecord) -> bool {
        match &self.tx {
            Some(tx) => tx.send(rec).is_ok(),
            None => false,
        }
    }

    /// Records the sink has finished with.
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
}

impl Drop for EventPump {
    fn drop(&mut self) {
        // Disconnect so the thread drains and returns.
        self.tx.take();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("event pump thread joined"),
                Err(e) => tracing::warn!(?e, "event pump thread panicked during shutdown"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn drop_drains_queue_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        {
            let pump = EventPump::spawn(2, move |rec| {
                if let Ok(mut v) = sink.lock() {
                    v.push(rec.at_ms);
                }
            });
            for at_ms in 0..10 {
                assert!(pump.publish(EventRecord {
                    at_ms,
                    event: Event::FrameAvailable,
                }));
            }
        }
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
