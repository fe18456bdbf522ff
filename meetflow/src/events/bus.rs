//! Per-task publish/subscribe channels for progress events.
//!
//! Each task gets a bounded broadcast channel plus the most recent event.
//! A new subscriber first receives that latest event (its view of the
//! current state) and then every event published after it attached, in
//! publish order. Publishing never waits on subscribers; one that falls
//! more than the channel capacity behind skips the lost events.

use crate::core::ProgressEvent;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;

/// Default per-task channel capacity.
pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug)]
struct Channel {
    sender: broadcast::Sender<ProgressEvent>,
    last: Option<ProgressEvent>,
    terminal: bool,
}

impl Channel {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            last: None,
            terminal: false,
        }
    }

    // Terminal channels are done; event-less ones were only opened by a
    // subscriber of an unknown or already-discarded task.
    fn is_idle(&self) -> bool {
        self.sender.receiver_count() == 0 && (self.terminal || self.last.is_none())
    }
}

#[derive(Debug)]
struct BusInner {
    channels: DashMap<String, Arc<Mutex<Channel>>>,
    capacity: usize,
}

/// Fans progress events out to any number of observers per task.
///
/// Cheap to clone; clones share the same channels.
#[derive(Debug, Clone)]
pub struct ProgressBus {
    inner: Arc<BusInner>,
}

impl Default for ProgressBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ProgressBus {
    /// Creates a bus whose channels buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                channels: DashMap::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Publishes an event on the channel of `event.task_id`.
    ///
    /// Never blocks. A final event marks the channel terminal; it is
    /// discarded right away if nobody is listening.
    pub fn publish(&self, event: ProgressEvent) {
        let task_id = event.task_id.clone();
        let channel = self.channel(&task_id);
        let discard = {
            let mut channel = channel.lock();
            if channel.terminal {
                debug!(task_id = %task_id, "Dropping event published after final event");
                return;
            }
            channel.terminal = event.is_final;
            channel.last = Some(event.clone());
            // Err only means there are no receivers right now.
            let _ = channel.sender.send(event);
            channel.terminal
        };
        if discard {
            self.close(&task_id);
        }
    }

    /// Publishes an intermediate event for the stage the task is in.
    ///
    /// The event is dropped unless the channel's latest event has the same
    /// status and the channel is not terminal, so a report that lands after
    /// its stage moved on is lost rather than shown out of order. Progress
    /// is raised to the latest published value. Returns the event as sent.
    pub fn publish_within_stage(&self, mut event: ProgressEvent) -> Option<ProgressEvent> {
        let channel = self.inner.channels.get(&event.task_id).map(|c| Arc::clone(c.value()))?;
        let mut channel = channel.lock();
        let (status, progress) = channel.last.as_ref().map(|l| (l.status, l.progress))?;
        if channel.terminal || status != event.status {
            debug!(task_id = %event.task_id, "Dropping stale in-stage progress");
            return None;
        }
        event.progress = event.progress.max(progress);
        channel.last = Some(event.clone());
        let _ = channel.sender.send(event.clone());
        Some(event)
    }

    /// Subscribes to a task's events.
    ///
    /// The returned subscription starts with the latest published event,
    /// if any, followed by live events until the final one.
    #[must_use]
    pub fn subscribe(&self, task_id: &str) -> Subscription {
        let channel = self.channel(task_id);
        let channel = channel.lock();
        Subscription {
            pending: channel.last.clone(),
            receiver: Some(channel.sender.subscribe()),
            finished: false,
            bus: Some((self.clone(), task_id.to_string())),
        }
    }

    /// Discards the channel of `task_id` if it is idle.
    ///
    /// Returns true if a channel was removed.
    pub fn close(&self, task_id: &str) -> bool {
        let removed = self
            .inner
            .channels
            .remove_if(task_id, |_, channel| channel.lock().is_idle())
            .is_some();
        if removed {
            debug!(task_id = %task_id, "Progress channel discarded");
        }
        removed
    }

    /// Number of live subscribers for a task.
    #[must_use]
    pub fn subscriber_count(&self, task_id: &str) -> usize {
        self.inner
            .channels
            .get(task_id)
            .map_or(0, |c| c.value().lock().sender.receiver_count())
    }

    /// Returns true if a channel exists for the task.
    #[must_use]
    pub fn has_channel(&self, task_id: &str) -> bool {
        self.inner.channels.contains_key(task_id)
    }

    /// Number of open channels.
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.inner.channels.len()
    }

    fn channel(&self, task_id: &str) -> Arc<Mutex<Channel>> {
        let capacity = self.inner.capacity;
        let entry = self
            .inner
            .channels
            .entry(task_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Channel::new(capacity))));
        Arc::clone(entry.value())
    }
}

/// A handle yielding one task's progress events.
///
/// Dropping it detaches from the channel; the pipeline keeps running.
#[derive(Debug)]
pub struct Subscription {
    pending: Option<ProgressEvent>,
    receiver: Option<broadcast::Receiver<ProgressEvent>>,
    finished: bool,
    bus: Option<(ProgressBus, String)>,
}

impl Subscription {
    /// A subscription that yields a single event and ends.
    #[must_use]
    pub fn from_snapshot(event: ProgressEvent) -> Self {
        Self {
            pending: Some(event),
            receiver: None,
            finished: false,
            bus: None,
        }
    }

    /// Returns true if an event is buffered for immediate delivery.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Waits for the next event. Returns `None` after the final event or
    /// when the channel is gone.
    pub async fn recv(&mut self) -> Option<ProgressEvent> {
        if self.finished {
            return None;
        }
        if let Some(event) = self.pending.take() {
            self.finished = event.is_final;
            return Some(event);
        }
        let Some(receiver) = self.receiver.as_mut() else {
            self.finished = true;
            return None;
        };
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    self.finished = event.is_final;
                    return Some(event);
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Progress subscriber lagged");
                }
                Err(RecvError::Closed) => {
                    self.finished = true;
                    return None;
                }
            }
        }
    }

    /// Converts the subscription into a stream of events.
    pub fn into_stream(self) -> impl Stream<Item = ProgressEvent> + Send {
        stream::unfold(self, |mut sub| async move {
            let event = sub.recv().await?;
            Some((event, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some((bus, task_id)) = self.bus.take() {
            bus.close(&task_id);
        }
    }
}
