//! Progress registry shared by all upload sessions
//!
//! Every session registers itself and receives a [`ProgressHandle`]. Updates
//! go through the handle into a guarded map and are then forwarded to a
//! [`ProgressObserver`]. The map lock is never held while the observer runs.

use filedrop_core::{FileName, ProgressObservation, SessionId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// Events emitted by the registry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// A session opened its destination and starts streaming.
    Started {
        id: SessionId,
        file_name: FileName,
        total: Option<u64>,
    },
    /// Bytes were written to the destination.
    Progress {
        id: SessionId,
        observation: ProgressObservation,
    },
    /// The session ended and its entry was removed.
    Finished {
        id: SessionId,
        observation: ProgressObservation,
        success: bool,
    },
}

impl ProgressEvent {
    pub fn id(&self) -> SessionId {
        match self {
            ProgressEvent::Started { id, .. }
            | ProgressEvent::Progress { id, .. }
            | ProgressEvent::Finished { id, .. } => *id,
        }
    }
}

/// Receives progress events. Called synchronously from the upload path, so
/// implementations should hand off any slow rendering.
pub trait ProgressObserver: Send + Sync {
    fn on_event(&self, event: ProgressEvent);
}

/// Observer that drops every event
pub struct NoOpObserver;

impl ProgressObserver for NoOpObserver {
    fn on_event(&self, _event: ProgressEvent) {}
}

/// Observer forwarding events into an unbounded channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelObserver { tx }, rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_event(&self, event: ProgressEvent) {
        // A closed receiver only means nobody renders any more.
        let _ = self.tx.send(event);
    }
}

/// Registry of in-flight uploads
pub struct ProgressRegistry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<SessionId, ProgressObservation>>,
    observer: Arc<dyn ProgressObserver>,
}

impl ProgressRegistry {
    /// Create a registry forwarding to `observer`
    pub fn new(observer: Arc<dyn ProgressObserver>) -> Arc<Self> {
        Arc::new(ProgressRegistry {
            next_id: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
            observer,
        })
    }

    /// Registry that tracks sessions but renders nothing
    pub fn silent() -> Arc<Self> {
        Self::new(Arc::new(NoOpObserver))
    }

    /// Register a new session and get its handle
    pub fn register(self: &Arc<Self>, file_name: FileName, total: Option<u64>) -> ProgressHandle {
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let observation = ProgressObservation {
            file_name: file_name.clone(),
            bytes_written: 0,
            total,
        };

        self.lock().insert(id, observation);
        self.observer.on_event(ProgressEvent::Started {
            id,
            file_name: file_name.clone(),
            total,
        });

        ProgressHandle {
            id,
            file_name,
            total,
            bytes_written: 0,
            finished: false,
            registry: Arc::clone(self),
        }
    }

    /// Number of sessions currently registered
    pub fn active(&self) -> usize {
        self.lock().len()
    }

    /// Current state of every active session, ordered by registration
    pub fn snapshot(&self) -> Vec<(SessionId, ProgressObservation)> {
        let mut entries: Vec<_> = self
            .lock()
            .iter()
            .map(|(id, obs)| (*id, obs.clone()))
            .collect();
        entries.sort_by_key(|(id, _)| *id);
        entries
    }

    fn update(&self, id: SessionId, observation: ProgressObservation) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.bytes_written = observation.bytes_written;
            entry.total = observation.total;
        }
        self.observer.on_event(ProgressEvent::Progress { id, observation });
    }

    fn remove(&self, id: SessionId, observation: ProgressObservation, success: bool) {
        self.lock().remove(&id);
        self.observer.on_event(ProgressEvent::Finished {
            id,
            observation,
            success,
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, ProgressObservation>> {
        // Entries stay consistent even if an observer panicked mid-update.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One session's registration. Dropping it without [`finish`](Self::finish)
/// reports the session as failed.
pub struct ProgressHandle {
    id: SessionId,
    file_name: FileName,
    total: Option<u64>,
    bytes_written: u64,
    finished: bool,
    registry: Arc<ProgressRegistry>,
}

impl ProgressHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Publish the running byte count
    pub fn report(&mut self, bytes_written: u64) {
        debug_assert!(bytes_written >= self.bytes_written, "progress went backwards");
        self.bytes_written = bytes_written.max(self.bytes_written);
        self.registry.update(self.id, self.observation());
    }

    /// End the session and remove it from the registry
    pub fn finish(mut self, success: bool) {
        self.close(success);
    }

    /// A declared total is not enforced, so it grows with an oversized body
    fn observation(&self) -> ProgressObservation {
        ProgressObservation {
            file_name: self.file_name.clone(),
            bytes_written: self.bytes_written,
            total: self.total.map(|total| total.max(self.bytes_written)),
        }
    }

    fn close(&mut self, success: bool) {
        if !self.finished {
            self.finished = true;
            self.registry.remove(self.id, self.observation(), success);
        }
    }
}

impl Drop for ProgressHandle {
    fn drop(&mut self) {
        self.close(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filedrop_core::NamePolicy;

    fn name(s: &str) -> FileName {
        FileName::new(s, NamePolicy::Permissive).unwrap()
    }

    #[test]
    fn test_register_report_finish() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));

        let mut handle = registry.register(name("a.bin"), Some(10));
        assert_eq!(registry.active(), 1);

        handle.report(4);
        handle.report(10);
        assert_eq!(registry.snapshot()[0].1.bytes_written, 10);

        handle.finish(true);
        assert_eq!(registry.active(), 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], ProgressEvent::Started { total: Some(10), .. }));
        match &events[3] {
            ProgressEvent::Finished { observation, success, .. } => {
                assert!(*success);
                assert_eq!(observation.bytes_written, 10);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_drop_reports_failure() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));

        {
            let mut handle = registry.register(name("b.bin"), None);
            handle.report(3);
        }

        assert_eq!(registry.active(), 0);
        let last = std::iter::from_fn(|| rx.try_recv().ok()).last().unwrap();
        assert!(matches!(last, ProgressEvent::Finished { success: false, .. }));
    }

    #[test]
    fn test_oversized_body_raises_total() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));

        let mut handle = registry.register(name("big.bin"), Some(2));
        handle.report(6);
        assert_eq!(registry.snapshot()[0].1.total, Some(6));
        handle.finish(true);

        let observed: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|e| match e {
                ProgressEvent::Progress { observation, .. } => Some(observation),
                _ => None,
            })
            .collect();
        assert_eq!(observed.len(), 1);
        assert_eq!(observed[0].bytes_written, 6);
        assert_eq!(observed[0].total, Some(6));
    }

    #[test]
    fn test_session_ids_are_unique() {
        let registry = ProgressRegistry::silent();
        let a = registry.register(name("same.bin"), None);
        let b = registry.register(name("same.bin"), None);
        assert_ne!(a.id(), b.id());
        assert_eq!(registry.active(), 2);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].0, a.id());
        assert_eq!(snapshot[1].0, b.id());
    }

    #[test]
    fn test_concurrent_sessions_do_not_interfere() {
        let (observer, mut rx) = ChannelObserver::new();
        let registry = ProgressRegistry::new(Arc::new(observer));

        let threads: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut handle = registry.register(name(&format!("file-{}", i)), Some(1000));
                    for n in 1..=100 {
                        handle.report(n * 10);
                    }
                    let id = handle.id();
                    handle.finish(true);
                    id
                })
            })
            .collect();

        let ids: Vec<_> = threads.into_iter().map(|t| t.join().unwrap()).collect();
        assert_eq!(registry.active(), 0);

        let events: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        for id in ids {
            let progress: Vec<u64> = events
                .iter()
                .filter_map(|e| match e {
                    ProgressEvent::Progress { id: eid, observation } if *eid == id => {
                        Some(observation.bytes_written)
                    }
                    _ => None,
                })
                .collect();
            assert_eq!(progress.len(), 100);
            assert!(progress.windows(2).all(|w| w[0] <= w[1]));
            assert_eq!(*progress.last().unwrap(), 1000);
        }
    }
}
