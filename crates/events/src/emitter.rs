//! In-process event fan-out.
//!
//! Listeners register a sender per event name. Publishing delivers the raw
//! payload to every sender registered on that name. A housekeeping task
//! periodically drops names with no listeners left.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use rand::Rng;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// How often empty event containers are dropped, before jitter.
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(30 * 60);

/// Upper bound of the random delay added to each cleanup tick.
pub const CLEANUP_JITTER: Duration = Duration::from_secs(60);

struct Descriptor {
    listener: u64,
    tx: mpsc::UnboundedSender<Bytes>,
}

type Container = Arc<Mutex<Vec<Descriptor>>>;

struct Inner {
    events: RwLock<HashMap<String, Container>>,
    next_id: AtomicU64,
    stopped: AtomicBool,
    done: watch::Sender<bool>,
}

impl Inner {
    fn remove_listener(&self, listener: u64, names: &[String]) {
        let events = self.events.read();
        for name in names {
            if let Some(container) = events.get(name) {
                container.lock().retain(|d| d.listener != listener);
            }
        }
    }

    fn cleanup(&self) -> usize {
        let mut events = self.events.write();
        let before = events.len();
        events.retain(|_, c| !c.lock().is_empty());
        before - events.len()
    }
}

/// Handle returned by [`EventEmitter::listen`]. Dropping it unbinds too.
pub struct Unbind {
    inner: Arc<Inner>,
    listener: u64,
    names: Vec<String>,
}

impl Unbind {
    /// Remove every registration made by the listen call.
    pub fn unbind(self) {
        drop(self);
    }
}

impl Drop for Unbind {
    fn drop(&mut self) {
        self.inner.remove_listener(self.listener, &self.names);
    }
}

/// Event-name keyed fan-out of raw payloads.
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<Inner>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    /// Create an emitter. Call [`EventEmitter::spawn_cleanup`] to start housekeeping.
    #[must_use]
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                events: RwLock::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                stopped: AtomicBool::new(false),
                done,
            }),
        }
    }

    /// Register `tx` on every name in `events`.
    pub fn listen<S: AsRef<str>>(&self, events: &[S], tx: mpsc::UnboundedSender<Bytes>) -> Unbind {
        let listener = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let names: Vec<String> = events.iter().map(|e| e.as_ref().to_string()).collect();

        {
            let mut map = self.inner.events.write();
            for name in &names {
                map.entry(name.clone()).or_default().lock().push(Descriptor {
                    listener,
                    tx: tx.clone(),
                });
            }
        }
        trace!(listener, events = ?names, "Listener bound");

        Unbind {
            inner: self.inner.clone(),
            listener,
            names,
        }
    }

    /// Deliver `payload` to every listener of `event`. Returns how many received it.
    pub fn publish_raw(&self, event: &str, payload: Bytes) -> usize {
        let container = self.inner.events.read().get(event).cloned();
        let Some(container) = container else {
            return 0;
        };

        let mut descriptors = container.lock();
        descriptors.retain(|d| !d.tx.is_closed());
        let mut delivered = 0;
        for d in descriptors.iter() {
            if d.tx.send(payload.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Number of event names currently tracked.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.inner.events.read().len()
    }

    /// Drop event names without listeners. Returns how many were dropped.
    pub fn cleanup(&self) -> usize {
        self.inner.cleanup()
    }

    /// Run [`EventEmitter::cleanup`] every `interval` plus up to `jitter` until stopped.
    pub fn spawn_cleanup(&self, interval: Duration, jitter: Duration) -> JoinHandle<()> {
        let inner = self.inner.clone();
        let mut done = self.inner.done.subscribe();
        let jitter_ms = u64::try_from(jitter.as_millis()).unwrap_or(u64::MAX);

        tokio::spawn(async move {
            loop {
                let extra = if jitter_ms == 0 {
                    0
                } else {
                    rand::thread_rng().gen_range(0..=jitter_ms)
                };
                let wait = interval + Duration::from_millis(extra);

                tokio::select! {
                    () = tokio::time::sleep(wait) => {
                        let removed = inner.cleanup();
                        if removed > 0 {
                            debug!(removed, "Dropped empty event containers");
                        }
                    }
                    _ = done.wait_for(|stopped| *stopped) => break,
                }
            }
        })
    }

    /// Stop housekeeping. Only the first call has an effect.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            self.inner.done.send_replace(true);
        }
    }

    /// Whether [`EventEmitter::stop`] was called.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }
}
