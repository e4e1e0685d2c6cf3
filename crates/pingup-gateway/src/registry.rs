use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::frame::Frame;

/// Write side of one open live stream.
///
/// Each handle gets a fresh `conn_id`; two handles for the same user are
/// told apart by it, never by the user id alone.
#[derive(Debug, Clone)]
pub struct LiveHandle {
    conn_id: Uuid,
    user_id: String,
    tx: mpsc::UnboundedSender<Frame>,
}

impl LiveHandle {
    /// Create a handle and the receiver its stream drains.
    pub fn new(user_id: &str) -> (Self, mpsc::UnboundedReceiver<Frame>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = Self {
            conn_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            tx,
        };
        (handle, rx)
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Queue a frame for the client. Never waits. Returns false if the stream
    /// is already gone; the disconnect path cleans that up, not the caller.
    pub fn push(&self, frame: Frame) -> bool {
        match self.tx.send(frame) {
            Ok(()) => true,
            Err(_) => {
                warn!(
                    "Dropped frame for {} ({}): stream closed",
                    self.user_id, self.conn_id
                );
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Delivery-side view of the registry: hand a frame to whichever stream a
/// user currently has open.
pub trait Publisher: Send + Sync {
    /// Returns false if the user has no open stream or it closed mid-push.
    fn publish(&self, user_id: &str, frame: Frame) -> bool;
}

/// Maps each user to their single open live stream.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    streams: Arc<RwLock<HashMap<String, LiveHandle>>>,
    /// Set by [`ConnectionRegistry::close_all`]; later registrations are refused.
    closed: Arc<AtomicBool>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the handle under its user id. A previous handle for the same user
    /// is replaced and returned; dropping it ends that older stream.
    pub fn register(&self, handle: LiveHandle) -> Option<LiveHandle> {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            // Dropping the handle ends the new stream right after its greeting.
            debug!("Refusing stream {} for {}: shutting down", handle.conn_id, handle.user_id);
            return None;
        }
        debug!("Registering stream {} for {}", handle.conn_id, handle.user_id);
        streams.insert(handle.user_id.clone(), handle)
    }

    /// Remove the user's entry, but only if `conn_id` still owns it.
    pub fn unregister(&self, user_id: &str, conn_id: Uuid) -> bool {
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        match streams.get(user_id) {
            Some(current) if current.conn_id == conn_id => {
                streams.remove(user_id);
                true
            }
            Some(_) => {
                debug!("Stale disconnect for {} ({}), newer stream kept", user_id, conn_id);
                false
            }
            None => false,
        }
    }

    pub fn lookup(&self, user_id: &str) -> Option<LiveHandle> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(user_id)
            .cloned()
    }

    pub fn online_count(&self) -> usize {
        self.streams.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Drop every registered handle. Each open stream sees its channel close
    /// and ends, which lets in-flight responses finish during shutdown. The
    /// registry stays closed afterwards. Returns how many streams were still live.
    pub fn close_all(&self) -> usize {
        let drained: Vec<LiveHandle> = {
            let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::SeqCst);
            streams.drain().map(|(_, handle)| handle).collect()
        };
        drained.iter().filter(|handle| !handle.is_closed()).count()
    }
}

impl Publisher for ConnectionRegistry {
    fn publish(&self, user_id: &str, frame: Frame) -> bool {
        match self.lookup(user_id) {
            Some(handle) => handle.push(frame),
            None => false,
        }
    }
}
