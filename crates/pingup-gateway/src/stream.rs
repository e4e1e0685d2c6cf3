use std::convert::Infallible;
use std::time::Duration;

use bytes::Bytes;
use futures_util::Stream;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::info;

use crate::frame::Frame;
use crate::registry::{ConnectionRegistry, LiveHandle};

/// Runs its callback exactly once, when dropped.
pub struct CloseGuard {
    callback: Option<Box<dyn FnOnce() + Send>>,
}

impl CloseGuard {
    pub fn on_close(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            callback();
        }
    }
}

/// Open a live stream for `user_id` and register it.
///
/// The returned body stream starts with the connect greeting, then yields every
/// frame pushed to the user's handle in push order, with a keep-alive comment
/// every `keep_alive` of wall time. It ends when a newer stream for the same
/// user replaces this one. Dropping it (client disconnect, shutdown)
/// unregisters the handle unless it was already replaced.
pub fn open(
    registry: &ConnectionRegistry,
    user_id: &str,
    keep_alive: Duration,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    let (handle, mut rx) = LiveHandle::new(user_id);
    let conn_id = handle.conn_id();

    // Queued before registering so the greeting is always the first frame.
    handle.push(Frame::connected());

    if let Some(previous) = registry.register(handle) {
        info!("{} reconnected, replacing stream {}", user_id, previous.conn_id());
    }
    info!("{} opened live stream {} ({} online)", user_id, conn_id, registry.online_count());

    let guard = {
        let registry = registry.clone();
        let user_id = user_id.to_string();
        CloseGuard::on_close(move || {
            registry.unregister(&user_id, conn_id);
            info!("{} closed live stream {} ({} online)", user_id, conn_id, registry.online_count());
        })
    };

    async_stream::stream! {
        let _guard = guard;
        let mut ticker = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let frame = tokio::select! {
                next = rx.recv() => match next {
                    Some(frame) => frame,
                    // Registry dropped our handle: replaced by a newer stream.
                    None => break,
                },
                _ = ticker.tick() => Frame::KeepAlive,
            };
            yield Ok::<_, Infallible>(frame.encode());
        }
    }
}
