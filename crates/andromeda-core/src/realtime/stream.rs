// ── Subscription streams ──
//
// Typed views over the manager's broadcast channels. A stream ends when
// the manager shuts down; a subscriber that falls behind skips the
// events it missed and keeps going.

use andromeda_api::RoomId;
use futures_util::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// An event received on a chat channel, tagged with its room.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomEvent<T> {
    pub room_id: RoomId,
    pub event: T,
}

/// Subscription to one kind of realtime event.
#[derive(Debug)]
pub struct EventStream<T: Clone + Send + 'static> {
    receiver: broadcast::Receiver<T>,
    shutdown: CancellationToken,
}

impl<T: Clone + Send + 'static> EventStream<T> {
    pub(crate) fn new(receiver: broadcast::Receiver<T>, shutdown: CancellationToken) -> Self {
        Self { receiver, shutdown }
    }

    /// Wait for the next event. Returns `None` once the manager has shut
    /// down.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            tokio::select! {
                biased;
                () = self.shutdown.cancelled() => return None,
                result = self.receiver.recv() => match result {
                    Ok(event) => return Some(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event subscriber lagged, events dropped");
                    }
                    Err(RecvError::Closed) => return None,
                },
            }
        }
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<T> {
        if self.shutdown.is_cancelled() {
            return None;
        }
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(skipped, "event subscriber lagged, events dropped");
                }
                Err(_) => return None,
            }
        }
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> impl Stream<Item = T> + Send {
        futures_util::stream::unfold(self, |mut stream| async move {
            let event = stream.recv().await?;
            Some((event, stream))
        })
    }
}
