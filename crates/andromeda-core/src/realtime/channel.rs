// ── Channel slots ──
//
// A slot holds at most one live connection of a given kind. Opening a new
// connection bumps the slot's generation; the connection task carries the
// generation it was started with and may only touch slot state while it
// is still current. Every state transition happens under the slot lock.

use std::sync::{Mutex, MutexGuard, PoisonError};

use andromeda_api::ChannelTarget;
use strum::{Display, IntoStaticStr};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

/// Which realtime channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelKind {
    Notifications,
    Chat,
}

/// Lifecycle of a channel: `Closed -> Connecting -> Open -> Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
#[strum(serialize_all = "lowercase")]
pub enum ChannelState {
    #[default]
    Closed,
    Connecting,
    Open,
}

/// Handed to the task that drives a newly started connection.
#[derive(Debug)]
pub(crate) struct ConnectionLease {
    pub generation: u64,
    pub target: ChannelTarget,
    pub cancel: CancellationToken,
    pub outbound: mpsc::UnboundedReceiver<String>,
}

#[derive(Debug)]
struct LiveConnection {
    generation: u64,
    target: ChannelTarget,
    cancel: CancellationToken,
    outbound: mpsc::UnboundedSender<String>,
}

#[derive(Debug, Default)]
struct SlotInner {
    generation: u64,
    live: Option<LiveConnection>,
}

#[derive(Debug)]
pub(crate) struct ChannelSlot {
    state: watch::Sender<ChannelState>,
    inner: Mutex<SlotInner>,
}

impl ChannelSlot {
    pub fn new() -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        Self {
            state,
            inner: Mutex::new(SlotInner::default()),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ChannelState> {
        self.state.subscribe()
    }

    /// Target of the live (connecting or open) connection.
    pub fn target(&self) -> Option<ChannelTarget> {
        self.lock().live.as_ref().map(|live| live.target)
    }

    /// Start a connection unless one is already connecting or open.
    pub fn begin_if_idle(
        &self,
        target: ChannelTarget,
        parent: &CancellationToken,
    ) -> Option<ConnectionLease> {
        let mut inner = self.lock();
        if inner.live.is_some() {
            return None;
        }
        Some(self.begin_locked(&mut inner, target, parent))
    }

    /// Start a connection, cancelling whatever the slot held before.
    pub fn replace(&self, target: ChannelTarget, parent: &CancellationToken) -> ConnectionLease {
        let mut inner = self.lock();
        if let Some(previous) = inner.live.take() {
            previous.cancel.cancel();
        }
        self.begin_locked(&mut inner, target, parent)
    }

    /// Mark the connection `generation` as open. Returns `false` when it
    /// has been superseded or closed meanwhile.
    pub fn mark_open(&self, generation: u64) -> bool {
        let inner = self.lock();
        if !is_current(&inner, generation) {
            return false;
        }
        self.state.send_replace(ChannelState::Open);
        true
    }

    /// Record that connection `generation` ended on its own. Returns
    /// `false` when it had already been superseded or closed explicitly.
    pub fn finish(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if !is_current(&inner, generation) {
            return false;
        }
        inner.live = None;
        self.state.send_replace(ChannelState::Closed);
        true
    }

    /// Close the live connection, if any. Idempotent.
    pub fn close(&self) {
        let mut inner = self.lock();
        if let Some(live) = inner.live.take() {
            live.cancel.cancel();
        }
        self.state.send_replace(ChannelState::Closed);
    }

    /// Queue a text frame on the open connection. Frames are dropped
    /// unless the channel is `Open`.
    pub fn send(&self, text: String) -> bool {
        let inner = self.lock();
        if *self.state.borrow() != ChannelState::Open {
            return false;
        }
        inner
            .live
            .as_ref()
            .is_some_and(|live| live.outbound.send(text).is_ok())
    }

    fn begin_locked(
        &self,
        inner: &mut SlotInner,
        target: ChannelTarget,
        parent: &CancellationToken,
    ) -> ConnectionLease {
        inner.generation += 1;
        let cancel = parent.child_token();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        inner.live = Some(LiveConnection {
            generation: inner.generation,
            target,
            cancel: cancel.clone(),
            outbound: outbound_tx,
        });
        self.state.send_replace(ChannelState::Connecting);

        ConnectionLease {
            generation: inner.generation,
            target,
            cancel,
            outbound: outbound_rx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_current(inner: &SlotInner, generation: u64) -> bool {
    inner
        .live
        .as_ref()
        .is_some_and(|live| live.generation == generation)
}
