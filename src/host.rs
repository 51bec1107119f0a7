//! Browser-engine host boundary.
//!
//! The lifecycle loop never calls the host directly. Each tick queues
//! [`HostCommand`]s on a [`HostDispatch`], an unbounded channel that never blocks
//! the tick. A [`HostWorker`] task drains the queue, keeping per-tab order, and
//! runs every command against a [`BrowserHost`]. Failures are logged and dropped:
//! the next tick re-derives the desired state and issues whatever is still needed. Hosts must
//! treat every command as idempotent (show on a shown tab, thaw on a running tab,
//! ... are no-ops).

use crate::errors::{HostError, LifecycleError};
use crate::ids::TabId;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::{HashMap, VecDeque};
use std::fmt::Display;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

/// Commands sent to the browser-engine host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HostCommand {
    /// Attach the instance to the canvas and display it
    Show(TabId),
    /// Detach the instance; it keeps running
    Hide(TabId),
    /// Suspend the instance at the engine level
    Freeze(TabId),
    /// Resume a frozen instance (no-op when it is not frozen)
    Thaw(TabId),
    /// Terminate the instance for good
    Destroy(TabId),
}

impl HostCommand {
    pub fn tab_id(&self) -> &TabId {
        match self {
            HostCommand::Show(id)
            | HostCommand::Hide(id)
            | HostCommand::Freeze(id)
            | HostCommand::Thaw(id)
            | HostCommand::Destroy(id) => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HostCommand::Show(_) => "show",
            HostCommand::Hide(_) => "hide",
            HostCommand::Freeze(_) => "freeze",
            HostCommand::Thaw(_) => "thaw",
            HostCommand::Destroy(_) => "destroy",
        }
    }
}

impl Display for HostCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.name(), self.tab_id())
    }
}

/// The browser-engine host. All operations are asynchronous and must be idempotent.
pub trait BrowserHost: Send + Sync {
    fn show(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>>;
    fn hide(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>>;
    fn freeze(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>>;
    fn thaw(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>>;
    fn destroy(&self, tab_id: TabId) -> BoxFuture<'static, Result<(), HostError>>;

    /// Route a queued command to the matching operation.
    fn apply(&self, cmd: HostCommand) -> BoxFuture<'static, Result<(), HostError>> {
        match cmd {
            HostCommand::Show(id) => self.show(id),
            HostCommand::Hide(id) => self.hide(id),
            HostCommand::Freeze(id) => self.freeze(id),
            HostCommand::Thaw(id) => self.thaw(id),
            HostCommand::Destroy(id) => self.destroy(id),
        }
    }
}

/// Sending half of the host command queue.
#[derive(Debug, Clone)]
pub struct HostDispatch {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl HostDispatch {
    /// Create a dispatch and the receiver a [`HostWorker`] (or a test) drains.
    pub fn channel() -> (HostDispatch, mpsc::UnboundedReceiver<HostCommand>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (HostDispatch { tx }, rx)
    }

    /// Queue a command without waiting for it.
    pub fn send(&self, cmd: HostCommand) -> Result<(), LifecycleError> {
        self.tx.send(cmd).map_err(|_| LifecycleError::ChannelClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Upper bound for a single host call before its tab's lane moves on.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Drains the command queue against a [`BrowserHost`].
///
/// Commands for one tab run strictly in order (thaw before show, hide before
/// destroy); different tabs run concurrently, so a host call that hangs for one
/// tab never holds up the others. Every call is bounded by the command timeout.
///
/// On cancellation the commands already queued are still run before the worker
/// stops, which can delay shutdown by at most one timeout per tab.
pub struct HostWorker {
    host: Arc<dyn BrowserHost>,
    rx: mpsc::UnboundedReceiver<HostCommand>,
    cancel: CancellationToken,
    command_timeout: Duration,
    running: JoinSet<TabId>,
    /// One entry per tab with a command in flight, holding the commands queued behind it.
    lanes: HashMap<TabId, VecDeque<HostCommand>>,
}

impl HostWorker {
    pub fn new(host: Arc<dyn BrowserHost>, rx: mpsc::UnboundedReceiver<HostCommand>, cancel: CancellationToken) -> Self {
        Self {
            host,
            rx,
            cancel,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            running: JoinSet::new(),
            lanes: HashMap::new(),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        log::info!("host worker started");

        let mut open = true;
        while open || !self.running.is_empty() {
            tokio::select! {
                _ = self.cancel.cancelled(), if open => {
                    open = false;
                    self.drain_queue();
                }
                msg = self.rx.recv(), if open => match msg {
                    Some(cmd) => self.submit(cmd),
                    // All dispatchers dropped
                    None => open = false,
                },
                Some(done) = self.running.join_next(), if !self.running.is_empty() => match done {
                    Ok(tab_id) => self.advance_lane(tab_id),
                    Err(e) => log::warn!("host command task aborted: {}", e),
                },
            }
        }

        log::info!("host worker stopped");
    }

    /// Stop accepting commands and schedule everything still queued.
    fn drain_queue(&mut self) {
        self.rx.close();
        let mut drained = 0;
        while let Ok(cmd) = self.rx.try_recv() {
            self.submit(cmd);
            drained += 1;
        }
        if drained > 0 {
            log::debug!("host worker cancelled, finishing {} queued commands", drained);
        }
    }

    fn submit(&mut self, cmd: HostCommand) {
        match self.lanes.get_mut(cmd.tab_id()) {
            Some(queue) => queue.push_back(cmd),
            None => {
                self.lanes.insert(cmd.tab_id().clone(), VecDeque::new());
                self.launch(cmd);
            }
        }
    }

    fn advance_lane(&mut self, tab_id: TabId) {
        match self.lanes.get_mut(&tab_id).and_then(|queue| queue.pop_front()) {
            Some(next) => self.launch(next),
            None => {
                self.lanes.remove(&tab_id);
            }
        }
    }

    fn launch(&mut self, cmd: HostCommand) {
        let tab_id = cmd.tab_id().clone();
        let label = cmd.to_string();
        let timeout = self.command_timeout;
        let call = AssertUnwindSafe(self.host.apply(cmd)).catch_unwind();

        self.running.spawn(async move {
            match tokio::time::timeout(timeout, call).await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(e))) => log::warn!("host command {} failed: {}", label, e),
                Ok(Err(_)) => log::warn!("host command {} panicked", label),
                Err(_) => log::warn!("host command {} timed out after {:?}", label, timeout),
            }
            tab_id
        });
    }
}
