//! Connection sessions.
//!
//! A session owns one link to one device and walks it through the lifecycle
//! in [`state`](crate::state): connect with retry, service discovery, then any
//! number of reads until it is closed.
//!
//! Each session runs as its own tokio task. The task exclusively owns the
//! [`Link`]; callers talk to it through a [`SessionHandle`], which queues
//! commands on an mpsc channel and receives completions on oneshot channels.
//! Commands are processed one at a time, so reads on one session never
//! overlap. A read issued before the session is ready waits in the queue.
//!
//! Closing cancels whatever the task is awaiting. A completion that arrives
//! after cancellation is dropped and never changes state.

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ems_types::{DeviceAddress, ScanResult, codec};

use crate::error::{Error, Result, TransportError};
use crate::events::{DeviceEvent, DisconnectReason, EventDispatcher};
use crate::policy::ConnectPolicy;
use crate::state::{SessionInput, SessionState};
use crate::transport::{CharacteristicHandle, Link, Transport};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Default depth of a session's command queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

enum Command {
    Read {
        reply: oneshot::Sender<Result<Arc<ScanResult>>>,
    },
}

/// State visible to every handle of one session.
struct SessionShared {
    id: u64,
    address: DeviceAddress,
    state: watch::Receiver<SessionState>,
    last_scan: RwLock<Option<Arc<ScanResult>>>,
    last_error: Mutex<Option<Error>>,
    characteristic: OnceLock<CharacteristicHandle>,
    attempts: AtomicU32,
    close_reason: OnceLock<DisconnectReason>,
    cancel: CancellationToken,
}

impl SessionShared {
    fn record_error(&self, err: &Error) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err.clone());
    }

    fn last_error(&self) -> Option<Error> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Cheap, cloneable handle to a running session.
///
/// Two handles are equal when they refer to the same session.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    commands: mpsc::Sender<Command>,
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.shared.id)
            .field("address", &self.shared.address)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl PartialEq for SessionHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

impl Eq for SessionHandle {}

impl SessionHandle {
    /// Start a session task for `address` and begin connecting.
    pub(crate) fn spawn(
        address: DeviceAddress,
        transport: Arc<dyn Transport>,
        policy: ConnectPolicy,
        events: EventDispatcher,
        queue_capacity: usize,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (cmd_tx, cmd_rx) = mpsc::channel(queue_capacity.max(1));

        let shared = Arc::new(SessionShared {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            address,
            state: state_rx,
            last_scan: RwLock::new(None),
            last_error: Mutex::new(None),
            characteristic: OnceLock::new(),
            attempts: AtomicU32::new(0),
            close_reason: OnceLock::new(),
            cancel: CancellationToken::new(),
        });

        let task = SessionTask {
            shared: Arc::clone(&shared),
            state_tx,
            transport,
            policy,
            events,
            commands: cmd_rx,
            link: None,
            handle: None,
        };
        tokio::spawn(task.run());

        Self {
            shared,
            commands: cmd_tx,
        }
    }

    /// Process-unique session id.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn address(&self) -> &DeviceAddress {
        &self.shared.address
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Whether a close was requested and the link is still being released.
    pub fn is_closing(&self) -> bool {
        self.shared.cancel.is_cancelled() && !self.state().is_terminal()
    }

    /// Whether this session can still serve reads: not terminal, not closing.
    pub fn is_live(&self) -> bool {
        !self.shared.cancel.is_cancelled() && !self.state().is_terminal()
    }

    /// Wait until the session is `Closed` or `Failed`.
    pub async fn wait_finished(&self) {
        let mut rx = self.shared.state.clone();
        let _ = rx.wait_for(|s| s.is_terminal()).await;
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.clone()
    }

    /// Connect attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::Relaxed)
    }

    /// The most recent error, including read errors that left the session ready.
    pub fn last_error(&self) -> Option<Error> {
        self.shared.last_error()
    }

    /// The resolved WiFi scan characteristic, once services are discovered.
    pub fn characteristic(&self) -> Option<CharacteristicHandle> {
        self.shared.characteristic.get().copied()
    }

    /// The most recently published scan result.
    pub fn last_scan(&self) -> Option<Arc<ScanResult>> {
        self.shared
            .last_scan
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until the session is ready.
    ///
    /// Returns the terminal error if the session fails instead, or
    /// [`Error::SessionClosed`] if it is closed first.
    pub async fn wait_ready(&self) -> Result<()> {
        let mut rx = self.shared.state.clone();
        let state = *rx
            .wait_for(|s| s.is_ready() || s.is_terminal())
            .await
            .map_err(|_| Error::SessionClosed)?;

        match state {
            SessionState::Ready => Ok(()),
            _ => Err(self.terminal_error()),
        }
    }

    /// Read the WiFi scan characteristic and decode it.
    ///
    /// Queued behind any earlier request on this session. If the session is
    /// still connecting, the read runs once it is ready.
    #[tracing::instrument(level = "debug", skip_all, fields(address = %self.shared.address, session = self.shared.id))]
    pub async fn read_networks(&self) -> Result<Arc<ScanResult>> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Read { reply }).await.is_err() {
            return Err(self.terminal_error());
        }
        rx.await.unwrap_or_else(|_| Err(self.terminal_error()))
    }

    /// Close the session and release its link.
    ///
    /// Idempotent: closing a closed or failed session does nothing.
    pub async fn close(&self) {
        self.close_with(DisconnectReason::UserRequested).await;
    }

    pub(crate) async fn close_with(&self, reason: DisconnectReason) {
        if self.state().is_terminal() {
            return;
        }
        let _ = self.shared.close_reason.set(reason);
        self.shared.cancel.cancel();
        self.wait_finished().await;
    }

    fn terminal_error(&self) -> Error {
        match self.state() {
            SessionState::Failed => self.last_error().unwrap_or(Error::SessionClosed),
            _ => Error::SessionClosed,
        }
    }
}

enum Established {
    Ready,
    Failed,
    Cancelled,
}

/// The task side of a session.
struct SessionTask {
    shared: Arc<SessionShared>,
    state_tx: watch::Sender<SessionState>,
    transport: Arc<dyn Transport>,
    policy: ConnectPolicy,
    events: EventDispatcher,
    commands: mpsc::Receiver<Command>,
    link: Option<Box<dyn Link>>,
    handle: Option<CharacteristicHandle>,
}

impl SessionTask {
    #[tracing::instrument(level = "info", name = "session", skip_all, fields(address = %self.shared.address, id = self.shared.id))]
    async fn run(mut self) {
        self.transition(SessionInput::Connect);

        match self.establish().await {
            Established::Ready => self.serve().await,
            Established::Cancelled => self.shut_down(self.close_reason()).await,
            Established::Failed => {}
        }
    }

    /// Connect with retries, then discover services.
    async fn establish(&mut self) -> Established {
        let cancel = self.shared.cancel.clone();
        let mut attempt: u32 = 0;

        let link = loop {
            attempt += 1;
            self.shared.attempts.store(attempt, Ordering::Relaxed);
            debug!(attempt, max = self.policy.max_attempts, "connect attempt");

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Established::Cancelled,
                r = timeout(self.policy.attempt_timeout, self.transport.connect(&self.shared.address)) => r,
            };

            let status = match outcome {
                Ok(Ok(link)) => break link,
                Ok(Err(status)) => status,
                Err(_) => TransportError::Timeout(self.policy.attempt_timeout),
            };

            if !self.policy.should_retry(attempt, &status) {
                warn!(attempt, %status, "giving up on connect");
                self.fail(
                    SessionInput::ConnectExhausted,
                    Error::connect_failed(attempt, status),
                )
                .await;
                return Established::Failed;
            }

            let delay = self.policy.delay_for_attempt(attempt);
            warn!(attempt, %status, ?delay, "connect attempt failed, retrying");
            self.transition(SessionInput::AttemptFailed);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Established::Cancelled,
                _ = sleep(delay) => {}
            }
        };

        info!(attempt, "link established");
        self.link = Some(link);
        self.transition(SessionInput::Linked);
        self.events.send(DeviceEvent::Connected {
            address: self.shared.address.clone(),
            session_id: self.shared.id,
            attempts: attempt,
        });

        let Some(link) = self.link.as_mut() else {
            return Established::Cancelled;
        };
        let discovered = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Established::Cancelled,
            r = timeout(self.policy.discovery_timeout, link.discover_services()) => r,
        };

        let services = match discovered {
            Ok(Ok(services)) => services,
            Ok(Err(status)) => {
                self.fail(
                    SessionInput::DiscoveryFailed,
                    Error::DiscoveryFailed { status },
                )
                .await;
                return Established::Failed;
            }
            Err(_) => {
                let status = TransportError::Timeout(self.policy.discovery_timeout);
                self.fail(
                    SessionInput::DiscoveryFailed,
                    Error::DiscoveryFailed { status },
                )
                .await;
                return Established::Failed;
            }
        };
        debug!(count = services.len(), "services discovered");

        let Some(handle) = CharacteristicHandle::WIFI_SCAN.resolve(&services) else {
            self.fail(SessionInput::ServicesMissing, Error::unsupported_device())
                .await;
            return Established::Failed;
        };

        self.handle = Some(handle);
        let _ = self.shared.characteristic.set(handle);
        self.transition(SessionInput::ServicesResolved);
        info!("session ready");
        self.events.send(DeviceEvent::ServicesReady {
            address: self.shared.address.clone(),
            session_id: self.shared.id,
        });

        Established::Ready
    }

    /// Process queued commands until closed.
    async fn serve(&mut self) {
        let cancel = self.shared.cancel.clone();

        let reason = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break self.close_reason(),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Read { reply }) => {
                        let result = self.read().await;
                        if let Err(err) = &result {
                            self.shared.record_error(err);
                        }
                        let _ = reply.send(result);
                    }
                    None => {
                        debug!("all handles dropped");
                        break DisconnectReason::Dropped;
                    }
                },
            }
        };

        self.shut_down(reason).await;
    }

    async fn read(&mut self) -> Result<Arc<ScanResult>> {
        let cancel = self.shared.cancel.clone();
        let (Some(link), Some(handle)) = (self.link.as_mut(), self.handle) else {
            return Err(Error::SessionClosed);
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::SessionClosed),
            r = timeout(self.policy.read_timeout, link.read(&handle)) => r,
        };
        self.transition(SessionInput::Read);

        let payload = match outcome {
            Ok(Ok(payload)) => payload,
            Ok(Err(status)) => {
                warn!(%status, "read failed");
                return Err(Error::ReadFailed { status });
            }
            Err(_) => {
                warn!(timeout = ?self.policy.read_timeout, "read timed out");
                return Err(Error::ReadFailed {
                    status: TransportError::Timeout(self.policy.read_timeout),
                });
            }
        };

        let result = Arc::new(codec::decode(&payload).inspect_err(|e| {
            warn!(error = %e, bytes = payload.len(), "could not decode scan payload");
        })?);
        debug!(networks = result.len(), "scan result decoded");

        *self
            .shared
            .last_scan
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&result));

        self.events.send(DeviceEvent::ScanUpdated {
            address: self.shared.address.clone(),
            session_id: self.shared.id,
            result: ScanResult::clone(&result),
            received_at: OffsetDateTime::now_utc(),
        });

        Ok(result)
    }

    /// Enter `Failed`: release the link, record the error, reject queued work.
    async fn fail(&mut self, input: SessionInput, err: Error) {
        warn!(error = %err, "session failed");
        self.release_link().await;
        self.shared.record_error(&err);
        self.transition(input);
        self.events.send(DeviceEvent::Failed {
            address: self.shared.address.clone(),
            session_id: self.shared.id,
            error: err.to_string(),
        });
        self.reject_pending(&err);
    }

    /// Enter `Closed`.
    async fn shut_down(&mut self, reason: DisconnectReason) {
        self.release_link().await;
        info!(?reason, "session closed");
        // Published before the state flips so that `close()` returning
        // implies the event is already queued.
        self.events.send(DeviceEvent::Disconnected {
            address: self.shared.address.clone(),
            session_id: self.shared.id,
            reason,
        });
        self.transition(SessionInput::Close);
        self.reject_pending(&Error::SessionClosed);
    }

    /// Close the link if one is held. Runs at most once per link.
    async fn release_link(&mut self) {
        self.handle = None;
        let Some(mut link) = self.link.take() else {
            return;
        };
        match timeout(self.policy.read_timeout, link.close()).await {
            Ok(Ok(())) => debug!("link released"),
            Ok(Err(status)) => warn!(%status, "error while releasing link"),
            Err(_) => warn!("timed out releasing link"),
        }
    }

    fn reject_pending(&mut self, err: &Error) {
        self.commands.close();
        while let Ok(Command::Read { reply }) = self.commands.try_recv() {
            let _ = reply.send(Err(err.clone()));
        }
    }

    fn close_reason(&self) -> DisconnectReason {
        self.shared
            .close_reason
            .get()
            .copied()
            .unwrap_or(DisconnectReason::UserRequested)
    }

    fn transition(&self, input: SessionInput) {
        let current = *self.state_tx.borrow();
        match current.next(input) {
            Some(next) => {
                if next != current {
                    debug!(from = %current, to = %next, "state change");
                }
                self.state_tx.send_replace(next);
            }
            None => warn!(state = %current, ?input, "ignored input"),
        }
    }
}
