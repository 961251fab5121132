//! Connection lifecycle across session generations.
//!
//! The manager owns the "current session" slot. Only `connect` and `close`
//! write it; session tasks report their end through a monitor that degrades
//! the uplink only while its generation is still current.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use netip_types::OutboundEvent;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::UplinkConfig;
use crate::error::{Result, UplinkError};
use crate::handshake::HandshakeClient;
use crate::protocol::Identity;
use crate::session::{OutboundQueue, SessionEnd, SocketSession};
use crate::transport::{SessionGauge, open_stream};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Disconnected,
    Handshaking,
    Connected,
    Degraded,
    Closing,
    Closed,
}

/// Receivers handed to the owner of the manager
#[derive(Debug)]
pub struct UplinkChannels {
    /// Whole data frames received from the control plane
    pub inbound: mpsc::Receiver<Bytes>,
    /// Failures that require the process to exit
    pub fatal: mpsc::Receiver<UplinkError>,
}

struct Current {
    generation: u64,
    session: SocketSession,
    monitor: JoinHandle<()>,
}

struct Inner {
    config: UplinkConfig,
    identity: Identity,
    handshake: HandshakeClient,
    state: watch::Sender<ConnectionState>,
    current: Mutex<Option<Current>>,
    live_generation: AtomicU64,
    next_generation: AtomicU64,
    attempt: tokio::sync::Mutex<()>,
    reconnect_tx: mpsc::Sender<()>,
    reconnect_rx: Mutex<Option<mpsc::Receiver<()>>>,
    reconnect_pending: AtomicBool,
    shutdown: CancellationToken,
    outbound_tx: mpsc::Sender<OutboundEvent>,
    outbound_rx: OutboundQueue,
    inbound_tx: mpsc::Sender<Bytes>,
    fatal_tx: mpsc::Sender<UplinkError>,
    gauge: Arc<SessionGauge>,
}

impl Inner {
    fn current(&self) -> MutexGuard<'_, Option<Current>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Closed is terminal; late transitions from racing attempts are ignored
    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state || *current == ConnectionState::Closed {
                return false;
            }
            debug!("Uplink state {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    /// Take the current session out of the slot and wait until its tasks are gone
    async fn retire(&self) {
        let previous = {
            let mut current = self.current();
            self.live_generation.store(0, Ordering::SeqCst);
            current.take()
        };

        if let Some(previous) = previous {
            debug!("Retiring session {}", previous.generation);
            previous.session.cancel();
            let _ = previous.monitor.await;
        }
    }
}

/// Single uplink to the control plane, cheap to clone
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

impl ConnectionManager {
    /// # Errors
    ///
    /// Returns `UplinkError::Http` if the HTTP client cannot be built.
    pub fn new(config: UplinkConfig, identity: Identity) -> Result<(Self, UplinkChannels)> {
        let handshake = HandshakeClient::new(&config)?;
        let (outbound_tx, outbound_rx) = mpsc::channel(config.queue_capacity.max(1));
        let (inbound_tx, inbound_rx) = mpsc::channel(config.inbound_capacity.max(1));
        let (fatal_tx, fatal_rx) = mpsc::channel(1);
        let (reconnect_tx, reconnect_rx) = mpsc::channel(1);
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        let inner = Inner {
            config,
            identity,
            handshake,
            state,
            current: Mutex::new(None),
            live_generation: AtomicU64::new(0),
            next_generation: AtomicU64::new(1),
            attempt: tokio::sync::Mutex::new(()),
            reconnect_tx,
            reconnect_rx: Mutex::new(Some(reconnect_rx)),
            reconnect_pending: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            outbound_tx,
            outbound_rx: Arc::new(tokio::sync::Mutex::new(outbound_rx)),
            inbound_tx,
            fatal_tx,
            gauge: Arc::new(SessionGauge::default()),
        };

        let channels = UplinkChannels {
            inbound: inbound_rx,
            fatal: fatal_rx,
        };
        Ok((
            Self {
                inner: Arc::new(inner),
            },
            channels,
        ))
    }

    /// Establish the first session, retrying non-fatal failures, then start
    /// the reconnect supervisor.
    ///
    /// # Errors
    ///
    /// Returns the failure if it is fatal, or `UplinkError::Closed` if the
    /// manager was closed or already started.
    pub async fn start(&self) -> Result<()> {
        let signals = self
            .inner
            .reconnect_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(UplinkError::Closed)?;

        loop {
            let err = match self.connect().await {
                Ok(()) => break,
                Err(UplinkError::Closed) => return Err(UplinkError::Closed),
                Err(e) => e,
            };

            let class = err.class();
            let Some(delay) = self.inner.config.backoff.delay_for(class) else {
                error!("Fatal uplink failure: {}", err);
                return Err(err);
            };

            self.inner.set_state(ConnectionState::Degraded);
            warn!(
                "Initial connect failed ({:?}), retrying in {:?}: {}",
                class, delay, err
            );

            tokio::select! {
                () = self.inner.shutdown.cancelled() => return Err(UplinkError::Closed),
                () = tokio::time::sleep(delay) => {}
            }
        }

        tokio::spawn(self.clone().maintain(signals));
        Ok(())
    }

    /// Retire any current session, then handshake and open a new one.
    ///
    /// Attempts are serialized; a second caller waits for the first to finish.
    ///
    /// # Errors
    ///
    /// Returns the handshake or dial failure unclassified; callers decide
    /// between exiting and backing off.
    pub async fn connect(&self) -> Result<()> {
        let inner = &self.inner;
        let _attempt = inner.attempt.lock().await;

        if inner.shutdown.is_cancelled() {
            return Err(UplinkError::Closed);
        }

        inner.retire().await;
        if inner.shutdown.is_cancelled() {
            return Err(UplinkError::Closed);
        }
        inner.set_state(ConnectionState::Handshaking);

        let ticket = inner.handshake.dial(&inner.identity).await?;
        let path = ticket.endpoint_path.clone();
        let (ws, guard) = open_stream(
            ticket,
            &inner.identity.service,
            &inner.config.timeouts,
            &inner.gauge,
        )
        .await?;

        let (session, join) = SocketSession::spawn(
            ws,
            guard,
            Arc::clone(&inner.outbound_rx),
            inner.inbound_tx.clone(),
            inner.config.timeouts,
        );
        let generation = inner.next_generation.fetch_add(1, Ordering::SeqCst);

        let late = {
            let mut current = inner.current();
            if inner.shutdown.is_cancelled() {
                Some((session, join))
            } else {
                inner.live_generation.store(generation, Ordering::SeqCst);
                inner.set_state(ConnectionState::Connected);
                let monitor = tokio::spawn(self.clone().monitor(generation, join));
                *current = Some(Current {
                    generation,
                    session,
                    monitor,
                });
                None
            }
        };

        if let Some((session, join)) = late {
            debug!("Closed while session {} was opening", generation);
            if !session.close().await {
                debug!("Session {} close was not acknowledged", generation);
            }
            let _ = join.await;
            return Err(UplinkError::Closed);
        }

        info!("Uplink session {} connected to {}", generation, path);
        Ok(())
    }

    async fn monitor(self, generation: u64, join: JoinHandle<SessionEnd>) {
        let end = join
            .await
            .unwrap_or_else(|_| SessionEnd::Failed(UplinkError::StreamClosed));

        if self.inner.live_generation.load(Ordering::SeqCst) != generation {
            debug!("Retired session {} finished", generation);
            return;
        }

        match end {
            SessionEnd::Closed => debug!("Session {} closed", generation),
            SessionEnd::Failed(err) => {
                warn!("Session {} ended: {}", generation, err);
                self.degrade(err);
            }
        }
    }

    /// Supervisor: one reconnect per signal, strictly in sequence
    async fn maintain(self, mut signals: mpsc::Receiver<()>) {
        loop {
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                signal = signals.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            self.inner.reconnect_pending.store(false, Ordering::SeqCst);
            info!("Reconnecting uplink");

            match self.connect().await {
                Ok(()) => {}
                Err(UplinkError::Closed) => break,
                Err(e) => self.degrade(e),
            }
        }
        debug!("Reconnect supervisor stopped");
    }

    /// Report a failure. Fatal failures go to the fatal channel; anything
    /// else schedules one reconnect after the class's backoff. Reports that
    /// arrive while a reconnect is pending are coalesced into it.
    pub fn degrade(&self, err: UplinkError) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            debug!("Ignoring failure after close: {}", err);
            return;
        }

        let class = err.class();
        let Some(delay) = inner.config.backoff.delay_for(class) else {
            error!("Fatal uplink failure: {}", err);
            inner.set_state(ConnectionState::Degraded);
            let _ = inner.fatal_tx.try_send(err);
            return;
        };

        if inner.reconnect_pending.swap(true, Ordering::SeqCst) {
            debug!("Reconnect already pending, coalescing: {}", err);
            return;
        }

        inner.set_state(ConnectionState::Degraded);
        warn!(
            "Uplink degraded ({:?}), reconnecting in {:?}: {}",
            class, delay, err
        );

        let signal = inner.reconnect_tx.clone();
        let shutdown = inner.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = shutdown.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = signal.try_send(());
                }
            }
        });
    }

    /// Queue an event for the wire. Waits while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::Closed` once [`close`](Self::close) has been called.
    pub async fn send(&self, event: OutboundEvent) -> Result<()> {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return Err(UplinkError::Closed);
        }

        tokio::select! {
            () = inner.shutdown.cancelled() => Err(UplinkError::Closed),
            sent = inner.outbound_tx.send(event) => sent.map_err(|_| UplinkError::Closed),
        }
    }

    /// Queue an event only if there is room right now.
    ///
    /// # Errors
    ///
    /// Returns `UplinkError::QueueFull` when the queue has no room, or
    /// `UplinkError::Closed` once [`close`](Self::close) has been called.
    pub fn try_send(&self, event: OutboundEvent) -> Result<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(UplinkError::Closed);
        }

        self.inner.outbound_tx.try_send(event).map_err(|e| match e {
            TrySendError::Full(_) => UplinkError::QueueFull,
            TrySendError::Closed(_) => UplinkError::Closed,
        })
    }

    #[must_use]
    pub fn is_alive(&self) -> bool {
        *self.inner.state.borrow() == ConnectionState::Connected
            && self
                .inner
                .current()
                .as_ref()
                .is_some_and(|current| current.session.is_running())
    }

    /// Gracefully end the current session and stop reconnecting. Idempotent.
    pub async fn close(&self) {
        let inner = &self.inner;
        if inner.shutdown.is_cancelled() {
            return;
        }
        inner.shutdown.cancel();
        inner.set_state(ConnectionState::Closing);

        let current = {
            let mut slot = inner.current();
            inner.live_generation.store(0, Ordering::SeqCst);
            slot.take()
        };

        if let Some(current) = current {
            if !current.session.close().await {
                warn!("Session {} close was not acknowledged", current.generation);
            }
            let _ = current.monitor.await;
        }

        inner.set_state(ConnectionState::Closed);
        info!("Uplink closed");
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionGauge> {
        Arc::clone(&self.inner.gauge)
    }
}
