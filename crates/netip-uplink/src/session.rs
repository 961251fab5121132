//! One live websocket: a read loop, a write loop and the signals between them.
//!
//! The write loop is the only task that touches the sink. It owns the outbound
//! receiver for the lifetime of the session, so events reach the wire in the
//! order they were queued and a retired session hands the queue over intact.

use std::sync::Arc;

use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use netip_types::OutboundEvent;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, timeout, timeout_at};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::Timeouts;
use crate::error::UplinkError;
use crate::transport::{OpenGuard, WsStream};

pub(crate) type OutboundQueue = Arc<Mutex<mpsc::Receiver<OutboundEvent>>>;

/// Why a session stopped
#[derive(Debug)]
pub enum SessionEnd {
    Failed(UplinkError),
    Closed,
}

/// Control side of a running session
#[derive(Debug)]
pub struct SocketSession {
    cancel: CancellationToken,
    close_tx: mpsc::Sender<oneshot::Sender<()>>,
    close_wait: std::time::Duration,
}

impl SocketSession {
    /// Start the read and write loops on an acknowledged stream.
    ///
    /// The returned handle resolves once both halves of the socket are dropped.
    pub(crate) fn spawn(
        ws: WsStream,
        guard: OpenGuard,
        outbound: OutboundQueue,
        inbound: mpsc::Sender<Bytes>,
        timeouts: Timeouts,
    ) -> (Self, JoinHandle<SessionEnd>) {
        let cancel = CancellationToken::new();
        let (close_tx, close_rx) = mpsc::channel(1);
        let (sink, stream) = ws.split();

        let reader = tokio::spawn(read_loop(
            stream,
            inbound,
            cancel.clone(),
            timeouts.pong_wait,
        ));

        let writer = tokio::spawn(
            Writer {
                sink,
                close_rx,
                cancel: cancel.clone(),
                timeouts,
            }
            .run(outbound, reader, guard),
        );

        let session = Self {
            cancel,
            close_tx,
            close_wait: timeouts.write_wait * 2,
        };
        (session, writer)
    }

    /// Both loops are still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop without a close handshake
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Send a normal-closure frame and wait, bounded, for the write loop to
    /// acknowledge. Returns whether the acknowledgement arrived.
    pub async fn close(&self) -> bool {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.close_tx.try_send(ack_tx).is_err() {
            self.cancel.cancel();
            return false;
        }

        let acked = matches!(timeout(self.close_wait, ack_rx).await, Ok(Ok(())));
        if !acked {
            self.cancel.cancel();
        }
        acked
    }
}

async fn read_loop(
    mut stream: SplitStream<WsStream>,
    inbound: mpsc::Sender<Bytes>,
    cancel: CancellationToken,
    pong_wait: std::time::Duration,
) -> UplinkError {
    let mut deadline = Instant::now() + pong_wait;

    let reason = loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break UplinkError::Closed,
            frame = timeout_at(deadline, stream.next()) => frame,
        };

        let message = match frame {
            Err(_) => break UplinkError::PongTimeout(pong_wait),
            Ok(None) => break UplinkError::StreamClosed,
            Ok(Some(Err(e))) => break e.into(),
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Pong(_) => deadline = Instant::now() + pong_wait,
            Message::Text(_) | Message::Binary(_) => {
                let data = message.into_data();
                tokio::select! {
                    () = cancel.cancelled() => break UplinkError::Closed,
                    sent = inbound.send(data) => {
                        if sent.is_err() {
                            debug!("Inbound receiver gone, dropping frame");
                        }
                    }
                }
            }
            Message::Close(frame) => {
                if let Some(frame) = frame {
                    debug!("Peer closed stream: {} {}", frame.code, frame.reason.as_str());
                }
                break UplinkError::StreamClosed;
            }
            Message::Ping(_) | Message::Frame(_) => {}
        }
    };

    cancel.cancel();
    reason
}

struct Writer {
    sink: SplitSink<WsStream, Message>,
    close_rx: mpsc::Receiver<oneshot::Sender<()>>,
    cancel: CancellationToken,
    timeouts: Timeouts,
}

impl Writer {
    async fn run(
        mut self,
        outbound: OutboundQueue,
        reader: JoinHandle<UplinkError>,
        guard: OpenGuard,
    ) -> SessionEnd {
        let end = {
            let mut queue = outbound.lock().await;
            self.pump(&mut queue, reader).await
        };

        drop(self.sink);
        drop(guard);
        end
    }

    async fn pump(
        &mut self,
        queue: &mut mpsc::Receiver<OutboundEvent>,
        reader: JoinHandle<UplinkError>,
    ) -> SessionEnd {
        let period = self.timeouts.ping_period();
        let mut ping = interval_at(Instant::now() + period, period);

        let end = loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => {
                    // Reader failed or the session was retired
                    break None;
                }

                Some(ack) = self.close_rx.recv() => {
                    self.send_close().await;
                    let _ = ack.send(());
                    break Some(SessionEnd::Closed);
                }

                _ = ping.tick() => {
                    if let Err(e) = self.write(Message::Ping(Bytes::new())).await {
                        break Some(SessionEnd::Failed(e));
                    }
                }

                event = queue.recv() => {
                    let Some(event) = event else {
                        break Some(SessionEnd::Closed);
                    };
                    let text = match event.to_json() {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("Dropping unencodable {} event: {}", event.name(), e);
                            continue;
                        }
                    };
                    if let Err(e) = self.write(Message::Text(text.into())).await {
                        break Some(SessionEnd::Failed(e));
                    }
                }
            }
        };

        self.cancel.cancel();
        let reason = reader.await.unwrap_or(UplinkError::StreamClosed);
        end.unwrap_or(SessionEnd::Failed(reason))
    }

    async fn write(&mut self, message: Message) -> Result<(), UplinkError> {
        let wait = self.timeouts.write_wait;
        timeout(wait, self.sink.send(message))
            .await
            .map_err(|_| UplinkError::timeout("write", wait))??;
        Ok(())
    }

    async fn send_close(&mut self) {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: String::new().into(),
        };
        if let Err(e) = self.write(Message::Close(Some(frame))).await {
            debug!("Close frame not delivered: {}", e);
        }
        let wait = self.timeouts.write_wait;
        if timeout(wait, self.sink.close()).await.is_err() {
            debug!("Socket close timed out after {:?}", wait);
        }
    }
}
