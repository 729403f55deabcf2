//! Native push-channel driver using tokio-tungstenite.

use std::sync::Arc;

use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use url::Url;
use walletsync_shared::ClientMessage;

use super::{classify_close, CloseKind, ConnectionState, ReconnectConfig, ReconnectPolicy, WsHandle};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Builds the URL for the next attempt; `None` aborts the driver.
pub type UrlBuilder = Arc<dyn Fn() -> Option<Url> + Send + Sync>;
/// Whether the session is still authenticated (checked before each retry).
pub type SessionCheck = Arc<dyn Fn() -> bool + Send + Sync>;
/// Inbound text frame handler; may return an immediate reply.
pub type FrameHandler = Arc<dyn Fn(&str) -> Option<ClientMessage> + Send + Sync>;

/// A running driver for one push channel (Native implementation).
///
/// Dropping the connection stops the driver with a clean close.
pub struct WsConnection {
    sender: UnboundedSender<ClientMessage>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WsConnection {
    /// Spawn the driver on the current tokio runtime.
    pub fn spawn(
        config: ReconnectConfig,
        state: Arc<watch::Sender<ConnectionState>>,
        url_builder: UrlBuilder,
        session_valid: SessionCheck,
        on_frame: FrameHandler,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let (shutdown, shutdown_rx) = watch::channel(false);

        let driver = Driver {
            policy: ReconnectPolicy::new(config.clone()),
            config,
            state,
            url_builder,
            session_valid,
            on_frame,
            outbound: receiver,
            outbound_open: true,
            shutdown: shutdown_rx,
        };
        let task = tokio::spawn(driver.run());

        Self {
            sender,
            shutdown,
            task,
        }
    }

    /// Get a handle for sending messages
    pub fn handle(&self) -> WsHandle {
        WsHandle::new(self.sender.clone())
    }

    /// The driver has stopped (clean close, retries exhausted, or shutdown).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Ask the driver to close the socket cleanly and stop, cancelling any
    /// pending retry timer.
    pub fn close(&self) {
        let _ = self.shutdown.send(true);
    }
}

impl Drop for WsConnection {
    fn drop(&mut self) {
        self.close();
    }
}

enum SessionEnd {
    Closed(CloseKind),
    Shutdown,
}

struct Driver {
    config: ReconnectConfig,
    policy: ReconnectPolicy,
    state: Arc<watch::Sender<ConnectionState>>,
    url_builder: UrlBuilder,
    session_valid: SessionCheck,
    on_frame: FrameHandler,
    outbound: UnboundedReceiver<ClientMessage>,
    outbound_open: bool,
    shutdown: watch::Receiver<bool>,
}

impl Driver {
    async fn run(mut self) {
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let Some(url) = (self.url_builder)() else {
                warn!("no push-channel URL available");
                break;
            };

            self.state.send_replace(ConnectionState::Connecting);
            debug!(url = %redacted(&url), attempt = self.policy.attempt(), "opening push channel");

            let opened = tokio::select! {
                result = connect_async(url.as_str()) => result,
                _ = self.shutdown.changed() => break,
            };

            let end = match opened {
                Ok((socket, _response)) => {
                    self.policy.on_open();
                    self.state.send_replace(ConnectionState::Connected);
                    info!(url = %redacted(&url), "push channel connected");
                    self.run_session(socket).await
                }
                Err(e) => {
                    warn!(error = %e, "push channel failed to open");
                    SessionEnd::Closed(CloseKind::Unclean)
                }
            };

            match end {
                SessionEnd::Shutdown | SessionEnd::Closed(CloseKind::Clean) => break,
                SessionEnd::Closed(CloseKind::Unclean) => {
                    if !(self.session_valid)() {
                        info!("session ended; not reconnecting");
                        break;
                    }
                    let Some(delay) = self.policy.on_unclean_close() else {
                        warn!(
                            attempts = self.policy.attempt(),
                            "push channel retry budget exhausted; staying disconnected"
                        );
                        break;
                    };
                    let attempt = self.policy.attempt();
                    self.state.send_replace(ConnectionState::Reconnecting { attempt });
                    info!(attempt, delay_ms = delay.as_millis() as u64, "scheduling reconnect");
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.shutdown.changed() => break,
                    }
                }
            }
        }
        self.state.send_replace(ConnectionState::Disconnected);
        debug!("push channel driver stopped");
    }

    async fn run_session(&mut self, socket: Socket) -> SessionEnd {
        let (mut write, mut read) = socket.split();
        let period = self.config.keepalive_interval;
        let mut keepalive = interval_at(Instant::now() + period, period);
        keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let outgoing = tokio::select! {
                _ = self.shutdown.changed() => {
                    let frame = CloseFrame {
                        code: CloseCode::Normal,
                        reason: "client disconnect".into(),
                    };
                    let _ = write.send(Message::Close(Some(frame))).await;
                    return SessionEnd::Shutdown;
                }
                inbound = read.next() => match inbound {
                    Some(Ok(Message::Text(text))) => (self.on_frame)(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let code = frame.map(|f| u16::from(f.code));
                        let kind = classify_close(code);
                        info!(?code, ?kind, "push channel closed by server");
                        return SessionEnd::Closed(kind);
                    }
                    Some(Ok(_)) => None,
                    Some(Err(e)) => {
                        warn!(error = %e, "push channel read error");
                        return SessionEnd::Closed(CloseKind::Unclean);
                    }
                    None => {
                        warn!("push channel ended without a close frame");
                        return SessionEnd::Closed(CloseKind::Unclean);
                    }
                },
                _ = keepalive.tick() => Some(ClientMessage::ping_now()),
                queued = self.outbound.next(), if self.outbound_open => {
                    if queued.is_none() {
                        self.outbound_open = false;
                    }
                    queued
                }
            };

            if let Some(message) = outgoing {
                if let Err(e) = write.send(Message::text(message.to_json())).await {
                    warn!(error = %e, "push channel send failed");
                    return SessionEnd::Closed(CloseKind::Unclean);
                }
            }
        }
    }
}

/// The URL with its credential query stripped, for logging.
fn redacted(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
