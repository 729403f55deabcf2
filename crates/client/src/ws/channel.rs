//! The push channel as seen by the rest of the client.
//!
//! Inbound balance frames are normalized into [`BalanceUpdate`]s and
//! published on the [`EventBus`]; frames the balance layer does not consume
//! are forwarded untouched on [`TransportChannel::passthrough`].

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};
use walletsync_shared::{BalanceUpdate, ClientMessage, RawFrame, ServerMessage, UpdateSource};

use super::connection::{ConnectionState, WsConnection, WsHandle};
use crate::auth_session::SessionHandle;
use crate::config::SyncConfig;
use crate::event_bus::EventBus;
use crate::storage::KeyValueStore;

const PASSTHROUGH_CAPACITY: usize = 64;

pub struct TransportChannel {
    config: SyncConfig,
    session: SessionHandle,
    storage: Arc<dyn KeyValueStore>,
    bus: EventBus,
    state: Arc<watch::Sender<ConnectionState>>,
    passthrough: broadcast::Sender<RawFrame>,
    connection: Mutex<Option<WsConnection>>,
}

impl TransportChannel {
    pub fn new(
        config: SyncConfig,
        session: SessionHandle,
        storage: Arc<dyn KeyValueStore>,
        bus: EventBus,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (passthrough, _) = broadcast::channel(PASSTHROUGH_CAPACITY);
        Self {
            config,
            session,
            storage,
            bus,
            state: Arc::new(state),
            passthrough,
            connection: Mutex::new(None),
        }
    }

    /// Start the push channel. No-op without a session or while a driver is
    /// already running. Must be called from within a tokio runtime.
    pub fn connect(&self) {
        if !self.session.is_authenticated() {
            debug!("no session; push channel not started");
            return;
        }

        let mut connection = self.lock_connection();
        if connection.as_ref().is_some_and(|c| !c.is_finished()) {
            return;
        }

        let config = self.config.clone();
        let session = self.session.clone();
        let storage = self.storage.clone();
        let url_builder = Arc::new(move || {
            let token = session.resolve_token(storage.as_ref());
            if token.is_none() {
                debug!("no credential token; connecting unauthenticated");
            }
            config.ws_url(token.as_deref())
        });

        let session = self.session.clone();
        let session_valid = Arc::new(move || session.is_authenticated());

        let bus = self.bus.clone();
        let passthrough = self.passthrough.clone();
        let on_frame = Arc::new(move |text: &str| dispatch_frame(text, &bus, &passthrough));

        *connection = Some(WsConnection::spawn(
            self.config.reconnect.clone(),
            self.state.clone(),
            url_builder,
            session_valid,
            on_frame,
        ));
    }

    /// Close the channel cleanly and cancel any pending retry.
    pub fn disconnect(&self) {
        if let Some(connection) = self.lock_connection().take() {
            connection.close();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Read-only view of the connection state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Frames of kinds the balance layer does not consume.
    pub fn passthrough(&self) -> broadcast::Receiver<RawFrame> {
        self.passthrough.subscribe()
    }

    /// Outbound handle for the running driver, if any.
    pub fn handle(&self) -> Option<WsHandle> {
        self.lock_connection().as_ref().map(WsConnection::handle)
    }

    fn lock_connection(&self) -> std::sync::MutexGuard<'_, Option<WsConnection>> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for TransportChannel {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Handle one inbound text frame. Returns the reply to send, if any.
pub(crate) fn dispatch_frame(
    text: &str,
    bus: &EventBus,
    passthrough: &broadcast::Sender<RawFrame>,
) -> Option<ClientMessage> {
    let message = match RawFrame::parse(text).and_then(ServerMessage::from_frame) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "dropping malformed push frame");
            return None;
        }
    };

    match message {
        ServerMessage::BalanceUpdate(p) => {
            debug!(currency = %p.currency, "push balance update");
            bus.publish(BalanceUpdate::new(p.balance, p.currency, UpdateSource::Push));
        }
        ServerMessage::CurrencyChanged(p) => {
            debug!(currency = %p.new_currency, old_currency = ?p.old_currency, "push currency change");
            let mut update = BalanceUpdate::new(p.new_balance, p.new_currency, UpdateSource::Push);
            update.old_currency = p.old_currency;
            update.old_balance = p.old_balance;
            bus.publish(update);
        }
        ServerMessage::Connected(p) => {
            info!(username = ?p.username, "push channel acknowledged");
        }
        ServerMessage::Heartbeat => return Some(ClientMessage::ping_now()),
        ServerMessage::Pong => debug!("pong"),
        ServerMessage::Other(frame) => {
            debug!(kind = %frame.kind, "forwarding unhandled push frame");
            let _ = passthrough.send(frame);
        }
    }
    None
}
