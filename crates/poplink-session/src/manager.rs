//! Link actor: an isolated Tokio task that owns the transport and the
//! connection state machine.
//!
//! The actor is the only code that touches the transport, so every state
//! transition happens in one place, in event-arrival order. Callers hold
//! a [`LinkHandle`] and talk to the actor through an mpsc channel, with
//! `oneshot` reply channels for operations that can fail.

use std::sync::{Arc, Mutex};

use poplink_transport::{
    EndpointId, LinkTransport, TransportError, TransportEvent,
};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use crate::{ConnectionInfo, ConnectionState, EndpointInfo, SessionError};

/// Commands sent to the link actor through its channel.
enum LinkCommand {
    StartHosting {
        service_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    StartDiscovery {
        service_id: String,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    RequestConnection {
        endpoint: EndpointId,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Accept {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Reject {
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    Send {
        payload: Vec<u8>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
    /// Stop advertising; no-op unless currently `Advertising`.
    StopAdvertising {
        reply: oneshot::Sender<()>,
    },
    /// Stop discovering; no-op unless currently `Discovering`.
    StopDiscovery {
        reply: oneshot::Sender<()>,
    },
    /// Tear everything down and return to `Disconnected`.
    Disconnect {
        reply: oneshot::Sender<()>,
    },
    Shutdown,
}

/// Handle to a running link actor.
///
/// Cheap to clone. The actor stops when every handle is dropped or
/// [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct LinkHandle {
    sender: mpsc::Sender<LinkCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    endpoints_rx: watch::Receiver<Vec<EndpointInfo>>,
    connection_rx: watch::Receiver<Option<ConnectionInfo>>,
    inbound: Arc<Mutex<Option<mpsc::UnboundedReceiver<Vec<u8>>>>>,
}

impl LinkHandle {
    /// The link's current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watches the lifecycle state.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Watches the discovered-endpoint list (empty unless discovering).
    pub fn watch_endpoints(&self) -> watch::Receiver<Vec<EndpointInfo>> {
        self.endpoints_rx.clone()
    }

    /// Watches the pending or established connection.
    pub fn watch_connection(&self) -> watch::Receiver<Option<ConnectionInfo>> {
        self.connection_rx.clone()
    }

    /// Hands out the inbound payload stream.
    ///
    /// Single consumer; returns `None` on every call after the first.
    pub fn take_inbound(&self) -> Option<mpsc::UnboundedReceiver<Vec<u8>>> {
        self.inbound.lock().ok()?.take()
    }

    /// Starts hosting: advertise and wait for a connection request.
    pub async fn start_hosting(
        &self,
        service_id: &str,
    ) -> Result<(), SessionError> {
        self.request(|reply| LinkCommand::StartHosting {
            service_id: service_id.to_owned(),
            reply,
        })
        .await
    }

    /// Starts joining: discover hosts advertising under `service_id`.
    pub async fn start_discovery(
        &self,
        service_id: &str,
    ) -> Result<(), SessionError> {
        self.request(|reply| LinkCommand::StartDiscovery {
            service_id: service_id.to_owned(),
            reply,
        })
        .await
    }

    /// Requests a connection to a discovered endpoint.
    pub async fn request_connection(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), SessionError> {
        let endpoint = endpoint.clone();
        self.request(|reply| LinkCommand::RequestConnection { endpoint, reply })
            .await
    }

    /// Accepts the pending connection.
    pub async fn accept_connection(&self) -> Result<(), SessionError> {
        self.request(|reply| LinkCommand::Accept { reply }).await
    }

    /// Rejects the pending connection.
    pub async fn reject_connection(&self) -> Result<(), SessionError> {
        self.request(|reply| LinkCommand::Reject { reply }).await
    }

    /// Sends a payload to the connected peer.
    ///
    /// # Errors
    /// [`SessionError::NotConnected`] when no peer is connected; the
    /// link state is unaffected either way.
    pub async fn send(&self, payload: Vec<u8>) -> Result<(), SessionError> {
        self.request(|reply| LinkCommand::Send { payload, reply }).await
    }

    /// Stops advertising. Safe from any state; a no-op when not
    /// advertising.
    pub async fn stop_advertising(&self) {
        self.fire(|reply| LinkCommand::StopAdvertising { reply }).await;
    }

    /// Stops discovery and clears the discovered-endpoint list. Safe
    /// from any state; a no-op when not discovering.
    pub async fn stop_discovery(&self) {
        self.fire(|reply| LinkCommand::StopDiscovery { reply }).await;
    }

    /// Tears down whatever is active — advertisement, discovery, or an
    /// established connection — and returns to `Disconnected`.
    ///
    /// Never fails: teardown is legal from every state.
    pub async fn disconnect(&self) {
        self.fire(|reply| LinkCommand::Disconnect { reply }).await;
    }

    /// Stops the actor task.
    pub async fn shutdown(&self) {
        let _ = self.sender.send(LinkCommand::Shutdown).await;
    }

    /// Sends a command that cannot fail and waits for it to land.
    async fn fire(
        &self,
        make: impl FnOnce(oneshot::Sender<()>) -> LinkCommand,
    ) {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.sender.send(make(reply_tx)).await.is_ok() {
            let _ = reply_rx.await;
        }
    }

    async fn request(
        &self,
        make: impl FnOnce(oneshot::Sender<Result<(), SessionError>>) -> LinkCommand,
    ) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| SessionError::LinkClosed)?;
        reply_rx.await.map_err(|_| SessionError::LinkClosed)?
    }
}

/// The internal link actor. Runs inside a Tokio task.
struct LinkActor<T: LinkTransport> {
    transport: T,
    /// Our advertised local name, opaque here (built by the layer above).
    local_name: String,
    state: ConnectionState,
    /// Where to land if an in-flight handshake fails.
    fallback: ConnectionState,
    endpoints: Vec<EndpointInfo>,
    connection: Option<ConnectionInfo>,
    state_tx: watch::Sender<ConnectionState>,
    endpoints_tx: watch::Sender<Vec<EndpointInfo>>,
    connection_tx: watch::Sender<Option<ConnectionInfo>>,
    inbound_tx: mpsc::UnboundedSender<Vec<u8>>,
    commands: mpsc::Receiver<LinkCommand>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
}

impl<T: LinkTransport> LinkActor<T> {
    async fn run(mut self) {
        info!("link actor started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => {
                    match cmd {
                        Some(LinkCommand::Shutdown) | None => break,
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
                event = self.events.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
            }
        }

        self.teardown().await;
        info!("link actor stopped");
    }

    async fn handle_command(&mut self, cmd: LinkCommand) {
        match cmd {
            LinkCommand::StartHosting { service_id, reply } => {
                let result = self.handle_start_hosting(&service_id).await;
                let _ = reply.send(result);
            }
            LinkCommand::StartDiscovery { service_id, reply } => {
                let result = self.handle_start_discovery(&service_id).await;
                let _ = reply.send(result);
            }
            LinkCommand::RequestConnection { endpoint, reply } => {
                let result = self.handle_request_connection(&endpoint).await;
                let _ = reply.send(result);
            }
            LinkCommand::Accept { reply } => {
                let _ = reply.send(self.handle_accept().await);
            }
            LinkCommand::Reject { reply } => {
                let _ = reply.send(self.handle_reject().await);
            }
            LinkCommand::Send { payload, reply } => {
                let _ = reply.send(self.handle_send(payload).await);
            }
            LinkCommand::StopAdvertising { reply } => {
                self.transport.stop_advertising().await;
                if self.state == ConnectionState::Advertising {
                    self.fallback = ConnectionState::Disconnected;
                    self.set_state(ConnectionState::Disconnected);
                }
                let _ = reply.send(());
            }
            LinkCommand::StopDiscovery { reply } => {
                self.transport.stop_discovery().await;
                self.endpoints.clear();
                self.endpoints_tx.send_replace(Vec::new());
                if self.state == ConnectionState::Discovering {
                    self.fallback = ConnectionState::Disconnected;
                    self.set_state(ConnectionState::Disconnected);
                }
                let _ = reply.send(());
            }
            LinkCommand::Disconnect { reply } => {
                self.teardown().await;
                let _ = reply.send(());
            }
            // Handled in `run`.
            LinkCommand::Shutdown => {}
        }
    }

    async fn handle_start_hosting(
        &mut self,
        service_id: &str,
    ) -> Result<(), SessionError> {
        // Idempotent: already hosting is success, and the transport is
        // not poked again.
        if self.state == ConnectionState::Advertising {
            return Ok(());
        }
        if !self.state.can_transition_to(ConnectionState::Advertising) {
            return Err(SessionError::InvalidState {
                operation: "start hosting",
                state: self.state,
            });
        }
        match self
            .transport
            .start_advertising(service_id, &self.local_name)
            .await
        {
            Ok(()) => {}
            // Some media report "already advertising" as an error even
            // though the advertisement is up. The desired state holds, so
            // recover rather than surface it.
            Err(TransportError::AlreadyInProgress(_)) => {
                warn!("advertising already active, treating as started");
            }
            Err(e) => return Err(e.into()),
        }
        self.fallback = ConnectionState::Advertising;
        self.set_state(ConnectionState::Advertising);
        Ok(())
    }

    async fn handle_start_discovery(
        &mut self,
        service_id: &str,
    ) -> Result<(), SessionError> {
        if self.state == ConnectionState::Discovering {
            return Ok(());
        }
        if !self.state.can_transition_to(ConnectionState::Discovering) {
            return Err(SessionError::InvalidState {
                operation: "start discovery",
                state: self.state,
            });
        }
        match self.transport.start_discovery(service_id).await {
            Ok(()) => {}
            Err(TransportError::AlreadyInProgress(_)) => {
                warn!("discovery already active, treating as started");
            }
            Err(e) => return Err(e.into()),
        }
        self.endpoints.clear();
        self.endpoints_tx.send_replace(Vec::new());
        self.fallback = ConnectionState::Discovering;
        self.set_state(ConnectionState::Discovering);
        Ok(())
    }

    async fn handle_request_connection(
        &mut self,
        endpoint: &EndpointId,
    ) -> Result<(), SessionError> {
        // Already holding this exact connection: nothing to do.
        if self.state == ConnectionState::Connected
            && self
                .connection
                .as_ref()
                .is_some_and(|c| &c.endpoint == endpoint)
        {
            return Ok(());
        }
        if self.state != ConnectionState::Discovering {
            return Err(SessionError::InvalidState {
                operation: "request connection",
                state: self.state,
            });
        }
        if !self.endpoints.iter().any(|e| &e.endpoint == endpoint) {
            return Err(SessionError::UnknownEndpoint(endpoint.to_string()));
        }
        self.transport
            .request_connection(endpoint, &self.local_name)
            .await?;
        self.set_state(ConnectionState::Connecting);
        Ok(())
    }

    async fn handle_accept(&mut self) -> Result<(), SessionError> {
        let Some(connection) = &self.connection else {
            return Err(SessionError::NoPendingConnection);
        };
        if self.state == ConnectionState::Connected {
            return Err(SessionError::InvalidState {
                operation: "accept",
                state: self.state,
            });
        }
        let endpoint = connection.endpoint.clone();
        self.transport.accept_connection(&endpoint).await?;
        Ok(())
    }

    async fn handle_reject(&mut self) -> Result<(), SessionError> {
        let Some(connection) = &self.connection else {
            return Err(SessionError::NoPendingConnection);
        };
        if self.state == ConnectionState::Connected {
            return Err(SessionError::InvalidState {
                operation: "reject",
                state: self.state,
            });
        }
        let endpoint = connection.endpoint.clone();
        self.transport.reject_connection(&endpoint).await?;
        Ok(())
    }

    async fn handle_send(
        &mut self,
        payload: Vec<u8>,
    ) -> Result<(), SessionError> {
        // A failed or absent connection never changes the link state:
        // the caller decides what to do, the machine stays put.
        let Some(connection) = &self.connection else {
            return Err(SessionError::NotConnected);
        };
        if self.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected);
        }
        self.transport.send(&connection.endpoint, payload).await?;
        Ok(())
    }

    async fn handle_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::EndpointFound {
                endpoint,
                remote_name,
                service_id,
            } => {
                if self.state != ConnectionState::Discovering {
                    return;
                }
                debug!(%endpoint, %remote_name, "endpoint found");
                match self
                    .endpoints
                    .iter_mut()
                    .find(|e| e.endpoint == endpoint)
                {
                    Some(existing) => {
                        existing.remote_name = remote_name;
                        existing.service_id = service_id;
                    }
                    None => self.endpoints.push(EndpointInfo {
                        endpoint,
                        remote_name,
                        service_id,
                    }),
                }
                self.endpoints_tx.send_replace(self.endpoints.clone());
            }

            TransportEvent::EndpointLost { endpoint } => {
                debug!(%endpoint, "endpoint lost");
                self.endpoints.retain(|e| e.endpoint != endpoint);
                self.endpoints_tx.send_replace(self.endpoints.clone());
            }

            TransportEvent::ConnectionInitiated {
                endpoint,
                remote_name,
                auth_token,
                incoming,
            } => {
                // At most one connection, pending or live. An initiation
                // from a third endpoint must not displace it.
                if self
                    .connection
                    .as_ref()
                    .is_some_and(|c| c.endpoint != endpoint)
                {
                    warn!(
                        %endpoint,
                        %remote_name,
                        "initiation while a connection is held, rejecting"
                    );
                    let _ = self.transport.reject_connection(&endpoint).await;
                    return;
                }
                info!(%endpoint, %remote_name, incoming, "connection initiated");
                self.connection = Some(ConnectionInfo {
                    endpoint,
                    remote_name,
                    auth_token,
                    incoming,
                });
                self.connection_tx.send_replace(self.connection.clone());
                if self.state.can_transition_to(ConnectionState::Connecting) {
                    self.set_state(ConnectionState::Connecting);
                }
            }

            TransportEvent::ConnectionResult {
                endpoint,
                success,
                status,
            } => {
                if self
                    .connection
                    .as_ref()
                    .is_none_or(|c| c.endpoint != endpoint)
                {
                    return;
                }
                if success {
                    info!(%endpoint, "connected");
                    // Exactly one peer: once connected, stop being
                    // visible and stop scanning.
                    self.transport.stop_advertising().await;
                    self.transport.stop_discovery().await;
                    self.endpoints.clear();
                    self.endpoints_tx.send_replace(Vec::new());
                    self.set_state(ConnectionState::Connected);
                } else {
                    info!(%endpoint, status, "connection failed");
                    self.connection = None;
                    self.connection_tx.send_replace(None);
                    self.set_state(self.fallback);
                }
            }

            TransportEvent::PayloadReceived { endpoint, bytes } => {
                if self
                    .connection
                    .as_ref()
                    .is_none_or(|c| c.endpoint != endpoint)
                {
                    debug!(%endpoint, "payload from unknown endpoint, dropping");
                    return;
                }
                let _ = self.inbound_tx.send(bytes);
            }

            TransportEvent::Disconnected { endpoint } => {
                if self
                    .connection
                    .as_ref()
                    .is_none_or(|c| c.endpoint != endpoint)
                {
                    return;
                }
                info!(%endpoint, "peer disconnected");
                self.teardown().await;
            }
        }
    }

    /// Full reset: stop everything on the medium, clear every piece of
    /// link state, land in `Disconnected`.
    async fn teardown(&mut self) {
        if let Some(connection) = self.connection.take() {
            self.transport
                .disconnect_from_endpoint(&connection.endpoint)
                .await;
        }
        self.transport.stop_advertising().await;
        self.transport.stop_discovery().await;
        self.endpoints.clear();
        self.endpoints_tx.send_replace(Vec::new());
        self.connection_tx.send_replace(None);
        self.fallback = ConnectionState::Disconnected;
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(from = %self.state, to = %state, "link state");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }
}

/// Spawns the link actor over `transport` and returns its handle.
///
/// `local_name` is the string advertised to (and shown on) the peer
/// device; build it with the protocol crate's local-name encoding.
pub fn spawn_link<T: LinkTransport>(
    transport: T,
    local_name: impl Into<String>,
) -> LinkHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(32);
    let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
    let (endpoints_tx, endpoints_rx) = watch::channel(Vec::new());
    let (connection_tx, connection_rx) = watch::channel(None);
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

    // If the event stream was already taken the link can still issue
    // commands; it just never observes the medium. Keep the stand-in
    // sender alive so the actor doesn't mistake it for a closed medium.
    let (events, keepalive) = match transport.take_events() {
        Some(rx) => (rx, None),
        None => {
            warn!("transport event stream already taken");
            let (tx, rx) = mpsc::unbounded_channel();
            (rx, Some(tx))
        }
    };

    let actor = LinkActor {
        transport,
        local_name: local_name.into(),
        state: ConnectionState::Disconnected,
        fallback: ConnectionState::Disconnected,
        endpoints: Vec::new(),
        connection: None,
        state_tx,
        endpoints_tx,
        connection_tx,
        inbound_tx,
        commands: cmd_rx,
        events,
    };

    tokio::spawn(async move {
        let _keepalive = keepalive;
        actor.run().await;
    });

    LinkHandle {
        sender: cmd_tx,
        state_rx,
        endpoints_rx,
        connection_rx,
        inbound: Arc::new(Mutex::new(Some(inbound_rx))),
    }
}
