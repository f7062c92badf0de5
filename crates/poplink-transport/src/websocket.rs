//! WebSocket link implementation using `tokio-tungstenite`.
//!
//! Maps the [`LinkTransport`] surface onto plain LAN sockets so two real
//! processes can play. Advertising binds a listener; discovery probes a
//! configured list of peer addresses. A tiny JSON control-frame protocol
//! carries the connection handshake (probe/hello/connect-request/
//! accept/reject) and, once both sides have accepted, opaque payloads.
//!
//! Endpoint ids are local aliases for sockets — each side mints its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::{
    random_auth_token, random_endpoint_id, EndpointId, LinkTransport,
    TransportError, TransportEvent, STATUS_CONNECTION_REJECTED,
};

/// Addresses for a WebSocket link.
#[derive(Debug, Clone)]
pub struct WsLinkConfig {
    /// Address to bind when advertising, e.g. `"0.0.0.0:7447"`.
    pub bind_addr: String,
    /// Peer addresses probed during discovery, e.g. `["192.168.1.20:7447"]`.
    pub peer_addrs: Vec<String>,
}

/// Control frames exchanged on a link socket.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "frame", rename_all = "snake_case")]
enum WireFrame {
    Probe { service_id: String },
    Hello { service_id: String, name: String },
    ConnectRequest { name: String, token: String },
    Accept,
    Reject,
    Payload { data: Vec<u8> },
    Bye,
}

struct Socket {
    outgoing: mpsc::UnboundedSender<WireFrame>,
    remote_name: String,
    local_accepted: bool,
    remote_accepted: bool,
    established: bool,
    task: JoinHandle<()>,
}

struct Advertising {
    service_id: String,
    local_name: String,
    bound_addr: std::net::SocketAddr,
    listener: JoinHandle<()>,
}

#[derive(Default)]
struct WsState {
    advertising: Option<Advertising>,
    discovering: bool,
    sockets: HashMap<EndpointId, Socket>,
}

struct Inner {
    config: WsLinkConfig,
    events: mpsc::UnboundedSender<TransportEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>,
    // Plain std mutex; never held across an await point.
    state: Mutex<WsState>,
}

/// A [`LinkTransport`] over WebSocket for two devices on the same network.
#[derive(Clone)]
pub struct WsLinkTransport {
    inner: Arc<Inner>,
}

impl WsLinkTransport {
    /// Creates a transport for the given addresses. Nothing is bound
    /// until advertising or discovery starts.
    pub fn new(config: WsLinkConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Inner {
                config,
                events: tx,
                events_rx: Mutex::new(Some(rx)),
                state: Mutex::new(WsState::default()),
            }),
        }
    }

    /// The listener address while advertising. Handy when binding to
    /// port 0 and handing the real address to the other device.
    pub fn bound_addr(&self) -> Option<std::net::SocketAddr> {
        self.inner.lock().advertising.as_ref().map(|ad| ad.bound_addr)
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, WsState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: TransportEvent) {
        let _ = self.events.send(event);
    }

    /// Registers a socket and spawns its read/write task.
    fn adopt_socket<S>(
        self: &Arc<Self>,
        ws: WebSocketStream<S>,
        remote_name: String,
    ) -> EndpointId
    where
        S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
    {
        let id = random_endpoint_id();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(
            Arc::clone(self),
            id.clone(),
            ws,
            out_rx,
        ));
        self.lock().sockets.insert(
            id.clone(),
            Socket {
                outgoing: out_tx,
                remote_name,
                local_accepted: false,
                remote_accepted: false,
                established: false,
                task,
            },
        );
        id
    }

    /// Queues a frame for a socket. Best effort; a closed socket is
    /// reported through its task, not here.
    fn send_frame(&self, endpoint: &EndpointId, frame: WireFrame) {
        if let Some(socket) = self.lock().sockets.get(endpoint) {
            let _ = socket.outgoing.send(frame);
        }
    }

    /// Fires the success result once both sides have accepted.
    fn maybe_establish(&self, endpoint: &EndpointId) {
        let mut state = self.lock();
        let Some(socket) = state.sockets.get_mut(endpoint) else {
            return;
        };
        if socket.local_accepted && socket.remote_accepted && !socket.established {
            socket.established = true;
            drop(state);
            self.emit(TransportEvent::ConnectionResult {
                endpoint: endpoint.clone(),
                success: true,
                status: crate::STATUS_OK,
            });
        }
    }

    fn handle_frame(self: &Arc<Self>, endpoint: &EndpointId, frame: WireFrame) {
        match frame {
            WireFrame::Probe { service_id } => {
                let reply = {
                    let state = self.lock();
                    state.advertising.as_ref().and_then(|ad| {
                        (ad.service_id == service_id).then(|| WireFrame::Hello {
                            service_id: ad.service_id.clone(),
                            name: ad.local_name.clone(),
                        })
                    })
                };
                match reply {
                    Some(hello) => self.send_frame(endpoint, hello),
                    // Wrong service: not our peer, close politely.
                    None => self.send_frame(endpoint, WireFrame::Bye),
                }
            }
            WireFrame::Hello { service_id, name } => {
                if let Some(socket) = self.lock().sockets.get_mut(endpoint) {
                    socket.remote_name = name.clone();
                }
                self.emit(TransportEvent::EndpointFound {
                    endpoint: endpoint.clone(),
                    remote_name: name,
                    service_id,
                });
            }
            WireFrame::ConnectRequest { name, token } => {
                if let Some(socket) = self.lock().sockets.get_mut(endpoint) {
                    socket.remote_name = name.clone();
                }
                self.emit(TransportEvent::ConnectionInitiated {
                    endpoint: endpoint.clone(),
                    remote_name: name,
                    auth_token: token,
                    incoming: true,
                });
            }
            WireFrame::Accept => {
                if let Some(socket) = self.lock().sockets.get_mut(endpoint) {
                    socket.remote_accepted = true;
                }
                self.maybe_establish(endpoint);
            }
            WireFrame::Reject => {
                self.drop_socket(endpoint);
                self.emit(TransportEvent::ConnectionResult {
                    endpoint: endpoint.clone(),
                    success: false,
                    status: STATUS_CONNECTION_REJECTED,
                });
            }
            WireFrame::Payload { data } => {
                let established = self
                    .lock()
                    .sockets
                    .get(endpoint)
                    .map(|s| s.established)
                    .unwrap_or(false);
                if established {
                    self.emit(TransportEvent::PayloadReceived {
                        endpoint: endpoint.clone(),
                        bytes: data,
                    });
                } else {
                    tracing::debug!(
                        %endpoint,
                        "payload before mutual accept, dropping"
                    );
                }
            }
            WireFrame::Bye => {
                self.socket_closed(endpoint);
            }
        }
    }

    /// The socket's task observed a close or an error.
    fn socket_closed(&self, endpoint: &EndpointId) {
        let was_established = {
            let mut state = self.lock();
            state
                .sockets
                .remove(endpoint)
                .map(|socket| {
                    socket.task.abort();
                    socket.established
                })
                .unwrap_or(false)
        };
        if was_established {
            self.emit(TransportEvent::Disconnected {
                endpoint: endpoint.clone(),
            });
        } else {
            self.emit(TransportEvent::EndpointLost {
                endpoint: endpoint.clone(),
            });
        }
    }

    /// Removes a socket without emitting anything.
    fn drop_socket(&self, endpoint: &EndpointId) {
        if let Some(socket) = self.lock().sockets.remove(endpoint) {
            socket.task.abort();
        }
    }
}

/// Owns one WebSocket: forwards queued frames out and dispatches
/// incoming frames back into the transport.
async fn run_socket<S>(
    inner: Arc<Inner>,
    endpoint: EndpointId,
    ws: WebSocketStream<S>,
    mut out_rx: mpsc::UnboundedReceiver<WireFrame>,
) where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = out_rx.recv() => {
                let Some(frame) = frame else { break };
                let json = match serde_json::to_string(&frame) {
                    Ok(json) => json,
                    Err(e) => {
                        tracing::warn!(%endpoint, error = %e, "frame encode failed");
                        continue;
                    }
                };
                if sink.send(Message::text(json)).await.is_err() {
                    inner.socket_closed(&endpoint);
                    break;
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<WireFrame>(text.as_str()) {
                            Ok(frame) => inner.handle_frame(&endpoint, frame),
                            Err(e) => tracing::debug!(
                                %endpoint, error = %e, "unparseable frame, dropping"
                            ),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        inner.socket_closed(&endpoint);
                        break;
                    }
                    Some(Ok(_)) => {} // ping/pong/binary: ignore
                    Some(Err(e)) => {
                        tracing::debug!(%endpoint, error = %e, "socket error");
                        inner.socket_closed(&endpoint);
                        break;
                    }
                }
            }
        }
    }
}

impl LinkTransport for WsLinkTransport {
    async fn start_advertising(
        &self,
        service_id: &str,
        local_name: &str,
    ) -> Result<(), TransportError> {
        if self.inner.lock().advertising.is_some() {
            return Err(TransportError::AlreadyInProgress("advertising"));
        }

        let listener = TcpListener::bind(&self.inner.config.bind_addr)
            .await
            .map_err(TransportError::Io)?;
        let bound_addr = listener.local_addr().map_err(TransportError::Io)?;
        tracing::info!(addr = %bound_addr, service_id, "advertising on WebSocket listener");

        let inner = Arc::clone(&self.inner);
        let accept_loop = tokio::spawn(async move {
            loop {
                let (stream, addr) = match listener.accept().await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                match tokio_tungstenite::accept_async(stream).await {
                    Ok(ws) => {
                        let id = inner.adopt_socket(ws, addr.to_string());
                        tracing::debug!(endpoint = %id, %addr, "socket accepted");
                    }
                    Err(e) => {
                        tracing::debug!(%addr, error = %e, "handshake failed");
                    }
                }
            }
        });

        self.inner.lock().advertising = Some(Advertising {
            service_id: service_id.to_string(),
            local_name: local_name.to_string(),
            bound_addr,
            listener: accept_loop,
        });
        Ok(())
    }

    async fn stop_advertising(&self) {
        if let Some(ad) = self.inner.lock().advertising.take() {
            ad.listener.abort();
        }
    }

    async fn start_discovery(
        &self,
        service_id: &str,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.inner.lock();
            if state.discovering {
                return Err(TransportError::AlreadyInProgress("discovery"));
            }
            state.discovering = true;
        }

        // Probe each configured peer once. Unreachable peers are normal
        // (the other device may not be advertising yet).
        for addr in self.inner.config.peer_addrs.clone() {
            let url = format!("ws://{addr}");
            match tokio_tungstenite::connect_async(&url).await {
                Ok((ws, _response)) => {
                    let id = self.inner.adopt_socket(ws, addr.clone());
                    self.inner.send_frame(
                        &id,
                        WireFrame::Probe { service_id: service_id.to_string() },
                    );
                    tracing::debug!(endpoint = %id, %addr, "probing peer");
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "peer not reachable");
                }
            }
        }
        Ok(())
    }

    async fn stop_discovery(&self) {
        self.inner.lock().discovering = false;
    }

    async fn request_connection(
        &self,
        endpoint: &EndpointId,
        local_name: &str,
    ) -> Result<(), TransportError> {
        let remote_name = self
            .inner
            .lock()
            .sockets
            .get(endpoint)
            .map(|s| s.remote_name.clone())
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?;

        let token = random_auth_token();
        self.inner.send_frame(
            endpoint,
            WireFrame::ConnectRequest {
                name: local_name.to_string(),
                token: token.clone(),
            },
        );
        self.inner.emit(TransportEvent::ConnectionInitiated {
            endpoint: endpoint.clone(),
            remote_name,
            auth_token: token,
            incoming: false,
        });
        Ok(())
    }

    async fn accept_connection(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.inner.lock();
            let socket = state.sockets.get_mut(endpoint).ok_or_else(|| {
                TransportError::NoPendingConnection(endpoint.to_string())
            })?;
            socket.local_accepted = true;
        }
        self.inner.send_frame(endpoint, WireFrame::Accept);
        self.inner.maybe_establish(endpoint);
        Ok(())
    }

    async fn reject_connection(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        if !self.inner.lock().sockets.contains_key(endpoint) {
            return Err(TransportError::NoPendingConnection(
                endpoint.to_string(),
            ));
        }
        self.inner.send_frame(endpoint, WireFrame::Reject);
        self.inner.drop_socket(endpoint);
        self.inner.emit(TransportEvent::ConnectionResult {
            endpoint: endpoint.clone(),
            success: false,
            status: STATUS_CONNECTION_REJECTED,
        });
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &EndpointId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let state = self.inner.lock();
        let socket = state
            .sockets
            .get(endpoint)
            .filter(|s| s.established)
            .ok_or_else(|| TransportError::NotConnected(endpoint.to_string()))?;
        socket
            .outgoing
            .send(WireFrame::Payload { data: payload })
            .map_err(|_| TransportError::SendFailed("socket task gone".to_string()))
    }

    async fn disconnect_from_endpoint(&self, endpoint: &EndpointId) {
        self.inner.send_frame(endpoint, WireFrame::Bye);
        self.inner.drop_socket(endpoint);
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.inner
            .events_rx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
