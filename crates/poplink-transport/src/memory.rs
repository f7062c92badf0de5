//! In-process transport medium for tests and demos.
//!
//! A [`MemoryMedium`] plays the role of the air between devices: every
//! [`MemoryTransport`] endpoint registered on the same medium can
//! discover and connect to the others. Semantics mirror a real
//! nearby-devices stack — mutual accept before payloads, discovery
//! scoped by service id, disconnection observed by the remote side —
//! but everything happens synchronously under one lock, which keeps
//! tests deterministic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::{
    random_auth_token, random_endpoint_id, EndpointId, LinkTransport,
    TransportError, TransportEvent, STATUS_CONNECTION_REJECTED, STATUS_OK,
};

/// The shared in-process medium. Cheap to clone.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    inner: Arc<Mutex<MediumState>>,
}

#[derive(Default)]
struct MediumState {
    peers: HashMap<EndpointId, PeerSlot>,
    pending: Vec<Pending>,
    links: Vec<(EndpointId, EndpointId)>,
}

struct PeerSlot {
    events: mpsc::UnboundedSender<TransportEvent>,
    advertising: Option<Advertisement>,
    discovering: Option<String>,
    flaky_send: bool,
}

struct Advertisement {
    service_id: String,
    local_name: String,
}

struct Pending {
    from: EndpointId,
    to: EndpointId,
    from_accepted: bool,
    to_accepted: bool,
    token: String,
}

impl MemoryMedium {
    /// Creates a new, empty medium.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new endpoint on this medium and returns its transport.
    pub fn endpoint(&self) -> MemoryTransport {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = random_endpoint_id();
        {
            let mut state = self.lock();
            state.peers.insert(
                id.clone(),
                PeerSlot {
                    events: tx,
                    advertising: None,
                    discovering: None,
                    flaky_send: false,
                },
            );
        }
        tracing::debug!(endpoint = %id, "endpoint joined memory medium");
        MemoryTransport {
            medium: self.clone(),
            id,
            events: Arc::new(Mutex::new(Some(rx))),
        }
    }

    /// Severs an established link as if the radio dropped: both sides
    /// observe [`TransportEvent::Disconnected`].
    pub fn sever(&self, a: &EndpointId, b: &EndpointId) {
        let mut state = self.lock();
        let before = state.links.len();
        state
            .links
            .retain(|(x, y)| !((x == a && y == b) || (x == b && y == a)));
        if state.links.len() < before {
            state.emit(a, TransportEvent::Disconnected { endpoint: b.clone() });
            state.emit(b, TransportEvent::Disconnected { endpoint: a.clone() });
        }
    }

    /// Makes every future `send` from `endpoint` fail, without touching
    /// its established links. Used to exercise send-failure handling.
    pub fn set_flaky_send(&self, endpoint: &EndpointId, flaky: bool) {
        if let Some(slot) = self.lock().peers.get_mut(endpoint) {
            slot.flaky_send = flaky;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MediumState> {
        // The medium lock is never held across an await point.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MediumState {
    fn emit(&self, to: &EndpointId, event: TransportEvent) {
        if let Some(slot) = self.peers.get(to) {
            // A dropped receiver just means the endpoint went away.
            let _ = slot.events.send(event);
        }
    }

    fn linked(&self, a: &EndpointId, b: &EndpointId) -> bool {
        self.links
            .iter()
            .any(|(x, y)| (x == a && y == b) || (x == b && y == a))
    }
}

/// One endpoint's view of a [`MemoryMedium`].
#[derive(Clone)]
pub struct MemoryTransport {
    medium: MemoryMedium,
    id: EndpointId,
    events: Arc<Mutex<Option<mpsc::UnboundedReceiver<TransportEvent>>>>,
}

impl MemoryTransport {
    /// The id the medium assigned to this endpoint.
    pub fn endpoint_id(&self) -> &EndpointId {
        &self.id
    }

    /// The medium this endpoint is registered on.
    pub fn medium(&self) -> &MemoryMedium {
        &self.medium
    }
}

impl LinkTransport for MemoryTransport {
    async fn start_advertising(
        &self,
        service_id: &str,
        local_name: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.medium.lock();
        let slot = state
            .peers
            .get_mut(&self.id)
            .ok_or_else(|| TransportError::UnknownEndpoint(self.id.to_string()))?;
        if slot.advertising.is_some() {
            return Err(TransportError::AlreadyInProgress("advertising"));
        }
        slot.advertising = Some(Advertisement {
            service_id: service_id.to_string(),
            local_name: local_name.to_string(),
        });

        // Anyone already discovering this service sees us immediately.
        let found = TransportEvent::EndpointFound {
            endpoint: self.id.clone(),
            remote_name: local_name.to_string(),
            service_id: service_id.to_string(),
        };
        let watchers: Vec<EndpointId> = state
            .peers
            .iter()
            .filter(|(id, slot)| {
                **id != self.id && slot.discovering.as_deref() == Some(service_id)
            })
            .map(|(id, _)| id.clone())
            .collect();
        for watcher in watchers {
            state.emit(&watcher, found.clone());
        }
        Ok(())
    }

    async fn stop_advertising(&self) {
        let mut state = self.medium.lock();
        let Some(slot) = state.peers.get_mut(&self.id) else {
            return;
        };
        let Some(ad) = slot.advertising.take() else {
            return;
        };
        let watchers: Vec<EndpointId> = state
            .peers
            .iter()
            .filter(|(id, slot)| {
                **id != self.id
                    && slot.discovering.as_deref() == Some(ad.service_id.as_str())
            })
            .map(|(id, _)| id.clone())
            .collect();
        for watcher in watchers {
            state.emit(
                &watcher,
                TransportEvent::EndpointLost { endpoint: self.id.clone() },
            );
        }
    }

    async fn start_discovery(
        &self,
        service_id: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.medium.lock();
        let slot = state
            .peers
            .get_mut(&self.id)
            .ok_or_else(|| TransportError::UnknownEndpoint(self.id.to_string()))?;
        if slot.discovering.is_some() {
            return Err(TransportError::AlreadyInProgress("discovery"));
        }
        slot.discovering = Some(service_id.to_string());

        // Report every endpoint already advertising this service.
        let found: Vec<TransportEvent> = state
            .peers
            .iter()
            .filter(|(id, _)| **id != self.id)
            .filter_map(|(id, slot)| {
                let ad = slot.advertising.as_ref()?;
                (ad.service_id == service_id).then(|| TransportEvent::EndpointFound {
                    endpoint: id.clone(),
                    remote_name: ad.local_name.clone(),
                    service_id: ad.service_id.clone(),
                })
            })
            .collect();
        for event in found {
            state.emit(&self.id, event);
        }
        Ok(())
    }

    async fn stop_discovery(&self) {
        let mut state = self.medium.lock();
        if let Some(slot) = state.peers.get_mut(&self.id) {
            slot.discovering = None;
        }
    }

    async fn request_connection(
        &self,
        endpoint: &EndpointId,
        local_name: &str,
    ) -> Result<(), TransportError> {
        let mut state = self.medium.lock();
        let remote_name = state
            .peers
            .get(endpoint)
            .ok_or_else(|| TransportError::UnknownEndpoint(endpoint.to_string()))?
            .advertising
            .as_ref()
            .map(|ad| ad.local_name.clone())
            .unwrap_or_else(|| endpoint.to_string());

        let token = random_auth_token();
        state.pending.push(Pending {
            from: self.id.clone(),
            to: endpoint.clone(),
            from_accepted: false,
            to_accepted: false,
            token: token.clone(),
        });

        state.emit(
            endpoint,
            TransportEvent::ConnectionInitiated {
                endpoint: self.id.clone(),
                remote_name: local_name.to_string(),
                auth_token: token.clone(),
                incoming: true,
            },
        );
        state.emit(
            &self.id,
            TransportEvent::ConnectionInitiated {
                endpoint: endpoint.clone(),
                remote_name,
                auth_token: token,
                incoming: false,
            },
        );
        Ok(())
    }

    async fn accept_connection(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        let mut state = self.medium.lock();
        let idx = state
            .pending
            .iter()
            .position(|p| {
                (p.from == self.id && p.to == *endpoint)
                    || (p.to == self.id && p.from == *endpoint)
            })
            .ok_or_else(|| {
                TransportError::NoPendingConnection(endpoint.to_string())
            })?;

        {
            let pending = &mut state.pending[idx];
            if pending.from == self.id {
                pending.from_accepted = true;
            } else {
                pending.to_accepted = true;
            }
        }

        if state.pending[idx].from_accepted && state.pending[idx].to_accepted {
            let pending = state.pending.swap_remove(idx);
            state.links.push((pending.from.clone(), pending.to.clone()));
            state.emit(
                &pending.from,
                TransportEvent::ConnectionResult {
                    endpoint: pending.to.clone(),
                    success: true,
                    status: STATUS_OK,
                },
            );
            state.emit(
                &pending.to,
                TransportEvent::ConnectionResult {
                    endpoint: pending.from.clone(),
                    success: true,
                    status: STATUS_OK,
                },
            );
        }
        Ok(())
    }

    async fn reject_connection(
        &self,
        endpoint: &EndpointId,
    ) -> Result<(), TransportError> {
        let mut state = self.medium.lock();
        let idx = state
            .pending
            .iter()
            .position(|p| {
                (p.from == self.id && p.to == *endpoint)
                    || (p.to == self.id && p.from == *endpoint)
            })
            .ok_or_else(|| {
                TransportError::NoPendingConnection(endpoint.to_string())
            })?;
        let pending = state.pending.swap_remove(idx);
        state.emit(
            &pending.from,
            TransportEvent::ConnectionResult {
                endpoint: pending.to.clone(),
                success: false,
                status: STATUS_CONNECTION_REJECTED,
            },
        );
        state.emit(
            &pending.to,
            TransportEvent::ConnectionResult {
                endpoint: pending.from.clone(),
                success: false,
                status: STATUS_CONNECTION_REJECTED,
            },
        );
        Ok(())
    }

    async fn send(
        &self,
        endpoint: &EndpointId,
        payload: Vec<u8>,
    ) -> Result<(), TransportError> {
        let state = self.medium.lock();
        let flaky = state
            .peers
            .get(&self.id)
            .map(|slot| slot.flaky_send)
            .unwrap_or(false);
        if flaky {
            return Err(TransportError::SendFailed(
                "medium dropped the payload".to_string(),
            ));
        }
        if !state.linked(&self.id, endpoint) {
            return Err(TransportError::NotConnected(endpoint.to_string()));
        }
        state.emit(
            endpoint,
            TransportEvent::PayloadReceived {
                endpoint: self.id.clone(),
                bytes: payload,
            },
        );
        Ok(())
    }

    async fn disconnect_from_endpoint(&self, endpoint: &EndpointId) {
        let mut state = self.medium.lock();
        state.pending.retain(|p| {
            !((p.from == self.id && p.to == *endpoint)
                || (p.to == self.id && p.from == *endpoint))
        });
        let before = state.links.len();
        state.links.retain(|(a, b)| {
            !((a == &self.id && b == endpoint) || (b == &self.id && a == endpoint))
        });
        if state.links.len() < before {
            state.emit(
                endpoint,
                TransportEvent::Disconnected { endpoint: self.id.clone() },
            );
        }
    }

    fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }
}
