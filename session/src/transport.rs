//! Transport contract and an in-process implementation.
//!
//! The session never touches sockets directly. A transport moves opaque
//! datagrams between peers and queues lifecycle events; the session drains
//! that queue once per loop iteration.

use log::debug;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PeerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PeerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Signaling registration finished; `local_id` is our public identity.
    Registered { local_id: PeerId },
    /// A data channel to `peer` is open.
    Opened { peer: PeerId },
    Data { peer: PeerId, bytes: Vec<u8> },
    Closed { peer: PeerId },
    Error { peer: Option<PeerId>, reason: String },
}

pub trait Transport {
    /// Starts opening a channel to `remote`. Completion arrives as `Opened`.
    fn connect(&mut self, remote: &PeerId);

    /// Best-effort send; may be lost, duplicated or reordered.
    fn send(&mut self, peer: &PeerId, bytes: &[u8]);

    fn close(&mut self, peer: &PeerId);

    /// Drains every event queued since the last call.
    fn poll_events(&mut self) -> Vec<TransportEvent>;

    /// Releases all channels. No events are produced afterwards.
    fn shutdown(&mut self);
}

/// What the hub does with one datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Deliver,
    Drop,
    Duplicate,
}

type DeliveryFilter = Box<dyn FnMut(&PeerId, &PeerId, &[u8]) -> Delivery>;

#[derive(Default)]
struct HubState {
    inboxes: HashMap<PeerId, VecDeque<TransportEvent>>,
    links: HashSet<(PeerId, PeerId)>,
    filter: Option<DeliveryFilter>,
}

impl HubState {
    fn push(&mut self, to: &PeerId, event: TransportEvent) {
        if let Some(inbox) = self.inboxes.get_mut(to) {
            inbox.push_back(event);
        }
    }

    fn linked(&self, a: &PeerId, b: &PeerId) -> bool {
        self.links.contains(&(a.clone(), b.clone()))
    }

    fn unlink(&mut self, a: &PeerId, b: &PeerId) -> bool {
        let removed = self.links.remove(&(a.clone(), b.clone()));
        self.links.remove(&(b.clone(), a.clone()));
        removed
    }
}

/// Single-threaded in-memory network connecting any number of endpoints.
#[derive(Clone, Default)]
pub struct MemoryHub {
    state: Rc<RefCell<HubState>>,
}

impl MemoryHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an endpoint. Its first queued event is `Registered`.
    pub fn endpoint(&self, id: impl Into<PeerId>) -> MemoryTransport {
        let id = id.into();
        let mut state = self.state.borrow_mut();
        let mut inbox = VecDeque::new();
        inbox.push_back(TransportEvent::Registered {
            local_id: id.clone(),
        });
        state.inboxes.insert(id.clone(), inbox);

        MemoryTransport {
            id,
            hub: self.clone(),
        }
    }

    /// Installs a hook deciding the fate of every datagram `(from, to, bytes)`.
    pub fn set_filter(&self, filter: impl FnMut(&PeerId, &PeerId, &[u8]) -> Delivery + 'static) {
        self.state.borrow_mut().filter = Some(Box::new(filter));
    }

    /// Simulates the remote side dropping the channel between `a` and `b`.
    pub fn disconnect(&self, a: &PeerId, b: &PeerId) {
        let mut state = self.state.borrow_mut();
        if state.unlink(a, b) {
            state.push(a, TransportEvent::Closed { peer: b.clone() });
            state.push(b, TransportEvent::Closed { peer: a.clone() });
        }
    }

    /// Injects an arbitrary event into an endpoint's queue.
    pub fn inject(&self, to: &PeerId, event: TransportEvent) {
        self.state.borrow_mut().push(to, event);
    }
}

pub struct MemoryTransport {
    id: PeerId,
    hub: MemoryHub,
}

impl MemoryTransport {
    pub fn id(&self) -> &PeerId {
        &self.id
    }
}

impl Transport for MemoryTransport {
    fn connect(&mut self, remote: &PeerId) {
        let mut state = self.hub.state.borrow_mut();
        if !state.inboxes.contains_key(remote) {
            state.push(
                &self.id,
                TransportEvent::Error {
                    peer: Some(remote.clone()),
                    reason: "peer-unavailable".to_string(),
                },
            );
            return;
        }

        state.links.insert((self.id.clone(), remote.clone()));
        state.links.insert((remote.clone(), self.id.clone()));
        state.push(remote, TransportEvent::Opened {
            peer: self.id.clone(),
        });
        state.push(&self.id, TransportEvent::Opened {
            peer: remote.clone(),
        });
    }

    fn send(&mut self, peer: &PeerId, bytes: &[u8]) {
        let mut state = self.hub.state.borrow_mut();
        if !state.linked(&self.id, peer) {
            debug!("{} dropped datagram to unlinked peer {}", self.id, peer);
            return;
        }

        let delivery = match state.filter.as_mut() {
            Some(filter) => filter(&self.id, peer, bytes),
            None => Delivery::Deliver,
        };
        let copies = match delivery {
            Delivery::Deliver => 1,
            Delivery::Drop => 0,
            Delivery::Duplicate => 2,
        };
        for _ in 0..copies {
            state.push(
                peer,
                TransportEvent::Data {
                    peer: self.id.clone(),
                    bytes: bytes.to_vec(),
                },
            );
        }
    }

    fn close(&mut self, peer: &PeerId) {
        let mut state = self.hub.state.borrow_mut();
        if state.unlink(&self.id, peer) {
            state.push(peer, TransportEvent::Closed {
                peer: self.id.clone(),
            });
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut state = self.hub.state.borrow_mut();
        state
            .inboxes
            .get_mut(&self.id)
            .map(|inbox| inbox.drain(..).collect())
            .unwrap_or_default()
    }

    fn shutdown(&mut self) {
        let mut state = self.hub.state.borrow_mut();
        let peers: Vec<PeerId> = state
            .links
            .iter()
            .filter(|(from, _)| *from == self.id)
            .map(|(_, to)| to.clone())
            .collect();
        for peer in peers {
            state.unlink(&self.id, &peer);
            state.push(&peer, TransportEvent::Closed {
                peer: self.id.clone(),
            });
        }
        state.inboxes.remove(&self.id);
    }
}
