//! UDP transport adapter built on tokio
//!
//! Wraps a bound `UdpSocket` in two background tasks: a receiver that reads
//! datagrams and forwards them over an mpsc channel, and a sender that
//! drains an outbound channel onto the socket. The synchronous
//! [`Transport`] side only ever touches the channel ends, so the session
//! loop never awaits.
//!
//! Peers are identified by their socket address. A tiny handshake
//! (`Hello` / `HelloAck`) stands in for channel establishment, and `Bye`
//! stands in for an orderly close.

use crate::transport::{PeerId, Transport, TransportEvent};
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use shared::protocol::MAX_DATAGRAM_SIZE;
use std::collections::{HashSet, VecDeque};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Pause after a failed receive, multiplied by the length of the burst.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF_STEPS: u32 = 20;

/// Consecutive receive failures. Only the first failure of a burst is
/// forwarded to the session.
#[derive(Debug, Default)]
struct ErrorBurst {
    consecutive: u32,
}

impl ErrorBurst {
    /// Records a failure; true when it starts a new burst.
    fn fail(&mut self) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.consecutive == 1
    }

    fn succeed(&mut self) {
        self.consecutive = 0;
    }

    fn backoff(&self) -> Duration {
        RECV_ERROR_BACKOFF * self.consecutive.min(MAX_BACKOFF_STEPS)
    }
}

/// Envelope around every datagram on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frame {
    Hello,
    HelloAck,
    Data(Vec<u8>),
    Bye,
}

/// Messages sent from the receiver task to the transport
#[derive(Debug)]
enum Inbound {
    Frame { frame: Frame, addr: SocketAddr },
    Failed { reason: String },
}

/// Messages sent from the transport to the sender task
#[derive(Debug)]
struct Outbound {
    frame: Frame,
    addr: SocketAddr,
}

pub struct UdpTransport {
    local_addr: SocketAddr,
    peers: HashSet<SocketAddr>,
    pending: VecDeque<TransportEvent>,
    outbound_tx: Option<mpsc::UnboundedSender<Outbound>>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    receiver: JoinHandle<()>,
}

impl UdpTransport {
    /// Binds the socket and spawns the network tasks. Must be called from
    /// within a tokio runtime.
    pub async fn bind(addr: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        let local_addr = socket.local_addr()?;
        info!("Peer listening on {}", local_addr);

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let receiver = Self::spawn_receiver(Arc::clone(&socket), inbound_tx);
        Self::spawn_sender(socket, outbound_rx);

        let mut pending = VecDeque::new();
        pending.push_back(TransportEvent::Registered {
            local_id: PeerId::new(local_addr.to_string()),
        });

        Ok(Self {
            local_addr,
            peers: HashSet::new(),
            pending,
            outbound_tx: Some(outbound_tx),
            inbound_rx,
            receiver,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawns task that continuously listens for incoming datagrams
    fn spawn_receiver(
        socket: Arc<UdpSocket>,
        tx: mpsc::UnboundedSender<Inbound>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE + 64];
            let mut errors = ErrorBurst::default();
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, addr)) => {
                        errors.succeed();
                        match deserialize::<Frame>(&buf[..len]) {
                            Ok(frame) => {
                                if tx.send(Inbound::Frame { frame, addr }).is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to decode datagram from {}: {}", addr, e),
                        }
                    }
                    Err(e) => {
                        if errors.fail() {
                            error!("Failed to receive datagram: {}", e);
                            let reason = e.to_string();
                            if tx.send(Inbound::Failed { reason }).is_err() {
                                break;
                            }
                        } else {
                            debug!("Receive still failing: {}", e);
                        }
                        tokio::time::sleep(errors.backoff()).await;
                    }
                }
            }
        })
    }

    /// Spawns task that writes queued frames to the socket until the
    /// transport drops its sender.
    fn spawn_sender(socket: Arc<UdpSocket>, mut rx: mpsc::UnboundedReceiver<Outbound>) {
        tokio::spawn(async move {
            while let Some(Outbound { frame, addr }) = rx.recv().await {
                match serialize(&frame) {
                    Ok(bytes) => {
                        if let Err(e) = socket.send_to(&bytes, addr).await {
                            error!("Failed to send datagram to {}: {}", addr, e);
                        }
                    }
                    Err(e) => error!("Failed to encode frame for {}: {}", addr, e),
                }
            }
            debug!("Sender task finished");
        });
    }

    fn queue(&mut self, frame: Frame, addr: SocketAddr) {
        if let Some(tx) = self.outbound_tx.as_ref() {
            if tx.send(Outbound { frame, addr }).is_err() {
                error!("Sender task is gone; dropping frame for {}", addr);
            }
        }
    }

    fn parse_peer(peer: &PeerId) -> Option<SocketAddr> {
        peer.as_str().parse().ok()
    }

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Frame { frame, addr } => {
                let peer = PeerId::new(addr.to_string());
                match frame {
                    Frame::Hello => {
                        self.queue(Frame::HelloAck, addr);
                        if self.peers.insert(addr) {
                            self.pending.push_back(TransportEvent::Opened { peer });
                        }
                    }
                    Frame::HelloAck => {
                        if self.peers.insert(addr) {
                            self.pending.push_back(TransportEvent::Opened { peer });
                        }
                    }
                    Frame::Data(bytes) => {
                        if self.peers.contains(&addr) {
                            self.pending.push_back(TransportEvent::Data { peer, bytes });
                        } else {
                            debug!("Dropping data from unknown peer {}", addr);
                        }
                    }
                    Frame::Bye => {
                        if self.peers.remove(&addr) {
                            self.pending.push_back(TransportEvent::Closed { peer });
                        }
                    }
                }
            }
            Inbound::Failed { reason } => {
                self.pending
                    .push_back(TransportEvent::Error { peer: None, reason });
            }
        }
    }
}

impl Transport for UdpTransport {
    fn connect(&mut self, remote: &PeerId) {
        match Self::parse_peer(remote) {
            Some(addr) => {
                info!("Connecting to {}", addr);
                self.queue(Frame::Hello, addr);
            }
            None => self.pending.push_back(TransportEvent::Error {
                peer: Some(remote.clone()),
                reason: format!("invalid peer address '{}'", remote),
            }),
        }
    }

    fn send(&mut self, peer: &PeerId, bytes: &[u8]) {
        match Self::parse_peer(peer) {
            Some(addr) if self.peers.contains(&addr) => {
                self.queue(Frame::Data(bytes.to_vec()), addr);
            }
            _ => debug!("Not sending to unconnected peer {}", peer),
        }
    }

    fn close(&mut self, peer: &PeerId) {
        if let Some(addr) = Self::parse_peer(peer) {
            if self.peers.remove(&addr) {
                self.queue(Frame::Bye, addr);
            }
        }
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        while let Ok(inbound) = self.inbound_rx.try_recv() {
            self.handle_inbound(inbound);
        }
        self.pending.drain(..).collect()
    }

    fn shutdown(&mut self) {
        let peers: Vec<SocketAddr> = self.peers.drain().collect();
        for addr in peers {
            self.queue(Frame::Bye, addr);
        }
        // Dropping the sender lets the sender task flush and exit.
        self.outbound_tx = None;
        self.receiver.abort();
        self.pending.clear();
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}
