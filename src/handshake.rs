// Numan Thabit 2026
// handshake.rs - initiator side of the MSE encrypted-handshake negotiation

use std::sync::Arc;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    channel::{PeerChannel, Socket},
    config::HandshakeConfig,
    engine::{CryptoMode, EngineError, HandshakeEngine},
    metrics::Metrics,
    peer::{Peer, PeerPool},
    sched::{Command, CommandError, CommandSink, ConnectionId, Interest, Progress},
    store::PieceStore,
    swarm::{Download, SwarmRuntime},
};

/// Negotiation phases, in forward order. A session only moves forward through
/// this ordering or repeats its current pending sub-phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    SendKey,
    SendKeyPending,
    WaitKey,
    SendStep2Pending,
    FindVcMarker,
    RecvSelectAndPadLength,
    RecvPad,
}

#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("peer pool and piece store must be attached before the first step")]
    NotAttached,
    #[error("negotiated stream cipher missing encrypt/decrypt state")]
    MissingCipherState,
}

/// Which handshake path a fresh connection attempt should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    /// Full MSE negotiation.
    Encrypted,
    /// Legacy plaintext handshake, bypassing MSE entirely.
    Legacy,
}

/// Everything a freshly scheduled outbound connection attempt needs.
pub struct ConnectRequest {
    pub id: ConnectionId,
    pub mode: ConnectMode,
    pub download: Arc<Download>,
    pub swarm: Arc<SwarmRuntime>,
    pub peer: Arc<Peer>,
    pub pool: Arc<PeerPool>,
    pub store: Arc<PieceStore>,
}

/// Terminal outcome of a successful negotiation, transferred to the
/// next-stage command.
pub struct Negotiated {
    pub id: ConnectionId,
    pub download: Arc<Download>,
    pub swarm: Arc<SwarmRuntime>,
    pub peer: Arc<Peer>,
    pub pool: Arc<PeerPool>,
    pub store: Arc<PieceStore>,
    pub channel: PeerChannel,
    pub crypto: CryptoMode,
}

/// Builds the commands that follow this one: fresh outbound connection
/// attempts and the next protocol stage after a successful hand-off.
pub trait Dispatch: Send + Sync {
    fn connect(&self, request: ConnectRequest) -> Box<dyn Command>;

    fn next_stage(&self, outcome: Negotiated) -> Box<dyn Command>;
}

/// One encrypted-handshake attempt as the initiating side.
///
/// Owns its engine exclusively; everything else is shared. Claims one swarm
/// connection slot and one owning-unit command slot at construction and
/// releases both in `Drop`, so the counters balance on every exit path.
pub struct InitiatorHandshake<E: HandshakeEngine> {
    id: ConnectionId,
    phase: Phase,
    interest: Interest,
    deadline: Instant,
    started: Instant,
    socket: Arc<dyn Socket>,
    engine: E,
    download: Arc<Download>,
    swarm: Arc<SwarmRuntime>,
    peer: Arc<Peer>,
    pool: Option<Arc<PeerPool>>,
    store: Option<Arc<PieceStore>>,
    dispatch: Arc<dyn Dispatch>,
    config: HandshakeConfig,
    metrics: Arc<Metrics>,
}

impl<E: HandshakeEngine> InitiatorHandshake<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ConnectionId,
        download: Arc<Download>,
        peer: Arc<Peer>,
        swarm: Arc<SwarmRuntime>,
        socket: Arc<dyn Socket>,
        engine: E,
        dispatch: Arc<dyn Dispatch>,
        config: HandshakeConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        let started = Instant::now();
        swarm.acquire_connection();
        download.retain_command();
        metrics.active_connections.inc();
        metrics.handshake_attempts.inc();
        debug!(conn = %id, peer = %peer.addr(), "starting encrypted handshake");

        Self {
            id,
            phase: Phase::SendKey,
            interest: Interest::Write,
            deadline: started + config.connect_timeout(),
            started,
            socket,
            engine,
            download,
            swarm,
            peer,
            pool: None,
            store: None,
            dispatch,
            config,
            metrics,
        }
    }

    /// Attaches the shared peer pool. Must happen before the first step.
    pub fn set_peer_pool(&mut self, pool: Arc<PeerPool>) {
        self.pool = Some(pool);
    }

    /// Attaches the shared piece store. Must happen before the first step.
    pub fn set_piece_store(&mut self, store: Arc<PieceStore>) {
        self.store = Some(store);
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The key is on the wire; from here the longer protocol deadline governs
    /// and the session waits for the remote to answer.
    fn enter_wait_key(&mut self) {
        self.deadline = Instant::now() + self.config.protocol_timeout();
        self.interest = Interest::Read;
        self.phase = Phase::WaitKey;
    }

    fn advance(&mut self, sink: &mut dyn CommandSink) -> Result<Progress, HandshakeError> {
        match self.phase {
            Phase::SendKey => {
                self.engine.initialize(true)?;
                if self.engine.send_public_key()? {
                    self.enter_wait_key();
                } else {
                    self.phase = Phase::SendKeyPending;
                }
            }
            Phase::SendKeyPending => {
                if self.engine.send_public_key()? {
                    self.enter_wait_key();
                }
            }
            Phase::WaitKey => {
                if self.engine.receive_public_key()? {
                    self.engine.derive_cipher(self.download.info_hash())?;
                    if self.engine.send_initiator_step2()? {
                        self.phase = Phase::FindVcMarker;
                    } else {
                        self.interest = Interest::Write;
                        self.phase = Phase::SendStep2Pending;
                    }
                }
            }
            Phase::SendStep2Pending => {
                if self.engine.send_initiator_step2()? {
                    self.interest = Interest::Read;
                    self.phase = Phase::FindVcMarker;
                }
            }
            Phase::FindVcMarker => {
                if self.engine.find_vc_marker()? {
                    self.phase = Phase::RecvSelectAndPadLength;
                }
            }
            Phase::RecvSelectAndPadLength => {
                if self.engine.receive_crypto_select_and_pad_length()? {
                    self.phase = Phase::RecvPad;
                }
            }
            Phase::RecvPad => {
                if self.engine.receive_padding()? {
                    return self.finish(sink);
                }
            }
        }
        Ok(Progress::Continue)
    }

    fn finish(&mut self, sink: &mut dyn CommandSink) -> Result<Progress, HandshakeError> {
        let pool = self.pool.clone().ok_or(HandshakeError::NotAttached)?;
        let store = self.store.clone().ok_or(HandshakeError::NotAttached)?;

        let mut channel = PeerChannel::new(self.id, Arc::clone(&self.socket));
        let crypto = self.engine.negotiated_crypto();
        if crypto == CryptoMode::Rc4 {
            let encryptor = self
                .engine
                .take_encryptor()
                .ok_or(HandshakeError::MissingCipherState)?;
            let decryptor = self
                .engine
                .take_decryptor()
                .ok_or(HandshakeError::MissingCipherState)?;
            channel.enable_encryption(encryptor, decryptor);
        }

        self.metrics.handshake_success.inc();
        self.metrics
            .handshake_seconds
            .observe(self.started.elapsed().as_secs_f64());
        debug!(conn = %self.id, peer = %self.peer.addr(), %crypto, "handshake complete, handing off");

        let next = self.dispatch.next_stage(Negotiated {
            id: self.id,
            download: Arc::clone(&self.download),
            swarm: Arc::clone(&self.swarm),
            peer: Arc::clone(&self.peer),
            pool,
            store,
            channel,
            crypto,
        });
        sink.enqueue(next);
        Ok(Progress::Finished)
    }
}

impl<E: HandshakeEngine> Command for InitiatorHandshake<E> {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn interest(&self) -> Interest {
        self.interest
    }

    fn deadline(&self) -> Instant {
        self.deadline
    }

    fn ready(&self) -> bool {
        let probe = match self.interest {
            Interest::Read => self.socket.is_readable(),
            Interest::Write => self.socket.is_writable(),
        };
        // A failed readiness probe runs the step so the IO error surfaces.
        probe.unwrap_or(true)
    }

    fn should_abort(&self) -> bool {
        self.swarm.is_halted()
    }

    fn step(&mut self, sink: &mut dyn CommandSink) -> Result<Progress, CommandError> {
        self.advance(sink).map_err(CommandError::from)
    }

    fn prepare_fallback(&mut self, sink: &mut dyn CommandSink) -> bool {
        let (Some(pool), Some(store)) = (self.pool.clone(), self.store.clone()) else {
            return true;
        };

        if self.config.require_crypto {
            info!(
                conn = %self.id,
                peer = %self.peer.addr(),
                "establishing connection with the legacy handshake is disabled by configuration"
            );
            if pool.has_unused() && self.swarm.below_min_peers() {
                if let Some(replacement) = pool.acquire_unused() {
                    let id = sink.mint_id();
                    replacement.set_used_by(id);
                    self.metrics.fallback_encrypted_retry.inc();
                    let command = self.dispatch.connect(ConnectRequest {
                        id,
                        mode: ConnectMode::Encrypted,
                        download: Arc::clone(&self.download),
                        swarm: Arc::clone(&self.swarm),
                        peer: replacement,
                        pool,
                        store,
                    });
                    sink.enqueue(command);
                }
            }
            true
        } else {
            info!(conn = %self.id, peer = %self.peer.addr(), "retrying with the legacy handshake");
            self.metrics.fallback_legacy.inc();
            let command = self.dispatch.connect(ConnectRequest {
                id: self.id,
                mode: ConnectMode::Legacy,
                download: Arc::clone(&self.download),
                swarm: Arc::clone(&self.swarm),
                peer: Arc::clone(&self.peer),
                pool,
                store,
            });
            sink.enqueue(command);
            true
        }
    }

    fn on_abort(&mut self) {
        // With mandatory encryption the peer goes back to the pool for a
        // later attempt; otherwise the fallback path re-engages it directly.
        if self.config.require_crypto {
            if let Some(pool) = self.pool.as_ref() {
                debug!(conn = %self.id, peer = %self.peer.addr(), "returning peer to pool");
                pool.return_peer(&self.peer);
            }
        }
    }
}

impl<E: HandshakeEngine> Drop for InitiatorHandshake<E> {
    fn drop(&mut self) {
        self.download.release_command();
        self.swarm.release_connection();
        self.metrics.active_connections.dec();
    }
}
