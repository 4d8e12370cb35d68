// btmse public library surface.
// Numan Thabit 2026

pub mod config;

pub mod engine;

pub mod swarm;

pub mod peer;

pub mod store;

pub mod channel;

pub mod sched;

pub mod handshake;

pub mod metrics;

#[cfg(feature = "net")]
pub mod net;

#[cfg(feature = "driver")]
pub mod driver;

pub use config::{Config, ConfigError, HandshakeConfig};

pub use engine::{CryptoMode, EngineError, HandshakeEngine, StreamCipher};

pub use swarm::{Download, InfoHash, SwarmRuntime};

pub use peer::{Peer, PeerId, PeerPool};

pub use store::PieceStore;

pub use channel::{PeerChannel, Socket};

pub use sched::{
    Command, CommandError, CommandSink, ConnectionId, Interest, PollOutcome, Progress, Scheduler,
};

pub use handshake::{
    ConnectMode, ConnectRequest, Dispatch, HandshakeError, InitiatorHandshake, Negotiated, Phase,
};

pub use metrics::{Metrics, MetricsError};

#[cfg(feature = "net")]
pub use net::TcpSocket;

#[cfg(feature = "driver")]
pub use driver::{spawn_scheduler, DriverConfig, DriverError, DriverEvent, DriverHandle};
