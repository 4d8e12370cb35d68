// Numan Thabit 2026
// engine.rs - MSE handshake engine contract

use std::fmt;
use std::io;

use thiserror::Error;

use crate::swarm::InfoHash;

/// Errors surfaced by a handshake engine implementation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Cipher mode selected by the remote in its crypto_select field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoMode {
    /// Obfuscated key exchange only; payload stays in the clear.
    Plain,
    /// RC4-class stream cipher over the whole connection.
    Rc4,
}

impl CryptoMode {
    /// Wire bit for this mode in the crypto_provide/crypto_select fields.
    pub const fn select_bit(self) -> u32 {
        match self {
            CryptoMode::Plain => 0x01,
            CryptoMode::Rc4 => 0x02,
        }
    }
}

impl fmt::Display for CryptoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CryptoMode::Plain => f.write_str("plain"),
            CryptoMode::Rc4 => f.write_str("rc4"),
        }
    }
}

/// Symmetric stream cipher state handed off to the connection wrapper.
///
/// Encrypt and decrypt directions are independent instances; each one is
/// applied in place over the bytes moving in its direction.
pub trait StreamCipher: Send {
    fn apply(&mut self, data: &mut [u8]);
}

/// One side of the MSE key exchange, owned exclusively by the state machine
/// driving a single connection attempt.
///
/// The engine owns the socket buffering and byte-level framing; every send and
/// receive operation is non-blocking and resumes from its prior offset, so a
/// `false` return always means "call again when the socket is ready", never
/// data loss. Failures are terminal for the connection attempt.
pub trait HandshakeEngine: Send {
    /// Sets up local key material for the given role.
    fn initialize(&mut self, initiator: bool) -> Result<(), EngineError>;

    /// Sends the local public key. Returns true once fully flushed.
    fn send_public_key(&mut self) -> Result<bool, EngineError>;

    /// Receives the remote public key. Returns true once fully received.
    fn receive_public_key(&mut self) -> Result<bool, EngineError>;

    /// Derives the shared cipher, keyed by the swarm's content identifier.
    fn derive_cipher(&mut self, info_hash: &InfoHash) -> Result<(), EngineError>;

    /// Sends the initiator step 2 payload. Returns true once fully flushed.
    fn send_initiator_step2(&mut self) -> Result<bool, EngineError>;

    /// Scans inbound bytes for the verification-constant marker that begins
    /// the remote's response. Returns true once located.
    fn find_vc_marker(&mut self) -> Result<bool, EngineError>;

    /// Receives and parses the remote crypto_select field and the length of
    /// its trailing padding. Returns true once parsed.
    fn receive_crypto_select_and_pad_length(&mut self) -> Result<bool, EngineError>;

    /// Consumes exactly the announced padding. Returns true once consumed.
    fn receive_padding(&mut self) -> Result<bool, EngineError>;

    /// The cipher mode the remote selected. Meaningful only after
    /// [`HandshakeEngine::receive_crypto_select_and_pad_length`] returned true.
    fn negotiated_crypto(&self) -> CryptoMode;

    /// Takes the derived send-direction cipher state. Present only when the
    /// negotiated mode is [`CryptoMode::Rc4`]; each state can be taken once.
    fn take_encryptor(&mut self) -> Option<Box<dyn StreamCipher>>;

    /// Takes the derived receive-direction cipher state.
    fn take_decryptor(&mut self) -> Option<Box<dyn StreamCipher>>;
}
