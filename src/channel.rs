// Numan Thabit 2026
// channel.rs - socket abstraction and the post-handshake connection wrapper

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};

use crate::engine::StreamCipher;
use crate::sched::ConnectionId;

const READ_CHUNK: usize = 16 * 1024;

/// Non-blocking byte stream to a remote peer.
///
/// `send` and `recv` return `Ok(0)` when the operation would block; a closed
/// connection surfaces as an error, never as a silent zero-length read.
/// Readiness queries must not block.
pub trait Socket: fmt::Debug + Send + Sync {
    fn send(&self, buf: &[u8]) -> io::Result<usize>;

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize>;

    fn is_readable(&self) -> io::Result<bool>;

    fn is_writable(&self) -> io::Result<bool>;

    fn peer_addr(&self) -> io::Result<SocketAddr>;
}

/// Buffered transport over the raw socket, built once negotiation succeeds.
///
/// With encryption enabled, queued output is encrypted before it reaches the
/// outbound buffer and received input is decrypted before it is surfaced, so
/// later stages never see cipher text.
pub struct PeerChannel {
    id: ConnectionId,
    socket: Arc<dyn Socket>,
    outbound: BytesMut,
    inbound: BytesMut,
    encryptor: Option<Box<dyn StreamCipher>>,
    decryptor: Option<Box<dyn StreamCipher>>,
}

impl fmt::Debug for PeerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerChannel")
            .field("id", &self.id)
            .field("encrypted", &self.is_encrypted())
            .field("pending_out", &self.outbound.len())
            .field("received", &self.inbound.len())
            .finish()
    }
}

impl PeerChannel {
    pub fn new(id: ConnectionId, socket: Arc<dyn Socket>) -> Self {
        Self {
            id,
            socket,
            outbound: BytesMut::new(),
            inbound: BytesMut::new(),
            encryptor: None,
            decryptor: None,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn socket(&self) -> &Arc<dyn Socket> {
        &self.socket
    }

    /// Installs the negotiated stream-cipher states for both directions.
    pub fn enable_encryption(
        &mut self,
        encryptor: Box<dyn StreamCipher>,
        decryptor: Box<dyn StreamCipher>,
    ) {
        self.encryptor = Some(encryptor);
        self.decryptor = Some(decryptor);
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryptor.is_some()
    }

    /// Queues bytes for transmission, encrypting when enabled. Actual
    /// transmission happens during [`PeerChannel::flush`].
    pub fn queue(&mut self, data: &[u8]) {
        match self.encryptor.as_mut() {
            Some(cipher) => {
                let mut scratch = data.to_vec();
                cipher.apply(&mut scratch);
                self.outbound.extend_from_slice(&scratch);
            }
            None => self.outbound.extend_from_slice(data),
        }
    }

    /// Pushes queued bytes to the socket. Returns true once the outbound
    /// buffer is drained; a partial write keeps the remainder for the next
    /// write-ready pass.
    pub fn flush(&mut self) -> io::Result<bool> {
        while !self.outbound.is_empty() {
            let sent = self.socket.send(&self.outbound)?;
            if sent == 0 {
                return Ok(false);
            }
            self.outbound.advance(sent);
        }
        Ok(true)
    }

    pub fn pending_out(&self) -> usize {
        self.outbound.len()
    }

    /// Reads whatever the socket has available, decrypting when enabled.
    /// Returns the number of bytes appended to the receive buffer.
    pub fn fill(&mut self) -> io::Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let mut total = 0;
        loop {
            let received = self.socket.recv(&mut chunk)?;
            if received == 0 {
                break;
            }
            let slice = &mut chunk[..received];
            if let Some(cipher) = self.decryptor.as_mut() {
                cipher.apply(slice);
            }
            self.inbound.extend_from_slice(slice);
            total += received;
            if received < chunk.len() {
                break;
            }
        }
        Ok(total)
    }

    pub fn received(&self) -> &[u8] {
        &self.inbound
    }

    /// Takes everything received so far out of the buffer.
    pub fn take_received(&mut self) -> Bytes {
        self.inbound.split().freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct LoopSocket {
        state: Mutex<LoopState>,
    }

    #[derive(Debug, Default)]
    struct LoopState {
        written: Vec<u8>,
        inbound: VecDeque<u8>,
        // Per-send byte limits; 0 forces a would-block stall. Empty = accept all.
        accepts: VecDeque<usize>,
    }

    impl LoopSocket {
        fn with_accepts<I: IntoIterator<Item = usize>>(accepts: I) -> Self {
            let socket = Self::default();
            socket.state.lock().expect("state").accepts.extend(accepts);
            socket
        }

        fn push_inbound(&self, data: &[u8]) {
            self.state.lock().expect("state").inbound.extend(data);
        }

        fn written(&self) -> Vec<u8> {
            self.state.lock().expect("state").written.clone()
        }
    }

    impl Socket for LoopSocket {
        fn send(&self, buf: &[u8]) -> io::Result<usize> {
            let mut state = self.state.lock().expect("state");
            let take = state.accepts.pop_front().unwrap_or(buf.len()).min(buf.len());
            state.written.extend_from_slice(&buf[..take]);
            Ok(take)
        }

        fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
            let mut state = self.state.lock().expect("state");
            let mut count = 0;
            while count < buf.len() {
                match state.inbound.pop_front() {
                    Some(byte) => {
                        buf[count] = byte;
                        count += 1;
                    }
                    None => break,
                }
            }
            Ok(count)
        }

        fn is_readable(&self) -> io::Result<bool> {
            Ok(!self.state.lock().expect("state").inbound.is_empty())
        }

        fn is_writable(&self) -> io::Result<bool> {
            Ok(true)
        }

        fn peer_addr(&self) -> io::Result<SocketAddr> {
            Ok("127.0.0.1:6881".parse().expect("addr"))
        }
    }

    struct XorCipher(u8);

    impl StreamCipher for XorCipher {
        fn apply(&mut self, data: &mut [u8]) {
            for byte in data.iter_mut() {
                *byte ^= self.0;
            }
        }
    }

    fn xored(data: &[u8], key: u8) -> Vec<u8> {
        data.iter().map(|byte| byte ^ key).collect()
    }

    #[test]
    fn plain_queue_and_flush_round_trip() {
        let socket = Arc::new(LoopSocket::default());
        let mut channel = PeerChannel::new(ConnectionId(1), Arc::clone(&socket) as Arc<dyn Socket>);
        channel.queue(b"interested");
        assert!(channel.flush().expect("flush"));
        assert_eq!(socket.written(), b"interested");
        assert!(!channel.is_encrypted());
    }

    #[test]
    fn partial_flush_resumes_byte_exact() {
        let socket = Arc::new(LoopSocket::with_accepts([4, 0, 3, 0]));
        let mut channel = PeerChannel::new(ConnectionId(2), Arc::clone(&socket) as Arc<dyn Socket>);
        channel.queue(b"0123456789");

        assert!(!channel.flush().expect("flush"));
        assert_eq!(channel.pending_out(), 6);
        assert!(!channel.flush().expect("flush"));
        assert!(channel.flush().expect("flush"));

        assert_eq!(socket.written(), b"0123456789");
        assert_eq!(channel.pending_out(), 0);
    }

    #[test]
    fn encryption_applies_to_both_directions() {
        let socket = Arc::new(LoopSocket::default());
        let mut channel = PeerChannel::new(ConnectionId(3), Arc::clone(&socket) as Arc<dyn Socket>);
        channel.enable_encryption(Box::new(XorCipher(0x5a)), Box::new(XorCipher(0x5a)));
        assert!(channel.is_encrypted());

        channel.queue(b"piece");
        assert!(channel.flush().expect("flush"));
        assert_eq!(socket.written(), xored(b"piece", 0x5a));

        socket.push_inbound(&xored(b"have", 0x5a));
        assert_eq!(channel.fill().expect("fill"), 4);
        assert_eq!(&channel.take_received()[..], b"have");
    }
}
