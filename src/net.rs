#![cfg(feature = "net")]

// Numan Thabit 2026
// net.rs - non-blocking TCP socket with poll(2) readiness
use std::io;
use std::mem::MaybeUninit;
use std::net::SocketAddr;
use std::os::fd::AsFd;

use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use socket2::{Domain, Protocol, Socket as RawSocket, Type};

use crate::channel::Socket;

/// Non-blocking TCP connection to a remote peer.
#[derive(Debug)]
pub struct TcpSocket {
    inner: RawSocket,
    peer: SocketAddr,
}

impl TcpSocket {
    /// Starts a non-blocking connect. An in-progress connect is not an error;
    /// write readiness signals completion.
    pub fn connect(addr: SocketAddr) -> io::Result<Self> {
        let socket = RawSocket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_nonblocking(true)?;
        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => {}
            Err(err) if err.raw_os_error() == Some(nix::errno::Errno::EINPROGRESS as i32) => {}
            Err(err) => return Err(err),
        }
        Ok(Self {
            inner: socket,
            peer: addr,
        })
    }

    fn poll_ready(&self, flags: PollFlags) -> io::Result<bool> {
        let mut fds = [PollFd::new(self.inner.as_fd(), flags)];
        let ready = poll(&mut fds, PollTimeout::ZERO).map_err(io::Error::from)?;
        if ready == 0 {
            return Ok(false);
        }
        Ok(fds[0].revents().map_or(false, |revents| {
            revents.intersects(flags | PollFlags::POLLHUP | PollFlags::POLLERR)
        }))
    }
}

impl Socket for TcpSocket {
    fn send(&self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.send(buf) {
            Ok(sent) => Ok(sent),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        // socket2 reads into MaybeUninit storage; the caller's buffer is
        // already initialized, so the cast only forgets the initialization.
        let uninit = unsafe { &mut *(buf as *mut [u8] as *mut [MaybeUninit<u8>]) };
        match self.inner.recv(uninit) {
            Ok(0) => Err(io::ErrorKind::UnexpectedEof.into()),
            Ok(received) => Ok(received),
            Err(err)
                if err.kind() == io::ErrorKind::WouldBlock
                    || err.kind() == io::ErrorKind::Interrupted =>
            {
                Ok(0)
            }
            Err(err) => Err(err),
        }
    }

    fn is_readable(&self) -> io::Result<bool> {
        self.poll_ready(PollFlags::POLLIN)
    }

    fn is_writable(&self) -> io::Result<bool> {
        self.poll_ready(PollFlags::POLLOUT)
    }

    fn peer_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.peer)
    }
}
