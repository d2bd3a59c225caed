/*!
 * Datagram Transport
 * Fire-and-forget sends over a connected UDP socket, or to the logger
 */

use super::Completion;
use log::{debug, trace};
use std::cell::Cell;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::rc::Rc;

/// Receives send results. Failures are counted, never retried; the emitter
/// logs and resets the counter at the start of its next emission.
#[derive(Clone)]
pub struct SendSink {
    errors: Rc<Cell<u64>>,
}

impl SendSink {
    pub fn new() -> Self {
        Self {
            errors: Rc::new(Cell::new(0)),
        }
    }

    /// Send callback: record the result and release the completion
    pub fn complete(&self, completion: Completion, result: io::Result<()>) {
        if let Err(err) = result {
            self.errors.set(self.errors.get() + 1);
            debug!("send failed: {}", err);
        }
        drop(completion);
    }

    /// Accumulated failures since the last reset
    pub fn errors(&self) -> u64 {
        self.errors.get()
    }

    /// Read and reset the failure counter
    pub(crate) fn take_errors(&self) -> u64 {
        self.errors.replace(0)
    }
}

impl Default for SendSink {
    fn default() -> Self {
        Self::new()
    }
}

/// Datagram transport consumed by the emitter
///
/// Implementations must invoke `sink.complete` exactly once per send, either
/// inline or later from the host's poll loop. Until then the completion
/// counts against the pool and blocks the next emission.
pub trait Transport {
    fn send(&mut self, datagram: &[u8], completion: Completion, sink: &SendSink);
}

/// Connected non-blocking UDP socket, owned by the tracer
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    pub fn connect(address: SocketAddr) -> io::Result<Self> {
        let bind: SocketAddr = match address {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(bind)?;
        socket.connect(address)?;
        socket.set_nonblocking(true)?;
        Ok(Self { socket })
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8], completion: Completion, sink: &SendSink) {
        // Non-blocking send: a full kernel buffer surfaces as WouldBlock and
        // is counted like any other failure. The datagram is dropped.
        let result = self.socket.send(datagram).map(drop);
        sink.complete(completion, result);
    }
}

/// Writes datagram payloads to the logger; used by deterministic tests
pub struct LogTransport;

impl Transport for LogTransport {
    fn send(&mut self, datagram: &[u8], completion: Completion, sink: &SendSink) {
        trace!("statsd: {}", String::from_utf8_lossy(datagram));
        sink.complete(completion, Ok(()));
    }
}
