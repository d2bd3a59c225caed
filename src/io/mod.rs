/*!
 * I/O Layer Seam
 * Clock, completion pool, and datagram transport consumed by the emitter
 *
 * The tracer runs single-threaded and cooperative: the transport invokes the
 * send callback on the same logical thread, either inline (UDP, log mode) or
 * later from the host's poll loop (test harnesses). The completion pool is
 * the sole source of backpressure.
 */

mod clock;
mod completion;
mod transport;

pub use clock::{Clock, MonotonicClock};
pub use completion::{Completion, CompletionPool};
pub use transport::{LogTransport, SendSink, Transport, UdpTransport};
