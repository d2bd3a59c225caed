/*!
 * Trace Spans
 * Chrome-trace JSON objects appended to an append-only sink
 *
 * The stream opens with `[` and is never closed with `]`; Perfetto, Spall,
 * and chrome://tracing all tolerate the missing bracket, which keeps the
 * sink strictly append-only.
 */

use crate::events::Event;
use log::warn;
use std::fmt::Write as _;
use std::io::Write;

/// Upper bound on one formatted span object
pub const TRACE_SPAN_SIZE_MAX: usize = 1024;

/// Formats span objects into a bounded scratch buffer and appends them to
/// the sink. Oversize spans are dropped with a log; the stream stays valid.
pub(crate) struct SpanWriter {
    writer: Box<dyn Write>,
    buffer: String,
}

impl SpanWriter {
    pub fn new(mut writer: Box<dyn Write>) -> Self {
        if let Err(err) = writer.write_all(b"[\n") {
            warn!("trace sink write failed: {err}");
        }
        Self {
            writer,
            buffer: String::with_capacity(TRACE_SPAN_SIZE_MAX),
        }
    }

    /// Phase-"B" object carrying the event category, name, and args
    pub fn begin(&mut self, replica: u8, stack: u32, timestamp_us: u64, event: &Event) {
        let args = match serde_json::to_string(event) {
            Ok(args) => args,
            Err(err) => {
                warn!("span args serialization failed: {err}");
                return;
            }
        };
        self.buffer.clear();
        let _ = write!(
            self.buffer,
            r#"{{"pid":{replica},"tid":{stack},"cat":"{cat}","ph":"B","ts":{timestamp_us},"name":"{name}","args":{args}}}"#,
            cat = event.tag().name(),
            name = event,
        );
        self.append_span();
    }

    /// Phase-"E" object; end events are matched to their begin by `tid`
    pub fn end(&mut self, replica: u8, stack: u32, timestamp_us: u64) {
        self.buffer.clear();
        let _ = write!(
            self.buffer,
            r#"{{"pid":{replica},"tid":{stack},"ph":"E","ts":{timestamp_us}}}"#,
        );
        self.append_span();
    }

    fn append_span(&mut self) {
        if self.buffer.len() > TRACE_SPAN_SIZE_MAX {
            warn!(
                "span dropped: {} bytes exceeds {} byte buffer",
                self.buffer.len(),
                TRACE_SPAN_SIZE_MAX
            );
            return;
        }
        let result = self
            .writer
            .write_all(self.buffer.as_bytes())
            .and_then(|()| self.writer.write_all(b",\n"));
        if let Err(err) = result {
            warn!("trace sink write failed: {err}");
        }
    }

    pub fn flush(&mut self) {
        let _ = self.writer.flush();
    }
}
