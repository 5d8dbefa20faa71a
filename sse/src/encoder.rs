//! Serializes events into the `text/event-stream` wire format.
//!
//! A publication becomes a record of `id:`, `event:` and `data:` lines closed
//! by a blank line. A comment becomes a single `:`-prefixed line with no blank
//! line after it, so a client never mistakes a heartbeat for a record boundary.

use events::Event;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{self, Write};

/// Writes the wire representation of `event` through a string sink.
pub fn format_event<F: fmt::Write>(out: &mut F, event: &Event) -> fmt::Result {
    match event {
        Event::Publication(publication) => {
            if !publication.id.is_empty() {
                out.write_str("id: ")?;
                out.write_str(&publication.id)?;
                out.write_char('\n')?;
            }
            if !publication.event.is_empty() {
                out.write_str("event: ")?;
                out.write_str(&publication.event)?;
                out.write_char('\n')?;
            }
            // A trailing newline yields an explicit empty segment, and empty
            // data still yields exactly one `data:` line.
            for segment in publication.data.split('\n') {
                out.write_str("data: ")?;
                out.write_str(segment)?;
                out.write_char('\n')?;
            }
            out.write_char('\n')
        }
        Event::Comment(comment) => {
            out.write_char(':')?;
            out.write_str(&comment.value)?;
            out.write_char('\n')
        }
    }
}

enum Sink<W: Write> {
    Plain(W),
    Gzip(GzEncoder<W>),
}

/// Streams encoded events into a byte sink, optionally gzip compressed.
///
/// Every call to [`Encoder::encode`] flushes, so each event leaves the
/// process (and is decodable on the other end) as soon as it is written.
pub struct Encoder<W: Write> {
    sink: Sink<W>,
    scratch: String,
}

impl<W: Write> Encoder<W> {
    pub fn new(writer: W, gzip: bool) -> Self {
        let sink = if gzip {
            Sink::Gzip(GzEncoder::new(writer, Compression::default()))
        } else {
            Sink::Plain(writer)
        };
        Self {
            sink,
            scratch: String::new(),
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self.sink, Sink::Gzip(_))
    }

    /// Encodes one event and flushes it to the underlying writer.
    ///
    /// Failures are returned as-is and never retried; the caller decides
    /// what happens to the subscriber.
    pub fn encode(&mut self, event: &Event) -> io::Result<()> {
        self.scratch.clear();
        format_event(&mut self.scratch, event)
            .map_err(|_| io::Error::other("failed to format event"))?;

        match &mut self.sink {
            Sink::Plain(writer) => {
                writer.write_all(self.scratch.as_bytes())?;
                writer.flush()
            }
            Sink::Gzip(writer) => {
                writer.write_all(self.scratch.as_bytes())?;
                // Sync flush of the deflate stream, then of the writer beneath.
                writer.flush()
            }
        }
    }

    pub fn get_ref(&self) -> &W {
        match &self.sink {
            Sink::Plain(writer) => writer,
            Sink::Gzip(writer) => writer.get_ref(),
        }
    }

    /// Mutable access to the underlying writer. Only append-safe operations
    /// (such as draining an in-memory buffer) keep a compressed stream valid.
    pub fn get_mut(&mut self) -> &mut W {
        match &mut self.sink {
            Sink::Plain(writer) => writer,
            Sink::Gzip(writer) => writer.get_mut(),
        }
    }

    /// Ends the stream, writing the gzip trailer when compressing.
    pub fn finish(self) -> io::Result<W> {
        match self.sink {
            Sink::Plain(writer) => Ok(writer),
            Sink::Gzip(writer) => writer.finish(),
        }
    }
}
