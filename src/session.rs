use bytes::{Buf, BytesMut};
use std::mem;

use crate::codec::{Decoder, Limits, ProtocolError};
use crate::command::Command;

/// Per-connection decoding state.
///
/// Bytes are fed in as the transport delivers them. Complete commands are queued until the buffer
/// holds no partial frame, at which point the whole queue is released as one batch so that its
/// replies can be flushed in a single write, in request order.
#[derive(Debug)]
pub struct Session {
    // Bytes received but not yet resolved. The decoder keeps the header and the elements of an
    // unfinished command, so this only ever holds the start of one element.
    accumulator: BytesMut,
    decoder: Decoder,
    pending: Vec<Command>,
}

impl Session {
    pub fn new(limits: Limits, capacity: usize) -> Session {
        Session {
            accumulator: BytesMut::with_capacity(capacity),
            decoder: Decoder::new(limits),
            pending: Vec::new(),
        }
    }

    /// Feeds newly received bytes. Returns the batch of commands to dispatch once no command is
    /// mid-flight, or `None` while waiting for more bytes.
    ///
    /// A [`ProtocolError`] leaves the session in an undefined state, the connection should be
    /// closed.
    pub fn feed(&mut self, data: &[u8]) -> Result<Option<Vec<Command>>, ProtocolError> {
        if self.accumulator.is_empty() {
            // Nothing buffered: decode straight from the read view and only keep the tail.
            let (commands, rest) = self.decoder.decode(data)?;
            self.pending.extend(commands);
            self.accumulator.extend_from_slice(rest);
        } else {
            self.accumulator.extend_from_slice(data);
            let (commands, rest) = self.decoder.decode(&self.accumulator)?;
            let consumed = self.accumulator.len() - rest.len();
            self.pending.extend(commands);
            self.accumulator.advance(consumed);
        }

        if !self.has_partial_frame() && !self.pending.is_empty() {
            return Ok(Some(mem::take(&mut self.pending)));
        }

        Ok(None)
    }

    /// True while a command is only partially received.
    pub fn has_partial_frame(&self) -> bool {
        !self.accumulator.is_empty() || self.decoder.is_partial()
    }

    /// Commands decoded but held back until the partial frame behind them completes.
    pub fn pending(&self) -> &[Command] {
        &self.pending
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new(Limits::default(), 4096)
    }
}
