//! Newline framing and decoding of the `x,y,speed,orientation` telemetry
//! stream. Independent of how bytes are read off the socket.

use serde::{Deserialize, Serialize};

use crate::config::FRAME_SAFETY_MARGIN;
use crate::types::TelemetryRecord;

/// Accumulates bytes until a newline arrives or the buffer is full.
pub struct LineFramer {
    buf: Vec<u8>,
    limit: usize,
}

impl LineFramer {
    /// `capacity` must exceed the safety margin; the buffer never holds more
    /// than `capacity - 2` bytes.
    pub fn new(capacity: usize) -> Self {
        let limit = capacity.saturating_sub(FRAME_SAFETY_MARGIN).max(1);
        LineFramer {
            buf: Vec::with_capacity(limit),
            limit,
        }
    }

    /// Feed one byte. Returns the candidate line when `byte` completes one.
    ///
    /// The byte that completes a line (the newline, or the byte arriving on a
    /// full buffer) is not part of the line.
    pub fn push(&mut self, byte: u8) -> Option<Vec<u8>> {
        if byte == b'\n' || self.buf.len() >= self.limit {
            let line = std::mem::replace(&mut self.buf, Vec::with_capacity(self.limit));
            return Some(line);
        }
        self.buf.push(byte);
        None
    }

    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }
}

/// Decode `x,y,speed,orientation`. Anything else yields `None`.
pub fn parse_record(line: &[u8]) -> Option<TelemetryRecord> {
    let text = std::str::from_utf8(line).ok()?;
    let mut fields = text.split(',');

    let mut next = || -> Option<f64> {
        let value: f64 = fields.next()?.trim().parse().ok()?;
        value.is_finite().then_some(value)
    };
    let x = next()?;
    let y = next()?;
    let speed = next()?;
    let orientation = next()?;

    if fields.next().is_some() {
        return None;
    }

    Some(TelemetryRecord {
        x,
        y,
        speed,
        orientation,
    })
}

/// Counters for one telemetry connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameStats {
    pub records: u64,
    pub dropped_lines: u64,
}

/// Framer plus decoder. Malformed lines are dropped and counted.
pub struct TelemetryParser {
    framer: LineFramer,
    stats: FrameStats,
}

impl TelemetryParser {
    pub fn new(capacity: usize) -> Self {
        TelemetryParser {
            framer: LineFramer::new(capacity),
            stats: FrameStats::default(),
        }
    }

    pub fn push_byte(&mut self, byte: u8) -> Option<TelemetryRecord> {
        let line = self.framer.push(byte)?;
        match parse_record(&line) {
            Some(record) => {
                self.stats.records += 1;
                Some(record)
            }
            None => {
                self.stats.dropped_lines += 1;
                log::debug!(
                    "Dropping malformed telemetry line: {:?}",
                    String::from_utf8_lossy(&line)
                );
                None
            }
        }
    }

    /// Feed a chunk of any size, handing each decoded record to `emit` in
    /// stream order.
    pub fn feed(&mut self, bytes: &[u8], mut emit: impl FnMut(TelemetryRecord)) {
        for &byte in bytes {
            if let Some(record) = self.push_byte(byte) {
                emit(record);
            }
        }
    }

    pub fn buffered_len(&self) -> usize {
        self.framer.buffered_len()
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }
}
