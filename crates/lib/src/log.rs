//! Build log capture.
//!
//! Every byte a build produces (engine passes, bibliography tool, and the
//! markers quire writes between them) flows through a [`LogSink`]. The
//! [`LogBuffer`] is the bounded aggregator shared by all passes of one job.

/// Destination for build output.
///
/// Sinks receive raw subprocess bytes exactly as they are read from the
/// pipes, interleaved with quire's own notes.
pub trait LogSink: Send {
  /// Accepts one chunk of output.
  fn push(&mut self, chunk: &[u8]);

  /// Writes a line of quire's own commentary into the log.
  fn note(&mut self, line: &str) {
    self.push(format!("\n[quire] {}\n", line).as_bytes());
  }
}

/// Append-only byte buffer with a hard cap.
///
/// Once the cap is reached further input is dropped silently. The chunk that
/// crosses the cap is cut at the exact byte boundary.
#[derive(Debug, Clone)]
pub struct LogBuffer {
  bytes: Vec<u8>,
  cap: usize,
}

impl LogBuffer {
  pub fn new(cap: usize) -> Self {
    Self {
      bytes: Vec::with_capacity(cap.min(64 * 1024)),
      cap,
    }
  }

  /// Appends as much of `chunk` as fits and returns the number of bytes kept.
  pub fn append(&mut self, chunk: &[u8]) -> usize {
    let room = self.cap.saturating_sub(self.bytes.len());
    let accepted = chunk.len().min(room);
    self.bytes.extend_from_slice(&chunk[..accepted]);
    accepted
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  /// Current contents decoded as UTF-8, replacing invalid sequences.
  pub fn snapshot(&self) -> String {
    String::from_utf8_lossy(&self.bytes).into_owned()
  }

  pub fn into_string(self) -> String {
    match String::from_utf8(self.bytes) {
      Ok(s) => s,
      Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
  }
}

impl LogSink for LogBuffer {
  fn push(&mut self, chunk: &[u8]) {
    self.append(chunk);
  }
}
