//! Server-Sent Events framing shared by the run pump and the tail.

use relay_core::Event;

/// Comment frame sent on idle tails; ignored by `EventSource` clients.
pub const HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

/// Splits a byte stream into `\n`-terminated lines.
///
/// Bytes after the last newline stay buffered until more data arrives. A
/// line is only decoded once complete, so multi-byte characters split across
/// chunks survive.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk and take every line it completes, newline included.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split_inclusive(|b| *b == b'\n')
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect()
    }

    /// Bytes of an unfinished line still waiting for its newline.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// The JSON payload of an SSE `data:` line, if `line` is one.
pub fn data_payload(line: &str) -> Option<&str> {
    let payload = line.trim().strip_prefix("data:")?;
    Some(payload.trim_start())
}

/// Frame one event for the tail.
pub fn data_frame(event: &Event) -> serde_json::Result<String> {
    Ok(format!("data: {}\n\n", event.to_json()?))
}
