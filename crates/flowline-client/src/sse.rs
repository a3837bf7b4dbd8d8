use serde_json::Value;
use tracing::debug;

const DATA_PREFIX: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

/// Incremental decoder for the runner's line-delimited event stream.
///
/// Wire format: each frame is a line `data: <json>`; a literal
/// `data: [DONE]` terminates the stream; every other line (blank
/// keepalives, comments) is ignored. Payloads that fail to parse as JSON
/// are skipped rather than surfaced — keepalive lines may start with the
/// data prefix, so lenience here is the protocol contract.
///
/// Bytes are buffered and only complete lines are interpreted, so a frame
/// (or a multi-byte UTF-8 character) split across chunk boundaries is
/// reassembled before parsing. A trailing partial line at end-of-stream is
/// incomplete and never becomes a frame.
#[derive(Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    finished: bool,
    skipped: u64,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Count of lines dropped as uninterpretable: data-prefixed payloads
    /// that were not JSON, plus lines that were not valid UTF-8.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Feed a chunk of bytes and extract every frame it completes.
    ///
    /// Chunk boundaries are arbitrary: one chunk may complete several
    /// frames or none. After the sentinel, all further input is ignored.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Value> {
        let mut frames = Vec::new();
        if self.finished {
            return frames;
        }
        self.buffer.extend_from_slice(chunk);

        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let Ok(text) = std::str::from_utf8(&line[..pos]) else {
                // Not valid UTF-8 — treat like any other unparseable line
                self.skipped += 1;
                continue;
            };
            let text = text.trim_end_matches('\r');

            let Some(payload) = text.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_SENTINEL {
                self.finished = true;
                self.buffer.clear();
                break;
            }

            match serde_json::from_str::<Value>(payload) {
                Ok(value) => frames.push(value),
                Err(e) => {
                    debug!(payload, error = %e, "skipping non-JSON frame payload");
                    self.skipped += 1;
                }
            }
        }

        frames
    }
}
