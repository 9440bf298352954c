use thiserror::Error;

// ============================================================================
// Frame Decoder
// ============================================================================

const DATA_PREFIX: &str = "data: ";
const DONE_TOKEN: &str = "[DONE]";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("stream contained a line that is not valid UTF-8")]
    InvalidUtf8,
}

/// Incremental decoder for the relay's newline-delimited frame stream.
///
/// Raw bytes are buffered until a complete line (terminated by `\n`) is
/// available, then each line is classified: keep-alive comments (leading
/// `:`) and blank lines are dropped, `data: [DONE]` terminates the stream,
/// and any other `data: ` payload is parsed as JSON to extract the
/// `choices[0].delta.content` fragment.
///
/// Buffering whole bytes until the newline also keeps multi-byte UTF-8
/// sequences intact across read boundaries: a `\n` byte cannot occur inside
/// a multi-byte sequence, so a complete line is always decodable on its own.
///
/// A complete line whose payload is not valid JSON is pushed back onto the
/// front of the buffer (with its line feed restored) and the extraction
/// pass stops until more bytes arrive. This mirrors the upstream contract
/// that frames are well-formed JSON; a frame that never becomes valid will
/// hold up the stream rather than be dropped.
pub struct FrameDecoder {
    buf: Vec<u8>,
    done: bool,
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::new(),
            done: false,
        }
    }

    /// True once the `[DONE]` sentinel has been observed. Terminal: all
    /// further input is ignored.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed newly received bytes, returning every content delta completed
    /// by this chunk, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<String>, DecodeError> {
        if self.done {
            return Ok(Vec::new());
        }

        self.buf.extend_from_slice(chunk);

        let mut deltas = Vec::new();

        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let rest = self.buf.split_off(newline + 1);
            let mut line = std::mem::replace(&mut self.buf, rest);
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }

            let line = String::from_utf8(line).map_err(|_| DecodeError::InvalidUtf8)?;

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
                continue;
            };
            let payload = payload.trim();

            if payload == DONE_TOKEN {
                self.done = true;
                self.buf.clear();
                break;
            }

            match serde_json::from_str::<serde_json::Value>(payload) {
                Ok(value) => {
                    if let Some(content) = value
                        .pointer("/choices/0/delta/content")
                        .and_then(|v| v.as_str())
                    {
                        if !content.is_empty() {
                            deltas.push(content.to_string());
                        }
                    }
                }
                Err(_) => {
                    // Frame split at a line boundary inside a JSON value:
                    // restore the line and wait for more bytes.
                    let mut restored = line.into_bytes();
                    restored.push(b'\n');
                    restored.extend_from_slice(&self.buf);
                    self.buf = restored;
                    break;
                }
            }
        }

        Ok(deltas)
    }
}

// ============================================================================
// Tests
// ============================================================================
