//! Incremental UTF-8 assembly of a streamed response body.
//!
//! The response body is plain text with no framing, split at whatever
//! boundaries the transport chose. A boundary may fall inside a multi-byte
//! character, so the decoder keeps the incomplete tail of each chunk and
//! prepends it to the next one instead of decoding chunks independently.

use futures_util::{Stream, StreamExt};

/// Failures while reconstructing a streamed message.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    /// The connection failed before end-of-stream. The partial text is discarded.
    #[error("transport failed after {bytes_received} bytes: {reason}")]
    Transport {
        /// Bytes received before the failure.
        bytes_received: usize,
        /// Underlying transport error.
        reason: String,
    },

    /// The body is not valid UTF-8, or ended inside a multi-byte character.
    #[error("malformed UTF-8 in response body at byte {offset}")]
    InvalidUtf8 {
        /// Byte offset in the whole body where decoding failed.
        offset: usize,
    },
}

/// Accumulates a growing text buffer from ordered byte chunks.
#[derive(Debug, Default)]
pub struct StreamDecoder {
    text: String,
    pending: Vec<u8>,
    bytes_received: usize,
}

impl StreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk and return the text it completed.
    ///
    /// The returned fragment may be empty when the chunk only contained part
    /// of a character.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] when the bytes cannot be UTF-8.
    pub fn push(&mut self, chunk: &[u8]) -> Result<&str, DecodeError> {
        let start = self.text.len();
        // Offset of `pending[0]` in the whole body.
        let base = self.bytes_received - self.pending.len();
        self.bytes_received += chunk.len();

        let joined;
        let bytes: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        match std::str::from_utf8(bytes) {
            Ok(s) => self.text.push_str(s),
            Err(e) => {
                let valid = e.valid_up_to();
                // `valid` bytes were just validated by `from_utf8`.
                if let Ok(prefix) = std::str::from_utf8(&bytes[..valid]) {
                    self.text.push_str(prefix);
                }
                if e.error_len().is_some() {
                    return Err(DecodeError::InvalidUtf8 {
                        offset: base + valid,
                    });
                }
                self.pending = bytes[valid..].to_vec();
            }
        }

        Ok(&self.text[start..])
    }

    /// Text decoded so far.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Total bytes fed so far, including any incomplete tail.
    pub fn bytes_received(&self) -> usize {
        self.bytes_received
    }

    /// Complete decoding at end-of-stream.
    ///
    /// Zero bytes received yields an empty string.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidUtf8`] if the body ended mid-character.
    pub fn finish(self) -> Result<String, DecodeError> {
        if !self.pending.is_empty() {
            return Err(DecodeError::InvalidUtf8 {
                offset: self.bytes_received - self.pending.len(),
            });
        }
        Ok(self.text)
    }

    /// Abandon decoding after a transport failure, dropping the partial text.
    pub fn fail(self, reason: impl std::fmt::Display) -> DecodeError {
        DecodeError::Transport {
            bytes_received: self.bytes_received,
            reason: reason.to_string(),
        }
    }
}

/// Consume a byte stream until it ends and return the full text.
///
/// # Errors
///
/// Returns [`DecodeError::Transport`] if the stream yields an error, or
/// [`DecodeError::InvalidUtf8`] for a malformed body.
pub async fn decode_stream<S, B, E>(stream: S) -> Result<String, DecodeError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    decode_stream_with(stream, |_| {}).await
}

/// Like [`decode_stream`], calling `on_text` with each newly decoded fragment.
///
/// # Errors
///
/// Same as [`decode_stream`].
pub async fn decode_stream_with<S, B, E, F>(stream: S, mut on_text: F) -> Result<String, DecodeError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
    F: FnMut(&str),
{
    let mut decoder = StreamDecoder::new();
    let mut stream = std::pin::pin!(stream);

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                let fragment = decoder.push(chunk.as_ref())?;
                if !fragment.is_empty() {
                    on_text(fragment);
                }
            }
            Err(e) => return Err(decoder.fail(e)),
        }
    }

    decoder.finish()
}
