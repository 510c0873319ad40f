use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only the `data` field is surfaced. Comments and the `event`, `id` and
/// `retry` fields are skipped, and events without data are dropped.
pub struct Sse {
    buf: String,
    // Bytes of an incomplete UTF-8 sequence split across chunks.
    pending: Vec<u8>,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: String::new(),
            pending: Vec::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::Chunks)?
            else {
                if !self.pending.is_empty() {
                    return Err(Error::InvalidPayload);
                }
                // No LF can follow a final CR anymore.
                if self.buf.ends_with('\r') {
                    self.buf.pop();
                    self.buf.push('\n');
                    return self.try_parse_event();
                }
                // Trailing data without a blank line is not an event.
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending.extend_from_slice(bytes);
        let valid_len = match str::from_utf8(&self.pending) {
            Ok(_) => self.pending.len(),
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let text = str::from_utf8(&self.pending[..valid_len])
            .map_err(|_| Error::InvalidPayload)?;
        self.buf.push_str(text);
        self.pending.drain(..valid_len);

        // Lines end with CRLF, LF or a bare CR. A CR at the end of the
        // buffer stays until the next chunk shows whether an LF follows.
        if self.buf.contains('\r') {
            let trailing_cr = self.buf.ends_with('\r');
            if trailing_cr {
                self.buf.pop();
            }
            self.buf = self.buf.replace("\r\n", "\n").replace('\r', "\n");
            if trailing_cr {
                self.buf.push('\r');
            }
        }
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // event         = *( comment / field ) end-of-line
        // comment       = colon *any-char end-of-line
        // field         = 1*name-char [ colon [ space ] *any-char ] end-of-line
        while let Some(eol_idx) = self.buf.find("\n\n") {
            let block: String = self.buf.drain(0..eol_idx + 2).collect();

            let mut data_lines = Vec::new();
            for line in block.split('\n') {
                if line.is_empty() || line.starts_with(':') {
                    continue;
                }
                let (name, value) = line.split_once(':').unwrap_or((line, ""));
                let value = value.strip_prefix(' ').unwrap_or(value);
                match name {
                    "data" => data_lines.push(value),
                    "event" | "id" | "retry" => {}
                    _ => return Err(Error::InvalidPayload),
                }
            }

            if !data_lines.is_empty() {
                return Ok(Some(data_lines.join("\n")));
            }
        }
        Ok(None)
    }
}
