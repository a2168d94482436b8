use crate::error::{DecodeError, ProtocolError};
use crate::types::PropertyBag;
use bytes::{Buf, BytesMut};
use serde::Serialize;
use serde_json::Value;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::codec::Decoder;

const READ_CHUNK: usize = 4096;

/// Outbound command envelope, serialized as one CRLF terminated line
#[derive(Debug, Clone, Serialize)]
pub struct Request<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a [Value],
}

/// A decoded inbound line
#[derive(Debug, Clone, PartialEq)]
pub enum WireEvent {
    /// Acknowledgement or property query result
    Result { id: Option<u64>, values: Vec<String> },
    /// Error object returned by the bulb
    Error(ProtocolError),
    /// Unsolicited `props` push
    Notification(PropertyBag),
}

/// Encode a command as `{"id":..,"method":"..","params":[..]}\r\n`
pub fn encode(id: u64, method: &str, params: &[Value]) -> serde_json::Result<Vec<u8>> {
    let mut line = serde_json::to_vec(&Request { id, method, params })?;
    line.extend_from_slice(b"\r\n");
    Ok(line)
}

/// Decode one inbound line (trailing CR/LF is ignored)
pub fn decode(line: &[u8]) -> Result<WireEvent, DecodeError> {
    let text = std::str::from_utf8(line).map_err(|_| DecodeError::NotUtf8)?;
    let value: Value = serde_json::from_str(text.trim()).map_err(DecodeError::NotJson)?;
    let obj = value.as_object().ok_or(DecodeError::UnknownShape)?;

    let id = obj.get("id").and_then(Value::as_u64);

    if let Some(result) = obj.get("result") {
        let values = result
            .as_array()
            .ok_or(DecodeError::MissingExpectedKeys("result"))?
            .iter()
            .map(value_to_string)
            .collect();
        return Ok(WireEvent::Result { id, values });
    }

    if let Some(error) = obj.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_i64)
            .ok_or(DecodeError::MissingExpectedKeys("code"))?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .ok_or(DecodeError::MissingExpectedKeys("message"))?;
        return Ok(WireEvent::Error(ProtocolError {
            id,
            code,
            message: message.to_string(),
        }));
    }

    if let Some(method) = obj.get("method") {
        if method.as_str() != Some("props") {
            return Err(DecodeError::UnknownShape);
        }
        let params = obj
            .get("params")
            .and_then(Value::as_object)
            .ok_or(DecodeError::MissingExpectedKeys("params"))?;
        let bag = params
            .iter()
            .map(|(k, v)| (k.clone(), value_to_string(v)))
            .collect();
        return Ok(WireEvent::Notification(bag));
    }

    Err(DecodeError::UnknownShape)
}

// Bulbs report most values as strings but some firmware sends bare numbers
fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Frames the inbound byte stream into lines and decodes each one.
///
/// A bad line yields `Some(Err(..))` and framing carries on with the next line,
/// so one garbled payload never ends the stream. Lines longer than
/// `max_length` are dropped up to their terminating newline.
#[derive(Debug)]
pub struct WireCodec {
    max_length: usize,
    next_index: usize,
    discarding: bool,
}

impl WireCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            max_length,
            next_index: 0,
            discarding: false,
        }
    }
}

impl Decoder for WireCodec {
    type Item = Result<WireEvent, DecodeError>;
    type Error = std::io::Error;

    fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let newline = buf[self.next_index..].iter().position(|b| *b == b'\n');

            match newline {
                Some(offset) => {
                    let end = self.next_index + offset;
                    self.next_index = 0;
                    let line = buf.split_to(end + 1);

                    if self.discarding {
                        self.discarding = false;
                        continue;
                    }
                    if line.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Ok(Some(decode(&line)));
                }
                None if buf.len() > self.max_length => {
                    tracing::warn!("Discarding inbound line longer than {} bytes", self.max_length);
                    buf.advance(buf.len());
                    self.next_index = 0;
                    self.discarding = true;
                    return Ok(None);
                }
                None => {
                    self.next_index = buf.len();
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(item) = self.decode(buf)? {
            return Ok(Some(item));
        }
        // The final line may arrive without a terminator before the peer closes
        if buf.is_empty() || self.discarding {
            buf.clear();
            return Ok(None);
        }
        let line = buf.split_to(buf.len());
        self.next_index = 0;
        Ok(Some(decode(&line)))
    }
}

/// Reads decoded lines from a byte stream
///
/// Unlike `FramedRead`, a read error does not end the stream: the error is
/// returned once and the next call resumes with whatever was already
/// buffered. End of input yields `None`.
pub struct WireReader<R> {
    inner: R,
    codec: WireCodec,
    buf: BytesMut,
    eof: bool,
}

impl<R: AsyncRead + Unpin> WireReader<R> {
    pub fn new(inner: R, codec: WireCodec) -> Self {
        Self {
            inner,
            codec,
            buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Next decoded line, a read error, or `None` once the peer has closed.
    ///
    /// Cancel safe: dropping the future never loses buffered bytes.
    pub async fn next(&mut self) -> Option<io::Result<Result<WireEvent, DecodeError>>> {
        loop {
            if self.eof {
                return self.codec.decode_eof(&mut self.buf).transpose();
            }
            match self.codec.decode(&mut self.buf) {
                Ok(Some(item)) => return Some(Ok(item)),
                Ok(None) => {}
                Err(e) => return Some(Err(e)),
            }

            self.buf.reserve(READ_CHUNK);
            match self.inner.read_buf(&mut self.buf).await {
                Ok(0) => self.eof = true,
                Ok(_) => {}
                Err(e) => return Some(Err(e)),
            }
        }
    }
}
