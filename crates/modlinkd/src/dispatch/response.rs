//! Response encoding.
//!
//! Every response starts with a single JSON header line tagged by `type`.
//! A binary header announces `byte_count` as decimal text and is followed
//! directly by exactly that many raw bytes, with no trailing delimiter.

use std::io::Write;

use serde::Serialize;

use super::errors::DispatchError;

/// Result of executing one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// The command failed; `message` explains why.
    Error {
        /// Client-facing explanation.
        message: String,
    },
    /// Raw bytes returned by the command.
    Binary {
        /// Payload written after the header line.
        data: Vec<u8>,
    },
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Header<'a> {
    Error { message: &'a str },
    Binary { byte_count: String },
}

impl Response {
    /// Creates an error response.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Creates a binary response.
    #[must_use]
    pub const fn binary(data: Vec<u8>) -> Self {
        Self::Binary { data }
    }

    /// Creates an error response describing a dispatch failure.
    #[must_use]
    pub fn from_error(error: &DispatchError) -> Self {
        Self::error(error.to_string())
    }

    /// True for error responses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    /// Encodes the response into the bytes sent on the wire.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be serialised.
    pub fn encode(&self) -> Result<Vec<u8>, DispatchError> {
        let mut encoded = Vec::new();
        ResponseWriter::new(&mut encoded).write_response(self)?;
        Ok(encoded)
    }

    fn header(&self) -> Header<'_> {
        match self {
            Self::Error { message } => Header::Error { message },
            Self::Binary { data } => Header::Binary {
                byte_count: data.len().to_string(),
            },
        }
    }
}

/// Writer that frames responses onto a byte stream.
pub struct ResponseWriter<W> {
    writer: W,
}

impl<W: Write> ResponseWriter<W> {
    /// Creates a new response writer wrapping the given output stream.
    pub const fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Writes the header line and, for binary responses, the payload.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or the underlying write fails.
    pub fn write_response(&mut self, response: &Response) -> Result<(), DispatchError> {
        serde_json::to_writer(&mut self.writer, &response.header())?;
        self.writer.write_all(b"\n")?;
        if let Response::Binary { data } = response {
            self.writer.write_all(data)?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Consumes the writer and returns the wrapped stream.
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_header_is_a_single_line() {
        let encoded = Response::error("bad offset").encode().expect("encode error");
        assert_eq!(encoded, b"{\"type\":\"error\",\"message\":\"bad offset\"}\n");
    }

    #[test]
    fn binary_header_precedes_raw_bytes() {
        let encoded = Response::binary(vec![1, 2, 3, 4])
            .encode()
            .expect("encode binary");
        let mut expected = b"{\"type\":\"binary\",\"byte_count\":\"4\"}\n".to_vec();
        expected.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(encoded, expected);
    }

    #[test]
    fn payload_newlines_are_not_escaped() {
        let encoded = Response::binary(b"\n\n".to_vec())
            .encode()
            .expect("encode binary");
        assert!(encoded.ends_with(b"}\n\n\n"));
    }

    #[test]
    fn writer_streams_consecutive_responses() {
        let mut writer = ResponseWriter::new(Vec::new());
        writer
            .write_response(&Response::error("first"))
            .expect("write first");
        writer
            .write_response(&Response::binary(vec![0xff]))
            .expect("write second");
        let output = writer.into_inner();
        let header_end = output
            .iter()
            .position(|b| *b == b'\n')
            .expect("first header line");
        assert!(output[header_end + 1..].starts_with(b"{\"type\":\"binary\""));
        assert_eq!(output.last(), Some(&0xff));
    }
}
