//! Blocking TCP client speaking the line protocol.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::Value;

const READ_TIMEOUT: Duration = Duration::from_secs(2);

/// A response as read back from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireResponse {
    Error(String),
    Binary(Vec<u8>),
}

/// Client connection with a buffered reader over the response stream.
pub struct TestClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
}

impl TestClient {
    /// Connects to `addr` with a bounded read timeout.
    pub fn connect(addr: SocketAddr) -> Self {
        let writer = TcpStream::connect(addr).expect("connect to server");
        writer
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(writer.try_clone().expect("clone client stream"));
        Self { writer, reader }
    }

    /// Sends raw bytes exactly as given.
    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).expect("write request bytes");
    }

    /// Sends one request line, appending the terminator.
    pub fn send_line(&mut self, line: &str) {
        self.send_raw(format!("{line}\n").as_bytes());
    }

    /// Sends a `getBinaryData` request.
    pub fn request_binary(&mut self, path: &str, offset: &str, length: &str) {
        let request = serde_json::json!({
            "name": "getBinaryData",
            "args": [path, offset, length],
        });
        self.send_line(&request.to_string());
    }

    /// Reads one header line and, for binary responses, its payload.
    pub fn read_response(&mut self) -> WireResponse {
        let mut header = String::new();
        let read = self.reader.read_line(&mut header).expect("read header line");
        assert!(read > 0, "connection closed before a response arrived");

        let value: Value = serde_json::from_str(header.trim_end()).expect("header is JSON");
        match value["type"].as_str() {
            Some("error") => WireResponse::Error(
                value["message"]
                    .as_str()
                    .expect("error message")
                    .to_owned(),
            ),
            Some("binary") => {
                let count: usize = value["byte_count"]
                    .as_str()
                    .expect("byte_count text")
                    .parse()
                    .expect("byte_count is decimal");
                let mut data = vec![0; count];
                self.reader.read_exact(&mut data).expect("read payload");
                WireResponse::Binary(data)
            }
            other => panic!("unexpected response type {other:?} in {header:?}"),
        }
    }

    /// True once the server has closed the connection.
    pub fn observes_close(&mut self) -> bool {
        let mut buf = [0_u8; 1];
        match self.reader.read(&mut buf) {
            Ok(0) => true,
            Ok(_) => false,
            Err(error) => matches!(
                error.kind(),
                io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionAborted
            ),
        }
    }
}
