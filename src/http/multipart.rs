//! Downstream multipart encoding.

use bytes::Bytes;
use rand::Rng;

/// Writes `multipart/x-mixed-replace` parts with a per-response boundary.
#[derive(Debug)]
pub struct MultipartWriter {
    boundary: String,
    started: bool,
}

impl MultipartWriter {
    /// Writer with a fresh random boundary.
    pub fn new() -> Self {
        Self::with_boundary(random_boundary())
    }

    pub fn with_boundary(boundary: impl Into<String>) -> Self {
        Self {
            boundary: boundary.into(),
            started: false,
        }
    }

    pub fn boundary(&self) -> &str {
        &self.boundary
    }

    /// Value for the response Content-Type header.
    pub fn content_type(&self) -> String {
        format!("multipart/x-mixed-replace; boundary={}", self.boundary)
    }

    /// Delimiter and headers of one JPEG part; the payload follows.
    pub fn part_header(&mut self, len: usize) -> Bytes {
        let lead = if self.started { "\r\n" } else { "" };
        self.started = true;
        Bytes::from(format!(
            "{}--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            lead, self.boundary, len
        ))
    }

    /// Closing delimiter.
    pub fn close(&mut self) -> Bytes {
        let lead = if self.started { "\r\n" } else { "" };
        self.started = true;
        Bytes::from(format!("{}--{}--\r\n", lead, self.boundary))
    }
}

impl Default for MultipartWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn random_boundary() -> String {
    let bytes: [u8; 30] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
