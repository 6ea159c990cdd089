// HTTP response wrapper
// Keeps the raw status line, header block and body, and derives parsed views

use bytes::Bytes;
use serde_json::Value;
use std::collections::HashMap;

use crate::error::Result;

/// Decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    /// Body parsed as JSON
    Json(Value),
    /// Body that is not valid JSON, returned unchanged
    Raw(Bytes),
}

impl Body {
    /// Decode bytes as JSON, falling back to the raw bytes
    pub fn decode(bytes: &Bytes) -> Self {
        match serde_json::from_slice(bytes) {
            Ok(value) => Body::Json(value),
            Err(_) => Body::Raw(bytes.clone()),
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Body::Json(value) => Some(value),
            Body::Raw(_) => None,
        }
    }

    /// JSON view of the body; raw content becomes a JSON string
    pub fn into_value(self) -> Value {
        match self {
            Body::Json(value) => value,
            Body::Raw(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
        }
    }
}

/// Raw HTTP response produced once per request
#[derive(Debug, Clone)]
pub struct HttpResponse {
    status: u16,
    header_block: String,
    body: Bytes,
}

impl HttpResponse {
    pub fn new(status: u16, header_block: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            header_block: header_block.into(),
            body: body.into(),
        }
    }

    /// Read a reqwest response to completion
    pub(crate) async fn read(response: reqwest::Response) -> Result<Self> {
        let status = response.status();
        let mut header_block = format!("{:?} {}\r\n", response.version(), status);
        for (name, value) in response.headers() {
            header_block.push_str(name.as_str());
            header_block.push_str(": ");
            header_block.push_str(&String::from_utf8_lossy(value.as_bytes()));
            header_block.push_str("\r\n");
        }
        header_block.push_str("\r\n");

        let body = response.bytes().await?;
        Ok(Self::new(status.as_u16(), header_block, body))
    }

    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn header_block(&self) -> &str {
        &self.header_block
    }

    pub fn raw_body(&self) -> &Bytes {
        &self.body
    }

    /// Parsed header mapping
    pub fn headers(&self) -> HashMap<String, String> {
        parse_header_block(&self.header_block)
    }

    /// Decoded body, or the raw bytes when it is not JSON
    pub fn body(&self) -> Body {
        Body::decode(&self.body)
    }

    /// Body as text, lossily decoded
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Parse a `Name: Value\r\n` header block
///
/// Lines without a colon (such as the status line) map to an empty value.
/// Duplicate names keep the last occurrence.
pub fn parse_header_block(block: &str) -> HashMap<String, String> {
    let mut headers = HashMap::new();
    for line in block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                headers.insert(name.trim().to_string(), value.trim().to_string());
            }
            None => {
                headers.insert(line.trim().to_string(), String::new());
            }
        }
    }
    headers
}
