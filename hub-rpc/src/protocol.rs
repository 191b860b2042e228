//! JSON envelope codec
//!
//! One JSON object per logical message:
//!
//! ```text
//! request       {"id": "<uuid>", "method": "getVolume", "params": {...}}
//! response      {"id": "<uuid>", "result": 42}
//!               {"id": "<uuid>", "error": {"code": -1, "message": "..."}}
//! notification  {"method": "volumeChanged", "params": {"data": {"volume": 55}}}
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// An outbound request
#[derive(Debug, Serialize)]
pub struct Request<'a> {
    pub id: &'a str,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<&'a Value>,
}

impl<'a> Request<'a> {
    pub fn new(id: &'a str, method: &'a str, params: Option<&'a Value>) -> Self {
        Self { id, method, params }
    }

    /// Serialize to the bytes written on the transport
    pub fn encode(&self) -> Result<Bytes, serde_json::Error> {
        serde_json::to_vec(self).map(Bytes::from)
    }
}

/// Error payload of a failed response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A server-initiated push message
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub method: String,
    /// `params.data`, or `null` when absent
    pub data: Value,
}

/// A parsed inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Response {
        id: String,
        outcome: Result<Value, RpcError>,
    },
    Notification(Notification),
}

#[derive(Deserialize)]
struct RawEnvelope {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl Envelope {
    /// Interpret one complete message
    pub fn parse(message: &[u8]) -> Result<Envelope, ProtocolError> {
        let raw: RawEnvelope = serde_json::from_slice(message)
            .map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        let id = match raw.id {
            None | Some(Value::Null) => None,
            Some(Value::String(id)) => Some(id),
            // Numbers correlate by their decimal text
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(other) => return Err(ProtocolError::InvalidId(other.to_string())),
        };

        match (id, raw.method) {
            (Some(id), method) => {
                if let Some(error) = raw.error {
                    return Ok(Envelope::Response {
                        id,
                        outcome: Err(error),
                    });
                }
                match (raw.result, method) {
                    (None, Some(method)) => Err(ProtocolError::InboundRequest { id, method }),
                    (result, _) => Ok(Envelope::Response {
                        id,
                        outcome: Ok(result.unwrap_or(Value::Null)),
                    }),
                }
            }
            (None, Some(method)) => {
                let data = match raw.params {
                    Some(Value::Object(mut params)) => {
                        params.remove("data").unwrap_or(Value::Null)
                    }
                    _ => Value::Null,
                };
                Ok(Envelope::Notification(Notification { method, data }))
            }
            (None, None) => Err(ProtocolError::Unrecognized),
        }
    }
}
