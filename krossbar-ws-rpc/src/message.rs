//! JSON-RPC envelope codec.
//!
//! Outgoing requests are always `{"jsonrpc": "2.0", "method", "params", "id"}`, where
//! `params` are positional arguments followed by a configuration map.
//! Incoming frames are classified by the fields they carry, without parsing
//! notification payloads. See [Envelope].

use serde::{
    ser::{SerializeSeq, Serializer},
    Deserialize, Deserializer, Serialize,
};
use serde_json::{value::RawValue, Map, Value};

use crate::Error;

pub const JSONRPC_VERSION: &str = "2.0";

/// Error code reported if server error payload is not a JSON-RPC error object
pub const SERVER_ERROR_CODE: i64 = -32000;

/// Request params: positional arguments followed by a configuration map.
/// The map is passed to the server as is
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParams {
    args: Vec<Value>,
    config: Map<String, Value>,
}

impl RequestParams {
    pub fn new(args: Vec<Value>) -> Self {
        Self {
            args,
            config: Map::new(),
        }
    }

    /// Replace configuration map, which is appended to the arguments
    pub fn with_config(mut self, config: impl Into<Map<String, Value>>) -> Self {
        self.config = config.into();
        self
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn config(&self) -> &Map<String, Value> {
        &self.config
    }
}

impl From<Vec<Value>> for RequestParams {
    fn from(args: Vec<Value>) -> Self {
        Self::new(args)
    }
}

impl Serialize for RequestParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.args.len() + 1))?;

        for arg in &self.args {
            seq.serialize_element(arg)?;
        }
        seq.serialize_element(&self.config)?;

        seq.end()
    }
}

/// Outgoing request
#[derive(Serialize, Debug, Clone)]
pub struct RpcRequest {
    jsonrpc: &'static str,
    pub method: String,
    pub params: RequestParams,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(id: u64, method: &str, params: RequestParams) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: method.to_owned(),
            params,
            id,
        }
    }

    /// Serialize into a text frame
    pub fn encode(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| Error::ParamsTypeError(e.to_string()))
    }
}

/// Server error object
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Incoming frame. Payloads are kept raw and borrowed from the frame
#[derive(Debug)]
pub enum Envelope<'a> {
    /// Response to a request. For subscription requests the result is a subscription id
    Acknowledgement { id: u64, result: &'a RawValue },
    /// Subscription item
    Notification {
        subscription: u64,
        result: &'a RawValue,
    },
    /// Server error, optionally bound to a request
    Error {
        id: Option<u64>,
        error: RpcErrorObject,
    },
}

#[derive(Deserialize)]
struct RawEnvelope<'a> {
    #[serde(default)]
    id: Option<u64>,
    /// `Some` whenever the field is present, including `null`
    #[serde(borrow, default, deserialize_with = "present_raw_value")]
    result: Option<&'a RawValue>,
    #[serde(borrow, default)]
    params: Option<RawNotificationParams<'a>>,
    #[serde(borrow, default)]
    error: Option<&'a RawValue>,
}

fn present_raw_value<'de, D>(deserializer: D) -> Result<Option<&'de RawValue>, D::Error>
where
    D: Deserializer<'de>,
{
    <&RawValue>::deserialize(deserializer).map(Some)
}

#[derive(Deserialize)]
struct RawNotificationParams<'a> {
    subscription: u64,
    #[serde(borrow)]
    result: &'a RawValue,
}

impl<'a> Envelope<'a> {
    /// Classify a frame. `error` wins over `id`, which wins over `params`
    pub fn decode(frame: &'a str) -> crate::Result<Self> {
        let raw: RawEnvelope<'a> =
            serde_json::from_str(frame).map_err(|e| Error::ProtocolError(e.to_string()))?;

        if let Some(error) = raw.error {
            return Ok(Envelope::Error {
                id: raw.id,
                error: decode_error_object(error),
            });
        }

        if let Some(id) = raw.id {
            return match raw.result {
                Some(result) => Ok(Envelope::Acknowledgement { id, result }),
                None => Err(Error::ProtocolError(format!(
                    "Response to {id} has neither result nor error"
                ))),
            };
        }

        match raw.params {
            Some(params) => Ok(Envelope::Notification {
                subscription: params.subscription,
                result: params.result,
            }),
            None => Err(Error::ProtocolError(
                "Frame is neither a response nor a notification".into(),
            )),
        }
    }
}

/// Subscription id from an acknowledgement result
pub fn parse_subscription_id(result: &RawValue) -> crate::Result<u64> {
    serde_json::from_str(result.get()).map_err(|e| {
        Error::ProtocolError(format!(
            "Invalid subscription id `{}`: {e}",
            result.get()
        ))
    })
}

fn decode_error_object(raw: &RawValue) -> RpcErrorObject {
    serde_json::from_str(raw.get()).unwrap_or_else(|_| RpcErrorObject {
        code: SERVER_ERROR_CODE,
        message: raw.get().to_owned(),
        data: None,
    })
}
