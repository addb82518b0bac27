use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::monitor::{LogMonitor, Monitor};

/// Default delivery queue size of a subscription
pub const DEFAULT_DELIVERY_CAPACITY: usize = 200;

/// Default notification encoding requested from the server
pub const DEFAULT_ENCODING: &str = "jsonParsed";

/// Client configuration
#[derive(Clone)]
pub struct ClientConfig {
    delivery_capacity: usize,
    reconnect: bool,
    monitor: Arc<dyn Monitor>,
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Max number of undelivered notifications per subscription.
    /// A subscription which reaches the limit is closed with [crate::Error::CapacityExceeded].
    /// Zero is treated as one
    pub fn with_delivery_capacity(mut self, capacity: usize) -> Self {
        self.delivery_capacity = capacity.max(1);
        self
    }

    /// Mark the client as willing to reconnect.
    /// The flag is only reported by [crate::rpc::Client::reconnect_requested]. Reconnection is not implemented
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Event sink. [LogMonitor] by default
    pub fn with_monitor(mut self, monitor: Arc<dyn Monitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn delivery_capacity(&self) -> usize {
        self.delivery_capacity
    }

    pub fn reconnect(&self) -> bool {
        self.reconnect
    }

    pub fn monitor(&self) -> &Arc<dyn Monitor> {
        &self.monitor
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            delivery_capacity: DEFAULT_DELIVERY_CAPACITY,
            reconnect: false,
            monitor: Arc::new(LogMonitor),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("delivery_capacity", &self.delivery_capacity)
            .field("reconnect", &self.reconnect)
            .finish_non_exhaustive()
    }
}

/// Commitment level to request from the server
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum Commitment {
    Processed,
    Confirmed,
    Finalized,
    // Legacy levels
    Recent,
    Single,
    SingleGossip,
    Root,
    Max,
}

/// Subscription configuration map, which is appended to the request params.
/// Keys are passed to the server without interpretation
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeConfig {
    options: Map<String, Value>,
}

impl SubscribeConfig {
    /// Config with the default `jsonParsed` encoding
    pub fn new() -> Self {
        Self::default()
    }

    /// Config without any options
    pub fn empty() -> Self {
        Self {
            options: Map::new(),
        }
    }

    pub fn with_encoding(self, encoding: &str) -> Self {
        self.with_option("encoding", Value::String(encoding.to_owned()))
    }

    /// Set commitment level. `None` removes the option
    pub fn with_commitment(mut self, commitment: Option<Commitment>) -> Self {
        match commitment {
            Some(commitment) => self.with_option("commitment", commitment.as_value()),
            None => {
                self.options.remove("commitment");
                self
            }
        }
    }

    /// Add an arbitrary option
    pub fn with_option(mut self, key: &str, value: Value) -> Self {
        self.options.insert(key.to_owned(), value);
        self
    }

    pub fn options(&self) -> &Map<String, Value> {
        &self.options
    }
}

impl Default for SubscribeConfig {
    fn default() -> Self {
        Self::empty().with_encoding(DEFAULT_ENCODING)
    }
}

impl From<SubscribeConfig> for Map<String, Value> {
    fn from(config: SubscribeConfig) -> Self {
        config.options
    }
}

impl Commitment {
    fn as_value(&self) -> Value {
        // Unit variants always serialize into a string
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}
