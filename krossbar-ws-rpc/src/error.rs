use thiserror::Error;

use crate::message::RpcErrorObject;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Peer closed the connection
    #[error("Peer disconnected")]
    PeerDisconnected,
    /// Connection closed by [crate::rpc::Client::close]
    #[error("Connection closed")]
    ConnectionClosed,
    /// Transport failed to read or write a frame
    #[error("Transport error: {0}")]
    Transport(String),
    /// Failed to establish a connection
    #[error("Failed to connect: {0}")]
    Connect(String),
    /// Incoming frame doesn't follow the JSON-RPC envelope
    #[error("Protocol error: {0}")]
    ProtocolError(String),
    /// Request params failed to serialize
    #[error("Invalid request params: {0}")]
    ParamsTypeError(String),
    /// Notification payload doesn't match the subscription result type.
    /// Contains deserialization error
    #[error("Invalid result type: {0}")]
    ResultTypeError(String),
    /// Subscriber didn't keep up with the notifications
    #[error("Reached delivery queue max capacity {0}")]
    CapacityExceeded(usize),
    /// Error returned by the server
    #[error("Server returned an error {code}: {message}")]
    Server { code: i64, message: String },
    /// Subscription closed by the user
    #[error("Unsubscribed")]
    Unsubscribed,
    /// Subscription handle was dropped
    #[error("Subscription handle dropped")]
    SubscriptionDropped,
    /// Internal library error. Should never happen
    #[error("Internal Krossbar error: {0}. Please report the issue")]
    InternalError(String),
}

impl Error {
    /// If the subscription was closed by the user rather than by a failure
    pub fn is_caller_initiated(&self) -> bool {
        matches!(self, Error::Unsubscribed | Error::SubscriptionDropped)
    }
}

impl From<RpcErrorObject> for Error {
    fn from(error: RpcErrorObject) -> Self {
        Error::Server {
            code: error.code,
            message: error.message,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
