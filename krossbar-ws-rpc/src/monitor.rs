use log::trace;

use crate::Error;

/// Frame direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Incoming,
    Outgoing,
}

/// Why an incoming frame was not delivered to any subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Frame doesn't follow JSON-RPC envelope
    Malformed,
    /// Notification for a subscription id the client doesn't track
    UnknownSubscription(u64),
    /// Response to a request the client doesn't track
    UntrackedResponse(u64),
    /// Server error which can't be bound to a subscription
    UnresolvedError,
}

/// Client event
#[derive(Debug)]
pub enum MonitorEvent<'a> {
    /// Frame sent or received
    Frame {
        direction: Direction,
        frame: &'a str,
    },
    /// Subscription request registered and waiting for acknowledgement
    SubscriptionRegistered { request_id: u64 },
    /// Server acknowledged a subscription
    SubscriptionPromoted {
        request_id: u64,
        subscription_id: u64,
    },
    /// Subscription terminated
    SubscriptionClosed {
        request_id: u64,
        subscription_id: Option<u64>,
        reason: &'a Error,
    },
    /// Incoming frame dropped
    FrameDropped { reason: DropReason },
}

/// Structured event sink. Injected into a client with [crate::config::ClientConfig::with_monitor].
/// Called from the reader loop, so implementations must not block
pub trait Monitor: Send + Sync {
    fn on_event(&self, event: &MonitorEvent<'_>);
}

/// Forwards all events into the log with `trace` level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMonitor;

impl Monitor for LogMonitor {
    fn on_event(&self, event: &MonitorEvent<'_>) {
        trace!("Client event: {event:?}");
    }
}

/// Ignores all events
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {
    fn on_event(&self, _: &MonitorEvent<'_>) {}
}
