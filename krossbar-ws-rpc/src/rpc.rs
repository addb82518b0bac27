use std::sync::Arc;

use futures::{Sink, Stream, StreamExt as _};
use log::{debug, info, trace, warn};
use parking_lot::Mutex;
use serde_json::{value::RawValue, Value};
use tokio::sync::Notify;

use crate::{
    config::ClientConfig,
    message::{self, Envelope, RequestParams, RpcErrorObject, RpcRequest},
    message_stream::{self, FrameStream},
    monitor::{Direction, DropReason, Monitor, MonitorEvent},
    subscription::{self, ResultShape, Subscription, SubscriptionState},
    subscriptions_registry::{Promotion, SubscriptionsRegistry},
    writer::{RpcWriter, WriteAck},
    Error,
};

/// State shared by the client, the reader loop, and subscription handles
pub(crate) struct ClientShared {
    /// Registry lock is never held across an await or a write
    registry: Mutex<SubscriptionsRegistry>,
    writer: RpcWriter,
    monitor: Arc<dyn Monitor>,
    config: ClientConfig,
    /// Stops the reader loop
    shutdown: Notify,
}

impl ClientShared {
    /// Remove a subscription, set its terminal error, and send unsubscription request.
    /// Does nothing if the subscription has already been closed.
    /// Returns unsubscription write result if the request has been sent
    pub(crate) fn close_subscription(
        &self,
        state: &SubscriptionState,
        reason: Error,
    ) -> Option<WriteAck> {
        let (removed, subscription_id) = {
            let mut registry = self.registry.lock();

            // Read the id under the lock, so we don't race with the acknowledgement
            let subscription_id = state.subscription_id();
            let removed = registry.remove(state.request_id(), subscription_id);

            if removed.is_some() && subscription_id.is_none() && reason.is_caller_initiated() {
                registry.add_orphan(state.request_id(), state.unsubscribe_method());
            }

            (removed, subscription_id)
        };

        let removed = removed?;

        debug!(
            "Closing subscription {} ({subscription_id:?}): {reason}",
            removed.request_id()
        );

        self.monitor.on_event(&MonitorEvent::SubscriptionClosed {
            request_id: removed.request_id(),
            subscription_id,
            reason: &reason,
        });
        removed.terminate(reason);

        self.send_unsubscribe(subscription_id?, removed.unsubscribe_method())
    }

    /// Enqueue unsubscription request. Failures are only logged
    fn send_unsubscribe(&self, subscription_id: u64, method: &str) -> Option<WriteAck> {
        let request_id = self.registry.lock().next_id();
        let request = RpcRequest::new(
            request_id,
            method,
            RequestParams::new(vec![Value::from(subscription_id)]),
        );

        match self.writer.enqueue(&request) {
            Ok(ack) => Some(ack),
            Err(e) => {
                warn!("Unable to send `{method}` for subscription {subscription_id}: {e}");
                None
            }
        }
    }

    /// Terminate a subscription which failed to register
    fn rollback(&self, state: &SubscriptionState, error: Error) {
        let removed = self.registry.lock().remove(state.request_id(), None);

        if removed.is_some() {
            debug!("Rolling back subscription {}", state.request_id());
        }

        state.terminate(error);
    }

    /// Remove all subscriptions with the connection `error`
    fn close_all_subscriptions(&self, error: Error) {
        let drained = self.registry.lock().drain_all(error.clone());

        for state in drained {
            self.monitor.on_event(&MonitorEvent::SubscriptionClosed {
                request_id: state.request_id(),
                subscription_id: state.subscription_id(),
                reason: &error,
            });

            state.terminate(error.clone());
        }
    }

    fn frame_dropped(&self, reason: DropReason) {
        self.monitor.on_event(&MonitorEvent::FrameDropped { reason });
    }

    /// Route an incoming frame
    fn handle_frame(&self, frame: &str) {
        trace!("Incoming frame: {frame}");

        self.monitor.on_event(&MonitorEvent::Frame {
            direction: Direction::Incoming,
            frame,
        });

        match Envelope::decode(frame) {
            Ok(Envelope::Acknowledgement { id, result }) => self.handle_acknowledgement(id, result),
            Ok(Envelope::Notification {
                subscription,
                result,
            }) => self.handle_notification(subscription, result),
            Ok(Envelope::Error { id, error }) => self.handle_error(id, error),
            Err(e) => {
                warn!("Dropping malformed frame: {e}");
                self.frame_dropped(DropReason::Malformed)
            }
        }
    }

    fn handle_acknowledgement(&self, request_id: u64, result: &RawValue) {
        let subscription_id = match message::parse_subscription_id(result) {
            Ok(subscription_id) => subscription_id,
            Err(e) => return self.handle_invalid_acknowledgement(request_id, e),
        };

        let promotion = self.registry.lock().promote(request_id, subscription_id);
        match promotion {
            Promotion::Promoted(_) => {
                self.monitor.on_event(&MonitorEvent::SubscriptionPromoted {
                    request_id,
                    subscription_id,
                });
            }
            // Subscription closed before the server acknowledged it
            Promotion::Orphaned(method) => {
                debug!("Late acknowledgement for closed subscription {request_id}");
                let _ = self.send_unsubscribe(subscription_id, &method);
            }
            // Unsubscription responses end up here
            Promotion::Unknown => {
                debug!("Ignoring response to untracked request {request_id}");
                self.frame_dropped(DropReason::UntrackedResponse(request_id))
            }
            Promotion::Duplicate(state) => {
                let error = Error::ProtocolError(format!(
                    "Subscription id {subscription_id} is already active"
                ));
                warn!("Closing subscription {request_id}: {error}");

                self.monitor.on_event(&MonitorEvent::SubscriptionClosed {
                    request_id,
                    subscription_id: None,
                    reason: &error,
                });
                state.terminate(error);
            }
        }
    }

    fn handle_invalid_acknowledgement(&self, request_id: u64, error: Error) {
        let (orphan, pending) = {
            let mut registry = self.registry.lock();
            (registry.take_orphan(request_id), registry.lookup_pending(request_id))
        };

        match (orphan, pending) {
            (Some(_), _) => {
                warn!("Invalid acknowledgement for closed subscription {request_id}: {error}")
            }
            (None, Some(state)) => {
                warn!("Invalid acknowledgement for subscription {request_id}: {error}");
                let _ = self.close_subscription(&state, error);
            }
            (None, None) => {
                debug!("Ignoring response to untracked request {request_id}");
                self.frame_dropped(DropReason::UntrackedResponse(request_id))
            }
        }
    }

    fn handle_notification(&self, subscription_id: u64, payload: &RawValue) {
        trace!("Received notification for subscription {subscription_id}");

        let found = self.registry.lock().lookup_active(subscription_id);
        let Some(state) = found else {
            warn!("Unable to find subscription {subscription_id} for incoming notification");
            self.frame_dropped(DropReason::UnknownSubscription(subscription_id));
            return;
        };

        // Never blocks. A full queue closes the subscription
        if let Err(e) = state.deliver(payload) {
            warn!("Failed to deliver notification for {subscription_id}: {e}");
            let _ = self.close_subscription(&state, e);
        }
    }

    fn handle_error(&self, request_id: Option<u64>, error: RpcErrorObject) {
        let error = Error::from(error);

        let pending = request_id.and_then(|request_id| {
            let mut registry = self.registry.lock();
            registry.take_orphan(request_id);
            registry.lookup_pending(request_id)
        });

        match pending {
            Some(state) => {
                warn!("Server rejected subscription {}: {error}", state.request_id());
                let _ = self.close_subscription(&state, error);
            }
            None => {
                warn!("Server error for request {request_id:?}: {error}");
                self.frame_dropped(DropReason::UnresolvedError)
            }
        }
    }
}

/// Read incoming frames until the transport fails or the client is closed.
/// All subscriptions receive the connection error afterwards
async fn poll(mut stream: FrameStream, shared: Arc<ClientShared>) {
    let error = loop {
        let frame = tokio::select! {
            _ = shared.shutdown.notified() => {
                debug!("Client closed. Stopping reader");
                break Error::ConnectionClosed
            }
            frame = stream.next() => frame,
        };

        match frame {
            Some(Ok(frame)) => shared.handle_frame(&frame),
            Some(Err(e)) => {
                info!("Failed to read incoming message: {e}");
                break e;
            }
            None => {
                info!("Peer closed the connection");
                break Error::PeerDisconnected;
            }
        }
    };

    shared.close_all_subscriptions(error);
    shared.writer.close();
}

/// Subscriptions client.
///
/// Owns a reader task, which routes incoming notifications into [Subscription] handles,
/// and a writer task, which serializes outgoing requests. Dropping the client closes the connection
pub struct Client {
    shared: Arc<ClientShared>,
}

impl Client {
    /// Connect to a websocket `address` with default config
    pub async fn connect(address: &str) -> crate::Result<Self> {
        Self::connect_with_config(address, ClientConfig::default()).await
    }

    /// Connect to a websocket `address`
    pub async fn connect_with_config(address: &str, config: ClientConfig) -> crate::Result<Self> {
        let (sink, stream) = message_stream::connect_websocket(address).await?;

        Ok(Self::with_transport(sink, stream, config))
    }

    /// Make a client from a text frames transport.
    /// Must be called inside Tokio runtime
    pub fn with_transport<W, S>(sink: W, stream: S, config: ClientConfig) -> Self
    where
        W: Sink<String, Error = Error> + Send + 'static,
        S: Stream<Item = crate::Result<String>> + Send + 'static,
    {
        trace!("Making new client from a transport: {config:?}");

        let monitor = config.monitor().clone();

        let shared = Arc::new(ClientShared {
            registry: Mutex::new(SubscriptionsRegistry::new()),
            writer: RpcWriter::spawn(Box::pin(sink), monitor.clone()),
            monitor,
            config,
            shutdown: Notify::new(),
        });

        tokio::spawn(poll(Box::pin(stream), shared.clone()));

        Self { shared }
    }

    /// Subscribe using `subscribe_method`. `params` are sent with a configuration map at the end.
    ///
    /// Returns as soon as the request is written. The server acknowledgement is handled in background.
    /// Immediately returns an `Error` if the request failed to serialize or to be written
    pub async fn subscribe<R: Send + 'static>(
        &self,
        params: impl Into<RequestParams>,
        subscribe_method: &str,
        unsubscribe_method: &str,
        shape: ResultShape<R>,
    ) -> crate::Result<Subscription<R>> {
        let request_id = self.shared.registry.lock().next_id();
        let request = RpcRequest::new(request_id, subscribe_method, params.into());

        let (state, receiver) = subscription::channel(
            request_id,
            unsubscribe_method,
            shape,
            self.shared.config.delivery_capacity(),
        );

        // Register before writing, so we don't miss an immediate acknowledgement
        self.shared
            .registry
            .lock()
            .register(request_id, state.clone())?;

        self.shared
            .monitor
            .on_event(&MonitorEvent::SubscriptionRegistered { request_id });

        debug!("New subscription with id {request_id} to the `{subscribe_method}`");

        if let Err(e) = self.shared.writer.write(&request).await {
            debug!("Error subscribing to `{subscribe_method}`: {e}");

            self.shared.rollback(&state, e.clone());
            return Err(e);
        }

        Ok(Subscription::new(state, receiver, self.shared.clone()))
    }

    /// Close the connection. All subscriptions receive [Error::ConnectionClosed]
    pub fn close(&self) {
        // Stored permit stops the reader even if it's not waiting at the moment
        self.shared.shutdown.notify_one();
        self.shared.writer.close();
    }

    /// If reconnection was requested in the config. The client never reconnects by itself
    pub fn reconnect_requested(&self) -> bool {
        self.shared.config.reconnect()
    }

    /// Number of subscriptions waiting for acknowledgement
    pub fn pending_subscriptions(&self) -> usize {
        self.shared.registry.lock().pending_len()
    }

    /// Number of acknowledged subscriptions
    pub fn active_subscriptions(&self) -> usize {
        self.shared.registry.lock().active_len()
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.close()
    }
}
