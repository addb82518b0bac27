use std::{
    fmt,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use futures::{stream::FusedStream, Stream};
use log::{trace, warn};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};

use crate::{rpc::ClientShared, Error};

type DecodeFn<R> = dyn Fn(&RawValue) -> crate::Result<R> + Send + Sync;

/// Expected result shape of a subscription. Decodes notification payloads into `R`
pub struct ResultShape<R> {
    decode: Arc<DecodeFn<R>>,
}

impl<R> ResultShape<R> {
    /// Custom decoder. Errors close the subscription
    pub fn new<F>(decode: F) -> Self
    where
        F: Fn(&RawValue) -> crate::Result<R> + Send + Sync + 'static,
    {
        Self {
            decode: Arc::new(decode),
        }
    }

    pub fn decode(&self, payload: &RawValue) -> crate::Result<R> {
        (self.decode)(payload)
    }
}

impl<R: DeserializeOwned> ResultShape<R> {
    /// Deserialize payloads with serde
    pub fn json() -> Self {
        Self::new(|payload: &RawValue| {
            serde_json::from_str(payload.get()).map_err(|e| Error::ResultTypeError(e.to_string()))
        })
    }
}

impl<R: DeserializeOwned> Default for ResultShape<R> {
    fn default() -> Self {
        Self::json()
    }
}

impl<R> Clone for ResultShape<R> {
    fn clone(&self) -> Self {
        Self {
            decode: self.decode.clone(),
        }
    }
}

/// Type erased result delivery: decodes a payload and pushes it into the subscriber queue
pub(crate) trait Delivery: Send + Sync {
    /// Never blocks. Full queue is an error
    fn deliver(&self, payload: &RawValue) -> crate::Result<()>;
}

struct TypedDelivery<R> {
    shape: ResultShape<R>,
    sender: Sender<R>,
}

impl<R: Send + 'static> Delivery for TypedDelivery<R> {
    fn deliver(&self, payload: &RawValue) -> crate::Result<()> {
        let value = self.shape.decode(payload)?;

        match self.sender.try_send(value) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(Error::CapacityExceeded(self.sender.max_capacity())),
            Err(TrySendError::Closed(_)) => Err(Error::SubscriptionDropped),
        }
    }
}

/// Subscription state shared between the registry and the user handle
pub(crate) struct SubscriptionState {
    request_id: u64,
    unsubscribe_method: String,
    /// Assigned once on acknowledgement
    subscription_id: OnceCell<u64>,
    /// Terminal error. Set once before the delivery is dropped
    error: OnceCell<Error>,
    /// `None` after termination, which closes the subscriber queue
    delivery: Mutex<Option<Box<dyn Delivery>>>,
}

impl SubscriptionState {
    pub(crate) fn new(
        request_id: u64,
        unsubscribe_method: &str,
        delivery: Box<dyn Delivery>,
    ) -> Self {
        Self {
            request_id,
            unsubscribe_method: unsubscribe_method.to_owned(),
            subscription_id: OnceCell::new(),
            error: OnceCell::new(),
            delivery: Mutex::new(Some(delivery)),
        }
    }

    pub(crate) fn request_id(&self) -> u64 {
        self.request_id
    }

    pub(crate) fn subscription_id(&self) -> Option<u64> {
        self.subscription_id.get().copied()
    }

    pub(crate) fn assign_subscription_id(&self, subscription_id: u64) {
        if self.subscription_id.set(subscription_id).is_err() {
            warn!(
                "Subscription {} already has an id. Ignoring {subscription_id}",
                self.request_id
            )
        }
    }

    pub(crate) fn unsubscribe_method(&self) -> &str {
        &self.unsubscribe_method
    }

    pub(crate) fn error(&self) -> Option<&Error> {
        self.error.get()
    }

    pub(crate) fn deliver(&self, payload: &RawValue) -> crate::Result<()> {
        match self.delivery.lock().as_ref() {
            Some(delivery) => delivery.deliver(payload),
            None => {
                trace!("Dropping notification for terminated {}", self.request_id);
                Ok(())
            }
        }
    }

    /// Set terminal error and close the subscriber queue. Already queued results stay readable
    pub(crate) fn terminate(&self, error: Error) {
        // Delivery holds the same lock, so nothing is enqueued once the error is set
        let mut delivery = self.delivery.lock();

        if self.error.set(error).is_err() {
            trace!("Subscription {} is already terminated", self.request_id);
        }

        delivery.take();
    }

    pub(crate) fn is_terminated(&self) -> bool {
        self.error.get().is_some()
    }
}

/// Make subscription state with a queue of `capacity` results
pub(crate) fn channel<R: Send + 'static>(
    request_id: u64,
    unsubscribe_method: &str,
    shape: ResultShape<R>,
    capacity: usize,
) -> (Arc<SubscriptionState>, Receiver<R>) {
    let (sender, receiver) = mpsc::channel(capacity);

    let state = SubscriptionState::new(
        request_id,
        unsubscribe_method,
        Box::new(TypedDelivery { shape, sender }),
    );

    (Arc::new(state), receiver)
}

/// Live subscription handle.
///
/// Results are read with [Subscription::receive], or by using the handle as a [Stream].
/// Dropping the handle unsubscribes
pub struct Subscription<R> {
    state: Arc<SubscriptionState>,
    receiver: Receiver<R>,
    client: Arc<ClientShared>,
    /// Stream has returned its last item
    finished: bool,
}

impl<R> Subscription<R> {
    pub(crate) fn new(
        state: Arc<SubscriptionState>,
        receiver: Receiver<R>,
        client: Arc<ClientShared>,
    ) -> Self {
        Self {
            state,
            receiver,
            client,
            finished: false,
        }
    }

    /// Id of the subscription request
    pub fn request_id(&self) -> u64 {
        self.state.request_id()
    }

    /// Server assigned id. `None` until the server acknowledges the subscription
    pub fn subscription_id(&self) -> Option<u64> {
        self.state.subscription_id()
    }

    /// Wait for the next result.
    /// Returns queued results first, then the terminal error. Once returned, the error is
    /// returned on every subsequent call. Manual unsubscription ends with [Error::Unsubscribed]
    pub async fn receive(&mut self) -> crate::Result<R> {
        match self.receiver.recv().await {
            Some(value) => Ok(value),
            None => Err(self.terminal_error()),
        }
    }

    /// Stop the subscription and notify the server.
    /// Subsequent calls do nothing. Returns an error if failed to send unsubscription request
    pub async fn unsubscribe(&self) -> crate::Result<()> {
        match self
            .client
            .close_subscription(&self.state, Error::Unsubscribed)
        {
            Some(ack) => ack.await.unwrap_or(Err(Error::PeerDisconnected)),
            None => Ok(()),
        }
    }

    fn terminal_error(&self) -> Error {
        self.state.error().cloned().unwrap_or_else(|| {
            Error::InternalError("Subscription queue closed without an error".into())
        })
    }
}

impl<R> Drop for Subscription<R> {
    fn drop(&mut self) {
        if !self.state.is_terminated() {
            let _ = self
                .client
                .close_subscription(&self.state, Error::SubscriptionDropped);
        }
    }
}

impl<R> Unpin for Subscription<R> {}

impl<R> Stream for Subscription<R> {
    type Item = crate::Result<R>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if this.finished {
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(value)) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(None) => {
                this.finished = true;

                match this.terminal_error() {
                    Error::Unsubscribed => Poll::Ready(None),
                    e => Poll::Ready(Some(Err(e))),
                }
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<R> FusedStream for Subscription<R> {
    fn is_terminated(&self) -> bool {
        self.finished
    }
}

impl<R> fmt::Debug for Subscription<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("request_id", &self.request_id())
            .field("subscription_id", &self.subscription_id())
            .field("unsubscribe_method", &self.state.unsubscribe_method())
            .finish()
    }
}
