use std::sync::Arc;

use futures::{
    channel::oneshot::{channel as one_channel, Receiver as OneReceiver, Sender as OneSender},
    SinkExt as _,
};
use log::{debug, trace, warn};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::{
    message::RpcRequest,
    message_stream::FrameSink,
    monitor::{Direction, Monitor, MonitorEvent},
    Error,
};

/// Resolves when the frame has been written into the transport
pub(crate) type WriteAck = OneReceiver<crate::Result<()>>;

enum Command {
    Frame {
        text: String,
        ack: OneSender<crate::Result<()>>,
    },
    Close,
}

/// Writer handle. Frames are written by a single writer task, so concurrent writers
/// never interleave. Enqueueing never blocks
#[derive(Clone)]
pub(crate) struct RpcWriter {
    sender: UnboundedSender<Command>,
}

impl RpcWriter {
    /// Spawn a writer task owning the `sink`
    pub(crate) fn spawn(sink: FrameSink, monitor: Arc<dyn Monitor>) -> Self {
        let (sender, receiver) = unbounded_channel();

        tokio::spawn(write_loop(sink, receiver, monitor));

        Self { sender }
    }

    /// Encode and enqueue a request
    pub(crate) fn enqueue(&self, request: &RpcRequest) -> crate::Result<WriteAck> {
        let text = request.encode()?;
        let (ack, result) = one_channel();

        self.sender
            .send(Command::Frame { text, ack })
            .map_err(|_| Error::PeerDisconnected)?;

        Ok(result)
    }

    /// Write a request and wait until it's written into the transport
    pub(crate) async fn write(&self, request: &RpcRequest) -> crate::Result<()> {
        self.enqueue(request)?
            .await
            .unwrap_or(Err(Error::PeerDisconnected))
    }

    /// Close the transport after writing already enqueued frames
    pub(crate) fn close(&self) {
        if self.sender.send(Command::Close).is_err() {
            trace!("Writer is already closed");
        }
    }
}

async fn write_loop(
    mut sink: FrameSink,
    mut receiver: UnboundedReceiver<Command>,
    monitor: Arc<dyn Monitor>,
) {
    while let Some(command) = receiver.recv().await {
        match command {
            Command::Frame { text, ack } => {
                trace!("Outgoing frame: {text}");

                let result = sink.send(text.clone()).await;
                match &result {
                    Ok(_) => monitor.on_event(&MonitorEvent::Frame {
                        direction: Direction::Outgoing,
                        frame: &text,
                    }),
                    Err(e) => warn!("Failed to write outgoing frame: {e}"),
                }

                if ack.send(result).is_err() {
                    trace!("Writer wasn't waiting for a write result")
                }
            }
            Command::Close => {
                debug!("Closing transport");

                if let Err(e) = sink.close().await {
                    debug!("Error closing transport: {e}");
                }
                break;
            }
        }
    }

    // Frames enqueued after close resolve with `PeerDisconnected`
    receiver.close();
}
