use std::pin::Pin;

use futures::{future, Sink, SinkExt as _, Stream, StreamExt as _};
use log::{debug, trace};
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
};

use crate::Error;

/// Outgoing text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = Error> + Send>>;

/// Incoming text frames. Any error is fatal for the connection
pub type FrameStream = Pin<Box<dyn Stream<Item = crate::Result<String>> + Send>>;

/// Connect to a websocket `address` and split it into text frames sink and stream
pub async fn connect_websocket(address: &str) -> crate::Result<(FrameSink, FrameStream)> {
    let (socket, response) = connect_async(address)
        .await
        .map_err(|e| Error::Connect(e.to_string()))?;

    debug!("Connected to {address}: {}", response.status());

    let (sink, stream) = socket.split();

    let sink = sink
        .with(|text: String| future::ready(Ok::<_, WsError>(Message::Text(text))))
        .sink_map_err(|e| Error::Transport(e.to_string()));

    let stream = stream.filter_map(|message| future::ready(text_frame(message)));

    Ok((Box::pin(sink), Box::pin(stream)))
}

/// Convert a websocket message into a text frame. Control frames are skipped
fn text_frame(message: Result<Message, WsError>) -> Option<crate::Result<String>> {
    match message {
        Ok(Message::Text(text)) => Some(Ok(text)),
        Ok(Message::Binary(data)) => Some(
            String::from_utf8(data).map_err(|e| Error::Transport(format!("Non UTF-8 frame: {e}"))),
        ),
        Ok(Message::Close(frame)) => {
            debug!("Peer closed the websocket: {frame:?}");
            Some(Err(Error::PeerDisconnected))
        }
        Ok(message) => {
            trace!("Skipping control frame: {message:?}");
            None
        }
        Err(e) => Some(Err(Error::Transport(e.to_string()))),
    }
}
