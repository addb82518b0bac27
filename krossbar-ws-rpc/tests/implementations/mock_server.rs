use std::time::Duration;

use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    SinkExt as _, StreamExt as _,
};
use serde_json::{json, Value};
use tokio::time::{sleep, timeout};

use krossbar_ws_rpc::{config::ClientConfig, rpc::Client, Error};

const TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Scripted server side of an in-memory transport
pub struct MockServer {
    /// Frames written by the client
    requests: UnboundedReceiver<String>,
    /// Frames to read by the client
    frames: UnboundedSender<krossbar_ws_rpc::Result<String>>,
}

/// Make a client connected to a mock server
pub fn connect(config: ClientConfig) -> (Client, MockServer) {
    let (requests_tx, requests) = unbounded::<String>();
    let (frames, frames_rx) = unbounded();

    let client = Client::with_transport(
        requests_tx.sink_map_err(|_| Error::PeerDisconnected),
        frames_rx,
        config,
    );

    (client, MockServer { requests, frames })
}

impl MockServer {
    /// Next request written by the client
    pub async fn next_request(&mut self) -> Value {
        self.try_next_request()
            .await
            .expect("Client closed the transport")
    }

    /// Next request, or `None` if the client closed the transport
    pub async fn try_next_request(&mut self) -> Option<Value> {
        let frame = timeout(TIMEOUT, self.requests.next())
            .await
            .expect("Timed out waiting for a client request")?;

        Some(serde_json::from_str(&frame).expect("Client sent invalid JSON"))
    }

    /// If the client hasn't written anything new
    pub fn no_pending_requests(&mut self) -> bool {
        self.requests.try_next().is_err()
    }

    /// Stop reading client requests. Subsequent client writes fail
    pub fn close_requests(&mut self) {
        self.requests.close();
        while let Ok(Some(_)) = self.requests.try_next() {}
    }

    pub fn send(&self, frame: Value) {
        self.send_raw(&frame.to_string())
    }

    pub fn send_raw(&self, frame: &str) {
        self.frames
            .unbounded_send(Ok(frame.to_owned()))
            .expect("Client stopped reading")
    }

    pub fn acknowledge(&self, request_id: u64, subscription_id: u64) {
        self.send(json!({"jsonrpc": "2.0", "result": subscription_id, "id": request_id}))
    }

    pub fn notify(&self, subscription_id: u64, result: Value) {
        self.send(json!({
            "jsonrpc": "2.0",
            "method": "notification",
            "params": {"subscription": subscription_id, "result": result}
        }))
    }

    /// Fail the client transport with `error`
    pub fn fail(&self, error: Error) {
        self.frames
            .unbounded_send(Err(error))
            .expect("Client stopped reading")
    }

    /// Close the client read side
    pub fn disconnect(&mut self) {
        self.frames.close_channel()
    }
}

pub fn request_id(request: &Value) -> u64 {
    request["id"].as_u64().expect("Request without an id")
}

/// Wait until `condition` is true
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    timeout(TIMEOUT, async {
        while !condition() {
            sleep(POLL_INTERVAL).await
        }
    })
    .await
    .expect("Timed out waiting for a condition")
}

pub fn init_logger() {
    let _ = pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Debug)
        .try_init();
}
