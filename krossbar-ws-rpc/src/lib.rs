/*!
JSON-RPC subscriptions client used by Krossbar services to consume websocket notification streams.

The library:
- Multiplexes any number of subscriptions over a single websocket connection;
- Routes server acknowledgements and notifications into per-subscription queues from a single reader task;
- Never blocks the reader on a slow subscriber: a subscription which overflows its queue is closed with [Error::CapacityExceeded];
- Propagates connection failures into every live subscription.

Use [rpc::Client::subscribe] to make a subscription, and [subscription::Subscription::receive] to read results.
A subscription is also a [futures::Stream].

# Examples

Typed subscription:
```
use krossbar_ws_rpc::{config::Commitment, rpc::Client};

async fn program() {
    let client = Client::connect("ws://127.0.0.1:8900").await.unwrap();

    let mut subscription = client
        .program_subscribe("ProgramX", Some(Commitment::Finalized))
        .await
        .unwrap();

    loop {
        match subscription.receive().await {
            Ok(result) => println!("Slot {}: {:?}", result.context.slot, result.value),
            Err(e) => {
                println!("Subscription closed: {e}");
                return;
            }
        }
    }
}
```

Custom method and result shape:
```
use futures::StreamExt;
use serde_json::json;

use krossbar_ws_rpc::{
    config::SubscribeConfig, message::RequestParams, rpc::Client, subscription::ResultShape,
};

async fn slots() {
    let client = Client::connect("ws://127.0.0.1:8900").await.unwrap();

    let params = RequestParams::new(vec![json!("Vote111111111111111111111111111111111111111")])
        .with_config(SubscribeConfig::new().with_encoding("base64"));

    let subscription = client
        .subscribe(
            params,
            "accountSubscribe",
            "accountUnsubscribe",
            ResultShape::<serde_json::Value>::json(),
        )
        .await
        .unwrap();

    let results = subscription.take(2).collect::<Vec<krossbar_ws_rpc::Result<_>>>().await;
    println!("Account updates: {results:?}");
}
```

See `tests/` for more examples.
*/

pub mod config;
mod error;
pub mod message;
mod message_stream;
pub mod methods;
pub mod monitor;
pub mod rpc;
pub mod subscription;
mod subscriptions_registry;
mod writer;

pub use error::*;
pub use message_stream::{connect_websocket, FrameSink, FrameStream};

/// Connect to a websocket `address` with default config
pub async fn connect(address: &str) -> Result<rpc::Client> {
    rpc::Client::connect(address).await
}
