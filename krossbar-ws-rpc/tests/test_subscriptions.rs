use std::collections::HashMap;

use futures::StreamExt;
use serde_json::json;

use krossbar_ws_rpc::{
    config::{ClientConfig, Commitment},
    message::RequestParams,
    subscription::ResultShape,
    Error,
};

mod implementations;
use implementations::mock_server::{connect, eventually, init_logger, request_id};

const SUBSCRIBE_METHOD: &str = "slotSubscribe";
const UNSUBSCRIBE_METHOD: &str = "slotUnsubscribe";

#[tokio::test]
async fn test_program_subscription() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let mut subscription = client
        .program_subscribe("ProgramX", Some(Commitment::Finalized))
        .await
        .unwrap();

    let request = server.next_request().await;
    assert_eq!(
        request,
        json!({
            "jsonrpc": "2.0",
            "method": "programSubscribe",
            "params": ["ProgramX", {"encoding": "jsonParsed", "commitment": "finalized"}],
            "id": subscription.request_id()
        })
    );
    assert_eq!(subscription.subscription_id(), None);
    assert_eq!(client.pending_subscriptions(), 1);

    server.acknowledge(request_id(&request), 77);
    eventually(|| subscription.subscription_id() == Some(77)).await;
    assert_eq!(client.pending_subscriptions(), 0);
    assert_eq!(client.active_subscriptions(), 1);

    server.notify(
        77,
        json!({"context": {"slot": 5}, "value": {"account": {"lamports": 10}}}),
    );

    let result = subscription.receive().await.unwrap();
    assert_eq!(result.context.slot, 5);
    assert_eq!(result.value["account"]["lamports"], 10);

    // Test formatting here
    assert_eq!(
        format!("{subscription:?}"),
        format!(
            "Subscription {{ request_id: {}, subscription_id: Some(77), unsubscribe_method: \"programUnsubscribe\" }}",
            subscription.request_id()
        )
    );
}

#[tokio::test]
async fn test_malformed_payload() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let mut subscription = client.program_subscribe("ProgramX", None).await.unwrap();

    let request = server.next_request().await;
    assert_eq!(
        request["params"],
        json!(["ProgramX", {"encoding": "jsonParsed"}])
    );

    server.acknowledge(request_id(&request), 77);
    server.notify(77, json!("not a program result"));

    assert!(matches!(
        subscription.receive().await,
        Err(Error::ResultTypeError(_))
    ));
    assert_eq!(client.active_subscriptions(), 0);

    // The error is terminal
    assert!(matches!(
        subscription.receive().await,
        Err(Error::ResultTypeError(_))
    ));

    let unsubscribe = server.next_request().await;
    assert_eq!(unsubscribe["method"], "programUnsubscribe");
    assert_eq!(unsubscribe["params"], json!([77, {}]));
}

#[tokio::test]
async fn test_acknowledgement_routing() {
    init_logger();

    const COUNT: u64 = 8;

    let (client, mut server) = connect(ClientConfig::default());

    let mut subscriptions = Vec::new();
    for index in 0..COUNT {
        let subscription = client
            .subscribe(
                vec![json!(index)],
                SUBSCRIBE_METHOD,
                UNSUBSCRIBE_METHOD,
                ResultShape::<u64>::json(),
            )
            .await
            .unwrap();

        subscriptions.push(subscription);
    }

    // Request id by subscription index
    let mut request_ids = HashMap::new();
    for _ in 0..COUNT {
        let request = server.next_request().await;
        request_ids.insert(request["params"][0].as_u64().unwrap(), request_id(&request));
    }

    let unique_ids: std::collections::HashSet<u64> = request_ids.values().copied().collect();
    assert_eq!(unique_ids.len() as u64, COUNT);

    // Acknowledge in reverse order
    for index in (0..COUNT).rev() {
        server.acknowledge(request_ids[&index], 100 + index);
    }

    eventually(|| client.active_subscriptions() == COUNT as usize).await;

    for (index, subscription) in subscriptions.iter().enumerate() {
        assert_eq!(subscription.subscription_id(), Some(100 + index as u64));
    }

    for index in (0..COUNT).rev() {
        server.notify(100 + index, json!(index * 10));
    }

    for (index, subscription) in subscriptions.iter_mut().enumerate() {
        assert_eq!(subscription.receive().await.unwrap(), index as u64 * 10);
    }
}

#[tokio::test]
async fn test_notification_order() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let mut first = client
        .subscribe(
            vec![json!(1)],
            SUBSCRIBE_METHOD,
            UNSUBSCRIBE_METHOD,
            ResultShape::<u64>::json(),
        )
        .await
        .unwrap();
    let mut second = client
        .subscribe(
            vec![json!(2)],
            SUBSCRIBE_METHOD,
            UNSUBSCRIBE_METHOD,
            ResultShape::<u64>::json(),
        )
        .await
        .unwrap();

    {
        let request = server.next_request().await;
        server.acknowledge(request_id(&request), 1);
    }
    {
        let request = server.next_request().await;
        server.acknowledge(request_id(&request), 2);
    }

    for value in 0..50 {
        server.notify(1, json!(value));
        server.notify(2, json!(1000 + value));
    }

    for value in 0..50 {
        assert_eq!(first.receive().await.unwrap(), value);
    }

    for value in 0..50 {
        assert_eq!(second.receive().await.unwrap(), 1000 + value);
    }
}

#[tokio::test]
async fn test_unroutable_frames_are_dropped() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let mut subscription = client.root_subscribe().await.unwrap();

    let request = server.next_request().await;
    assert_eq!(request["method"], "rootSubscribe");
    assert_eq!(request["params"], json!([{}]));

    // Nothing of this should break the connection
    server.send_raw("not a json");
    server.send_raw(r#"{"jsonrpc":"2.0"}"#);
    server.notify(999, json!(1));
    server.acknowledge(12345, 6);
    server.send(json!({"jsonrpc": "2.0", "error": {"code": -32700, "message": "Parse error"}, "id": null}));

    server.acknowledge(request_id(&request), 3);
    server.notify(3, json!(420));

    assert_eq!(subscription.receive().await.unwrap(), 420);
    assert_eq!(client.active_subscriptions(), 1);
}

#[tokio::test]
async fn test_custom_result_shape() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let shape = ResultShape::new(|payload| {
        let value: serde_json::Value = serde_json::from_str(payload.get())
            .map_err(|e| Error::ResultTypeError(e.to_string()))?;

        value["slot"]
            .as_u64()
            .ok_or_else(|| Error::ResultTypeError("No slot".into()))
    });

    let params = RequestParams::new(vec![]).with_config(
        krossbar_ws_rpc::config::SubscribeConfig::empty().with_option("filter", json!("all")),
    );

    let mut subscription = client
        .subscribe(params, SUBSCRIBE_METHOD, UNSUBSCRIBE_METHOD, shape)
        .await
        .unwrap();

    let request = server.next_request().await;
    assert_eq!(request["params"], json!([{"filter": "all"}]));

    server.acknowledge(request_id(&request), 8);
    server.notify(8, json!({"slot": 11, "parent": 10}));
    server.notify(8, json!({"parent": 11}));

    assert_eq!(subscription.receive().await.unwrap(), 11);
    assert!(matches!(
        subscription.receive().await,
        Err(Error::ResultTypeError(message)) if message == "No slot"
    ));
}

#[tokio::test]
async fn test_subscription_stream() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let subscription = client.root_subscribe().await.unwrap();

    {
        let request = server.next_request().await;
        server.acknowledge(request_id(&request), 4);
    }
    server.notify(4, json!(420));
    server.notify(4, json!(421));

    let response = subscription
        .take(2)
        .collect::<Vec<krossbar_ws_rpc::Result<u64>>>()
        .await;

    assert!(matches!(response[0], Ok(420)));
    assert!(matches!(response[1], Ok(421)));
}

#[tokio::test]
async fn test_stream_ends_with_terminal_error() {
    init_logger();

    let (client, mut server) = connect(ClientConfig::default());

    let subscription = client.root_subscribe().await.unwrap();

    {
        let request = server.next_request().await;
        server.acknowledge(request_id(&request), 4);
    }
    server.notify(4, json!(420));
    server.notify(4, json!("invalid"));

    let response = subscription
        .collect::<Vec<krossbar_ws_rpc::Result<u64>>>()
        .await;

    assert_eq!(response.len(), 2);
    assert!(matches!(response[0], Ok(420)));
    assert!(matches!(response[1], Err(Error::ResultTypeError(_))));
}
