//! Typed subscriptions for well known methods

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    config::{Commitment, SubscribeConfig},
    message::RequestParams,
    rpc::Client,
    subscription::{ResultShape, Subscription},
};

pub const PROGRAM_SUBSCRIBE: &str = "programSubscribe";
pub const PROGRAM_UNSUBSCRIBE: &str = "programUnsubscribe";
pub const ROOT_SUBSCRIBE: &str = "rootSubscribe";
pub const ROOT_UNSUBSCRIBE: &str = "rootUnsubscribe";

/// Notification context
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RpcContext {
    pub slot: u64,
}

/// Program account notification. The account value is left undecoded
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgramResult {
    pub context: RpcContext,
    pub value: Value,
}

impl Client {
    /// Subscribe to program account changes
    pub async fn program_subscribe(
        &self,
        program_id: &str,
        commitment: Option<Commitment>,
    ) -> crate::Result<Subscription<ProgramResult>> {
        let params = RequestParams::new(vec![Value::from(program_id)])
            .with_config(SubscribeConfig::new().with_commitment(commitment));

        self.subscribe(
            params,
            PROGRAM_SUBSCRIBE,
            PROGRAM_UNSUBSCRIBE,
            ResultShape::json(),
        )
        .await
    }

    /// Subscribe to new roots. Each notification is a slot number
    pub async fn root_subscribe(&self) -> crate::Result<Subscription<u64>> {
        self.subscribe(
            RequestParams::default(),
            ROOT_SUBSCRIBE,
            ROOT_UNSUBSCRIBE,
            ResultShape::json(),
        )
        .await
    }
}
