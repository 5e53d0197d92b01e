//! JSON-RPC adapter for the chain gateway service. The gateway owns signing,
//! nonce management and the node connections; this side only shapes requests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

use super::models::{
    ChainId, EventQuery, ForeignRequest, HomeRequest, Question, QuestionId, RawEvent,
};
use super::{ChainApi, ForeignChainApi, HomeChainApi};
use crate::error::{AppResult, ChainError};

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// Thin JSON-RPC 2.0 client for one gateway endpoint
pub struct GatewayClient {
    http: reqwest::Client,
    endpoint: String,
    next_id: AtomicU64,
}

impl GatewayClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport {
                method: "client_init".to_string(),
                message: e.to_string(),
            })?;

        Ok(Self {
            http,
            endpoint: endpoint.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> AppResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(endpoint = %self.endpoint, method, id, "gateway call");

        let transport = |e: reqwest::Error| ChainError::Transport {
            method: method.to_string(),
            message: e.to_string(),
        };

        let response = self
            .http
            .post(&self.endpoint)
            .json(&RpcRequest {
                jsonrpc: "2.0",
                id,
                method,
                params,
            })
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;

        let body: RpcResponse<T> = response.json().await.map_err(|e| ChainError::Decode {
            method: method.to_string(),
            message: e.to_string(),
        })?;

        decode_response(method, body)
    }

    async fn chain_id(&self) -> AppResult<ChainId> {
        self.call("chain_id", json!([])).await.map(ChainId)
    }

    async fn block_number(&self) -> AppResult<u64> {
        self.call("block_number", json!([])).await
    }

    async fn past_events(&self, event: &str, query: &EventQuery) -> AppResult<Vec<RawEvent>> {
        self.call(
            "get_past_events",
            json!({
                "event": event,
                "filter": query.filter,
                "fromBlock": query.from_block,
                "toBlock": query.to_block,
            }),
        )
        .await
    }
}

fn decode_response<T>(method: &str, body: RpcResponse<T>) -> AppResult<T> {
    match body {
        RpcResponse {
            error: Some(error), ..
        } => Err(ChainError::Rpc {
            method: method.to_string(),
            code: error.code,
            message: error.message,
        }
        .into()),
        RpcResponse {
            result: Some(result),
            ..
        } => Ok(result),
        _ => Err(ChainError::Decode {
            method: method.to_string(),
            message: "response carried neither result nor error".to_string(),
        }
        .into()),
    }
}

/// Gateway endpoint in front of the home proxy
pub struct HomeGateway {
    client: GatewayClient,
}

impl HomeGateway {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainApi for HomeGateway {
    async fn chain_id(&self) -> AppResult<ChainId> {
        self.client.chain_id().await
    }

    async fn block_number(&self) -> AppResult<u64> {
        self.client.block_number().await
    }

    async fn past_events(&self, event: &str, query: &EventQuery) -> AppResult<Vec<RawEvent>> {
        self.client.past_events(event, query).await
    }
}

#[async_trait]
impl HomeChainApi for HomeGateway {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.client.call("get_request", json!([question_id])).await
    }

    async fn get_question(&self, question_id: &QuestionId) -> AppResult<Question> {
        self.client.call("get_question", json!([question_id])).await
    }

    async fn handle_notified_request(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.client
            .call("handle_notified_request", json!([question_id]))
            .await
    }

    async fn handle_finalized_question(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<HomeRequest> {
        self.client
            .call("handle_finalized_question", json!([question_id]))
            .await
    }

    async fn handle_changed_answer(&self, question_id: &QuestionId) -> AppResult<HomeRequest> {
        self.client
            .call("handle_changed_answer", json!([question_id]))
            .await
    }

    async fn report_arbitration_answer(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<HomeRequest> {
        self.client
            .call("report_arbitration_answer", json!([question_id]))
            .await
    }
}

/// Gateway endpoint in front of the foreign proxy
pub struct ForeignGateway {
    client: GatewayClient,
}

impl ForeignGateway {
    pub fn new(client: GatewayClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChainApi for ForeignGateway {
    async fn chain_id(&self) -> AppResult<ChainId> {
        self.client.chain_id().await
    }

    async fn block_number(&self) -> AppResult<u64> {
        self.client.block_number().await
    }

    async fn past_events(&self, event: &str, query: &EventQuery) -> AppResult<Vec<RawEvent>> {
        self.client.past_events(event, query).await
    }
}

#[async_trait]
impl ForeignChainApi for ForeignGateway {
    async fn get_request(&self, question_id: &QuestionId) -> AppResult<ForeignRequest> {
        self.client.call("get_request", json!([question_id])).await
    }

    async fn handle_failed_dispute_creation(
        &self,
        question_id: &QuestionId,
    ) -> AppResult<ForeignRequest> {
        self.client
            .call("handle_failed_dispute_creation", json!([question_id]))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::models::HomeStatus;
    use crate::error::AppError;

    #[test]
    fn test_decode_result() {
        let body: RpcResponse<HomeRequest> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":{"status":"Pending","requester":"0xabc"}}"#,
        )
        .unwrap();

        let request = decode_response("get_request", body).unwrap();
        assert_eq!(request.status, HomeStatus::Pending);
    }

    #[test]
    fn test_decode_rpc_error() {
        let body: RpcResponse<u64> = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":2,"error":{"code":-32000,"message":"execution reverted"}}"#,
        )
        .unwrap();

        match decode_response("block_number", body) {
            Err(AppError::Chain(ChainError::Rpc { code, message, .. })) => {
                assert_eq!(code, -32000);
                assert_eq!(message, "execution reverted");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_decode_empty_response() {
        let body: RpcResponse<u64> = serde_json::from_str(r#"{"jsonrpc":"2.0","id":3}"#).unwrap();
        assert!(matches!(
            decode_response("block_number", body),
            Err(AppError::Chain(ChainError::Decode { .. }))
        ));
    }

    #[test]
    fn test_request_shape() {
        let request = RpcRequest {
            jsonrpc: "2.0",
            id: 9,
            method: "get_past_events",
            params: json!({"event": "RequestAccepted", "fromBlock": 1, "toBlock": 5}),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["method"], "get_past_events");
        assert_eq!(value["params"]["toBlock"], 5);
    }
}
