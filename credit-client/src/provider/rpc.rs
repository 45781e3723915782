//! JSON-RPC signing provider
//!
//! Talks JSON-RPC 2.0 over HTTP to a wallet or node that holds the signing
//! account and signs `eth_sendTransaction` requests itself.

use super::{
    ProviderError, ProviderResult, SigningProvider, TransactionReceipt, TransactionRequest,
};
use crate::types::{Address, TransactionId};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

/// HTTP JSON-RPC provider
pub struct JsonRpcProvider {
    url: String,
    client: Client,
    next_id: AtomicU64,
}

impl JsonRpcProvider {
    /// Create a provider for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> ProviderResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        Ok(Self {
            url: url.into(),
            client,
            next_id: AtomicU64::new(1),
        })
    }

    async fn request<T: DeserializeOwned>(&self, method: &str, params: Value) -> ProviderResult<T> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "JSON-RPC request");

        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": id,
                "method": method,
                "params": params,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Transport(format!(
                "HTTP {} from {}: {}",
                status.as_u16(),
                method,
                body.trim()
            )));
        }

        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", method, e)))?;

        if let Some(error) = envelope.error {
            debug!(method, id, code = error.code, "JSON-RPC error: {}", error.message);
            return Err(ProviderError::Rpc {
                code: error.code,
                message: error.message,
                data: error.data.as_ref().and_then(revert_data),
            });
        }

        serde_json::from_value(envelope.result)
            .map_err(|e| ProviderError::InvalidResponse(format!("{}: {}", method, e)))
    }
}

/// Revert data is either a hex string or nested one level inside an object
fn revert_data(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => map.get("data").and_then(revert_data),
        _ => None,
    }
}

fn transaction_object(tx: &TransactionRequest) -> Value {
    let mut object = json!({
        "from": tx.from.to_string(),
        "to": tx.to.to_string(),
        "data": format!("0x{}", hex::encode(&tx.data)),
    });
    if let Some(gas) = tx.gas {
        object["gas"] = Value::String(format!("{:#x}", gas));
    }
    object
}

fn parse_quantity(raw: &str) -> ProviderResult<u64> {
    let digits = raw.trim().trim_start_matches("0x");
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| ProviderError::InvalidResponse(format!("bad quantity '{}': {}", raw, e)))
}

fn parse_data(raw: &str) -> ProviderResult<Vec<u8>> {
    hex::decode(raw.trim().trim_start_matches("0x"))
        .map_err(|e| ProviderError::InvalidResponse(format!("bad hex data: {}", e)))
}

#[async_trait]
impl SigningProvider for JsonRpcProvider {
    fn name(&self) -> &str {
        "json-rpc"
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        let accounts: Vec<String> = self.request("eth_requestAccounts", json!([])).await?;
        accounts
            .iter()
            .map(|a| {
                a.parse()
                    .map_err(|_| ProviderError::InvalidResponse(format!("bad account '{}'", a)))
            })
            .collect()
    }

    async fn chain_id(&self) -> ProviderResult<u64> {
        let raw: String = self.request("eth_chainId", json!([])).await?;
        parse_quantity(&raw)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> ProviderResult<u64> {
        let raw: String = self
            .request("eth_estimateGas", json!([transaction_object(tx)]))
            .await?;
        parse_quantity(&raw)
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> ProviderResult<TransactionId> {
        let hash: String = self
            .request("eth_sendTransaction", json!([transaction_object(tx)]))
            .await?;
        Ok(TransactionId::new(hash))
    }

    async fn transaction_receipt(
        &self,
        hash: &TransactionId,
    ) -> ProviderResult<Option<TransactionReceipt>> {
        let raw: Option<RawReceipt> = self
            .request("eth_getTransactionReceipt", json!([hash.as_str()]))
            .await?;

        raw.map(|receipt| {
            Ok(TransactionReceipt {
                transaction_hash: TransactionId::new(receipt.transaction_hash),
                block_number: receipt.block_number.as_deref().map(parse_quantity).transpose()?,
                gas_used: receipt.gas_used.as_deref().map(parse_quantity).transpose()?,
                success: match receipt.status.as_deref() {
                    Some(status) => parse_quantity(status)? == 1,
                    None => true,
                },
            })
        })
        .transpose()
    }

    async fn call(&self, tx: &TransactionRequest) -> ProviderResult<Vec<u8>> {
        let raw: String = self
            .request("eth_call", json!([transaction_object(tx), "latest"]))
            .await?;
        parse_data(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> JsonRpcProvider {
        JsonRpcProvider::new(server.uri(), Duration::from_secs(5)).unwrap()
    }

    fn sample_tx() -> TransactionRequest {
        TransactionRequest {
            from: "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap(),
            to: "0x945399948e25415dB05a30D6e0b4134A1882b303".parse().unwrap(),
            data: vec![0xde, 0xad, 0xbe, 0xef],
            gas: None,
        }
    }

    #[tokio::test]
    async fn test_chain_id_and_accounts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_chainId"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0xaa36a7"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_requestAccounts"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": ["0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(provider.chain_id().await.unwrap(), 11_155_111);
        let accounts = provider.request_accounts().await.unwrap();
        assert_eq!(
            accounts[0].to_string(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[tokio::test]
    async fn test_send_transaction_carries_gas_cap() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "eth_sendTransaction",
                "params": [{"data": "0xdeadbeef", "gas": "0x6270"}]
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": "0xfeed"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let hash = provider(&server)
            .send_transaction(&sample_tx().with_gas(25_200))
            .await
            .unwrap();
        assert_eq!(hash.as_str(), "0xfeed");
    }

    #[tokio::test]
    async fn test_rpc_error_keeps_revert_data() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_estimateGas"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": 3, "message": "execution reverted", "data": {"data": "0x08c379a0"}}
            })))
            .mount(&server)
            .await;

        let err = provider(&server).estimate_gas(&sample_tx()).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Rpc {
                code: 3,
                message: "execution reverted".to_string(),
                data: Some("0x08c379a0".to_string()),
            }
        );
        assert!(err.is_revert());
    }

    #[tokio::test]
    async fn test_pending_and_failed_receipts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt", "params": ["0x01"]})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": null})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "eth_getTransactionReceipt", "params": ["0x02"]})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "result": {
                    "transactionHash": "0x02",
                    "blockNumber": "0x10",
                    "gasUsed": "0x5208",
                    "status": "0x0"
                }
            })))
            .mount(&server)
            .await;

        let provider = provider(&server);
        assert_eq!(
            provider
                .transaction_receipt(&TransactionId::new("0x01"))
                .await
                .unwrap(),
            None
        );
        let receipt = provider
            .transaction_receipt(&TransactionId::new("0x02"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.gas_used, Some(21_000));
        assert!(!receipt.success);
    }

    #[tokio::test]
    async fn test_http_failure_is_transport_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let err = provider(&server).call(&sample_tx()).await.unwrap_err();
        assert_eq!(
            err,
            ProviderError::Transport("HTTP 502 from eth_call: bad gateway".to_string())
        );
    }
}
