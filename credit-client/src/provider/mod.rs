//! Signing provider interface
//!
//! The explicit stand-in for a wallet capability: it exposes the connected
//! accounts and the node operations the client needs. Signing happens behind
//! the provider; this crate never sees key material.

pub mod mock;
pub mod rpc;

use crate::abi;
use crate::types::{Address, TransactionId};
use async_trait::async_trait;
use thiserror::Error;

pub use mock::{CallKind, MockLedger, RecordedCall};
pub use rpc::JsonRpcProvider;

/// Result type for provider operations
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Raw provider failures, normalized by the client before reaching callers
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Network or HTTP failure
    #[error("transport error: {0}")]
    Transport(String),

    /// JSON-RPC error object
    #[error("{message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message
        message: String,
        /// Hex-encoded revert data, when the node supplies it
        data: Option<String>,
    },

    /// Response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(err.to_string())
    }
}

impl ProviderError {
    /// Whether the contract itself rejected the call
    pub fn is_revert(&self) -> bool {
        match self {
            ProviderError::Rpc { code, message, data } => {
                *code == 3
                    || message.to_lowercase().contains("revert")
                    || data
                        .as_deref()
                        .and_then(decode_hex)
                        .and_then(|bytes| abi::decode_revert_reason(&bytes))
                        .is_some()
            }
            _ => false,
        }
    }

    /// Revert reason from the error data, or from the message text
    pub fn revert_reason(&self) -> Option<String> {
        let ProviderError::Rpc { message, data, .. } = self else {
            return None;
        };

        if let Some(reason) = data
            .as_deref()
            .and_then(decode_hex)
            .and_then(|bytes| abi::decode_revert_reason(&bytes))
        {
            return Some(reason);
        }

        message
            .split_once("execution reverted:")
            .map(|(_, reason)| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
    }
}

fn decode_hex(data: &str) -> Option<Vec<u8>> {
    hex::decode(data.trim().trim_start_matches("0x")).ok()
}

/// Call or transaction against the contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Signing account
    pub from: Address,
    /// Contract address
    pub to: Address,
    /// Calldata (selector and encoded arguments)
    pub data: Vec<u8>,
    /// Gas cap; unset while estimating
    pub gas: Option<u64>,
}

impl TransactionRequest {
    /// Same call with a gas cap attached
    pub fn with_gas(mut self, gas: u64) -> Self {
        self.gas = Some(gas);
        self
    }
}

/// Receipt of a mined transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    /// Transaction hash
    pub transaction_hash: TransactionId,
    /// Block the transaction was included in
    pub block_number: Option<u64>,
    /// Gas consumed
    pub gas_used: Option<u64>,
    /// False when execution reverted on-chain
    pub success: bool,
}

/// Wallet-like signing capability
#[async_trait]
pub trait SigningProvider: Send + Sync {
    /// Provider name, for logs
    fn name(&self) -> &str;

    /// Accounts the provider can sign for; the first one is used
    async fn request_accounts(&self) -> ProviderResult<Vec<Address>>;

    /// Chain id of the connected network
    async fn chain_id(&self) -> ProviderResult<u64>;

    /// Estimated gas for executing `tx` against current state
    async fn estimate_gas(&self, tx: &TransactionRequest) -> ProviderResult<u64>;

    /// Sign and broadcast `tx`
    async fn send_transaction(&self, tx: &TransactionRequest) -> ProviderResult<TransactionId>;

    /// Receipt of a submitted transaction, `None` while still pending
    async fn transaction_receipt(
        &self,
        hash: &TransactionId,
    ) -> ProviderResult<Option<TransactionReceipt>>;

    /// Execute `tx` read-only and return the raw result
    async fn call(&self, tx: &TransactionRequest) -> ProviderResult<Vec<u8>>;
}
