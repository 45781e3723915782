//! # Hydrogen Credit Ledger Client
//!
//! Typed client for the hydrogen credit certificate contract:
//! - Submit, approve, verify and mint certification requests
//! - Read requests, totals and role assignments
//! - Gas estimate with a safety margin before every transaction
//! - One-line normalized errors for every remote failure
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              LedgerClient                │
//! │  validation → descriptor → estimate/send │
//! └───────────────────┬──────────────────────┘
//!                     │ SigningProvider
//!          ┌──────────┴───────────┐
//!   ┌──────▼────────┐     ┌───────▼──────┐
//!   │JsonRpcProvider│     │  MockLedger  │
//!   │ (wallet/node) │     │ (in-memory)  │
//!   └───────────────┘     └──────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms, unused_qualifications)]

pub mod abi;
pub mod client;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod metrics;
pub mod models;
pub mod operation;
pub mod provider;
pub mod types;

pub use client::{ClientSettings, LedgerClient};
pub use config::Config;
pub use descriptor::InterfaceDescriptor;
pub use error::{Error, Result};
pub use models::{
    CertificationRequest, Identity, InterfaceDescription, RequestEntry, RequestStage, Roles,
};
pub use operation::Operation;
pub use provider::{JsonRpcProvider, MockLedger, ProviderError, SigningProvider};
pub use types::{Address, TransactionId};

/// Deployed certificate contract on Sepolia
pub const DEFAULT_CONTRACT_ADDRESS: &str = "0x945399948e25415dB05a30D6e0b4134A1882b303";

/// Sepolia chain id (0xaa36a7)
pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;

/// Block explorer used for transaction links
pub const DEFAULT_EXPLORER_URL: &str = "https://sepolia.etherscan.io";

/// Percentage added on top of gas estimates
pub const DEFAULT_GAS_MARGIN_PERCENT: u64 = 20;
