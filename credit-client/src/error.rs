//! Error types for the ledger client

use crate::provider::ProviderError;
use thiserror::Error;

/// Result type for ledger client operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger client errors
///
/// Every failure crossing the client boundary is one of these kinds. Remote
/// failures are carried as already-normalized one-line messages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad local input, never sent to the ledger
    #[error("Validation error: {0}")]
    Validation(String),

    /// No account is available to sign with
    #[error("No signing identity: {0}")]
    NoSigningIdentity(String),

    /// The interface descriptor does not declare the requested operation
    #[error("Contract operation '{0}' is not declared by the interface descriptor")]
    MissingOperation(String),

    /// Strict construction found undeclared required operations
    #[error("Interface descriptor is missing required operations: {}", .0.join(", "))]
    IncompleteInterface(Vec<String>),

    /// The cost estimate failed, nothing was submitted
    #[error("Cost estimation failed: {0}")]
    EstimationFailure(String),

    /// Submission or remote execution failed
    #[error("{0}")]
    RemoteCall(String),

    /// Connected network differs from the configured one
    #[error("Wrong network: expected chain {expected}, connected to chain {actual}")]
    WrongNetwork {
        /// Configured chain id
        expected: u64,
        /// Chain id reported by the provider
        actual: u64,
    },

    /// ABI encoding or decoding error
    #[error("ABI error: {0}")]
    Abi(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short label used for metrics and structured output
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation_error",
            Error::NoSigningIdentity(_) => "no_signing_identity",
            Error::MissingOperation(_) => "missing_operation",
            Error::IncompleteInterface(_) => "incomplete_interface",
            Error::EstimationFailure(_) => "estimation_failure",
            Error::RemoteCall(_) => "remote_call_error",
            Error::WrongNetwork { .. } => "wrong_network",
            Error::Abi(_) => "abi_error",
            Error::Config(_) => "config_error",
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<validator::ValidationErrors> for Error {
    fn from(err: validator::ValidationErrors) -> Self {
        Error::Validation(single_line(&err.to_string()))
    }
}

/// Render a provider failure as one human-readable line.
///
/// Known failure shapes map to guidance; anything else falls through to
/// `Failed to <action>: <cause>`.
pub fn describe_failure(action: &str, err: &ProviderError) -> String {
    let cause = err.to_string();
    let lowered = cause.to_lowercase();

    let message = if lowered.contains("missing revert data") {
        format!(
            "Failed to {}: the contract call failed without revert data; check the contract \
             interface, your account permissions, whether the contract is paused, and the parameters",
            action
        )
    } else if err.is_revert() {
        match err.revert_reason() {
            Some(reason) => format!(
                "Failed to {}: contract execution reverted: {}",
                action, reason
            ),
            None => format!(
                "Failed to {}: contract execution reverted; check that your account has permission for this operation",
                action
            ),
        }
    } else if cause.trim().is_empty() {
        format!("Failed to {}: unknown error", action)
    } else {
        format!("Failed to {}: {}", action, cause)
    };

    single_line(&message)
}

/// Collapse any whitespace run, including newlines, into a single space
pub(crate) fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}
