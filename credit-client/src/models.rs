use crate::abi::Token;
use crate::types::Address;
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Certification request as stored by the contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificationRequest {
    pub id: u64,
    pub submitter: Address,
    pub report_uri: String,
    pub requested_amount: u128,
    pub approved_amount: u128,
    pub verified: bool,
    pub minted: bool,
    pub timestamp: DateTime<Utc>,
    pub admin_notes: String,
}

impl CertificationRequest {
    /// Build from the contract's request record
    /// `(submitter, reportURI, requestedAmount, approvedAmount, verified, minted, timestamp, adminNotes)`
    pub fn from_tokens(id: u64, tokens: Vec<Token>) -> Result<Self> {
        let shape_error = || Error::Abi(format!("unexpected layout for request {}", id));

        let mut fields = tokens.into_iter();
        let mut next = || fields.next().ok_or_else(shape_error);

        let submitter = next()?.into_address().ok_or_else(shape_error)?;
        let report_uri = next()?.into_string().ok_or_else(shape_error)?;
        let requested_amount = next()?.into_uint().ok_or_else(shape_error)?;
        let approved_amount = next()?.into_uint().ok_or_else(shape_error)?;
        let verified = next()?.into_bool().ok_or_else(shape_error)?;
        let minted = next()?.into_bool().ok_or_else(shape_error)?;
        let seconds = next()?.into_uint().ok_or_else(shape_error)?;
        let admin_notes = next()?.into_string().ok_or_else(shape_error)?;

        let timestamp = i64::try_from(seconds)
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
            .ok_or_else(|| Error::Abi(format!("request {} has an invalid timestamp {}", id, seconds)))?;

        Ok(CertificationRequest {
            id,
            submitter,
            report_uri,
            requested_amount,
            approved_amount,
            verified,
            minted,
            timestamp,
            admin_notes,
        })
    }

    /// Display stage derived from the flags
    pub fn stage(&self) -> RequestStage {
        match (self.minted, self.verified, self.approved_amount > 0) {
            (true, _, _) => RequestStage::Minted,
            (false, true, true) => RequestStage::ReadyToMint,
            (false, true, false) => RequestStage::Verified,
            (false, false, true) => RequestStage::Approved,
            (false, false, false) => RequestStage::Pending,
        }
    }
}

/// Where a request sits in its lifecycle, for display only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStage {
    Pending,
    Approved,
    Verified,
    ReadyToMint,
    Minted,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RequestStage::Pending => "pending",
            RequestStage::Approved => "approved, awaiting verification",
            RequestStage::Verified => "verified, awaiting approval",
            RequestStage::ReadyToMint => "ready to mint",
            RequestStage::Minted => "minted",
        };
        f.write_str(label)
    }
}

/// Role snapshot for one account
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Roles {
    pub admin: bool,
    pub certifier: bool,
    pub government: bool,
}

/// Connected signing identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub account: Address,
    pub chain_id: u64,
    pub expected_chain_id: u64,
}

impl Identity {
    pub fn wrong_network(&self) -> bool {
        self.chain_id != self.expected_chain_id
    }
}

/// Interface diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InterfaceDescription {
    pub address: Address,
    /// Functions the descriptor declares
    pub operations: Vec<String>,
    /// Required operations it does not declare usably
    pub missing: Vec<String>,
}

/// One row of the request listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RequestEntry {
    Loaded(CertificationRequest),
    Failed { id: u64, error: String },
}

impl RequestEntry {
    pub fn id(&self) -> u64 {
        match self {
            RequestEntry::Loaded(request) => request.id,
            RequestEntry::Failed { id, .. } => *id,
        }
    }
}

/// Input of `submit_request`
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct SubmitCertification {
    #[validate(custom(function = "not_blank", message = "report URI must not be empty"))]
    pub report_uri: String,
    #[validate(range(min = 1, message = "amount must be greater than zero"))]
    pub amount: i64,
}

impl SubmitCertification {
    pub fn new(report_uri: &str, amount: i64) -> Self {
        SubmitCertification {
            report_uri: report_uri.to_string(),
            amount,
        }
    }
}

/// The URI is opaque; only an all-whitespace value is rejected
fn not_blank(value: &str) -> std::result::Result<(), validator::ValidationError> {
    if value.trim().is_empty() {
        return Err(validator::ValidationError::new("blank"));
    }
    Ok(())
}

/// Input of `approve`
#[derive(Debug, Clone, Deserialize, Serialize, validator::Validate)]
pub struct ApproveAmount {
    pub request_id: u64,
    #[validate(range(min = 1, message = "approved amount must be greater than zero"))]
    pub approved_amount: i64,
    pub notes: String,
}
