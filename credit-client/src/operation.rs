//! Contract operations the client knows how to call

use serde::Serialize;
use std::fmt;

/// Typed name of a contract operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Operation {
    SubmitCertificationRequest,
    VerifyRequest,
    ApproveAmount,
    MintTokens,
    GetRequest,
    GetAllRequests,
    GetMultipleRequests,
    GetTotalRequests,
    AddCertifier,
    AddGovernment,
    DefaultAdminRole,
    CertifierRole,
    GovernmentRole,
    HasRole,
}

impl Operation {
    /// Operations checked against the interface descriptor at construction
    pub const REQUIRED: [Operation; 14] = [
        Operation::SubmitCertificationRequest,
        Operation::VerifyRequest,
        Operation::ApproveAmount,
        Operation::MintTokens,
        Operation::GetRequest,
        Operation::GetAllRequests,
        Operation::GetMultipleRequests,
        Operation::GetTotalRequests,
        Operation::AddCertifier,
        Operation::AddGovernment,
        Operation::DefaultAdminRole,
        Operation::CertifierRole,
        Operation::GovernmentRole,
        Operation::HasRole,
    ];

    /// Function name as declared by the contract
    pub fn name(self) -> &'static str {
        match self {
            Operation::SubmitCertificationRequest => "submitCertificationRequest",
            Operation::VerifyRequest => "verifyRequest",
            Operation::ApproveAmount => "approveAmount",
            Operation::MintTokens => "mintTokens",
            Operation::GetRequest => "getRequest",
            Operation::GetAllRequests => "getAllRequests",
            Operation::GetMultipleRequests => "getMultipleRequests",
            Operation::GetTotalRequests => "getTotalRequests",
            Operation::AddCertifier => "addCertifier",
            Operation::AddGovernment => "addGovernment",
            Operation::DefaultAdminRole => "DEFAULT_ADMIN_ROLE",
            Operation::CertifierRole => "CERTIFIER_ROLE",
            Operation::GovernmentRole => "GOVERNMENT_ROLE",
            Operation::HasRole => "hasRole",
        }
    }

    /// Verb phrase used in failure messages ("Failed to <action>: ...")
    pub fn action(self) -> &'static str {
        match self {
            Operation::SubmitCertificationRequest => "submit request",
            Operation::VerifyRequest => "verify request",
            Operation::ApproveAmount => "approve amount",
            Operation::MintTokens => "mint tokens",
            Operation::GetRequest => "get request",
            Operation::GetAllRequests => "get all requests",
            Operation::GetMultipleRequests => "get multiple requests",
            Operation::GetTotalRequests => "get total requests",
            Operation::AddCertifier => "add certifier",
            Operation::AddGovernment => "add government",
            Operation::DefaultAdminRole
            | Operation::CertifierRole
            | Operation::GovernmentRole
            | Operation::HasRole => "check roles",
        }
    }

    /// Whether the operation submits a transaction
    pub fn is_state_changing(self) -> bool {
        matches!(
            self,
            Operation::SubmitCertificationRequest
                | Operation::VerifyRequest
                | Operation::ApproveAmount
                | Operation::MintTokens
                | Operation::AddCertifier
                | Operation::AddGovernment
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
