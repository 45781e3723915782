//! End-to-end certificate flows against the in-memory ledger

use credit_client::abi::Token;
use credit_client::provider::{CallKind, MockLedger, ProviderError, SigningProvider};
use credit_client::{
    Address, ClientSettings, Error, InterfaceDescriptor, LedgerClient, RequestEntry,
    RequestStage,
};
use std::sync::Arc;
use std::time::Duration;

const ADMIN: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const STARTUP: &str = "0xfB6916095ca1df60bB79Ce92cE3Ea74c37c5d359";

fn contract() -> Address {
    credit_client::DEFAULT_CONTRACT_ADDRESS.parse().unwrap()
}

fn admin() -> Address {
    ADMIN.parse().unwrap()
}

fn startup() -> Address {
    STARTUP.parse().unwrap()
}

fn settings() -> ClientSettings {
    let mut settings = ClientSettings::new(contract());
    settings.poll_interval = Duration::from_millis(1);
    settings.confirmation_timeout = Duration::from_secs(1);
    settings
}

fn ledger() -> MockLedger {
    MockLedger::new(contract(), admin()).unwrap()
}

fn client_for(ledger: MockLedger) -> (Arc<MockLedger>, LedgerClient) {
    client_with(ledger, InterfaceDescriptor::bundled().unwrap(), settings())
}

fn client_with(
    ledger: MockLedger,
    descriptor: InterfaceDescriptor,
    settings: ClientSettings,
) -> (Arc<MockLedger>, LedgerClient) {
    let ledger = Arc::new(ledger);
    let provider: Arc<dyn SigningProvider> = ledger.clone();
    let client = LedgerClient::new(provider, descriptor, settings).unwrap();
    (ledger, client)
}

#[tokio::test]
async fn test_certificate_lifecycle() {
    let (ledger, client) = client_for(ledger());

    client.submit_request("ipfs://abc", 5).await.unwrap();
    let submit = ledger
        .calls()
        .await
        .into_iter()
        .find(|c| c.kind == CallKind::Send)
        .unwrap();
    assert_eq!(submit.operation.as_deref(), Some("submitCertificationRequest"));
    assert_eq!(
        submit.args,
        vec![Token::String("ipfs://abc".into()), Token::Uint(5)]
    );

    client.grant_certifier(admin()).await.unwrap();
    client.grant_government(admin()).await.unwrap();

    client.approve(0, 3, "partial").await.unwrap();
    let request = client.get_request(0).await.unwrap();
    assert_eq!(request.approved_amount, 3);
    assert_eq!(request.admin_notes, "partial");
    assert_eq!(request.stage(), RequestStage::Approved);

    // mint is refused until the request is verified
    match client.mint(0).await {
        Err(Error::RemoteCall(message)) => {
            assert!(message.starts_with("Failed to mint tokens"));
            assert!(message.contains("Request not verified"));
        }
        other => panic!("expected remote call error, got {:?}", other),
    }
    assert_eq!(ledger.count_operation(CallKind::Send, "mintTokens").await, 0);

    client.verify(0).await.unwrap();
    assert!(client.get_request(0).await.unwrap().verified);

    let hash = client.mint(0).await.unwrap();
    assert!(hash.as_str().starts_with("0x"));
    let request = client.get_request(0).await.unwrap();
    assert!(request.minted);
    assert_eq!(request.stage(), RequestStage::Minted);
    assert_eq!(ledger.balance_of(admin()).await, 3);

    assert!(matches!(client.mint(0).await, Err(Error::RemoteCall(_))));
    assert_eq!(ledger.balance_of(admin()).await, 3);
}

#[tokio::test]
async fn test_submitted_request_reads_back_unchanged() {
    let (_ledger, client) = client_for(ledger());

    client.submit_request(" ipfs://report-7\n", 42).await.unwrap();
    let request = client.get_request(0).await.unwrap();

    assert_eq!(request.id, 0);
    assert_eq!(request.report_uri, " ipfs://report-7\n");
    assert_eq!(request.requested_amount, 42);
    assert_eq!(request.approved_amount, 0);
    assert_eq!(request.submitter, admin());
    assert_eq!(request.stage(), RequestStage::Pending);
    assert_eq!(client.total_count().await.unwrap(), 1);
    assert_eq!(client.list_request_ids().await.unwrap(), vec![0]);
}

#[tokio::test]
async fn test_invalid_input_is_rejected_locally() {
    let (ledger, client) = client_for(ledger());

    assert!(matches!(
        client.submit_request("ipfs://abc", 0).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        client.submit_request("ipfs://abc", -5).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        client.submit_request("   ", 5).await,
        Err(Error::Validation(_))
    ));
    assert!(matches!(
        client.approve(0, 0, "none").await,
        Err(Error::Validation(_))
    ));

    assert!(ledger.calls().await.is_empty());
}

#[tokio::test]
async fn test_empty_ledger_lists_without_fetching_ids() {
    let (ledger, client) = client_for(ledger());

    assert_eq!(client.total_count().await.unwrap(), 0);
    assert!(client.list_request_ids().await.unwrap().is_empty());
    assert!(client.load_requests().await.unwrap().is_empty());

    assert_eq!(
        ledger.count_operation(CallKind::Call, "getAllRequests").await,
        0
    );
    assert_eq!(
        ledger.count_operation(CallKind::Call, "getTotalRequests").await,
        3
    );
}

#[tokio::test]
async fn test_missing_operation_fails_before_remote_traffic() {
    let mut descriptor = InterfaceDescriptor::bundled().unwrap();
    descriptor.remove("mintTokens");
    let (ledger, client) = client_with(ledger(), descriptor, settings());

    assert_eq!(client.missing_operations(), ["mintTokens".to_string()]);
    assert_eq!(client.describe_interface().missing, vec!["mintTokens".to_string()]);

    match client.mint(0).await {
        Err(Error::MissingOperation(name)) => assert_eq!(name, "mintTokens"),
        other => panic!("expected missing operation, got {:?}", other),
    }
    assert!(ledger.calls().await.is_empty());

    // everything else keeps working
    client.submit_request("ipfs://abc", 5).await.unwrap();
}

#[tokio::test]
async fn test_strict_interface_refuses_incomplete_descriptor() {
    let mut descriptor = InterfaceDescriptor::bundled().unwrap();
    descriptor.remove("mintTokens");
    descriptor.remove("hasRole");

    let mut strict = settings();
    strict.strict_interface = true;

    let provider: Arc<dyn SigningProvider> = Arc::new(ledger());
    match LedgerClient::new(provider, descriptor, strict) {
        Err(Error::IncompleteInterface(missing)) => {
            assert_eq!(missing, vec!["mintTokens".to_string(), "hasRole".to_string()]);
        }
        Err(other) => panic!("unexpected error {:?}", other),
        Ok(_) => panic!("strict construction accepted an incomplete descriptor"),
    }
}

#[tokio::test]
async fn test_wrong_network_blocks_transactions() {
    let (ledger, client) = client_for(ledger().with_chain_id(1));

    let identity = client.connect().await.unwrap();
    assert!(identity.wrong_network());
    assert_eq!(identity.account, admin());

    assert_eq!(
        client.submit_request("ipfs://abc", 5).await,
        Err(Error::WrongNetwork {
            expected: 11_155_111,
            actual: 1
        })
    );
    assert_eq!(ledger.count(CallKind::Estimate).await, 0);
    assert_eq!(ledger.count(CallKind::Send).await, 0);

    // reads are not gated
    assert_eq!(client.total_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_no_signing_identity() {
    let (ledger, client) = client_for(ledger().with_accounts(vec![]));

    assert!(matches!(client.connect().await, Err(Error::NoSigningIdentity(_))));
    assert!(matches!(
        client.submit_request("ipfs://abc", 5).await,
        Err(Error::NoSigningIdentity(_))
    ));
    assert!(matches!(
        client.get_request(0).await,
        Err(Error::NoSigningIdentity(_))
    ));
    assert_eq!(ledger.count(CallKind::Estimate).await, 0);
    assert_eq!(ledger.count(CallKind::Call).await, 0);
}

#[tokio::test]
async fn test_estimation_failure_prevents_submission() {
    let failing = ledger()
        .with_estimate_failure(ProviderError::Transport("connection reset by peer".into()));
    let (ledger, client) = client_for(failing);

    match client.submit_request("ipfs://abc", 5).await {
        Err(Error::EstimationFailure(message)) => {
            assert_eq!(
                message,
                "Failed to submit request: transport error: connection reset by peer"
            );
        }
        other => panic!("expected estimation failure, got {:?}", other),
    }
    assert_eq!(ledger.count(CallKind::Estimate).await, 1);
    assert_eq!(ledger.count(CallKind::Send).await, 0);
}

#[tokio::test]
async fn test_gas_cap_adds_twenty_percent() {
    let (ledger, client) = client_for(ledger().with_fixed_gas_estimate(50_001));

    client.submit_request("ipfs://abc", 5).await.unwrap();

    let send = ledger
        .calls()
        .await
        .into_iter()
        .find(|c| c.kind == CallKind::Send)
        .unwrap();
    assert_eq!(send.gas, Some(60_001));
}

#[tokio::test]
async fn test_roles_are_read_only() {
    let (ledger, client) = client_for(ledger());
    client.grant_certifier(admin()).await.unwrap();

    let sends = ledger.count(CallKind::Send).await;
    let estimates = ledger.count(CallKind::Estimate).await;

    let roles = client.get_roles(admin()).await.unwrap();
    assert!(roles.admin);
    assert!(roles.certifier);
    assert!(!roles.government);

    let roles = client.get_roles(startup()).await.unwrap();
    assert!(!roles.admin && !roles.certifier && !roles.government);

    assert_eq!(ledger.count(CallKind::Send).await, sends);
    assert_eq!(ledger.count(CallKind::Estimate).await, estimates);
}

#[tokio::test]
async fn test_permission_failure_surfaces_revert_reason() {
    let (ledger, client) = client_for(ledger().with_accounts(vec![startup()]));

    client.submit_request("ipfs://abc", 5).await.unwrap();
    match client.approve(0, 5, "self approval").await {
        Err(Error::RemoteCall(message)) => {
            assert_eq!(
                message,
                "Failed to approve amount: contract execution reverted: Caller is not an admin"
            );
        }
        other => panic!("expected remote call error, got {:?}", other),
    }
    assert_eq!(ledger.count_operation(CallKind::Send, "approveAmount").await, 0);
}

#[tokio::test]
async fn test_load_requests_isolates_failures() {
    let (ledger, client) = client_for(ledger());
    for n in 0..3 {
        client
            .submit_request(&format!("ipfs://report-{}", n), 10 + n)
            .await
            .unwrap();
    }
    ledger.fail_reads_of(1).await;

    let entries = client.load_requests().await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(matches!(&entries[0], RequestEntry::Loaded(r) if r.report_uri == "ipfs://report-0"));
    match &entries[1] {
        RequestEntry::Failed { id, error } => {
            assert_eq!(*id, 1);
            assert!(error.contains("Request unavailable"));
        }
        other => panic!("expected failed entry, got {:?}", other),
    }
    assert!(matches!(&entries[2], RequestEntry::Loaded(r) if r.requested_amount == 12));
}

#[tokio::test]
async fn test_batched_requests_keep_id_order() {
    let (ledger, client) = client_for(ledger());
    client.submit_request("ipfs://first", 1).await.unwrap();
    client.submit_request("ipfs://second", 2).await.unwrap();

    let requests = client.get_requests(&[1, 0]).await.unwrap();
    assert_eq!(requests[0].id, 1);
    assert_eq!(requests[0].report_uri, "ipfs://second");
    assert_eq!(requests[1].report_uri, "ipfs://first");

    let calls = ledger.count(CallKind::Call).await;
    assert!(client.get_requests(&[]).await.unwrap().is_empty());
    assert_eq!(ledger.count(CallKind::Call).await, calls);
}

#[tokio::test]
async fn test_describe_interface() {
    let (ledger, client) = client_for(ledger());

    let description = client.describe_interface();
    assert_eq!(description.address, contract());
    assert!(description.missing.is_empty());
    assert!(description
        .operations
        .contains(&"submitCertificationRequest".to_string()));
    assert!(ledger.calls().await.is_empty());
}

#[tokio::test]
async fn test_signing_provider_without_accounts_support() {
    let failing = ledger().with_accounts_failure(ProviderError::Rpc {
        code: -32601,
        message: "the method eth_requestAccounts does not exist/is not available".into(),
        data: None,
    });
    let (unsupported, client) = client_for(failing);

    match client.connect().await {
        Err(Error::NoSigningIdentity(message)) => {
            assert!(message.starts_with("Failed to connect signing provider"));
            assert!(message.contains("eth_requestAccounts"));
        }
        other => panic!("expected no signing identity, got {:?}", other),
    }

    assert_eq!(unsupported.count(CallKind::ChainId).await, 0);

    let unreachable =
        ledger().with_accounts_failure(ProviderError::Transport("connection refused".into()));
    let (ledger, client) = client_for(unreachable);
    assert!(matches!(
        client.submit_request("ipfs://abc", 5).await,
        Err(Error::NoSigningIdentity(_))
    ));
    assert_eq!(ledger.count(CallKind::Estimate).await, 0);
}

#[tokio::test]
async fn test_reverted_receipt_is_remote_call_error() {
    let (ledger, client) = client_for(ledger().with_reverting_sends());

    match client.submit_request("ipfs://abc", 5).await {
        Err(Error::RemoteCall(message)) => {
            let sent = ledger.sent_transactions().await;
            assert_eq!(sent.len(), 1);
            assert_eq!(
                message,
                format!("Failed to submit request: transaction {} reverted on-chain", sent[0])
            );
        }
        other => panic!("expected remote call error, got {:?}", other),
    }

    // the estimate passed, but nothing was recorded by the ledger
    assert_eq!(ledger.count(CallKind::Estimate).await, 1);
    assert_eq!(client.total_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unconfirmed_transaction_times_out_naming_hash() {
    let mut short = settings();
    short.confirmation_timeout = Duration::from_millis(20);
    let (ledger, client) = client_with(
        ledger().with_pending_receipts(),
        InterfaceDescriptor::bundled().unwrap(),
        short,
    );

    match client.submit_request("ipfs://abc", 5).await {
        Err(Error::RemoteCall(message)) => {
            let sent = ledger.sent_transactions().await;
            assert_eq!(sent.len(), 1);
            assert!(message.starts_with("Failed to submit request"));
            assert!(message.contains(sent[0].as_str()));
            assert!(message.contains("was not confirmed"));
        }
        other => panic!("expected remote call error, got {:?}", other),
    }
    assert!(ledger.count(CallKind::Receipt).await > 1);
}

#[tokio::test]
async fn test_transaction_declared_as_view_is_missing() {
    let mut artifact: serde_json::Value =
        serde_json::from_str(include_str!("../abi/HydrogenCreditCertificate.json")).unwrap();
    for entry in artifact["abi"].as_array_mut().unwrap() {
        if entry["name"] == "mintTokens" {
            entry["stateMutability"] = "view".into();
        }
    }
    let descriptor = InterfaceDescriptor::from_json(&artifact.to_string()).unwrap();
    let (ledger, client) = client_with(ledger(), descriptor, settings());

    assert_eq!(client.missing_operations(), ["mintTokens".to_string()]);
    assert!(matches!(
        client.mint(0).await,
        Err(Error::MissingOperation(name)) if name == "mintTokens"
    ));
    assert!(ledger.calls().await.is_empty());
}
