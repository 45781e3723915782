//! Property-based tests for client invariants

use credit_client::provider::{CallKind, MockLedger, SigningProvider};
use credit_client::{Address, ClientSettings, Error, InterfaceDescriptor, LedgerClient};
use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;

fn setup(ledger: MockLedger) -> (tokio::runtime::Runtime, Arc<MockLedger>, LedgerClient) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let mut settings = ClientSettings::new(contract());
    settings.poll_interval = Duration::from_millis(1);

    let ledger = Arc::new(ledger);
    let provider: Arc<dyn SigningProvider> = ledger.clone();
    let client =
        LedgerClient::new(provider, InterfaceDescriptor::bundled().unwrap(), settings).unwrap();
    (runtime, ledger, client)
}

fn contract() -> Address {
    credit_client::DEFAULT_CONTRACT_ADDRESS.parse().unwrap()
}

fn mock() -> MockLedger {
    let admin: Address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".parse().unwrap();
    MockLedger::new(contract(), admin).unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: a non-positive amount never produces remote traffic
    #[test]
    fn non_positive_amounts_never_reach_the_ledger(
        amount in i64::MIN..=0i64,
        uri in "ipfs://[a-z0-9]{1,16}",
    ) {
        let (runtime, ledger, client) = setup(mock());

        let result = runtime.block_on(client.submit_request(&uri, amount));
        prop_assert!(matches!(result, Err(Error::Validation(_))));
        prop_assert!(runtime.block_on(ledger.calls()).is_empty());
    }

    /// Property: what is submitted is what is read back
    #[test]
    fn submitted_requests_read_back_unchanged(
        amount in 1i64..=i64::MAX,
        uri in "ipfs://[a-zA-Z0-9]{1,40}",
    ) {
        let (runtime, _ledger, client) = setup(mock());

        runtime.block_on(client.submit_request(&uri, amount)).unwrap();
        let request = runtime.block_on(client.get_request(0)).unwrap();

        prop_assert_eq!(request.report_uri, uri);
        prop_assert_eq!(request.requested_amount, amount as u128);
    }

    /// Property: the submitted gas cap is floor(estimate * 1.2)
    #[test]
    fn gas_cap_is_estimate_plus_margin(estimate in 21_000u64..30_000_000u64) {
        let (runtime, ledger, client) = setup(mock().with_fixed_gas_estimate(estimate));

        runtime.block_on(client.submit_request("ipfs://abc", 5)).unwrap();

        let sends: Vec<_> = runtime
            .block_on(ledger.calls())
            .into_iter()
            .filter(|c| c.kind == CallKind::Send)
            .collect();
        prop_assert_eq!(sends.len(), 1);
        prop_assert_eq!(sends[0].gas, Some(estimate * 120 / 100));
    }
}
