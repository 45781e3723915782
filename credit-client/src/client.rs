//! Ledger client
//!
//! Turns certificate operations into calls against one contract through a
//! [`SigningProvider`]. State-changing operations go through the same path:
//! local validation, interface lookup, signer and network checks, a gas
//! estimate with a safety margin, submission, then polling for the receipt.

use crate::abi::Token;
use crate::descriptor::{Function, InterfaceDescriptor};
use crate::error::describe_failure;
use crate::metrics;
use crate::models::{
    ApproveAmount, CertificationRequest, Identity, InterfaceDescription, RequestEntry, Roles,
    SubmitCertification,
};
use crate::operation::Operation;
use crate::provider::{SigningProvider, TransactionRequest};
use crate::types::{Address, TransactionId};
use crate::{Error, Result};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use validator::Validate;

/// Client behaviour knobs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSettings {
    pub contract_address: Address,
    pub expected_chain_id: u64,
    /// Percentage added on top of the gas estimate
    pub gas_margin_percent: u64,
    pub poll_interval: Duration,
    pub confirmation_timeout: Duration,
    /// Fail construction when required operations are undeclared
    pub strict_interface: bool,
}

impl ClientSettings {
    /// Sepolia defaults for `contract_address`
    pub fn new(contract_address: Address) -> Self {
        ClientSettings {
            contract_address,
            expected_chain_id: crate::SEPOLIA_CHAIN_ID,
            gas_margin_percent: crate::DEFAULT_GAS_MARGIN_PERCENT,
            poll_interval: Duration::from_secs(2),
            confirmation_timeout: Duration::from_secs(300),
            strict_interface: false,
        }
    }
}

/// Gas cap submitted for an estimate: `floor(estimate * (100 + margin) / 100)`
pub(crate) fn gas_limit(estimate: u64, margin_percent: u64) -> u64 {
    let scaled = u128::from(estimate) * (100 + u128::from(margin_percent)) / 100;
    u64::try_from(scaled).unwrap_or(u64::MAX)
}

pub struct LedgerClient {
    provider: Arc<dyn SigningProvider>,
    descriptor: InterfaceDescriptor,
    settings: ClientSettings,
    missing: Vec<String>,
}

impl LedgerClient {
    /// Create a client, checking the descriptor against the required operations once
    pub fn new(
        provider: Arc<dyn SigningProvider>,
        descriptor: InterfaceDescriptor,
        settings: ClientSettings,
    ) -> Result<Self> {
        let missing = descriptor.missing(&Operation::REQUIRED);
        if !missing.is_empty() {
            if settings.strict_interface {
                return Err(Error::IncompleteInterface(missing));
            }
            warn!(
                "Interface descriptor is missing operations: {}",
                missing.join(", ")
            );
        }

        info!(
            "Ledger client for contract {} via {} provider",
            settings.contract_address,
            provider.name()
        );

        Ok(LedgerClient {
            provider,
            descriptor,
            settings,
            missing,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Required operations the descriptor does not declare, or declares with the wrong mutability
    pub fn missing_operations(&self) -> &[String] {
        &self.missing
    }

    /// Request the signing identity and report the connected network
    pub async fn connect(&self) -> Result<Identity> {
        let account = self.signer().await?;
        let chain_id = self.chain_id().await?;

        let identity = Identity {
            account,
            chain_id,
            expected_chain_id: self.settings.expected_chain_id,
        };
        if identity.wrong_network() {
            warn!(
                "Connected to chain {}, expected {}",
                chain_id, self.settings.expected_chain_id
            );
        }

        info!("Connected as {} on chain {}", account, chain_id);
        Ok(identity)
    }

    /// Submit a certification request
    pub async fn submit_request(&self, report_uri: &str, amount: i64) -> Result<TransactionId> {
        let op = Operation::SubmitCertificationRequest;
        self.observe(op, async {
            // Validate request
            let input = SubmitCertification::new(report_uri, amount);
            input.validate()?;

            let args = vec![Token::String(input.report_uri), Token::Uint(amount_word(input.amount)?)];
            self.transact(op, args).await
        })
        .await
    }

    /// Mark a request verified (certifier)
    pub async fn verify(&self, request_id: u64) -> Result<TransactionId> {
        let op = Operation::VerifyRequest;
        self.observe(op, self.transact(op, vec![Token::Uint(request_id.into())]))
            .await
    }

    /// Approve an amount for a request (admin)
    pub async fn approve(
        &self,
        request_id: u64,
        approved_amount: i64,
        notes: &str,
    ) -> Result<TransactionId> {
        let op = Operation::ApproveAmount;
        self.observe(op, async {
            // Validate request
            let input = ApproveAmount {
                request_id,
                approved_amount,
                notes: notes.to_string(),
            };
            input.validate()?;

            let args = vec![
                Token::Uint(input.request_id.into()),
                Token::Uint(amount_word(input.approved_amount)?),
                Token::String(input.notes),
            ];
            self.transact(op, args).await
        })
        .await
    }

    /// Mint the approved amount of a verified request (government)
    pub async fn mint(&self, request_id: u64) -> Result<TransactionId> {
        let op = Operation::MintTokens;
        self.observe(op, self.transact(op, vec![Token::Uint(request_id.into())]))
            .await
    }

    /// Grant the certifier role (admin)
    pub async fn grant_certifier(&self, account: Address) -> Result<TransactionId> {
        let op = Operation::AddCertifier;
        self.observe(op, self.transact(op, vec![Token::Address(account)]))
            .await
    }

    /// Grant the government role (admin)
    pub async fn grant_government(&self, account: Address) -> Result<TransactionId> {
        let op = Operation::AddGovernment;
        self.observe(op, self.transact(op, vec![Token::Address(account)]))
            .await
    }

    pub async fn get_request(&self, request_id: u64) -> Result<CertificationRequest> {
        self.observe(Operation::GetRequest, async {
            let from = self.signer().await?;
            self.fetch_request(from, request_id).await
        })
        .await
    }

    /// Fetch several requests in one batched call
    pub async fn get_requests(&self, request_ids: &[u64]) -> Result<Vec<CertificationRequest>> {
        let op = Operation::GetMultipleRequests;
        self.observe(op, async {
            if request_ids.is_empty() {
                return Ok(Vec::new());
            }

            let from = self.signer().await?;
            let ids = request_ids.iter().map(|id| Token::Uint((*id).into())).collect();
            let records = single_output(op, self.read(from, op, vec![Token::Array(ids)]).await?)?
                .into_array()
                .ok_or_else(|| unexpected_output(op))?;

            if records.len() != request_ids.len() {
                return Err(Error::Abi(format!(
                    "{} returned {} records for {} ids",
                    op,
                    records.len(),
                    request_ids.len()
                )));
            }

            request_ids
                .iter()
                .zip(records)
                .map(|(id, record)| {
                    let fields = record.into_tuple().ok_or_else(|| unexpected_output(op))?;
                    CertificationRequest::from_tokens(*id, fields)
                })
                .collect()
        })
        .await
    }

    /// Ids of all requests; empty without a listing call when the total is zero
    pub async fn list_request_ids(&self) -> Result<Vec<u64>> {
        let op = Operation::GetAllRequests;
        self.observe(op, async {
            let from = self.signer().await?;
            self.request_ids(from).await
        })
        .await
    }

    pub async fn total_count(&self) -> Result<u64> {
        self.observe(Operation::GetTotalRequests, async {
            let from = self.signer().await?;
            self.total(from).await
        })
        .await
    }

    /// Every request, fetched one at a time. A request that fails to load is
    /// reported in place and does not stop the rest.
    pub async fn load_requests(&self) -> Result<Vec<RequestEntry>> {
        let from = self.signer().await?;
        let ids = self.request_ids(from).await?;

        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.fetch_request(from, id).await {
                Ok(request) => entries.push(RequestEntry::Loaded(request)),
                Err(e) => {
                    warn!("Failed to load request {}: {}", id, e);
                    entries.push(RequestEntry::Failed {
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        Ok(entries)
    }

    /// Role snapshot for `account`; read-only
    pub async fn get_roles(&self, account: Address) -> Result<Roles> {
        self.observe(Operation::HasRole, async {
            let from = self.signer().await?;

            let mut granted = [false; 3];
            let role_ops = [
                Operation::DefaultAdminRole,
                Operation::CertifierRole,
                Operation::GovernmentRole,
            ];
            for (slot, role_op) in granted.iter_mut().zip(role_ops) {
                let role = single_output(role_op, self.read(from, role_op, vec![]).await?)?
                    .into_fixed_bytes()
                    .ok_or_else(|| unexpected_output(role_op))?;

                let op = Operation::HasRole;
                *slot = single_output(
                    op,
                    self.read(from, op, vec![Token::FixedBytes(role), Token::Address(account)])
                        .await?,
                )?
                .into_bool()
                .ok_or_else(|| unexpected_output(op))?;
            }

            let [admin, certifier, government] = granted;
            debug!(
                "Roles of {}: admin={} certifier={} government={}",
                account, admin, certifier, government
            );
            Ok(Roles {
                admin,
                certifier,
                government,
            })
        })
        .await
    }

    /// Contract address, declared operations and missing required ones
    pub fn describe_interface(&self) -> InterfaceDescription {
        InterfaceDescription {
            address: self.settings.contract_address,
            operations: self.descriptor.operation_names(),
            missing: self.missing.clone(),
        }
    }

    async fn observe<T, F>(&self, op: Operation, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let started = Instant::now();
        let result = call.await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(e) => {
                warn!(operation = op.name(), kind = e.kind(), "{}", e);
                e.kind()
            }
        };
        metrics::record_call(op, outcome, started.elapsed());
        result
    }

    fn function(&self, op: Operation) -> Result<&Function> {
        self.descriptor
            .operation(op)
            .ok_or_else(|| Error::MissingOperation(op.name().to_string()))
    }

    async fn signer(&self) -> Result<Address> {
        let accounts = self
            .provider
            .request_accounts()
            .await
            .map_err(|e| Error::NoSigningIdentity(describe_failure("connect signing provider", &e)))?;

        accounts.first().copied().ok_or_else(|| {
            Error::NoSigningIdentity(format!(
                "{} provider returned no accounts; connect a wallet first",
                self.provider.name()
            ))
        })
    }

    async fn chain_id(&self) -> Result<u64> {
        self.provider
            .chain_id()
            .await
            .map_err(|e| Error::RemoteCall(describe_failure("read network", &e)))
    }

    async fn ensure_network(&self) -> Result<()> {
        let actual = self.chain_id().await?;
        if actual != self.settings.expected_chain_id {
            warn!(
                "Refusing transaction on chain {}, expected {}",
                actual, self.settings.expected_chain_id
            );
            return Err(Error::WrongNetwork {
                expected: self.settings.expected_chain_id,
                actual,
            });
        }
        Ok(())
    }

    async fn transact(&self, op: Operation, args: Vec<Token>) -> Result<TransactionId> {
        let function = self.function(op)?;
        let data = function.encode_input(&args)?;

        let from = self.signer().await?;
        self.ensure_network().await?;

        let tx = TransactionRequest {
            from,
            to: self.settings.contract_address,
            data,
            gas: None,
        };

        // Estimate first; a rejected estimate never reaches submission
        let estimate = self.provider.estimate_gas(&tx).await.map_err(|e| {
            let message = describe_failure(op.action(), &e);
            if e.is_revert() {
                Error::RemoteCall(message)
            } else {
                Error::EstimationFailure(message)
            }
        })?;
        metrics::record_gas_estimate(op, estimate);

        let gas = gas_limit(estimate, self.settings.gas_margin_percent);
        debug!("{} gas estimate {} -> limit {}", op, estimate, gas);

        let hash = self
            .provider
            .send_transaction(&tx.with_gas(gas))
            .await
            .map_err(|e| Error::RemoteCall(describe_failure(op.action(), &e)))?;
        info!("Submitted {} transaction {}", op, hash);

        self.wait_for_confirmation(op, &hash).await?;
        info!("Confirmed {} transaction {}", op, hash);
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, op: Operation, hash: &TransactionId) -> Result<()> {
        let deadline = Instant::now() + self.settings.confirmation_timeout;

        loop {
            match self.provider.transaction_receipt(hash).await {
                Ok(Some(receipt)) if receipt.success => return Ok(()),
                Ok(Some(_)) => {
                    return Err(Error::RemoteCall(format!(
                        "Failed to {}: transaction {} reverted on-chain",
                        op.action(),
                        hash
                    )))
                }
                Ok(None) => {}
                Err(e) => warn!("Receipt lookup for {} failed: {}", hash, e),
            }

            if Instant::now() >= deadline {
                return Err(Error::RemoteCall(format!(
                    "Failed to {}: transaction {} was not confirmed within {:?}; it may still be mined",
                    op.action(),
                    hash,
                    self.settings.confirmation_timeout
                )));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    async fn read(&self, from: Address, op: Operation, args: Vec<Token>) -> Result<Vec<Token>> {
        let function = self.function(op)?;
        let tx = TransactionRequest {
            from,
            to: self.settings.contract_address,
            data: function.encode_input(&args)?,
            gas: None,
        };

        let raw = self
            .provider
            .call(&tx)
            .await
            .map_err(|e| Error::RemoteCall(describe_failure(op.action(), &e)))?;
        function.decode_output(&raw)
    }

    async fn fetch_request(&self, from: Address, request_id: u64) -> Result<CertificationRequest> {
        let tokens = self
            .read(from, Operation::GetRequest, vec![Token::Uint(request_id.into())])
            .await?;
        CertificationRequest::from_tokens(request_id, tokens)
    }

    async fn total(&self, from: Address) -> Result<u64> {
        let op = Operation::GetTotalRequests;
        let total = single_output(op, self.read(from, op, vec![]).await?)?
            .into_uint()
            .ok_or_else(|| unexpected_output(op))?;
        u64::try_from(total).map_err(|_| unexpected_output(op))
    }

    async fn request_ids(&self, from: Address) -> Result<Vec<u64>> {
        if self.total(from).await? == 0 {
            return Ok(Vec::new());
        }

        let op = Operation::GetAllRequests;
        single_output(op, self.read(from, op, vec![]).await?)?
            .into_array()
            .ok_or_else(|| unexpected_output(op))?
            .into_iter()
            .map(|token| {
                token
                    .into_uint()
                    .and_then(|id| u64::try_from(id).ok())
                    .ok_or_else(|| unexpected_output(op))
            })
            .collect()
    }
}

/// Validated positive amount as a uint256 word
fn amount_word(amount: i64) -> Result<u128> {
    u128::try_from(amount)
        .map_err(|_| Error::Validation("amount must be greater than zero".to_string()))
}

fn single_output(op: Operation, tokens: Vec<Token>) -> Result<Token> {
    let mut tokens = tokens.into_iter();
    match (tokens.next(), tokens.next()) {
        (Some(token), None) => Ok(token),
        _ => Err(unexpected_output(op)),
    }
}

fn unexpected_output(op: Operation) -> Error {
    Error::Abi(format!("unexpected return value from {}", op))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_limit_adds_margin_and_floors() {
        assert_eq!(gas_limit(21_000, 20), 25_200);
        assert_eq!(gas_limit(21_001, 20), 25_201);
        assert_eq!(gas_limit(100_000, 0), 100_000);
        assert_eq!(gas_limit(u64::MAX, 20), u64::MAX);
    }

    #[test]
    fn test_single_output() {
        assert_eq!(
            single_output(Operation::GetTotalRequests, vec![Token::Uint(4)]).unwrap(),
            Token::Uint(4)
        );
        assert!(single_output(Operation::GetTotalRequests, vec![]).is_err());
        assert!(
            single_output(Operation::GetTotalRequests, vec![Token::Uint(1), Token::Uint(2)])
                .is_err()
        );
    }

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::new(Address::ZERO);
        assert_eq!(settings.expected_chain_id, 11_155_111);
        assert_eq!(settings.gas_margin_percent, 20);
        assert!(!settings.strict_interface);
    }
}
