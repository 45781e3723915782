//! In-memory certificate ledger
//!
//! Plays both the wallet and the contract: calldata is decoded through the
//! same interface descriptor the client uses, and the contract's rules (role
//! checks, approval and verification before mint, no double mint) are
//! enforced here. Every provider call is recorded for inspection.

use super::{
    ProviderError, ProviderResult, SigningProvider, TransactionReceipt, TransactionRequest,
};
use crate::abi::{self, Token};
use crate::descriptor::{Function, InterfaceDescriptor};
use crate::types::{Address, TransactionId};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Kind of provider call seen by the mock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Accounts,
    ChainId,
    Estimate,
    Send,
    Receipt,
    Call,
}

/// One provider call as observed by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub kind: CallKind,
    /// Contract function, for calls carrying calldata
    pub operation: Option<String>,
    /// Decoded arguments
    pub args: Vec<Token>,
    /// Gas cap supplied with a send
    pub gas: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    Admin,
    Certifier,
    Government,
}

impl Role {
    fn id(self) -> [u8; 32] {
        match self {
            Role::Admin => [0u8; 32],
            Role::Certifier => abi::keccak256(b"CERTIFIER_ROLE"),
            Role::Government => abi::keccak256(b"GOVERNMENT_ROLE"),
        }
    }

    fn from_id(id: &[u8]) -> Option<Role> {
        [Role::Admin, Role::Certifier, Role::Government]
            .into_iter()
            .find(|role| role.id() == id)
    }
}

#[derive(Debug, Clone)]
struct StoredRequest {
    submitter: Address,
    report_uri: String,
    requested_amount: u128,
    approved_amount: u128,
    verified: bool,
    minted: bool,
    timestamp: u64,
    admin_notes: String,
}

impl StoredRequest {
    fn to_tokens(&self) -> Vec<Token> {
        vec![
            Token::Address(self.submitter),
            Token::String(self.report_uri.clone()),
            Token::Uint(self.requested_amount),
            Token::Uint(self.approved_amount),
            Token::Bool(self.verified),
            Token::Bool(self.minted),
            Token::Uint(u128::from(self.timestamp)),
            Token::String(self.admin_notes.clone()),
        ]
    }
}

#[derive(Debug, Clone, Default)]
struct LedgerState {
    requests: Vec<StoredRequest>,
    roles: BTreeSet<(Role, Address)>,
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
    unreadable: BTreeSet<u64>,
    receipts: HashMap<String, TransactionReceipt>,
    sent: Vec<TransactionId>,
    block_number: u64,
}

impl LedgerState {
    fn require_role(&self, role: Role, caller: Address) -> Result<(), String> {
        if self.roles.contains(&(role, caller)) {
            return Ok(());
        }
        Err(match role {
            Role::Admin => "Caller is not an admin",
            Role::Certifier => "Caller is not a certifier",
            Role::Government => "Caller is not government",
        }
        .to_string())
    }

    fn request_mut(&mut self, id: u128) -> Result<&mut StoredRequest, String> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.requests.get_mut(idx))
            .ok_or_else(|| "Request does not exist".to_string())
    }

    fn request(&self, id: u128) -> Result<&StoredRequest, String> {
        if u64::try_from(id).is_ok_and(|id| self.unreadable.contains(&id)) {
            return Err("Request unavailable".to_string());
        }
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.requests.get(idx))
            .ok_or_else(|| "Request does not exist".to_string())
    }
}

struct Args(Vec<Token>);

impl Args {
    fn get(&self, i: usize) -> Result<Token, String> {
        self.0
            .get(i)
            .cloned()
            .ok_or_else(|| format!("missing argument {}", i))
    }

    fn uint(&self, i: usize) -> Result<u128, String> {
        self.get(i)?
            .into_uint()
            .ok_or_else(|| format!("argument {} is not an integer", i))
    }

    fn string(&self, i: usize) -> Result<String, String> {
        self.get(i)?
            .into_string()
            .ok_or_else(|| format!("argument {} is not a string", i))
    }

    fn address(&self, i: usize) -> Result<Address, String> {
        self.get(i)?
            .into_address()
            .ok_or_else(|| format!("argument {} is not an address", i))
    }

    fn bytes32(&self, i: usize) -> Result<Vec<u8>, String> {
        self.get(i)?
            .into_fixed_bytes()
            .ok_or_else(|| format!("argument {} is not bytes32", i))
    }

    fn uint_array(&self, i: usize) -> Result<Vec<u128>, String> {
        self.get(i)?
            .into_array()
            .ok_or_else(|| format!("argument {} is not an array", i))?
            .into_iter()
            .map(|t| t.into_uint().ok_or_else(|| "array element is not an integer".to_string()))
            .collect()
    }
}

fn revert(reason: &str) -> ProviderError {
    let mut payload = abi::selector("Error(string)").to_vec();
    payload.extend(abi::encode(&[Token::String(reason.to_string())]));
    ProviderError::Rpc {
        code: 3,
        message: format!("execution reverted: {}", reason),
        data: Some(format!("0x{}", hex::encode(payload))),
    }
}

fn silent_revert() -> ProviderError {
    ProviderError::Rpc {
        code: -32000,
        message: "execution reverted".to_string(),
        data: None,
    }
}

/// In-memory ledger implementing [`SigningProvider`]
pub struct MockLedger {
    descriptor: InterfaceDescriptor,
    contract: Address,
    chain_id: u64,
    accounts: Vec<Address>,
    fixed_gas_estimate: Option<u64>,
    estimate_failure: Option<ProviderError>,
    accounts_failure: Option<ProviderError>,
    reverting_sends: bool,
    pending_receipts: bool,
    state: RwLock<LedgerState>,
    calls: RwLock<Vec<RecordedCall>>,
}

impl MockLedger {
    /// Ledger for `contract` on Sepolia, with `admin` as the only account and admin
    pub fn new(contract: Address, admin: Address) -> crate::Result<Self> {
        let mut state = LedgerState::default();
        state.roles.insert((Role::Admin, admin));

        Ok(Self {
            descriptor: InterfaceDescriptor::bundled()?,
            contract,
            chain_id: crate::SEPOLIA_CHAIN_ID,
            accounts: vec![admin],
            fixed_gas_estimate: None,
            estimate_failure: None,
            accounts_failure: None,
            reverting_sends: false,
            pending_receipts: false,
            state: RwLock::new(state),
            calls: RwLock::new(Vec::new()),
        })
    }

    /// Report a different network
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Replace the connected accounts; empty means no signing identity
    pub fn with_accounts(mut self, accounts: Vec<Address>) -> Self {
        self.accounts = accounts;
        self
    }

    /// Answer every successful estimate with `gas`
    pub fn with_fixed_gas_estimate(mut self, gas: u64) -> Self {
        self.fixed_gas_estimate = Some(gas);
        self
    }

    /// Fail every estimate with `err`
    pub fn with_estimate_failure(mut self, err: ProviderError) -> Self {
        self.estimate_failure = Some(err);
        self
    }

    /// Fail every account request with `err`
    pub fn with_accounts_failure(mut self, err: ProviderError) -> Self {
        self.accounts_failure = Some(err);
        self
    }

    /// Mine every transaction as reverted, leaving state untouched
    pub fn with_reverting_sends(mut self) -> Self {
        self.reverting_sends = true;
        self
    }

    /// Never produce receipts, as if transactions stay in the mempool
    pub fn with_pending_receipts(mut self) -> Self {
        self.pending_receipts = true;
        self
    }

    /// Make `getRequest` revert for one id
    pub async fn fail_reads_of(&self, request_id: u64) {
        self.state.write().await.unreadable.insert(request_id);
    }

    /// Every provider call so far
    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.calls.read().await.clone()
    }

    /// Number of calls of one kind
    pub async fn count(&self, kind: CallKind) -> usize {
        self.calls.read().await.iter().filter(|c| c.kind == kind).count()
    }

    /// Number of calls of one kind naming `operation`
    pub async fn count_operation(&self, kind: CallKind, operation: &str) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| c.kind == kind && c.operation.as_deref() == Some(operation))
            .count()
    }

    /// Hashes of every transaction sent, in order
    pub async fn sent_transactions(&self) -> Vec<TransactionId> {
        self.state.read().await.sent.clone()
    }

    /// Minted token balance
    pub async fn balance_of(&self, account: Address) -> u128 {
        self.state
            .read()
            .await
            .balances
            .get(&account)
            .copied()
            .unwrap_or(0)
    }

    async fn record(&self, kind: CallKind, operation: Option<String>, args: Vec<Token>, gas: Option<u64>) {
        self.calls.write().await.push(RecordedCall {
            kind,
            operation,
            args,
            gas,
        });
    }

    /// Resolve calldata to a declared function and its arguments, recording the call
    async fn decode_and_record(
        &self,
        kind: CallKind,
        tx: &TransactionRequest,
    ) -> ProviderResult<(&Function, Vec<Token>)> {
        let decoded = if tx.to == self.contract {
            self.descriptor
                .function_for_calldata(&tx.data)
                .and_then(|f| f.decode_input(&tx.data).map(|args| (f, args)))
        } else {
            None
        };

        match decoded {
            Some((function, Ok(args))) => {
                self.record(kind, Some(function.name.clone()), args.clone(), tx.gas)
                    .await;
                Ok((function, args))
            }
            Some((function, Err(e))) => {
                self.record(kind, Some(function.name.clone()), Vec::new(), tx.gas)
                    .await;
                debug!("Mock ledger could not decode {} calldata: {}", function.name, e);
                Err(silent_revert())
            }
            None => {
                self.record(kind, None, Vec::new(), tx.gas).await;
                Err(silent_revert())
            }
        }
    }

    fn execute(
        &self,
        state: &mut LedgerState,
        caller: Address,
        function: &Function,
        args: Vec<Token>,
    ) -> Result<Vec<Token>, String> {
        let args = Args(args);

        match function.name.as_str() {
            "submitCertificationRequest" => {
                let report_uri = args.string(0)?;
                let amount = args.uint(1)?;
                if report_uri.is_empty() {
                    return Err("Report URI required".to_string());
                }
                if amount == 0 {
                    return Err("Amount must be greater than zero".to_string());
                }
                let id = state.requests.len() as u128;
                state.requests.push(StoredRequest {
                    submitter: caller,
                    report_uri,
                    requested_amount: amount,
                    approved_amount: 0,
                    verified: false,
                    minted: false,
                    timestamp: Utc::now().timestamp().max(0) as u64,
                    admin_notes: String::new(),
                });
                Ok(vec![Token::Uint(id)])
            }
            "verifyRequest" => {
                state.require_role(Role::Certifier, caller)?;
                let request = state.request_mut(args.uint(0)?)?;
                if request.verified {
                    return Err("Request already verified".to_string());
                }
                request.verified = true;
                Ok(vec![])
            }
            "approveAmount" => {
                state.require_role(Role::Admin, caller)?;
                let amount = args.uint(1)?;
                let notes = args.string(2)?;
                let request = state.request_mut(args.uint(0)?)?;
                if request.minted {
                    return Err("Tokens already minted".to_string());
                }
                if amount == 0 {
                    return Err("Approved amount must be greater than zero".to_string());
                }
                request.approved_amount = amount;
                request.admin_notes = notes;
                Ok(vec![])
            }
            "mintTokens" => {
                state.require_role(Role::Government, caller)?;
                let request = state.request_mut(args.uint(0)?)?;
                if !request.verified {
                    return Err("Request not verified".to_string());
                }
                if request.approved_amount == 0 {
                    return Err("Amount not approved".to_string());
                }
                if request.minted {
                    return Err("Tokens already minted".to_string());
                }
                request.minted = true;
                let (submitter, amount) = (request.submitter, request.approved_amount);
                *state.balances.entry(submitter).or_default() += amount;
                state.total_supply += amount;
                Ok(vec![])
            }
            "addCertifier" | "addGovernment" => {
                state.require_role(Role::Admin, caller)?;
                let role = if function.name == "addCertifier" {
                    Role::Certifier
                } else {
                    Role::Government
                };
                state.roles.insert((role, args.address(0)?));
                Ok(vec![])
            }
            "getRequest" => Ok(state.request(args.uint(0)?)?.to_tokens()),
            "getMultipleRequests" => {
                let records = args
                    .uint_array(0)?
                    .into_iter()
                    .map(|id| state.request(id).map(|r| Token::Tuple(r.to_tokens())))
                    .collect::<Result<Vec<_>, String>>()?;
                Ok(vec![Token::Array(records)])
            }
            "getAllRequests" => Ok(vec![Token::Array(
                (0..state.requests.len() as u128).map(Token::Uint).collect(),
            )]),
            "getTotalRequests" => Ok(vec![Token::Uint(state.requests.len() as u128)]),
            "DEFAULT_ADMIN_ROLE" => Ok(vec![Token::FixedBytes(Role::Admin.id().to_vec())]),
            "CERTIFIER_ROLE" => Ok(vec![Token::FixedBytes(Role::Certifier.id().to_vec())]),
            "GOVERNMENT_ROLE" => Ok(vec![Token::FixedBytes(Role::Government.id().to_vec())]),
            "hasRole" => {
                let role = Role::from_id(&args.bytes32(0)?);
                let account = args.address(1)?;
                Ok(vec![Token::Bool(
                    role.is_some_and(|role| state.roles.contains(&(role, account))),
                )])
            }
            "balanceOf" => Ok(vec![Token::Uint(
                state.balances.get(&args.address(0)?).copied().unwrap_or(0),
            )]),
            "totalSupply" => Ok(vec![Token::Uint(state.total_supply)]),
            other => Err(format!("{} is not supported by the mock ledger", other)),
        }
    }
}

#[async_trait]
impl SigningProvider for MockLedger {
    fn name(&self) -> &str {
        "mock-ledger"
    }

    async fn request_accounts(&self) -> ProviderResult<Vec<Address>> {
        self.record(CallKind::Accounts, None, Vec::new(), None).await;
        if let Some(err) = &self.accounts_failure {
            return Err(err.clone());
        }
        Ok(self.accounts.clone())
    }

    async fn chain_id(&self) -> ProviderResult<u64> {
        self.record(CallKind::ChainId, None, Vec::new(), None).await;
        Ok(self.chain_id)
    }

    async fn estimate_gas(&self, tx: &TransactionRequest) -> ProviderResult<u64> {
        let (function, args) = self.decode_and_record(CallKind::Estimate, tx).await?;
        if let Some(err) = &self.estimate_failure {
            return Err(err.clone());
        }

        let mut scratch = self.state.read().await.clone();
        self.execute(&mut scratch, tx.from, function, args)
            .map_err(|reason| revert(&reason))?;

        Ok(self
            .fixed_gas_estimate
            .unwrap_or(21_000 + 16 * tx.data.len() as u64 + 30_000))
    }

    async fn send_transaction(&self, tx: &TransactionRequest) -> ProviderResult<TransactionId> {
        let (function, args) = self.decode_and_record(CallKind::Send, tx).await?;

        let mut state = self.state.write().await;
        state.block_number += 1;
        let outcome = if self.reverting_sends {
            Err("reverted by ledger configuration".to_string())
        } else {
            self.execute(&mut state, tx.from, function, args)
        };

        let mut preimage = state.block_number.to_be_bytes().to_vec();
        preimage.extend_from_slice(tx.from.as_bytes());
        preimage.extend_from_slice(&tx.data);
        let hash = TransactionId::new(format!("0x{}", hex::encode(abi::keccak256(&preimage))));

        if let Err(reason) = &outcome {
            info!("Mock ledger: {} reverted: {}", function.name, reason);
        }

        let receipt = TransactionReceipt {
            transaction_hash: hash.clone(),
            block_number: Some(state.block_number),
            gas_used: tx.gas,
            success: outcome.is_ok(),
        };
        state.receipts.insert(hash.as_str().to_string(), receipt);
        state.sent.push(hash.clone());
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: &TransactionId,
    ) -> ProviderResult<Option<TransactionReceipt>> {
        self.record(CallKind::Receipt, None, Vec::new(), None).await;
        if self.pending_receipts {
            return Ok(None);
        }
        Ok(self.state.read().await.receipts.get(hash.as_str()).cloned())
    }

    async fn call(&self, tx: &TransactionRequest) -> ProviderResult<Vec<u8>> {
        let (function, args) = self.decode_and_record(CallKind::Call, tx).await?;

        let mut scratch = self.state.read().await.clone();
        let values = self
            .execute(&mut scratch, tx.from, function, args)
            .map_err(|reason| revert(&reason))?;

        function
            .encode_output(&values)
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))
    }
}
