//! Text and JSON rendering of command results

use anyhow::Result;
use credit_client::{
    Address, CertificationRequest, Identity, InterfaceDescription, RequestEntry, Roles,
    TransactionId,
};
use serde::Serialize;
use serde_json::json;

pub struct Output {
    json: bool,
    explorer_url: String,
}

impl Output {
    pub fn new(json: bool, explorer_url: &str) -> Self {
        Output {
            json,
            explorer_url: explorer_url.to_string(),
        }
    }

    /// Progress line of a multi-step command; kept off stdout when printing JSON
    pub fn step(&self, line: &str) {
        if self.steps_on_stderr() {
            eprintln!("{}", line);
        } else {
            println!("{}", line);
        }
    }

    fn steps_on_stderr(&self) -> bool {
        self.json
    }

    fn print_json<T: Serialize>(&self, value: &T) -> Result<()> {
        println!("{}", serde_json::to_string_pretty(value)?);
        Ok(())
    }

    pub fn transaction(&self, summary: &str, hash: &TransactionId) -> Result<()> {
        let link = hash.explorer_url(&self.explorer_url);
        if self.json {
            return self.print_json(&json!({
                "summary": summary,
                "transaction": hash,
                "explorer": link,
            }));
        }
        println!("✅ {}", summary);
        println!("   tx: {}", hash);
        println!("   {}", link);
        Ok(())
    }

    pub fn identity(&self, identity: &Identity) -> Result<()> {
        if self.json {
            return self.print_json(&json!({
                "account": identity.account,
                "chain_id": identity.chain_id,
                "expected_chain_id": identity.expected_chain_id,
                "wrong_network": identity.wrong_network(),
            }));
        }
        println!("Account: {}", identity.account);
        println!("Chain:   {}", identity.chain_id);
        if identity.wrong_network() {
            println!(
                "⚠️  Wrong network: switch to chain {} before sending transactions",
                identity.expected_chain_id
            );
        }
        Ok(())
    }

    pub fn interface(&self, description: &InterfaceDescription) -> Result<()> {
        if self.json {
            return self.print_json(description);
        }
        println!("Contract: {}", description.address);
        println!("Operations ({}):", description.operations.len());
        for name in &description.operations {
            println!("  {}", name);
        }
        if !description.missing.is_empty() {
            println!("Missing: {}", description.missing.join(", "));
        }
        Ok(())
    }

    pub fn roles(&self, account: Address, roles: &Roles) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "account": account, "roles": roles }));
        }
        let mark = |granted: bool| if granted { "yes" } else { "no" };
        println!("Roles of {}", account);
        println!("  admin:      {}", mark(roles.admin));
        println!("  certifier:  {}", mark(roles.certifier));
        println!("  government: {}", mark(roles.government));
        Ok(())
    }

    pub fn request(&self, request: &CertificationRequest) -> Result<()> {
        if self.json {
            return self.print_json(&json!({
                "request": request,
                "stage": request.stage(),
            }));
        }
        print_request(request);
        Ok(())
    }

    pub fn entries(&self, entries: &[RequestEntry]) -> Result<()> {
        if self.json {
            return self.print_json(&entries);
        }
        if entries.is_empty() {
            println!("No certification requests");
            return Ok(());
        }
        for entry in entries {
            match entry {
                RequestEntry::Loaded(request) => print_request(request),
                RequestEntry::Failed { id, error } => {
                    println!("Request #{}: could not be loaded ({})", id, error)
                }
            }
            println!();
        }
        Ok(())
    }

    pub fn total(&self, total: u64) -> Result<()> {
        if self.json {
            return self.print_json(&json!({ "total": total }));
        }
        println!("{} certification request(s)", total);
        Ok(())
    }
}

fn print_request(request: &CertificationRequest) {
    println!("Request #{} [{}]", request.id, request.stage());
    println!("  submitter: {}", request.submitter);
    println!("  report:    {}", request.report_uri);
    println!("  requested: {}", request.requested_amount);
    println!("  approved:  {}", request.approved_amount);
    println!("  verified:  {}", request.verified);
    println!("  minted:    {}", request.minted);
    println!("  submitted: {}", request.timestamp);
    if !request.admin_notes.is_empty() {
        println!("  notes:     {}", request.admin_notes);
    }
}
