// Demo walkthrough - runs the full certificate lifecycle against an in-memory
// ledger, including a mint attempted before verification

use crate::output::Output;
use anyhow::Result;
use credit_client::{
    Address, ClientSettings, InterfaceDescriptor, LedgerClient, MockLedger, SigningProvider,
};
use std::sync::Arc;
use std::time::Duration;

const DEMO_ACCOUNT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
const DEMO_REPORT: &str = "ipfs://bafybeigdyrzt5sfp7udm7hu76uh7y26nf3efuylqabf3oclgtqy55fbzdi";

pub async fn run(out: &Output) -> Result<()> {
    let account: Address = DEMO_ACCOUNT.parse()?;
    let contract: Address = credit_client::DEFAULT_CONTRACT_ADDRESS.parse()?;

    let ledger: Arc<dyn SigningProvider> = Arc::new(MockLedger::new(contract, account)?);
    let mut settings = ClientSettings::new(contract);
    settings.poll_interval = Duration::from_millis(10);
    let client = LedgerClient::new(ledger, InterfaceDescriptor::bundled()?, settings)?;

    out.step("\n🌱 =================================================================");
    out.step("🌱 Hydrogen Credit Certificates - Lifecycle Demo (in-memory ledger)");
    out.step("🌱 =================================================================\n");

    // Step 1: Connect
    let identity = client.connect().await?;
    out.step(&format!("  ✅ Connected as {} on chain {}", identity.account, identity.chain_id));

    // Step 2: Roles
    client.grant_certifier(account).await?;
    client.grant_government(account).await?;
    let roles = client.get_roles(account).await?;
    out.step(&format!(
        "  ✅ Roles granted (admin={}, certifier={}, government={})",
        roles.admin, roles.certifier, roles.government
    ));

    // Step 3: Submission
    let hash = client.submit_request(DEMO_REPORT, 1_000).await?;
    let id = client.total_count().await?.saturating_sub(1);
    out.step(&format!("  ✅ Request #{} submitted for 1000 credits (tx {})", id, hash));

    // Step 4: Approval
    client
        .approve(id, 800, "Electrolyser output audited at 80% of claim")
        .await?;
    out.step("  ✅ Approved 800 credits");

    // Step 5: Mint before verification is refused by the contract
    match client.mint(id).await {
        Ok(_) => out.step("  ⚠️  Mint unexpectedly accepted before verification"),
        Err(e) => out.step(&format!("  🛑 Mint before verification rejected: {}", e)),
    }

    // Step 6: Verification
    client.verify(id).await?;
    out.step("  ✅ Request verified by certifier");

    // Step 7: Mint
    let hash = client.mint(id).await?;
    out.step(&format!("  🎉 Tokens minted (tx {})\n", hash));

    out.entries(&client.load_requests().await?)
}
