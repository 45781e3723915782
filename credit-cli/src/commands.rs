use crate::output::Output;
use anyhow::Result;
use clap::Subcommand;
use credit_client::{Address, LedgerClient};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Request the signing account and show the connected network
    Connect,

    /// Show the contract address and the operations its interface declares
    Inspect,

    /// Show admin, certifier and government roles of an account
    Roles {
        /// Account to check (defaults to the signing account)
        #[arg(long)]
        account: Option<Address>,
    },

    /// Submit a certification request
    Submit {
        /// Off-chain report reference, e.g. an IPFS URI
        #[arg(long)]
        report_uri: String,

        /// Requested credit amount
        #[arg(long, allow_hyphen_values = true)]
        amount: i64,
    },

    /// Approve an amount for a request (admin)
    Approve {
        #[arg(long)]
        id: u64,

        #[arg(long, allow_hyphen_values = true)]
        amount: i64,

        #[arg(long, default_value = "")]
        notes: String,
    },

    /// Verify a request (certifier)
    Verify {
        #[arg(long)]
        id: u64,
    },

    /// Mint tokens for a verified, approved request (government)
    Mint {
        #[arg(long)]
        id: u64,
    },

    /// Show one request
    Get {
        #[arg(long)]
        id: u64,
    },

    /// List every request
    List,

    /// Show the number of requests
    Total,

    /// Grant the certifier role (admin)
    AddCertifier {
        /// Account to grant (defaults to the signing account)
        #[arg(long)]
        account: Option<Address>,
    },

    /// Grant the government role (admin)
    AddGovernment {
        /// Account to grant (defaults to the signing account)
        #[arg(long)]
        account: Option<Address>,
    },

    /// Walk through the certificate lifecycle against an in-memory ledger
    Demo,
}

pub async fn execute(client: &LedgerClient, command: Command, out: &Output) -> Result<()> {
    match command {
        Command::Connect => out.identity(&client.connect().await?),
        Command::Inspect => out.interface(&client.describe_interface()),
        Command::Roles { account } => {
            let account = resolve_account(client, account).await?;
            out.roles(account, &client.get_roles(account).await?)
        }
        Command::Submit { report_uri, amount } => out.transaction(
            "Certification request submitted",
            &client.submit_request(&report_uri, amount).await?,
        ),
        Command::Approve { id, amount, notes } => out.transaction(
            &format!("Approved {} for request #{}", amount, id),
            &client.approve(id, amount, &notes).await?,
        ),
        Command::Verify { id } => out.transaction(
            &format!("Request #{} verified", id),
            &client.verify(id).await?,
        ),
        Command::Mint { id } => out.transaction(
            &format!("Tokens minted for request #{}", id),
            &client.mint(id).await?,
        ),
        Command::Get { id } => out.request(&client.get_request(id).await?),
        Command::List => out.entries(&client.load_requests().await?),
        Command::Total => out.total(client.total_count().await?),
        Command::AddCertifier { account } => {
            let account = resolve_account(client, account).await?;
            out.transaction(
                &format!("Certifier role granted to {}", account),
                &client.grant_certifier(account).await?,
            )
        }
        Command::AddGovernment { account } => {
            let account = resolve_account(client, account).await?;
            out.transaction(
                &format!("Government role granted to {}", account),
                &client.grant_government(account).await?,
            )
        }
        Command::Demo => crate::demo::run(out).await,
    }
}

async fn resolve_account(client: &LedgerClient, account: Option<Address>) -> Result<Address> {
    match account {
        Some(account) => Ok(account),
        None => Ok(client.connect().await?.account),
    }
}
