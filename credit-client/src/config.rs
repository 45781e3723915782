use crate::client::ClientSettings;
use crate::descriptor::InterfaceDescriptor;
use crate::{Error, Result};
use config::{Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub rpc: RpcConfig,
    pub contract: ContractConfig,
    pub network: NetworkConfig,
    pub transaction: TransactionConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RpcConfig {
    pub url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ContractConfig {
    pub address: String,
    /// ABI JSON file; the bundled descriptor is used when unset
    pub interface_file: Option<String>,
    pub strict_interface: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NetworkConfig {
    pub expected_chain_id: u64,
    pub explorer_url: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct TransactionConfig {
    pub gas_margin_percent: u64,
    pub poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
}

impl Config {
    /// Load from `CREDIT_CONFIG` (if set) and the environment
    pub fn from_env() -> Result<Self> {
        let file = env::var("CREDIT_CONFIG").ok();
        Self::load(file.as_deref().map(Path::new))
    }

    /// Load defaults, then `file`, then environment overrides
    pub fn load(file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            // Start with default configuration
            .set_default("rpc.url", "http://127.0.0.1:8545")?
            .set_default("rpc.timeout_secs", 30)?
            .set_default("contract.address", crate::DEFAULT_CONTRACT_ADDRESS)?
            .set_default("contract.strict_interface", false)?
            .set_default("network.expected_chain_id", crate::SEPOLIA_CHAIN_ID)?
            .set_default("network.explorer_url", crate::DEFAULT_EXPLORER_URL)?
            .set_default(
                "transaction.gas_margin_percent",
                crate::DEFAULT_GAS_MARGIN_PERCENT,
            )?
            .set_default("transaction.poll_interval_ms", 2_000)?
            .set_default("transaction.confirmation_timeout_secs", 300)?;

        if let Some(path) = file {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables
        builder = builder.add_source(Environment::with_prefix("CREDIT_CLIENT").separator("__"));

        if let Ok(rpc_url) = env::var("RPC_URL") {
            builder = builder.set_override("rpc.url", rpc_url)?;
        }

        if let Ok(address) = env::var("CONTRACT_ADDRESS") {
            builder = builder.set_override("contract.address", address)?;
        }

        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rpc.url.trim().is_empty() {
            return Err(Error::Config("RPC URL is required".to_string()));
        }

        if self.rpc.timeout_secs == 0 {
            return Err(Error::Config("RPC timeout cannot be 0".to_string()));
        }

        if self.contract.address.parse::<crate::Address>().is_err() {
            return Err(Error::Config(format!(
                "Invalid contract address '{}'",
                self.contract.address
            )));
        }

        if self.transaction.poll_interval_ms == 0 {
            return Err(Error::Config("Poll interval cannot be 0".to_string()));
        }

        if self.transaction.confirmation_timeout_secs == 0 {
            return Err(Error::Config("Confirmation timeout cannot be 0".to_string()));
        }

        Ok(())
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc.timeout_secs)
    }

    pub fn client_settings(&self) -> Result<ClientSettings> {
        let address = self
            .contract
            .address
            .parse()
            .map_err(|_| Error::Config(format!("Invalid contract address '{}'", self.contract.address)))?;

        Ok(ClientSettings {
            contract_address: address,
            expected_chain_id: self.network.expected_chain_id,
            gas_margin_percent: self.transaction.gas_margin_percent,
            poll_interval: Duration::from_millis(self.transaction.poll_interval_ms),
            confirmation_timeout: Duration::from_secs(self.transaction.confirmation_timeout_secs),
            strict_interface: self.contract.strict_interface,
        })
    }

    /// Interface descriptor named by the configuration
    pub fn descriptor(&self) -> Result<InterfaceDescriptor> {
        match &self.contract.interface_file {
            Some(path) => InterfaceDescriptor::from_file(path),
            None => InterfaceDescriptor::bundled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_config(name: &str, body: &str) -> std::path::PathBuf {
        let path = env::temp_dir().join(format!("credit-client-{}-{}.toml", name, std::process::id()));
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_file_values_reach_client_settings() {
        let path = write_config(
            "settings",
            r#"
[network]
expected_chain_id = 31337

[transaction]
gas_margin_percent = 50
poll_interval_ms = 10

[contract]
strict_interface = true
"#,
        );

        let config = Config::load(Some(&path)).unwrap();
        fs::remove_file(&path).ok();

        let settings = config.client_settings().unwrap();
        assert_eq!(settings.expected_chain_id, 31_337);
        assert_eq!(settings.gas_margin_percent, 50);
        assert_eq!(settings.poll_interval, Duration::from_millis(10));
        assert!(settings.strict_interface);
        assert_eq!(config.network.explorer_url, crate::DEFAULT_EXPLORER_URL);
        assert!(config.descriptor().is_ok());
    }

    #[test]
    fn test_invalid_contract_address_is_rejected() {
        let path = write_config(
            "bad-address",
            r#"
[contract]
address = "0x1234"
"#,
        );

        let result = Config::load(Some(&path));
        fs::remove_file(&path).ok();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Config::load(Some(Path::new("/nonexistent/credit.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
