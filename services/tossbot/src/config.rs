//! Bot configuration: environment variables with CLI overrides.

use clap::{Parser, ValueEnum};

use tossbot_types::ChainNetwork;

/// Which messaging network set the bot joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkEnv {
    /// Developer messaging network.
    Dev,
    /// Production messaging network.
    Production,
    /// No external network: stdin/stdout transport and a mock wallet
    /// provider, for local runs.
    Local,
}

/// Toss bot: chat-native wagers with on-chain stakes
#[derive(Parser, Debug)]
#[command(name = "tossbot")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Signing key for the bot's messaging identity (hex)
    #[arg(long, env = "TOSSBOT_WALLET_KEY")]
    pub wallet_key: Option<String>,

    /// Encryption key for the messaging store (32-byte hex)
    #[arg(long, env = "TOSSBOT_DB_ENCRYPTION_KEY")]
    pub db_encryption_key: Option<String>,

    /// Messaging network set
    #[arg(long, env = "TOSSBOT_ENV", value_enum, default_value = "dev")]
    pub network_env: NetworkEnv,

    /// Messaging gateway endpoint (dev/production)
    #[arg(long, env = "TOSSBOT_GATEWAY_URL", default_value = "http://127.0.0.1:7656")]
    pub gateway_url: String,

    /// Chain to settle on
    #[arg(long, env = "TOSSBOT_CHAIN", default_value = "base-sepolia")]
    pub chain: ChainNetwork,

    /// JSON-RPC endpoint; defaults to the chain's public endpoint
    #[arg(long, env = "TOSSBOT_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Custodial wallet service credential id
    #[arg(long, env = "TOSSBOT_WALLET_API_KEY_ID")]
    pub wallet_api_key_id: Option<String>,

    /// Custodial wallet service credential secret
    #[arg(long, env = "TOSSBOT_WALLET_API_KEY_SECRET")]
    pub wallet_api_key_secret: Option<String>,

    /// Custodial wallet service endpoint
    #[arg(long, env = "TOSSBOT_WALLET_SERVICE_URL", default_value = "https://api.cdp.coinbase.com")]
    pub wallet_service_url: String,

    /// API key for the LLM toss parser; rule-based parsing without it
    #[arg(long, env = "TOSSBOT_LLM_API_KEY")]
    pub llm_api_key: Option<String>,

    /// Prefix text commands must start with
    #[arg(long, env = "TOSSBOT_COMMAND_PREFIX", default_value = "@toss")]
    pub command_prefix: String,

    /// Comma-separated command whitelist (all commands when unset)
    #[arg(long, env = "TOSSBOT_ALLOWED_COMMANDS")]
    pub allowed_commands: Option<String>,

    /// Message sent once per DM on first interaction
    #[arg(long, env = "TOSSBOT_WELCOME_DM")]
    pub welcome_dm: Option<String>,

    /// Message sent once per group on first interaction
    #[arg(long, env = "TOSSBOT_WELCOME_GROUP")]
    pub welcome_group: Option<String>,

    /// Directory for the JSON record store
    #[arg(long, env = "TOSSBOT_DATA_DIR", default_value = ".data")]
    pub data_dir: String,

    /// Chain watcher poll interval in seconds
    #[arg(long, env = "TOSSBOT_POLL_INTERVAL_SECS", default_value = "30")]
    pub poll_interval_secs: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "TOSSBOT_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json, pretty)
    #[arg(long, env = "TOSSBOT_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl Args {
    /// Reject configurations that cannot run. The local env needs no
    /// external credentials; dev/production need all of them.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.network_env == NetworkEnv::Local {
            return Ok(());
        }

        if self.wallet_key.as_deref().unwrap_or("").is_empty() {
            anyhow::bail!("TOSSBOT_WALLET_KEY is required outside the local env");
        }
        match self.db_encryption_key.as_deref() {
            None | Some("") => {
                anyhow::bail!("TOSSBOT_DB_ENCRYPTION_KEY is required outside the local env")
            }
            Some(key) if key.len() != 64 || !key.chars().all(|c| c.is_ascii_hexdigit()) => {
                anyhow::bail!("TOSSBOT_DB_ENCRYPTION_KEY must be 32 bytes of hex");
            }
            Some(_) => {}
        }
        if self.wallet_api_key_id.as_deref().unwrap_or("").is_empty()
            || self.wallet_api_key_secret.as_deref().unwrap_or("").is_empty()
        {
            anyhow::bail!(
                "TOSSBOT_WALLET_API_KEY_ID and TOSSBOT_WALLET_API_KEY_SECRET are required outside the local env"
            );
        }
        Ok(())
    }

    pub fn rpc_url(&self) -> String {
        self.rpc_url
            .clone()
            .unwrap_or_else(|| self.chain.default_rpc_url().to_string())
    }

    pub fn allowed_command_list(&self) -> Option<Vec<String>> {
        self.allowed_commands.as_ref().map(|raw| {
            raw.split(',')
                .map(|name| name.trim().to_ascii_lowercase())
                .filter(|name| !name.is_empty())
                .collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_env_needs_no_credentials() {
        let args = Args::parse_from(["tossbot", "--network-env", "local"]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_dev_env_requires_credentials() {
        let args = Args::parse_from(["tossbot", "--network-env", "dev"]);
        assert!(args.validate().is_err());

        let args = Args::parse_from([
            "tossbot",
            "--network-env",
            "dev",
            "--wallet-key",
            "0xabc",
            "--db-encryption-key",
            &"a".repeat(64),
            "--wallet-api-key-id",
            "id",
            "--wallet-api-key-secret",
            "secret",
        ]);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_db_key_must_be_32_byte_hex() {
        let args = Args::parse_from([
            "tossbot",
            "--network-env",
            "dev",
            "--wallet-key",
            "0xabc",
            "--db-encryption-key",
            "tooshort",
            "--wallet-api-key-id",
            "id",
            "--wallet-api-key-secret",
            "secret",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_chain_and_defaults() {
        let args = Args::parse_from(["tossbot", "--chain", "base-mainnet"]);
        assert_eq!(args.chain, ChainNetwork::BaseMainnet);
        assert_eq!(args.rpc_url(), "https://mainnet.base.org");
        assert_eq!(args.command_prefix, "@toss");
        assert_eq!(args.poll_interval_secs, 30);
    }

    #[test]
    fn test_allowed_commands_parsing() {
        let args = Args::parse_from(["tossbot", "--allowed-commands", "help, Status,close"]);
        assert_eq!(
            args.allowed_command_list(),
            Some(vec!["help".to_string(), "status".to_string(), "close".to_string()])
        );
    }
}
