//! HTTP adapter for the hosted custodial wallet service.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use tossbot_types::{ChainNetwork, EvmAddress, TxHash, UsdcAmount, UserId};

use crate::{
    check_transfer_cap, ProviderWallet, TransferReceipt, WalletError, WalletProvider, WalletResult,
};

/// Configuration for the wallet service adapter.
#[derive(Debug, Clone)]
pub struct WalletServiceConfig {
    pub base_url: String,
    /// Credential pair for the hosted service.
    pub api_key_id: String,
    pub api_key_secret: String,
    pub network: ChainNetwork,
}

/// Adapter talking to the custodial wallet service over HTTPS.
///
/// Transfers are submitted as sponsored (gasless) USDC sends; the
/// service returns the transaction hash without waiting for
/// confirmation.
pub struct HttpWalletProvider {
    config: WalletServiceConfig,
    client: reqwest::Client,
}

impl HttpWalletProvider {
    pub fn new(config: WalletServiceConfig) -> Self {
        Self { config, client: reqwest::Client::new() }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn unavailable(e: reqwest::Error) -> WalletError {
        WalletError::ProviderUnavailable { message: e.to_string() }
    }

    async fn parse_wallet(
        &self,
        user_id: &UserId,
        response: reqwest::Response,
    ) -> WalletResult<ProviderWallet> {
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WalletError::NotFound { user_id: user_id.to_string() });
        }
        let body: WalletBody = Self::check(response).await?.json().await.map_err(Self::unavailable)?;
        let address = EvmAddress::parse(&body.address)
            .map_err(|_| WalletError::InvalidAddress { address: body.address.clone() })?;
        Ok(ProviderWallet {
            user_id: user_id.clone(),
            address,
            provider_blob: body.wallet_token,
        })
    }

    async fn check(response: reqwest::Response) -> WalletResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| status.to_string());
        Err(WalletError::ProviderUnavailable {
            message: format!("{status}: {message}"),
        })
    }
}

#[derive(Serialize)]
struct CreateWalletRequest<'a> {
    user_id: &'a str,
    network: &'a str,
}

#[derive(Deserialize)]
struct WalletBody {
    address: String,
    wallet_token: String,
}

#[derive(Deserialize)]
struct BalanceBody {
    /// Balance in micro-USDC.
    balance: u64,
}

#[derive(Serialize)]
struct TransferRequest<'a> {
    to: &'a str,
    /// Amount in micro-USDC.
    amount: u64,
    network: &'a str,
    gasless: bool,
}

#[derive(Deserialize)]
struct TransferBody {
    transaction_hash: String,
    #[serde(default)]
    error: Option<String>,
}

#[async_trait]
impl WalletProvider for HttpWalletProvider {
    async fn create(&self, user_id: &UserId) -> WalletResult<ProviderWallet> {
        let response = self
            .client
            .post(self.url("/v1/wallets"))
            .basic_auth(&self.config.api_key_id, Some(&self.config.api_key_secret))
            .json(&CreateWalletRequest {
                user_id: user_id.as_str(),
                network: self.config.network.name(),
            })
            .send()
            .await
            .map_err(Self::unavailable)?;
        self.parse_wallet(user_id, response).await
    }

    async fn load(&self, user_id: &UserId) -> WalletResult<ProviderWallet> {
        let response = self
            .client
            .get(self.url(&format!("/v1/wallets/{user_id}")))
            .basic_auth(&self.config.api_key_id, Some(&self.config.api_key_secret))
            .send()
            .await
            .map_err(Self::unavailable)?;
        self.parse_wallet(user_id, response).await
    }

    async fn balance(&self, user_id: &UserId) -> WalletResult<UsdcAmount> {
        let response = self
            .client
            .get(self.url(&format!("/v1/wallets/{user_id}/balance")))
            .basic_auth(&self.config.api_key_id, Some(&self.config.api_key_secret))
            .query(&[("asset", "usdc"), ("network", self.config.network.name())])
            .send()
            .await
            .map_err(Self::unavailable)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(WalletError::NotFound { user_id: user_id.to_string() });
        }
        let body: BalanceBody = Self::check(response).await?.json().await.map_err(Self::unavailable)?;
        Ok(UsdcAmount::from_micros(body.balance))
    }

    async fn transfer(
        &self,
        from_user_id: &UserId,
        to_address: &EvmAddress,
        amount: UsdcAmount,
    ) -> WalletResult<TransferReceipt> {
        check_transfer_cap(amount)?;

        let response = self
            .client
            .post(self.url(&format!("/v1/wallets/{from_user_id}/transfers")))
            .basic_auth(&self.config.api_key_id, Some(&self.config.api_key_secret))
            .json(&TransferRequest {
                to: to_address.as_str(),
                amount: amount.micros(),
                network: self.config.network.name(),
                gasless: true,
            })
            .send()
            .await
            .map_err(Self::unavailable)?;

        let status = response.status();
        if status == reqwest::StatusCode::PAYMENT_REQUIRED {
            let body: TransferBody = response.json().await.map_err(Self::unavailable)?;
            return Err(WalletError::InsufficientFunds {
                available: body.error.unwrap_or_default(),
                required: amount.to_display_string(),
            });
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(WalletError::NotFound { user_id: from_user_id.to_string() });
        }

        let body: TransferBody = Self::check(response).await?.json().await.map_err(Self::unavailable)?;
        let hash = TxHash::parse(&body.transaction_hash).map_err(|_| {
            WalletError::ProviderUnavailable {
                message: format!("malformed transaction hash '{}'", body.transaction_hash),
            }
        })?;
        let link = self.config.network.explorer_tx_link(&hash);
        tracing::debug!(from = %from_user_id, to = %to_address, amount = %amount, tx = %hash, "transfer submitted");
        Ok(TransferReceipt { hash, link })
    }
}
