//! Chain RPC client
//!
//! Token balances are read by deriving the associated token account under the
//! native SPL program first, then token-2022. Decimals always come from
//! on-chain mint info; market-data metadata is never trusted for them.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::InstructionError;
use solana_sdk::program_pack::Pack;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use spl_associated_token_account::get_associated_token_address_with_program_id;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Mint, FALLBACK_DECIMALS};

/// Balance of one token account in base units, with on-chain decimals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenBalance {
    pub base_units: u64,
    pub decimals: u8,
}

/// Result of simulating a transaction against chain state
#[derive(Debug, Clone)]
pub struct SimulationOutcome {
    pub err: Option<String>,
    /// Custom program error code, when the failure carries one
    pub custom_error_code: Option<u32>,
    pub logs: Vec<String>,
    pub units_consumed: Option<u64>,
}

impl SimulationOutcome {
    pub fn success(&self) -> bool {
        self.err.is_none()
    }
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_balance(&self, owner: &Pubkey) -> Result<u64>;
    async fn get_token_balance(&self, owner: &Pubkey, mint: &Mint) -> Result<TokenBalance>;
    /// All token accounts owned by the wallet, across SPL and token-2022
    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<(Mint, TokenBalance)>>;
    async fn get_mint_decimals(&self, mint: &Mint) -> Result<u8>;
    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome>;
    async fn send_versioned_transaction(&self, tx: &VersionedTransaction) -> Result<Signature>;
}

/// Token-2022 program id. Not re-exported by the pinned spl-token crate, so
/// declared here from the canonical address.
fn token_2022_program_id() -> Pubkey {
    "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb"
        .parse()
        .expect("static program id")
}

pub struct RpcChainClient {
    rpc: RpcClient,
}

impl RpcChainClient {
    pub fn new(endpoint: String, timeout_ms: u64) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                endpoint,
                Duration::from_millis(timeout_ms),
                CommitmentConfig::confirmed(),
            ),
        }
    }

    /// Retry a transient read with short exponential backoff
    async fn with_read_retries<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = std::result::Result<T, backoff::Error<Error>>>,
    {
        let policy = backoff::ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(100))
            .with_max_interval(Duration::from_millis(800))
            .with_max_elapsed_time(Some(Duration::from_secs(5)))
            .build();
        backoff::future::retry(policy, op).await
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn get_balance(&self, owner: &Pubkey) -> Result<u64> {
        self.with_read_retries(|| async {
            self.rpc
                .get_balance(owner)
                .await
                .map_err(|e| backoff::Error::transient(Error::from(e)))
        })
        .await
    }

    async fn get_token_balance(&self, owner: &Pubkey, mint: &Mint) -> Result<TokenBalance> {
        let mint_pubkey = mint.to_pubkey()?;
        let decimals = self.get_mint_decimals(mint).await.unwrap_or_else(|e| {
            warn!(mint = %mint, "mint decimals unavailable ({e}), using fallback");
            FALLBACK_DECIMALS
        });

        // Try the native SPL program first, then token-2022
        for program_id in [spl_token::ID, token_2022_program_id()] {
            let ata = get_associated_token_address_with_program_id(owner, &mint_pubkey, &program_id);
            match self.rpc.get_token_account_balance(&ata).await {
                Ok(balance) => {
                    let base_units = balance
                        .amount
                        .parse::<u64>()
                        .map_err(|e| Error::Rpc(format!("bad token amount: {e}")))?;
                    return Ok(TokenBalance {
                        base_units,
                        decimals,
                    });
                }
                Err(e) => {
                    debug!(mint = %mint, program = %program_id, "no token account: {e}");
                }
            }
        }

        // No account under either program: balance is zero
        Ok(TokenBalance {
            base_units: 0,
            decimals,
        })
    }

    async fn get_token_holdings(&self, owner: &Pubkey) -> Result<Vec<(Mint, TokenBalance)>> {
        use solana_account_decoder::UiAccountData;
        use solana_client::rpc_request::TokenAccountsFilter;

        let mut out = Vec::new();
        for program_id in [spl_token::ID, token_2022_program_id()] {
            let accounts = self
                .rpc
                .get_token_accounts_by_owner(owner, TokenAccountsFilter::ProgramId(program_id))
                .await?;
            for keyed in accounts {
                let UiAccountData::Json(parsed) = keyed.account.data else {
                    continue;
                };
                let info = &parsed.parsed["info"];
                let Some(mint_str) = info["mint"].as_str() else {
                    continue;
                };
                let Ok(mint) = Mint::parse(mint_str) else {
                    continue;
                };
                let amount = info["tokenAmount"]["amount"]
                    .as_str()
                    .and_then(|a| a.parse::<u64>().ok())
                    .unwrap_or(0);
                let decimals = info["tokenAmount"]["decimals"]
                    .as_u64()
                    .map(|d| d as u8)
                    .unwrap_or(FALLBACK_DECIMALS);
                out.push((
                    mint,
                    TokenBalance {
                        base_units: amount,
                        decimals,
                    },
                ));
            }
        }
        Ok(out)
    }

    async fn get_mint_decimals(&self, mint: &Mint) -> Result<u8> {
        let account = self.rpc.get_account(&mint.to_pubkey()?).await?;
        // The token-2022 mint layout shares the base prefix, so unpacking the
        // SPL layout from the head of the data works for both programs.
        let data = account
            .data
            .get(..spl_token::state::Mint::LEN)
            .ok_or_else(|| Error::Rpc(format!("mint account too short for {mint}")))?;
        let mint_info = spl_token::state::Mint::unpack_from_slice(data)
            .map_err(|e| Error::Rpc(format!("mint unpack failed for {mint}: {e}")))?;
        Ok(mint_info.decimals)
    }

    async fn simulate_transaction(&self, tx: &VersionedTransaction) -> Result<SimulationOutcome> {
        let response = self.rpc.simulate_transaction(tx).await?;
        let value = response.value;
        let custom_error_code = value.err.as_ref().and_then(|err| match err {
            TransactionError::InstructionError(_, InstructionError::Custom(code)) => Some(*code),
            _ => None,
        });
        Ok(SimulationOutcome {
            err: value.err.map(|e| e.to_string()),
            custom_error_code,
            logs: value.logs.unwrap_or_default(),
            units_consumed: value.units_consumed,
        })
    }

    async fn send_versioned_transaction(&self, tx: &VersionedTransaction) -> Result<Signature> {
        self.rpc
            .send_transaction(tx)
            .await
            .map_err(|e| Error::TransactionSend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_2022_program_id_parses() {
        let id = token_2022_program_id();
        assert_ne!(id, spl_token::ID);
    }

    #[test]
    fn test_simulation_outcome_success() {
        let ok = SimulationOutcome {
            err: None,
            custom_error_code: None,
            logs: vec![],
            units_consumed: Some(1),
        };
        assert!(ok.success());
        let failed = SimulationOutcome {
            err: Some("custom program error".into()),
            custom_error_code: Some(6001),
            logs: vec![],
            units_consumed: None,
        };
        assert!(!failed.success());
    }
}
