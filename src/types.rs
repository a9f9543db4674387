//! Shared domain types and chain constants

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;

use crate::error::{Error, Result};

/// Canonical wrapped-SOL mint address
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Canonical USDC mint address
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Base units left untouched on every sell to avoid account-closing dust races
pub const DUST_BUFFER_BASE_UNITS: u64 = 10;

/// Rent-exempt minimum for an associated token account
pub const ATA_RENT_LAMPORTS: u64 = 2_039_280;

/// Flat base fee per transaction
pub const BASE_FEE_LAMPORTS: u64 = 10_000;

/// Extra lamports kept aside before any send
pub const SAFETY_BUFFER_LAMPORTS: u64 = 5_000_000;

/// Decimals assumed when on-chain mint info cannot be read
pub const FALLBACK_DECIMALS: u8 = 6;

lazy_static! {
    pub static ref SOL_MINT_PUBKEY: Pubkey = Pubkey::from_str(SOL_MINT).unwrap();
    pub static ref USDC_MINT_PUBKEY: Pubkey = Pubkey::from_str(USDC_MINT).unwrap();
}

/// Opaque token identifier. Base58 alphabet, 32-44 characters.
///
/// Keyed everywhere instead of raw strings so a mint can never be confused
/// with a signature or a wallet address in a map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Mint(String);

impl Mint {
    /// Parse and validate a mint address
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() < 32 || s.len() > 44 {
            return Err(Error::InvalidMint(s.to_string()));
        }
        bs58::decode(s)
            .into_vec()
            .map_err(|_| Error::InvalidMint(s.to_string()))?;
        Ok(Self(s.to_string()))
    }

    /// Construct without validation. For constants and storage rows that
    /// were validated on the way in.
    pub fn new_unchecked(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert to an on-chain pubkey
    pub fn to_pubkey(&self) -> Result<Pubkey> {
        Pubkey::from_str(&self.0).map_err(|_| Error::InvalidMint(self.0.clone()))
    }

    pub fn sol() -> Self {
        Self(SOL_MINT.to_string())
    }

    pub fn usdc() -> Self {
        Self(USDC_MINT.to_string())
    }

    pub fn is_sol(&self) -> bool {
        self.0 == SOL_MINT
    }

    pub fn is_usdc(&self) -> bool {
        self.0 == USDC_MINT
    }
}

impl fmt::Display for Mint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Mint {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// Slot class of a held position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotType {
    Core,
    Scout,
}

impl SlotType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotType::Core => "core",
            SlotType::Scout => "scout",
        }
    }
}

impl FromStr for SlotType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "core" => Ok(SlotType::Core),
            "scout" => Ok(SlotType::Scout),
            other => Err(Error::Internal(format!("unknown slot type: {other}"))),
        }
    }
}

/// Origin of a lot or a tracked position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSource {
    Bot,
    WalletDiscovery,
    Sniper,
}

impl PositionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PositionSource::Bot => "bot",
            PositionSource::WalletDiscovery => "wallet_discovery",
            PositionSource::Sniper => "sniper",
        }
    }
}

impl FromStr for PositionSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bot" => Ok(PositionSource::Bot),
            "wallet_discovery" => Ok(PositionSource::WalletDiscovery),
            "sniper" => Ok(PositionSource::Sniper),
            other => Err(Error::Internal(format!("unknown position source: {other}"))),
        }
    }
}

/// Market regime supplied by the upstream signal producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trend,
    #[default]
    Range,
}

/// One `(score, regime)` tuple per mint from the upstream feature producer
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Signal {
    /// Score in [-1, +1]; out-of-range input is clamped at the ranker edge
    pub score: f64,
    pub regime: Regime,
    /// Age of the underlying observation, seconds
    pub age_secs: f64,
}

impl Default for Signal {
    fn default() -> Self {
        Self {
            score: 0.0,
            regime: Regime::Range,
            age_secs: f64::MAX,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mint_parse_valid() {
        let mint = Mint::parse(SOL_MINT).unwrap();
        assert!(mint.is_sol());
        assert!(!mint.is_usdc());
        assert_eq!(mint.as_str(), SOL_MINT);
    }

    #[test]
    fn test_mint_parse_rejects_short() {
        assert!(Mint::parse("abc").is_err());
    }

    #[test]
    fn test_mint_parse_rejects_non_base58() {
        assert!(Mint::parse("0OIl+/0OIl+/0OIl+/0OIl+/0OIl+/0OIl+/").is_err());
    }

    #[test]
    fn test_mint_pubkey_roundtrip() {
        let mint = Mint::usdc();
        assert_eq!(mint.to_pubkey().unwrap(), *USDC_MINT_PUBKEY);
    }

    #[test]
    fn test_slot_type_roundtrip() {
        assert_eq!("core".parse::<SlotType>().unwrap(), SlotType::Core);
        assert_eq!(SlotType::Scout.as_str(), "scout");
    }

    #[test]
    fn test_source_roundtrip() {
        for s in [
            PositionSource::Bot,
            PositionSource::WalletDiscovery,
            PositionSource::Sniper,
        ] {
            assert_eq!(s.as_str().parse::<PositionSource>().unwrap(), s);
        }
    }
}
