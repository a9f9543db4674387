//! Error types for the rotation agent

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the rotation agent
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Invalid mint address: {0}")]
    InvalidMint(String),

    // Upstream errors
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Upstream timeout after {0}ms")]
    UpstreamTimeout(u64),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("HTTP error: {0}")]
    Http(String),

    // Execution errors
    #[error("Quote rejected: {0}")]
    QuoteRejected(String),

    #[error("Simulation failed: code {code} ({name})")]
    SimulationFailed { code: u32, name: String },

    #[error("Insufficient funds: have {have} lamports, need {need}")]
    InsufficientFunds { have: u64, need: u64 },

    #[error("Insufficient token balance: have {have}, requested {requested}")]
    InsufficientToken { have: u64, requested: u64 },

    #[error("Fee ratio {ratio:.6} exceeds hard cap {cap:.6}")]
    FeeGuardExceeded { ratio: f64, cap: f64 },

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Transaction send failed: {0}")]
    TransactionSend(String),

    // Ledger errors
    #[error("Ledger coverage violation: ratio {ratio:.4}")]
    LedgerCoverageViolation { ratio: f64 },

    #[error("Ledger invariant breach: {0}")]
    LedgerInvariantBreach(String),

    // Circuit / universe errors
    #[error("Risk circuit tripped: {reason}")]
    RiskCircuitTripped { reason: String },

    #[error("Mint in re-entry cooldown: {0}")]
    UniverseCooldown(String),

    // Orchestration errors
    #[error("Tick exceeded hard deadline of {0}ms")]
    TickTimeout(u64),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable (transient)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Rpc(_)
                | Error::Http(_)
                | Error::UpstreamUnavailable(_)
                | Error::UpstreamTimeout(_)
                | Error::TransactionSend(_)
        )
    }

    /// Fatal errors pause trading and keep the process read-only
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::LedgerInvariantBreach(_))
    }

    /// Short reason code used in trade records and rotation logs
    pub fn reason_code(&self) -> String {
        match self {
            Error::ConfigValidation(_) => "config_validation".into(),
            Error::UpstreamUnavailable(_) => "upstream_unavailable".into(),
            Error::UpstreamTimeout(_) => "upstream_timeout".into(),
            Error::QuoteRejected(_) => "quote_rejected".into(),
            Error::SimulationFailed { name, .. } => format!("simulation_failed:{name}"),
            Error::InsufficientFunds { .. } => "insufficient_funds".into(),
            Error::InsufficientToken { .. } => "insufficient_token".into(),
            Error::FeeGuardExceeded { .. } => "fee_ratio_exceeds_hard_cap".into(),
            Error::LedgerCoverageViolation { .. } => "ledger_coverage_violation".into(),
            Error::RiskCircuitTripped { reason } => format!("circuit:{reason}"),
            Error::UniverseCooldown(_) => "in_cooldown".into(),
            Error::TickTimeout(_) => "tick_timeout".into(),
            Error::Persistence(_) => "persistence".into(),
            other => format!("error:{other}"),
        }
    }
}

// Conversion from solana_client errors
impl From<solana_client::client_error::ClientError> for Error {
    fn from(e: solana_client::client_error::ClientError) -> Self {
        Error::Rpc(e.to_string())
    }
}

// Conversion from reqwest errors
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::UpstreamTimeout(0)
        } else {
            Error::Http(e.to_string())
        }
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from rusqlite errors
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        Error::Persistence(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
