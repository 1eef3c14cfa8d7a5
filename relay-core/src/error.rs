use serde_json::Value;
use std::fmt;

/// Why a visitor was turned away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReason {
    Bot,
    Vpn,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Bot => f.write_str("Bot traffic detected"),
            BlockReason::Vpn => f.write_str("VPN/Proxy detected"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// The request never produced a response (DNS, connect, timeout, body read).
    #[error("Failed to retrieve data from upstream: {0}")]
    Unavailable(String),

    #[error("Upstream responded with status {status}")]
    Status { status: u16, body: String },

    /// 2xx but not the `{ success: true, offers: [...] }` shape.
    #[error("Failed to retrieve data")]
    Malformed(Value),
}

/// Every way a relay request can end other than a selected offer.
///
/// HTTP status mapping happens in the API layer only.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("API key not set")]
    MissingCredential,

    #[error("{0}")]
    Blocked(BlockReason),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("No active offers for country {country}")]
    NoOffers { country: String },

    #[error("A server error occurred: {0}")]
    Internal(String),
}

impl RelayError {
    pub fn no_offers(country: &str) -> Self {
        let country = if country.is_empty() { "unknown" } else { country };
        RelayError::NoOffers { country: country.to_string() }
    }
}

pub type RelayResult<T> = Result<T, RelayError>;
