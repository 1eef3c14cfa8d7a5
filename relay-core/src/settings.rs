use crate::error::{RelayError, RelayResult};
use crate::visitor::{BotFilter, FallbackIps};

pub const DEFAULT_COUNTRY_HEADER: &str = "x-vercel-ip-country";

/// Everything the handler needs to know, fixed at construction.
#[derive(Debug, Clone)]
pub struct RelaySettings {
    /// Bearer credential for the offers API. Absent means every request fails closed.
    pub api_key: Option<String>,
    /// Platform header carrying the visitor's ISO-2 country.
    pub country_header: String,
    pub fallback_ips: FallbackIps,
    pub bot_filter: BotFilter,
    /// Reject visitors the geolocation service flags as proxy / VPN / hosting.
    pub block_vpn: bool,
}

impl RelaySettings {
    pub fn credential(&self) -> RelayResult<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(RelayError::MissingCredential)
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            api_key: None,
            country_header: DEFAULT_COUNTRY_HEADER.to_string(),
            fallback_ips: FallbackIps::default(),
            bot_filter: BotFilter::default(),
            block_vpn: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_credential_is_missing() {
        let mut settings = RelaySettings::default();
        assert!(matches!(settings.credential(), Err(RelayError::MissingCredential)));

        settings.api_key = Some("   ".to_string());
        assert!(matches!(settings.credential(), Err(RelayError::MissingCredential)));

        settings.api_key = Some("secret".to_string());
        assert_eq!(settings.credential().unwrap(), "secret");
    }
}
