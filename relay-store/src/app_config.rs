use relay_core::settings::DEFAULT_COUNTRY_HEADER;
use relay_core::visitor::{DEFAULT_BOT_PATTERNS, DEFAULT_FALLBACK_IP};
use relay_core::{BotFilter, FallbackIps, RelaySettings};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

/// Environment variable earlier deployments used for the credential.
pub const LEGACY_API_KEY_VAR: &str = "OGADS_API_KEY";

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub geo: GeoConfig,
    pub visitor: VisitorConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 3000 }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct UpstreamConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: "https://redirectapps.org/api/v2".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeoConfig {
    pub enabled: bool,
    /// Lookup URL, `{ip}` is replaced with the visitor address.
    pub url_template: String,
    pub block_vpn: bool,
    pub timeout_secs: u64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url_template: "https://ipapi.co/{ip}/json/".to_string(),
            block_vpn: true,
            timeout_secs: 5,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisitorConfig {
    pub country_header: String,
    pub default_fallback_ip: String,
    /// ISO-2 country -> public IP used when the client address is private.
    pub fallback_ips: HashMap<String, String>,
    pub bot_patterns: Vec<String>,
}

impl Default for VisitorConfig {
    fn default() -> Self {
        Self {
            country_header: DEFAULT_COUNTRY_HEADER.to_string(),
            default_fallback_ip: DEFAULT_FALLBACK_IP.to_string(),
            fallback_ips: HashMap::new(),
            bot_patterns: DEFAULT_BOT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let mut builder = config::Config::builder();

        // Lowest priority: the legacy credential variable
        if let Ok(key) = env::var(LEGACY_API_KEY_VAR) {
            builder = builder.set_default("upstream.api_key", key)?;
        }

        let s = builder
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `RELAY__UPSTREAM__API_KEY=...`, `RELAY__VISITOR__BOT_PATTERNS=bot,curl`
            .add_source(
                config::Environment::with_prefix("RELAY")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("visitor.bot_patterns"),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn from_toml(contents: &str) -> Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    /// The explicit settings handed to the request handler.
    pub fn relay_settings(&self) -> RelaySettings {
        let fallback_ips = self
            .visitor
            .fallback_ips
            .iter()
            .fold(FallbackIps::new(self.visitor.default_fallback_ip.clone()), |f, (country, ip)| {
                f.with_country(country, ip.clone())
            });

        RelaySettings {
            api_key: self.upstream.api_key.clone(),
            country_header: self.visitor.country_header.to_ascii_lowercase(),
            fallback_ips,
            bot_filter: BotFilter::new(&self.visitor.bot_patterns),
            block_vpn: self.geo.enabled && self.geo.block_vpn,
        }
    }
}
