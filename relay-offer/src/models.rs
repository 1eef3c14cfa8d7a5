use serde_json::Value;
use std::collections::BTreeSet;

/// Countries value that disables country filtering.
pub const ALL_COUNTRIES: &str = "ALL";

/// An advertiser offer as returned by the upstream offers API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Offer {
    pub id: Option<String>,
    pub name: Option<String>,
    pub link: Option<String>,
    /// Upper-cased ISO-2 codes. `None` when the upstream record has no `country` field.
    pub countries: Option<BTreeSet<String>>,
}

impl Offer {
    /// Build an offer from one entry of the upstream `offers` array.
    ///
    /// The upstream is loose about field names: the id may arrive as
    /// `offerid`, `offer_id` or `id` (string or number) and the name as
    /// `name` or `name_short`. `country` is a comma-separated list.
    pub fn from_json(raw: &Value) -> Self {
        let id = ["offerid", "offer_id", "id"]
            .iter()
            .find_map(|key| scalar_to_string(&raw[*key]));
        let name = ["name", "name_short"]
            .iter()
            .find_map(|key| scalar_to_string(&raw[*key]));
        let link = raw["link"].as_str().map(str::to_string);
        let countries = scalar_to_string(&raw["country"]).map(|csv| parse_countries(&csv));

        Self { id, name, link, countries }
    }

    /// Whether this offer may be shown to a visitor from `country`.
    ///
    /// Offers without a country field never match.
    pub fn serves(&self, country: &str) -> bool {
        match &self.countries {
            None => false,
            Some(_) if is_unrestricted(country) => true,
            Some(set) => set.contains(&country.trim().to_ascii_uppercase()),
        }
    }
}

/// Empty or `ALL` means "any country".
pub fn is_unrestricted(country: &str) -> bool {
    let country = country.trim();
    country.is_empty() || country.eq_ignore_ascii_case(ALL_COUNTRIES)
}

fn parse_countries(csv: &str) -> BTreeSet<String> {
    csv.split(',')
        .map(|c| c.trim().to_ascii_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Validated `{ success: true, offers: [...] }` body from the offers API
#[derive(Debug, Clone)]
pub struct OfferEnvelope {
    pub offers: Vec<Offer>,
}

impl OfferEnvelope {
    /// Validate the upstream body. The raw value is handed back on failure so
    /// callers can surface it as a diagnostic.
    pub fn parse(body: &Value) -> Result<Self, OfferError> {
        if body["success"].as_bool() != Some(true) {
            return Err(OfferError::Unsuccessful(body.clone()));
        }
        let offers = body["offers"]
            .as_array()
            .ok_or_else(|| OfferError::OffersNotArray(body.clone()))?
            .iter()
            .map(Offer::from_json)
            .collect();

        Ok(Self { offers })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OfferError {
    #[error("Upstream did not report success")]
    Unsuccessful(Value),

    #[error("Upstream `offers` field is not an array")]
    OffersNotArray(Value),
}

impl OfferError {
    pub fn details(&self) -> &Value {
        match self {
            OfferError::Unsuccessful(v) | OfferError::OffersNotArray(v) => v,
        }
    }
}
