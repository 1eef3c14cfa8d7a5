use crate::models::Offer;

/// Keep the offers a visitor from `country` is eligible for, in upstream order.
///
/// Empty or `ALL` keeps every offer that carries a country field. Offers with
/// no link are dropped since there is nothing to redirect to.
pub fn filter_by_country(offers: Vec<Offer>, country: &str) -> Vec<Offer> {
    offers
        .into_iter()
        .filter(|o| o.link.is_some() && o.serves(country))
        .collect()
}
