pub mod models;
pub mod filter;
pub mod selection;
pub mod link;

pub use models::{Offer, OfferEnvelope, OfferError, is_unrestricted};
pub use filter::filter_by_country;
pub use selection::{select_offer, FixedIndex, RandomSource, ThreadRandom};
pub use link::{build_tracking_link, TrackingParams};
