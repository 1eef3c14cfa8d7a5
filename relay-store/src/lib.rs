pub mod app_config;
pub mod offers_client;
pub mod geo_client;

pub use app_config::Config;
pub use offers_client::HttpOfferSource;
pub use geo_client::HttpGeoLookup;
