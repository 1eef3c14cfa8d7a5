pub mod error;
pub mod visitor;
pub mod upstream;
pub mod settings;
pub mod redirect;

pub use error::{BlockReason, RelayError, RelayResult, UpstreamError};
pub use visitor::{BotFilter, FallbackIps, InboundRequest, IpSource, VisitorContext};
pub use upstream::{GeoInfo, GeoLookup, OfferQuery, OfferSource, UpstreamReply};
pub use settings::RelaySettings;
pub use redirect::{OfferRedirectHandler, PassthroughReply, Selection};
