use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use url::{form_urlencoded, Url};

pub const AFF_SUB4: &str = "aff_sub4";
pub const AFF_SUB5: &str = "aff_sub5";

/// Bytes escaped in links that are not absolute URLs. `%` is left alone so
/// existing escapes survive.
const LINK_ESCAPES: &AsciiSet = &CONTROLS.add(b' ').add(b'"').add(b'<').add(b'>').add(b'`');

/// Tracking values passed through from the inbound request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackingParams {
    pub aff_sub4: String,
    pub aff_sub5: String,
}

/// Attach the tracking parameters to an offer link.
///
/// Absolute links are rewritten through [`Url`] so existing `aff_sub4` /
/// `aff_sub5` values are replaced and everything is encoded properly. Links
/// that do not parse are escaped and get the parameters appended as text.
pub fn build_tracking_link(link: &str, tracking: &TrackingParams) -> String {
    match Url::parse(link) {
        Ok(mut url) => {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != AFF_SUB4 && k != AFF_SUB5)
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();

            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair(AFF_SUB4, &tracking.aff_sub4)
                .append_pair(AFF_SUB5, &tracking.aff_sub5);

            url.to_string()
        }
        Err(_) => {
            let sep = if link.contains('?') { '&' } else { '?' };
            let link = utf8_percent_encode(link, LINK_ESCAPES);
            format!(
                "{link}{sep}{AFF_SUB4}={}&{AFF_SUB5}={}",
                encode(&tracking.aff_sub4),
                encode(&tracking.aff_sub5),
            )
        }
    }
}

fn encode(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
