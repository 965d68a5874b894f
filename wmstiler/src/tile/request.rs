//! GetMap request construction.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::grid::BoundingBox;
use crate::job::MapSource;

/// Characters escaped in query components. Matches the JavaScript
/// `encodeURIComponent` set so existing GetMap endpoints see identical
/// URLs.
const QUERY: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

fn encode(value: &str) -> String {
    utf8_percent_encode(value, QUERY).to_string()
}

/// The `BBOX` parameter value for a request box.
pub fn bbox_parameter(extent: &BoundingBox) -> String {
    format!(
        "{},{},{},{}",
        extent.xmin, extent.ymin, extent.xmax, extent.ymax
    )
}

/// Builds the full GetMap URL for one gutter-expanded tile request.
///
/// The source's parameters are appended in their configured order,
/// followed by `BBOX`, `WIDTH` and `HEIGHT`.
pub fn getmap_url(source: &MapSource, extent: &BoundingBox, width_px: u32, height_px: u32) -> String {
    let mut url = source.base_url.clone();
    for (key, value) in &source.params {
        url.push_str(&encode(key));
        url.push('=');
        url.push_str(&encode(value));
        url.push('&');
    }
    url.push_str(&format!(
        "BBOX={}&WIDTH={}&HEIGHT={}",
        encode(&bbox_parameter(extent)),
        width_px,
        height_px
    ));
    url
}
