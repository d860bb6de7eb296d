//! QrLink - Session Link Encoding
//!
//! ## Responsibilities
//!
//! - Build the capture-device URL (frontend URL + route + `session_id` + extras)
//! - Render that URL as a captioned QR raster (PNG)

mod caption;
mod render;

pub use render::{render_qr_image, ErrorCorrection, QrImage, QrRenderOptions, CAPTION, MAX_QR_SIZE};

use crate::error::{Error, Result};
use reqwest::Url;

/// Query parameter carrying the session token
pub const SESSION_QUERY_KEY: &str = "session_id";

/// Build the link encoded into the QR code
///
/// `route` is joined to the base path with exactly one `/`; `session_id`
/// and every extra parameter replace any same-named query parameter.
pub fn build_link_url<K, V>(
    base_url: &str,
    route: Option<&str>,
    session_id: Option<&str>,
    extra_params: impl IntoIterator<Item = (K, V)>,
) -> Result<String>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut url = Url::parse(base_url)
        .map_err(|e| Error::InvalidUrl(format!("{}: {}", base_url, e)))?;

    if url.cannot_be_a_base() {
        return Err(Error::InvalidUrl(format!("{}: not a hierarchical URL", base_url)));
    }

    if let Some(route) = route.filter(|r| !r.trim().is_empty()) {
        let joined = join_path(url.path(), route);
        url.set_path(&joined);
    }

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(id) = session_id.filter(|s| !s.is_empty()) {
        set_param(&mut pairs, SESSION_QUERY_KEY, id);
    }

    for (key, value) in extra_params {
        set_param(&mut pairs, key.as_ref(), value.as_ref());
    }

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(pairs.iter());
    }

    Ok(url.to_string())
}

/// Join two path segments with exactly one separating slash
fn join_path(base: &str, append: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        append.trim_start_matches('/')
    )
}

/// URLSearchParams::set semantics: replace first occurrence, drop the rest
fn set_param(pairs: &mut Vec<(String, String)>, key: &str, value: &str) {
    match pairs.iter().position(|(k, _)| k == key) {
        Some(first) => {
            pairs[first].1 = value.to_string();
            let mut index = 0;
            pairs.retain(|(k, _)| {
                let keep = index <= first || k != key;
                index += 1;
                keep
            });
        }
        None => pairs.push((key.to_string(), value.to_string())),
    }
}
