//! Content-addressed cache file naming
//!
//! A cache file is named `sha1(url).extension`. The hash covers the whole URL
//! string, query and fragment included, so two URLs that differ anywhere map
//! to different files. The extension is taken from the last segment of the
//! URL path, falling back to [`FALLBACK_EXTENSION`] when that segment has none.

use sha1::{Digest, Sha1};
use url::Url;

use crate::constants::FALLBACK_EXTENSION;

/// Derive the cache file name for a resource URL.
///
/// Pure and deterministic; any string is accepted.
pub fn name_for(url: &str) -> String {
    let digest = hex::encode(Sha1::digest(url.as_bytes()));
    format!("{}.{}", digest, extension_for(url))
}

/// Extension of the final URL path segment, or the fallback token.
pub fn extension_for(url: &str) -> String {
    let path = url_path(url);
    let last_segment = path.rsplit('/').next().unwrap_or_default();

    match last_segment.rsplit_once('.') {
        Some((_, ext)) if is_usable_extension(ext) => ext.to_string(),
        _ => FALLBACK_EXTENSION.to_string(),
    }
}

/// Path component of the URL, without query and fragment.
fn url_path(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        // Not an absolute URL; strip query and fragment by hand
        Err(_) => url
            .split(|c: char| c == '?' || c == '#')
            .next()
            .unwrap_or_default()
            .to_string(),
    }
}

fn is_usable_extension(ext: &str) -> bool {
    !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric())
}
