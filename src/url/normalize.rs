use crate::{UrlError, UrlResult};
use url::{form_urlencoded, Url};

/// Number of hex characters kept from the MD5 digest
const FINGERPRINT_LEN: usize = 12;

/// Normalizes a URL into a canonical string used as a dedup key
///
/// # Normalization Steps
///
/// 1. Parse the URL (scheme and host are lower-cased, default ports 80/443
///    dropped, dot segments resolved by the parser)
/// 2. Remove the fragment
/// 3. Empty path becomes `/`; exactly one trailing slash is removed from
///    non-root paths
/// 4. Query parameters are sorted by key (values for the same key keep their
///    order) and re-serialized as `application/x-www-form-urlencoded`
///
/// Normalization never fails: if the input cannot be parsed, the original
/// string is returned unchanged and a warning is logged.
///
/// # Examples
///
/// ```
/// use corpus_crawler::url::normalize_url;
///
/// assert_eq!(
///     normalize_url("HTTP://Example.COM:80/docs/?b=2&a=1#top"),
///     "http://example.com/docs?a=1&b=2"
/// );
/// ```
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw.trim()) {
        Ok(url) => canonicalize(url),
        Err(e) => {
            tracing::warn!("URL normalization failed for {}: {}", raw, e);
            raw.to_string()
        }
    }
}

/// Resolves `href` against `base`, then normalizes the result
///
/// Falls back to normalizing `href` on its own when resolution fails.
pub fn normalize_against(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|base| base.join(href.trim())) {
        Ok(url) => canonicalize(url),
        Err(e) => {
            tracing::warn!("Failed to resolve {} against {}: {}", href, base, e);
            normalize_url(href)
        }
    }
}

/// Derives the storage key for a URL
///
/// The fingerprint is the first 12 hex characters of the MD5 digest of the
/// normalized URL. It names artifact files and carries no security meaning.
pub fn fingerprint(raw: &str) -> String {
    let digest = format!("{:x}", md5::compute(normalize_url(raw).as_bytes()));
    digest[..FINGERPRINT_LEN].to_string()
}

/// Resolves a possibly relative link and checks it is a crawlable http(s) URL
///
/// Absolute links are taken as-is; anything else is joined onto `base`.
pub fn resolve_http_url(href: &str, base: Option<&str>) -> UrlResult<Url> {
    let href = href.trim();

    let url = match (Url::parse(href), base) {
        (Ok(url), _) => url,
        (Err(_), Some(base)) => Url::parse(base)
            .and_then(|base| base.join(href))
            .map_err(|e| UrlError::Parse(format!("{} (base {}): {}", href, base, e)))?,
        (Err(e), None) => return Err(UrlError::Parse(format!("{}: {}", href, e))),
    };

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(url.scheme().to_string()));
    }

    if url.host_str().map_or(true, str::is_empty) {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Applies the fragment, path and query rules to an already parsed URL
fn canonicalize(mut url: Url) -> String {
    url.set_fragment(None);

    if url.cannot_be_a_base() {
        return url.to_string();
    }

    let path = url.path();
    if path.is_empty() {
        url.set_path("/");
    } else if path.len() > 1 && path.ends_with('/') {
        let trimmed = path[..path.len() - 1].to_string();
        url.set_path(&trimmed);
    }

    if let Some(query) = url.query() {
        let mut params: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
            .into_owned()
            .collect();

        // Stable sort keeps multi-value order within a key
        params.sort_by(|a, b| a.0.cmp(&b.0));

        if params.is_empty() {
            url.set_query(None);
        } else {
            let encoded = form_urlencoded::Serializer::new(String::new())
                .extend_pairs(params.iter())
                .finish();
            url.set_query(Some(&encoded));
        }
    }

    url.to_string()
}
