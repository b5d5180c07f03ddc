use std::net::IpAddr;
use url::Url;

/// Second-level labels that act like public suffixes (`example.gov.in`)
const SECOND_LEVEL_LABELS: &[&str] = &["gov", "co", "org", "net", "edu", "ac"];

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use corpus_crawler::url::extract_host;
///
/// let url = Url::parse("https://Sub.Example.COM:8080/path").unwrap();
/// assert_eq!(extract_host(&url), Some("sub.example.com".to_string()));
/// ```
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Extracts the registrable root domain of a host
///
/// Keeps the last two labels, or the last three when the second-to-last
/// label is a generic organisational label (`gov`, `co`, `org`, `net`,
/// `edu`, `ac`), so `portal.example.gov.in` maps to `example.gov.in`.
/// This is a heuristic, not a public-suffix-list lookup. IP addresses are
/// returned unchanged.
///
/// # Examples
///
/// ```
/// use corpus_crawler::url::root_domain;
///
/// assert_eq!(root_domain("sub.example.gov.in"), "example.gov.in");
/// assert_eq!(root_domain("blog.example.com"), "example.com");
/// ```
pub fn root_domain(host: &str) -> String {
    let host = host.trim_end_matches('.').to_lowercase();

    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return host;
    }

    let labels: Vec<&str> = host.split('.').collect();
    let n = labels.len();

    if n >= 3 && SECOND_LEVEL_LABELS.contains(&labels[n - 2]) {
        labels[n - 3..].join(".")
    } else if n >= 2 {
        labels[n - 2..].join(".")
    } else {
        host
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_simple_host() {
        let url = Url::parse("https://example.com/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_extract_ignores_port_and_case() {
        let url = Url::parse("https://Example.COM:8080/").unwrap();
        assert_eq!(extract_host(&url), Some("example.com".to_string()));
    }

    #[test]
    fn test_root_of_plain_domain() {
        assert_eq!(root_domain("example.com"), "example.com");
        assert_eq!(root_domain("www.example.com"), "example.com");
        assert_eq!(root_domain("api.v2.example.com"), "example.com");
    }

    #[test]
    fn test_root_keeps_three_labels_for_second_level_suffix() {
        assert_eq!(root_domain("example.gov.in"), "example.gov.in");
        assert_eq!(root_domain("sub.example.gov.in"), "example.gov.in");
        assert_eq!(root_domain("www.bbc.co.uk"), "bbc.co.uk");
        assert_eq!(root_domain("dept.uni.ac.in"), "uni.ac.in");
    }

    #[test]
    fn test_root_is_case_insensitive() {
        assert_eq!(root_domain("Sub.Example.GOV.in"), "example.gov.in");
    }

    #[test]
    fn test_root_of_single_label() {
        assert_eq!(root_domain("localhost"), "localhost");
    }

    #[test]
    fn test_root_of_ip_address() {
        assert_eq!(root_domain("127.0.0.1"), "127.0.0.1");
        assert_eq!(root_domain("[::1]"), "[::1]");
    }
}
