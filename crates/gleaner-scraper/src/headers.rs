//! Header policy, ad-domain list, error table, URL validation

use crate::ScraperError;
use std::collections::HashMap;
use url::Url;

/// Ad-serving domains whose requests are aborted
pub const AD_SERVING_DOMAINS: &[&str] = &[
    "doubleclick.net",
    "adservice.google.com",
    "googlesyndication.com",
    "googletagservices.com",
    "googletagmanager.com",
    "google-analytics.com",
    "adsystem.com",
    "adservice.com",
    "adnxs.com",
    "ads-twitter.com",
    "facebook.net",
    "fbcdn.net",
    "amazon-adsystem.com",
];

/// Standard headers applied to every scrape
///
/// `User-Agent`, `Accept-Language`, and `Accept-Encoding` are deliberately
/// absent: they belong to the browser fingerprint, and overriding them
/// breaks anti-bot evasion.
pub const STANDARD_BROWSER_HEADERS: &[(&str, &str)] = &[
    ("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8"),
    ("DNT", "1"),
    ("Connection", "keep-alive"),
    ("Upgrade-Insecure-Requests", "1"),
    ("Sec-Fetch-Dest", "document"),
    ("Sec-Fetch-Mode", "navigate"),
    ("Sec-Fetch-Site", "none"),
    ("Sec-Fetch-User", "?1"),
    ("Cache-Control", "max-age=0"),
];

/// Headers the browser owns; caller-supplied values are dropped
const PROTECTED_HEADERS: &[&str] = &["user-agent", "accept-language", "accept-encoding"];

/// Merge caller headers over the standard set, dropping protected ones
pub fn merge_headers(custom: Option<&HashMap<String, String>>) -> HashMap<String, String> {
    let mut merged: HashMap<String, String> = STANDARD_BROWSER_HEADERS
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    if let Some(custom) = custom {
        for (key, value) in custom {
            if PROTECTED_HEADERS.contains(&key.to_lowercase().as_str()) {
                continue;
            }
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Whether a request URL belongs to a known ad-serving domain
pub fn is_ad_domain(url: &str) -> bool {
    AD_SERVING_DOMAINS.iter().any(|domain| url.contains(domain))
}

/// Accept only http/https at ingress (SSRF guard)
pub fn validate_scrape_url(raw: &str) -> Result<Url, ScraperError> {
    let url = Url::parse(raw).map_err(|_| ScraperError::InvalidUrl(raw.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(ScraperError::InvalidScheme(other.to_string())),
    }
}

/// Human-readable error for an HTTP status; `None` below 300
pub fn get_error_message(status: Option<u16>) -> Option<&'static str> {
    let status = match status {
        None => return Some("No response received"),
        Some(s) if s < 300 => return None,
        Some(s) => s,
    };
    Some(match status {
        300 => "Multiple Choices",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        304 => "Not Modified",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        402 => "Payment Required",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        406 => "Not Acceptable",
        407 => "Proxy Authentication Required",
        408 => "Request Timeout",
        409 => "Conflict",
        410 => "Gone",
        411 => "Length Required",
        412 => "Precondition Failed",
        413 => "Payload Too Large",
        414 => "URI Too Long",
        415 => "Unsupported Media Type",
        416 => "Range Not Satisfiable",
        417 => "Expectation Failed",
        418 => "I'm a Teapot",
        421 => "Misdirected Request",
        422 => "Unprocessable Entity",
        423 => "Locked",
        424 => "Failed Dependency",
        425 => "Too Early",
        426 => "Upgrade Required",
        428 => "Precondition Required",
        429 => "Too Many Requests",
        431 => "Request Header Fields Too Large",
        451 => "Unavailable For Legal Reasons",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        504 => "Gateway Timeout",
        505 => "HTTP Version Not Supported",
        506 => "Variant Also Negotiates",
        507 => "Insufficient Storage",
        508 => "Loop Detected",
        510 => "Not Extended",
        511 => "Network Authentication Required",
        _ => "Unknown Error",
    })
}
