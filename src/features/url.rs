//! Lexical features of a URL string. No network access, no failure modes.

use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use url::Url;

use crate::feature_vector;

static IP_HOST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:http[s]?://)?(?:\d{1,3}\.){3}\d{1,3}").unwrap());
static HEX_ESCAPE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"%[0-9a-fA-F]{2}").unwrap());
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static NON_WORD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^\w]").unwrap());

const SENSITIVE_KEYWORDS: &[&str] = &[
    "login", "signin", "verify", "update", "security", "account", "bank", "confirm", "password",
];
const BRAND_NAMES: &[&str] = &["google", "facebook", "paypal", "apple", "amazon", "microsoft"];
const SHORTENERS: &[&str] = &[
    "bit.ly", "goo.gl", "tinyurl.com", "ow.ly", "t.co", "is.gd", "buff.ly",
];

feature_vector! {
    #[derive(Debug, Clone, Default, PartialEq, Serialize)]
    pub struct UrlFeatures {
        pub url_length: u32,
        pub has_at_symbol: u8,
        /// `//` occurrences after the scheme separator.
        pub double_slash_in_path: u32,
        pub has_ip: u8,
        pub count_hyphens: u32,
        pub count_dots: u32,
        pub count_slashes: u32,
        pub count_special_chars: u32,
        pub https_in_domain: u8,
        pub url_depth: u32,
        pub has_sensitive_keywords: u8,
        /// Public suffix, e.g. `com` or `co.uk`; empty for IP hosts and unknown TLDs.
        pub tld_type: String,
        pub is_similar_to_brand: u8,
        pub dash_in_domain: u8,
        pub digit_count: u32,
        pub vowel_ratio: f64,
        pub is_short_url: u8,
        pub has_hex_chars: u8,
    }
}

pub fn extract_url_features(url: &str) -> UrlFeatures {
    let parsed = parse_lenient(url);
    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .map(|h| h.trim_end_matches('.').to_ascii_lowercase())
        .unwrap_or_default();
    let (domain, suffix) = split_registrable(&host);

    let lower = url.to_lowercase();
    let length = url.chars().count();
    let vowels = lower.chars().filter(|c| "aeiou".contains(*c)).count();
    let vowel_ratio = if length > 0 {
        vowels as f64 / length as f64
    } else {
        0.0
    };

    let url_depth = parsed
        .as_ref()
        .and_then(|u| u.path_segments())
        .map(|segs| segs.filter(|s| !s.is_empty()).count())
        .unwrap_or(0);

    let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);

    UrlFeatures {
        url_length: length as u32,
        has_at_symbol: flag(url.contains('@')),
        double_slash_in_path: after_scheme.matches("//").count() as u32,
        has_ip: flag(IP_HOST_RE.is_match(url)),
        count_hyphens: url.matches('-').count() as u32,
        count_dots: url.matches('.').count() as u32,
        count_slashes: url.matches('/').count() as u32,
        count_special_chars: NON_WORD_RE.find_iter(url).count() as u32,
        https_in_domain: flag(domain.contains("https")),
        url_depth: url_depth as u32,
        has_sensitive_keywords: flag(SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k))),
        tld_type: suffix,
        is_similar_to_brand: flag(BRAND_NAMES.iter().any(|b| domain.contains(b))),
        dash_in_domain: flag(domain.contains('-')),
        digit_count: DIGIT_RE.find_iter(url).count() as u32,
        vowel_ratio,
        is_short_url: flag(is_shortener(&host)),
        has_hex_chars: flag(HEX_ESCAPE_RE.is_match(url)),
    }
}

fn flag(b: bool) -> u8 {
    b as u8
}

/// Host is a shortener domain or one of its subdomains.
fn is_shortener(host: &str) -> bool {
    SHORTENERS.iter().any(|s| {
        host == *s
            || host
                .strip_suffix(*s)
                .is_some_and(|rest| rest.ends_with('.'))
    })
}

/// Parse with a scheme-less fallback (`example.com/x`, `host:8080/x`).
fn parse_lenient(url: &str) -> Option<Url> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return None;
    }
    match Url::parse(trimmed) {
        Ok(u) if u.host_str().is_some() || trimmed.contains("://") => Some(u),
        _ => Url::parse(&format!("http://{}", trimmed)).ok(),
    }
}

/// Split a host into (registrable label, public suffix).
///
/// `www.paypal.co.uk` -> (`paypal`, `co.uk`). IP hosts keep the whole address as
/// the label with no suffix; unknown TLDs yield the last label and no suffix.
fn split_registrable(host: &str) -> (String, String) {
    if host.is_empty() {
        return (String::new(), String::new());
    }
    let bare = host.trim_start_matches('[').trim_end_matches(']');
    if bare.parse::<IpAddr>().is_ok() {
        return (host.to_string(), String::new());
    }

    let suffix = psl::suffix(host.as_bytes())
        .filter(|s| s.is_known())
        .and_then(|s| std::str::from_utf8(s.as_bytes()).ok())
        .map(str::to_string)
        .unwrap_or_default();

    let rest = if suffix.is_empty() {
        host
    } else if host == suffix {
        ""
    } else {
        host.strip_suffix(suffix.as_str())
            .and_then(|h| h.strip_suffix('.'))
            .unwrap_or(host)
    };
    let domain = rest.rsplit('.').next().unwrap_or("").to_string();
    (domain, suffix)
}
