//! Coherent browser profiles
//!
//! Each request draws a full profile (User-Agent plus matching client
//! hints) so the header triple stays self-consistent; mixing hints from
//! different browsers is itself a bot signal. Chrome/Edge profiles only:
//! they are the ones whose client hints sites actually check.

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE,
    CACHE_CONTROL, CONNECTION, REFERER, UPGRADE_INSECURE_REQUESTS, USER_AGENT};

#[derive(Debug, Clone, Copy)]
pub struct BrowserProfile {
    pub user_agent: &'static str,
    pub sec_ch_ua: &'static str,
    pub sec_ch_ua_platform: &'static str,
}

pub const PROFILES: [BrowserProfile; 4] = [
    // Chrome 120 on Windows 10
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        sec_ch_ua: "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        sec_ch_ua_platform: "\"Windows\"",
    },
    // Chrome 119 on Windows 10
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        sec_ch_ua: "\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\"",
        sec_ch_ua_platform: "\"Windows\"",
    },
    // Chrome 120 on macOS
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        sec_ch_ua: "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Google Chrome\";v=\"120\"",
        sec_ch_ua_platform: "\"macOS\"",
    },
    // Edge 120 on Windows
    BrowserProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
        sec_ch_ua: "\"Not_A Brand\";v=\"8\", \"Chromium\";v=\"120\", \"Microsoft Edge\";v=\"120\"",
        sec_ch_ua_platform: "\"Windows\"",
    },
];

const REFERERS: [Option<&str>; 4] = [
    Some("https://www.google.com/"),
    Some("https://www.bing.com/"),
    Some("https://duckduckgo.com/"),
    None, // direct traffic
];

/// Full header set for one request, drawn from a random profile.
pub fn random_headers() -> HeaderMap {
    let mut rng = rand::rng();
    let profile = &PROFILES[rng.random_range(0..PROFILES.len())];
    let referer = REFERERS[rng.random_range(0..REFERERS.len())];

    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(profile.user_agent));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static(
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
        ),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate, br"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers.insert("sec-fetch-dest", HeaderValue::from_static("document"));
    headers.insert("sec-fetch-mode", HeaderValue::from_static("navigate"));
    headers.insert(
        "sec-fetch-site",
        HeaderValue::from_static(if referer.is_some() { "cross-site" } else { "none" }),
    );
    headers.insert("sec-fetch-user", HeaderValue::from_static("?1"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("max-age=0"));
    headers.insert("sec-ch-ua", HeaderValue::from_static(profile.sec_ch_ua));
    headers.insert("sec-ch-ua-mobile", HeaderValue::from_static("?0"));
    headers.insert(
        "sec-ch-ua-platform",
        HeaderValue::from_static(profile.sec_ch_ua_platform),
    );
    if let Some(referer) = referer {
        headers.insert(REFERER, HeaderValue::from_static(referer));
    }
    headers
}
