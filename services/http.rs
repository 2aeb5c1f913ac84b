/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Default reqwest/image-backed collaborators.
//!
//! [`HttpMetadataResolver`] fetches a page and scans its `<head>` for the
//! title, theme color, canonical/AMP alternates, and favicon link.
//! [`HttpIconLoader`] fetches the favicon, decodes it, normalizes it to a
//! small square, and derives a representative accent color.
//!
//! Both apply a fixed connect/read timeout per attempt and run on blocking
//! worker threads, never on the control thread.

use std::time::Duration;

use image::imageops::FilterType;
use log::debug;
use url::Url;

use super::{IconAsset, IconError, IconLoader, MetadataResolver, ResolveError, ResolvedMeta};

const ICON_EDGE: u32 = 48;
const FALLBACK_ACCENT: [u8; 3] = [0x75, 0x75, 0x75];

pub struct HttpMetadataResolver {
    client: reqwest::blocking::Client,
}

impl HttpMetadataResolver {
    pub fn new(timeout: Duration) -> Result<Self, ResolveError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ResolveError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl MetadataResolver for HttpMetadataResolver {
    fn resolve(&self, url: &str) -> Result<ResolvedMeta, ResolveError> {
        let response = self.client.get(url).send().map_err(classify_reqwest)?;
        if !response.status().is_success() {
            return Err(ResolveError::Network(format!(
                "{} for {url}",
                response.status()
            )));
        }
        // Redirects may have moved us; relative links resolve against the
        // final URL, not the requested one.
        let base = response.url().clone();
        let body = response.text().map_err(classify_reqwest)?;
        Ok(parse_head(&body, &base))
    }
}

fn classify_reqwest(error: reqwest::Error) -> ResolveError {
    if error.is_timeout() {
        ResolveError::Timeout
    } else {
        ResolveError::Network(error.to_string())
    }
}

pub struct HttpIconLoader {
    client: reqwest::blocking::Client,
}

impl HttpIconLoader {
    pub fn new(timeout: Duration) -> Result<Self, IconError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| IconError::Network(e.to_string()))?;
        Ok(Self { client })
    }
}

impl IconLoader for HttpIconLoader {
    fn load_icon_and_accent(&self, favicon_url: &str) -> Result<IconAsset, IconError> {
        let response = self
            .client
            .get(favicon_url)
            .send()
            .map_err(|e| IconError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(IconError::Network(format!(
                "{} for {favicon_url}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| IconError::Network(e.to_string()))?;

        let decoded = image::load_from_memory(&bytes)
            .map_err(|e| IconError::Decode(e.to_string()))?;
        let resized = decoded
            .resize_to_fill(ICON_EDGE, ICON_EDGE, FilterType::Triangle)
            .to_rgba8();
        let (width, height) = resized.dimensions();
        let rgba = resized.into_raw();
        let accent_color = accent_from_rgba(&rgba);
        Ok(IconAsset {
            rgba,
            width,
            height,
            accent_color,
        })
    }
}

/// Average color of the icon's sufficiently opaque pixels.
fn accent_from_rgba(rgba: &[u8]) -> [u8; 3] {
    let mut sums = [0u64; 3];
    let mut count = 0u64;
    for pixel in rgba.chunks_exact(4) {
        if pixel[3] >= 128 {
            sums[0] += u64::from(pixel[0]);
            sums[1] += u64::from(pixel[1]);
            sums[2] += u64::from(pixel[2]);
            count += 1;
        }
    }
    if count == 0 {
        return FALLBACK_ACCENT;
    }
    [
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ]
}

/// Scan an HTML document's head for the metadata the engine cares about.
/// Lenient by design: whatever cannot be found is simply absent.
pub fn parse_head(html: &str, base: &Url) -> ResolvedMeta {
    let mut meta = ResolvedMeta::default();
    let mut icon_href: Option<String> = None;

    let mut rest = html;
    while let Some(start) = rest.find('<') {
        rest = &rest[start + 1..];
        let Some(end) = rest.find('>') else { break };
        let tag = &rest[..end];
        rest = &rest[end + 1..];

        let (name, attrs) = split_tag(tag);
        match name.to_ascii_lowercase().as_str() {
            "/head" => break,
            "title" => {
                if meta.title.is_none() {
                    if let Some(close) = find_case_insensitive(rest, "</title") {
                        meta.title = Some(decode_entities(rest[..close].trim()));
                    }
                }
            }
            "meta" => {
                let name_attr = attr_value(attrs, "name").unwrap_or_default();
                if name_attr.eq_ignore_ascii_case("theme-color") {
                    if let Some(content) = attr_value(attrs, "content") {
                        meta.theme_color = parse_hex_color(&content);
                    }
                }
            }
            "link" => {
                let rel = attr_value(attrs, "rel").unwrap_or_default().to_ascii_lowercase();
                let Some(href) = attr_value(attrs, "href") else {
                    continue;
                };
                match rel.as_str() {
                    "canonical" => {
                        meta.canonical_url = resolve_href(base, &href);
                    }
                    "amphtml" => {
                        meta.amp_url = resolve_href(base, &href);
                    }
                    rel if rel.split_whitespace().any(|word| word == "icon")
                        || rel == "apple-touch-icon" =>
                    {
                        if icon_href.is_none() {
                            icon_href = Some(href);
                        }
                    }
                    _ => {}
                }
            }
            _ => {}
        }
    }

    meta.favicon_url = icon_href
        .and_then(|href| resolve_href(base, &href))
        .or_else(|| base.join("/favicon.ico").ok().map(|u| u.to_string()));

    if meta.title.is_none() {
        debug!("no title found for {base}");
    }
    meta
}

fn resolve_href(base: &Url, href: &str) -> Option<String> {
    base.join(href.trim()).ok().map(|u| u.to_string())
}

fn find_case_insensitive(haystack: &str, needle: &str) -> Option<usize> {
    let lower_haystack = haystack.to_ascii_lowercase();
    lower_haystack.find(&needle.to_ascii_lowercase())
}

/// Split a tag's name from its attribute text.
fn split_tag(tag: &str) -> (&str, &str) {
    let trimmed = tag.trim();
    match trimmed.find(char::is_whitespace) {
        Some(split) => (&trimmed[..split], &trimmed[split + 1..]),
        None => (trimmed, ""),
    }
}

/// Pull one attribute value out of a tag's attribute text. Handles
/// double-quoted, single-quoted, and bare values.
fn attr_value(attrs: &str, wanted: &str) -> Option<String> {
    let lower = attrs.to_ascii_lowercase();
    let wanted = wanted.to_ascii_lowercase();
    let mut search_from = 0;
    loop {
        let offset = lower[search_from..].find(&wanted)?;
        let at = search_from + offset;
        search_from = at + wanted.len();

        // Must be a standalone attribute name.
        let before_ok = at == 0
            || lower.as_bytes()[at - 1].is_ascii_whitespace()
            || lower.as_bytes()[at - 1] == b'/';
        let after = &attrs[at + wanted.len()..];
        let after_eq = after.trim_start();
        if !before_ok || !after_eq.starts_with('=') {
            continue;
        }
        let value = after_eq[1..].trim_start();
        return Some(if let Some(quoted) = value.strip_prefix('"') {
            quoted.split('"').next().unwrap_or_default().to_string()
        } else if let Some(quoted) = value.strip_prefix('\'') {
            quoted.split('\'').next().unwrap_or_default().to_string()
        } else {
            value
                .split(|c: char| c.is_whitespace() || c == '/' || c == '>')
                .next()
                .unwrap_or_default()
                .to_string()
        });
    }
}

/// Parse `#rgb` or `#rrggbb`.
fn parse_hex_color(text: &str) -> Option<[u8; 3]> {
    let hex = text.trim().strip_prefix('#')?;
    match hex.len() {
        3 => {
            let mut out = [0u8; 3];
            for (i, c) in hex.chars().enumerate() {
                let v = c.to_digit(16)? as u8;
                out[i] = v << 4 | v;
            }
            Some(out)
        }
        6 => {
            let mut out = [0u8; 3];
            for (i, pair) in hex.as_bytes().chunks_exact(2).enumerate() {
                let hi = (pair[0] as char).to_digit(16)? as u8;
                let lo = (pair[1] as char).to_digit(16)? as u8;
                out[i] = hi << 4 | lo;
            }
            Some(out)
        }
        _ => None,
    }
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://news.example/story/42").unwrap()
    }

    #[test]
    fn test_parse_full_head() {
        let html = r##"<html><head>
            <title> The  Big &amp; Important Story </title>
            <meta name="theme-color" content="#2196F3">
            <link rel="canonical" href="https://news.example/story/42-canonical">
            <link rel="amphtml" href="/amp/story/42">
            <link rel="shortcut icon" href="/static/fav.ico">
        </head><body><title>not this one</title></body></html>"##;

        let meta = parse_head(html, &base());
        assert_eq!(meta.title.as_deref(), Some("The Big & Important Story"));
        assert_eq!(meta.theme_color, Some([0x21, 0x96, 0xF3]));
        assert_eq!(
            meta.canonical_url.as_deref(),
            Some("https://news.example/story/42-canonical")
        );
        assert_eq!(
            meta.amp_url.as_deref(),
            Some("https://news.example/amp/story/42")
        );
        assert_eq!(
            meta.favicon_url.as_deref(),
            Some("https://news.example/static/fav.ico")
        );
    }

    #[test]
    fn test_missing_icon_falls_back_to_root_favicon() {
        let meta = parse_head("<html><head><title>x</title></head></html>", &base());
        assert_eq!(
            meta.favicon_url.as_deref(),
            Some("https://news.example/favicon.ico")
        );
    }

    #[test]
    fn test_bare_page_yields_mostly_empty_meta() {
        let meta = parse_head("plain text, no markup", &base());
        assert_eq!(meta.title, None);
        assert_eq!(meta.theme_color, None);
        assert_eq!(meta.canonical_url, None);
        assert_eq!(meta.amp_url, None);
    }

    #[test]
    fn test_single_quoted_and_unquoted_attrs() {
        let html = "<head><link rel='icon' href=/fav.png></head>";
        let meta = parse_head(html, &base());
        assert_eq!(
            meta.favicon_url.as_deref(),
            Some("https://news.example/fav.png")
        );
    }

    #[test]
    fn test_head_scan_stops_at_close_tag() {
        let html = r#"<head><title>Real</title></head>
            <body><link rel="canonical" href="https://evil.example/"></body>"#;
        let meta = parse_head(html, &base());
        assert_eq!(meta.canonical_url, None);
    }

    #[test]
    fn test_short_hex_color() {
        assert_eq!(parse_hex_color("#abc"), Some([0xAA, 0xBB, 0xCC]));
        assert_eq!(parse_hex_color("#A1B2C3"), Some([0xA1, 0xB2, 0xC3]));
        assert_eq!(parse_hex_color("blue"), None);
        assert_eq!(parse_hex_color("#12345"), None);
    }

    #[test]
    fn test_accent_averages_opaque_pixels_only() {
        // One opaque red, one opaque blue, one fully transparent white.
        let rgba = [
            255, 0, 0, 255, //
            0, 0, 255, 255, //
            255, 255, 255, 0,
        ];
        assert_eq!(accent_from_rgba(&rgba), [127, 0, 127]);
    }

    #[test]
    fn test_accent_of_fully_transparent_icon_is_fallback() {
        let rgba = [10, 20, 30, 0, 40, 50, 60, 0];
        assert_eq!(accent_from_rgba(&rgba), FALLBACK_ACCENT);
    }
}
