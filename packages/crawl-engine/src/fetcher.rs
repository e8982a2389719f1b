//! Page fetching and content extraction.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use tracing::debug;
use url::Url;

use crate::error::EngineError;
use crate::types::PageCapture;

/// Cap on extracted plain text, to bound downstream provider cost.
pub const MAX_TEXT_CHARS: usize = 10_000;

/// Cap on collected outbound links.
pub const MAX_LINKS: usize = 50;

/// Fetches one page and extracts title, text, and links.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<PageCapture, EngineError>;
}

/// HTTP fetcher using reqwest + scraper.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("aircrawl/0.1")
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }

    pub(crate) fn extract(url: &str, html: &str) -> PageCapture {
        let document = Html::parse_document(html);

        let title = extract_title(&document);
        let text = extract_text(&document);
        let links = Url::parse(url)
            .map(|base| extract_links(&document, &base))
            .unwrap_or_default();

        PageCapture {
            url: url.to_string(),
            title,
            text,
            links,
        }
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<PageCapture, EngineError> {
        debug!(url = %url, "Fetching page");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EngineError::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(EngineError::Fetch(format!("HTTP {status} for {url}")));
        }

        let html = response
            .text()
            .await
            .map_err(|e| EngineError::Fetch(e.to_string()))?;

        Ok(Self::extract(url, &html))
    }
}

/// Extract title from HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = Selector::parse("title").ok()?;
    document
        .select(&title_selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Extract plain text, skipping script/style blocks, whitespace-normalized
/// and capped at [`MAX_TEXT_CHARS`].
fn extract_text(document: &Html) -> String {
    let mut raw = String::new();
    collect_text(document.root_element(), &mut raw);

    let normalized = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.chars().count() > MAX_TEXT_CHARS {
        normalized.chars().take(MAX_TEXT_CHARS).collect()
    } else {
        normalized
    }
}

fn collect_text(element: ElementRef, out: &mut String) {
    for child in element.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            let name = child_el.value().name();
            if matches!(name, "script" | "style" | "noscript" | "head") {
                continue;
            }
            collect_text(child_el, out);
        }
    }
}

/// Extract outbound links resolved against the base URL, deduplicated and
/// capped at [`MAX_LINKS`].
fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let link_selector = match Selector::parse("a[href]") {
        Ok(s) => s,
        Err(_) => return vec![],
    };

    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for href in document
        .select(&link_selector)
        .filter_map(|el| el.value().attr("href"))
    {
        let Ok(resolved) = base_url.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let mut normalized = resolved;
        normalized.set_fragment(None);
        let link = normalized.to_string();
        if seen.insert(link.clone()) {
            links.push(link);
            if links.len() >= MAX_LINKS {
                break;
            }
        }
    }

    links
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_title() {
        let capture = HttpFetcher::extract(
            "https://example.com",
            "<html><head><title>Example</title></head><body>Hello world</body></html>",
        );
        assert_eq!(capture.title.as_deref(), Some("Example"));
        assert_eq!(capture.text, "Hello world");
    }

    #[test]
    fn test_extract_skips_script_and_style() {
        let html = r#"<html><body>
            <script>var hidden = "secret";</script>
            <style>.x { color: red; }</style>
            <p>visible content</p>
        </body></html>"#;
        let capture = HttpFetcher::extract("https://example.com", html);
        assert_eq!(capture.text, "visible content");
    }

    #[test]
    fn test_extract_text_is_capped() {
        let body = "word ".repeat(5_000);
        let html = format!("<html><body><p>{body}</p></body></html>");
        let capture = HttpFetcher::extract("https://example.com", &html);
        assert_eq!(capture.text.chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_extract_links_resolves_against_base() {
        let html = r#"<html><body>
            <a href="/about">About</a>
            <a href="https://other.example/page">Other</a>
            <a href="mailto:hi@example.com">Mail</a>
            <a href="/about">Duplicate</a>
        </body></html>"#;
        let capture = HttpFetcher::extract("https://example.com/start", html);
        assert_eq!(
            capture.links,
            vec![
                "https://example.com/about".to_string(),
                "https://other.example/page".to_string(),
            ]
        );
    }

    #[test]
    fn test_extract_links_are_capped() {
        let anchors: String = (0..100)
            .map(|i| format!(r#"<a href="/page-{i}">p{i}</a>"#))
            .collect();
        let html = format!("<html><body>{anchors}</body></html>");
        let capture = HttpFetcher::extract("https://example.com", &html);
        assert_eq!(capture.links.len(), MAX_LINKS);
    }

    #[test]
    fn test_empty_body_yields_empty_text() {
        let capture =
            HttpFetcher::extract("https://example.com", "<html><body></body></html>");
        assert!(capture.text.is_empty());
    }
}
