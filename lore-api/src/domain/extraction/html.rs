use std::time::Duration;

use super::ExtractionError;

const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetch a page and convert its body to markdown.
pub async fn fetch_as_markdown(url: &str) -> Result<String, ExtractionError> {
    let client = reqwest::Client::builder()
        .timeout(FETCH_TIMEOUT)
        .build()
        .map_err(|e| ExtractionError::Fetch(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| ExtractionError::Fetch(e.to_string()))?
        .error_for_status()
        .map_err(|e| ExtractionError::Fetch(e.to_string()))?;

    let html = response
        .text()
        .await
        .map_err(|e| ExtractionError::Fetch(e.to_string()))?;

    Ok(html_to_markdown(&html))
}

/// Convert HTML to markdown, sanitizing first so scripts and event handlers
/// never reach the converter.
pub fn html_to_markdown(html: &str) -> String {
    let sanitized = ammonia::clean(html);
    htmd::convert(&sanitized).unwrap_or_else(|_| strip_html(&sanitized))
}

/// Last-resort fallback: drop tags, decode the common entities.
fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            c if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}
