//! Content type dispatch: raw submissions to normalized markdown.

mod html;
mod mock;
mod pdf;

use async_trait::async_trait;
use thiserror::Error;

use super::resource::{NewResource, ResourceType};

pub use html::html_to_markdown;
pub use mock::MockExtractor;

#[allow(dead_code)]
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("invalid content type: {0}")]
    InvalidContentType(String),
    #[error("url resources require a url")]
    MissingUrl,
    #[error("content is not valid UTF-8")]
    InvalidText,
    #[error("failed to fetch url: {0}")]
    Fetch(String),
    #[error("failed to extract pdf: {0}")]
    Pdf(String),
}

/// Stateless transformer from a raw submission to normalized text.
#[async_trait]
pub trait ContentExtractor: Send + Sync {
    async fn extract(&self, resource: &NewResource) -> Result<String, ExtractionError>;
}

/// Dispatches on the declared content type: URL fetch + HTML→markdown,
/// PDF→text, or raw passthrough.
#[derive(Default)]
pub struct DefaultExtractor;

impl DefaultExtractor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentExtractor for DefaultExtractor {
    async fn extract(&self, resource: &NewResource) -> Result<String, ExtractionError> {
        match resource.resource_type {
            ResourceType::Text => String::from_utf8(resource.content.clone())
                .map_err(|_| ExtractionError::InvalidText),
            ResourceType::Url => {
                let url = resource
                    .url
                    .as_deref()
                    .filter(|url| !url.trim().is_empty())
                    .ok_or(ExtractionError::MissingUrl)?;
                html::fetch_as_markdown(url).await
            }
            ResourceType::Pdf => {
                let bytes = resource.content.clone();
                tokio::task::spawn_blocking(move || pdf::pdf_to_text(&bytes))
                    .await
                    .map_err(|e| ExtractionError::Pdf(e.to_string()))?
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_resource(content: &[u8]) -> NewResource {
        NewResource {
            name: None,
            resource_type: ResourceType::Text,
            content: content.to_vec(),
            url: None,
        }
    }

    #[tokio::test]
    async fn text_is_passed_through() {
        let extractor = DefaultExtractor::new();
        let extracted = extractor
            .extract(&text_resource(b"hello world"))
            .await
            .unwrap();
        assert_eq!(extracted, "hello world");
    }

    #[tokio::test]
    async fn invalid_utf8_text_is_rejected() {
        let extractor = DefaultExtractor::new();
        let err = extractor
            .extract(&text_resource(&[0xff, 0xfe, 0x00]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::InvalidText));
    }

    #[tokio::test]
    async fn url_without_url_is_rejected() {
        let extractor = DefaultExtractor::new();
        let resource = NewResource {
            name: None,
            resource_type: ResourceType::Url,
            content: vec![],
            url: None,
        };
        let err = extractor.extract(&resource).await.unwrap_err();
        assert!(matches!(err, ExtractionError::MissingUrl));
    }

    #[tokio::test]
    async fn garbage_pdf_is_an_extraction_error() {
        let extractor = DefaultExtractor::new();
        let resource = NewResource {
            name: None,
            resource_type: ResourceType::Pdf,
            content: b"not a pdf".to_vec(),
            url: None,
        };
        let err = extractor.extract(&resource).await.unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }
}
