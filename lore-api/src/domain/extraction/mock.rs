//! Mock extractor for pipeline tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use super::{ContentExtractor, ExtractionError};
use crate::domain::resource::NewResource;

/// Extractor that either echoes the raw content as UTF-8 or fails with a
/// configured error.
#[derive(Clone, Default)]
pub struct MockExtractor {
    fail_with: Option<Arc<dyn Fn() -> ExtractionError + Send + Sync>>,
    call_count: Arc<AtomicUsize>,
}

impl MockExtractor {
    pub fn passthrough() -> Self {
        Self::default()
    }

    pub fn failing(make_error: impl Fn() -> ExtractionError + Send + Sync + 'static) -> Self {
        Self {
            fail_with: Some(Arc::new(make_error)),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentExtractor for MockExtractor {
    async fn extract(&self, resource: &NewResource) -> Result<String, ExtractionError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(ref make_error) = self.fail_with {
            return Err(make_error());
        }

        String::from_utf8(resource.content.clone()).map_err(|_| ExtractionError::InvalidText)
    }
}
