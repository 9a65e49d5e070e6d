#[derive(Debug, Clone)]
pub struct WeaviateURL(String);

impl AsRef<str> for WeaviateURL {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl WeaviateURL {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self(base_url.into())
    }

    /// Append the given path to the URL.
    pub fn append_path(&self, path: &str) -> Self {
        let trimmed_url = self.0.trim_end_matches('/');
        let trimmed_path = path.trim_start_matches('/');
        Self(format!("{}/{}", trimmed_url, trimmed_path))
    }

    pub fn with_query(&self, key: &str, value: &str) -> Self {
        if self.0.contains('?') {
            Self(format!("{}&{}={}", self.0, key, value))
        } else {
            Self(format!("{}?{}={}", self.0, key, value))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_path_normalizes_slashes() {
        let url = WeaviateURL::new("http://localhost:8080/");
        assert_eq!(
            url.append_path("/v1/objects").as_ref(),
            "http://localhost:8080/v1/objects"
        );
    }

    #[test]
    fn with_query_uses_separator_for_existing_query() {
        let url = WeaviateURL::new("http://localhost:8080")
            .append_path("v1/objects")
            .with_query("limit", "10")
            .with_query("class", "Chunk");
        assert_eq!(
            url.as_ref(),
            "http://localhost:8080/v1/objects?limit=10&class=Chunk"
        );
    }
}
