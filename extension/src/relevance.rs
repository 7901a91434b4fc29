use url::Url;

/// Decides whether a page is in scope for monitoring.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelevanceFilter {
    host: String,
    path_prefix: String,
}

impl RelevanceFilter {
    pub fn new(host: impl Into<String>, path_prefix: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            path_prefix: path_prefix.into(),
        }
    }

    /// Exact host match and path prefix match. Scheme, port and query are ignored.
    pub fn is_relevant(&self, url: &Url) -> bool {
        url.host_str() == Some(self.host.as_str()) && url.path().starts_with(&self.path_prefix)
    }
}
