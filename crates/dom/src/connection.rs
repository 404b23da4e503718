//! Results handed back by whatever fetches external resources.

use crate::error::DomError;
use crate::tree::XmlTree;

/// Outcome of fetching a resource.
#[derive(Debug, Clone)]
pub struct ConnectionResult {
    pub resource_uri: String,
    pub status_code: u16,
    pub headers: Vec<(String, String)>,
    pub content: Option<XmlTree>,
}

impl ConnectionResult {
    /// A successful response carrying a parsed tree.
    pub fn ok(resource_uri: &str, content: XmlTree) -> Self {
        Self {
            resource_uri: resource_uri.to_owned(),
            status_code: 200,
            headers: Vec::new(),
            content: Some(content),
        }
    }

    /// A response with no usable body.
    pub fn status(resource_uri: &str, status_code: u16) -> Self {
        Self {
            resource_uri: resource_uri.to_owned(),
            status_code,
            headers: Vec::new(),
            content: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Take the tree out of a successful response.
    ///
    /// Anything other than status 200 is a failed load; no retry is attempted.
    ///
    /// # Errors
    /// Returns [`DomError::Status`] or [`DomError::MissingContent`].
    pub fn into_tree(self) -> Result<XmlTree, DomError> {
        if self.status_code != 200 {
            return Err(DomError::Status {
                uri: self.resource_uri,
                status: self.status_code,
            });
        }
        self.content.ok_or(DomError::MissingContent(self.resource_uri))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// # Panics
    /// Panics if non-200 responses are accepted.
    #[test]
    fn non_success_status_is_an_error() {
        let result = ConnectionResult::status("http://example.org/x.xml", 404);
        assert!(matches!(result.into_tree(), Err(DomError::Status { status: 404, .. })));
    }

    /// # Panics
    /// Panics if header lookup is case-sensitive.
    #[test]
    fn header_lookup_ignores_case() {
        let mut result = ConnectionResult::ok("x.xml", XmlTree::new());
        result.headers.push(("Content-Type".to_owned(), "application/xml".to_owned()));
        assert_eq!(result.header("content-type"), Some("application/xml"));
        assert!(result.into_tree().is_ok());
    }
}
