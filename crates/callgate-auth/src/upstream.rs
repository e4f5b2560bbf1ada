//! Upstream base URL handling and target URL construction.

use std::fmt;

use crate::error::{AuthError, Result};

/// Validated upstream API base URL.
///
/// Always absolute (http or https) and stored without trailing slashes so
/// that joined paths never contain a double slash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamBase(String);

impl UpstreamBase {
    /// Parse and normalize a base URL.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let parsed = url::Url::parse(trimmed)
            .map_err(|e| AuthError::Config(format!("Invalid upstream base URL '{}': {}", raw, e)))?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AuthError::Config(format!(
                "Upstream base URL must use http or https, got '{}'",
                parsed.scheme()
            )));
        }
        if parsed.host_str().is_none() {
            return Err(AuthError::Config(format!(
                "Upstream base URL '{}' has no host",
                raw
            )));
        }

        Ok(Self(trimmed.trim_end_matches('/').to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Build the target URL for a set of path segments and a raw query string.
    ///
    /// Each segment is percent-encoded on its own; the query is appended
    /// verbatim.
    pub fn join_segments<S: AsRef<str>>(&self, segments: &[S], query: Option<&str>) -> String {
        let suffix = segments
            .iter()
            .map(|s| urlencoding::encode(s.as_ref()).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        let mut url = format!("{}/{}", self.0, suffix);
        if let Some(q) = query.map(|q| q.trim_start_matches('?')).filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(q);
        }
        url
    }

    /// Join an already-encoded endpoint path such as `/auth/refresh`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.0, path.trim_start_matches('/'))
    }
}

impl fmt::Display for UpstreamBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slashes_stripped() {
        let base = UpstreamBase::parse("https://api.example.com///").unwrap();
        assert_eq!(base.as_str(), "https://api.example.com");
    }

    #[test]
    fn test_join_segments_with_query() {
        let base = UpstreamBase::parse("https://api.example.com/").unwrap();
        let url = base.join_segments(&["call-tracking", "tracking-numbers"], Some("page=2"));
        assert_eq!(
            url,
            "https://api.example.com/call-tracking/tracking-numbers?page=2"
        );
    }

    #[test]
    fn test_query_with_leading_question_mark() {
        let base = UpstreamBase::parse("https://api.example.com").unwrap();
        let url = base.join_segments(&["businesses"], Some("?q=a%20b&sort=name"));
        assert_eq!(url, "https://api.example.com/businesses?q=a%20b&sort=name");
    }

    #[test]
    fn test_empty_query_is_dropped() {
        let base = UpstreamBase::parse("https://api.example.com").unwrap();
        assert_eq!(
            base.join_segments(&["calls"], Some("")),
            "https://api.example.com/calls"
        );
        assert_eq!(
            base.join_segments(&["calls"], None),
            "https://api.example.com/calls"
        );
    }

    #[test]
    fn test_segments_encoded_individually() {
        let base = UpstreamBase::parse("https://api.example.com/v1/").unwrap();
        let url = base.join_segments(&["marketing sources", "a/b", "ü"], None);
        assert_eq!(
            url,
            "https://api.example.com/v1/marketing%20sources/a%2Fb/%C3%BC"
        );
    }

    #[test]
    fn test_endpoint() {
        let base = UpstreamBase::parse("http://localhost:4000/").unwrap();
        assert_eq!(base.endpoint("/auth/refresh"), "http://localhost:4000/auth/refresh");
        assert_eq!(base.endpoint("auth/login"), "http://localhost:4000/auth/login");
    }

    #[test]
    fn test_rejects_relative_and_non_http() {
        assert!(UpstreamBase::parse("/api").is_err());
        assert!(UpstreamBase::parse("api.example.com").is_err());
        assert!(UpstreamBase::parse("ftp://api.example.com").is_err());
        assert!(UpstreamBase::parse("").is_err());
    }
}
