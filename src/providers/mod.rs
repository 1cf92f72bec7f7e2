//! Text provider trait and implementations.
//!
//! A provider translates an ordered batch of strings and answers with one
//! translation per input, in the same order.

mod echo;
mod google;

pub use echo::EchoProvider;
pub use google::GoogleTranslateProvider;

use crate::error::ProviderError;
use async_trait::async_trait;

/// How the provider should treat submitted content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// Inline markup is preserved around translated text.
    Html,
    /// Content is translated as plain text.
    Plain,
}

impl ContentType {
    /// MIME type understood by translation APIs.
    pub fn mime_type(self) -> &'static str {
        match self {
            ContentType::Html => "text/html",
            ContentType::Plain => "text/plain",
        }
    }
}

/// Trait for machine-translation backends.
///
/// Implementations own their transport, timeouts and cancellation. The
/// returned list must have the same length and order as `contents`.
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Returns the human-readable name of this provider.
    fn name(&self) -> &'static str;

    /// Translates a batch of strings.
    async fn translate(
        &self,
        contents: &[String],
        content_type: ContentType,
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_types() {
        assert_eq!(ContentType::Html.mime_type(), "text/html");
        assert_eq!(ContentType::Plain.mime_type(), "text/plain");
    }
}
