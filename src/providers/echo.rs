//! Identity provider for dry runs.

use super::{ContentType, TextProvider};
use crate::error::ProviderError;
use async_trait::async_trait;

/// Returns every input unchanged.
///
/// Running a book through it produces the bilingual layout without any
/// network access, which is handy for checking output structure.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoProvider;

#[async_trait]
impl TextProvider for EchoProvider {
    fn name(&self) -> &'static str {
        "Echo"
    }

    async fn translate(
        &self,
        contents: &[String],
        _content_type: ContentType,
        _source_language: &str,
        _target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        Ok(contents.to_vec())
    }
}
