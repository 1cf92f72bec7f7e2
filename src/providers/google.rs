//! Google Cloud Translation (v3 REST) provider.

use super::{ContentType, TextProvider};
use crate::config::ProviderConfig;
use crate::error::ProviderError;
use crate::utils::check_response_status;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Request body for `translateText`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateRequest<'a> {
    contents: &'a [String],
    mime_type: &'static str,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

/// Response from `translateText`.
#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

/// A single translated string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Translation {
    #[serde(default)]
    translated_text: String,
}

/// Client for the `projects.locations.translateText` endpoint.
pub struct GoogleTranslateProvider {
    /// HTTP client for API requests.
    client: Client,
    /// Connection configuration.
    config: ProviderConfig,
}

impl GoogleTranslateProvider {
    /// Creates a provider from configuration.
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        if !config.is_configured() {
            return Err(ProviderError::InvalidConfig(
                "project_id and access_token are required".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    /// Full URL of the translate endpoint.
    fn endpoint(&self) -> String {
        format!(
            "{}/projects/{}/locations/{}:translateText",
            self.config.base_url.trim_end_matches('/'),
            self.config.project_id,
            self.config.location
        )
    }
}

#[async_trait]
impl TextProvider for GoogleTranslateProvider {
    fn name(&self) -> &'static str {
        "Google Cloud Translation"
    }

    async fn translate(
        &self,
        contents: &[String],
        content_type: ContentType,
        source_language: &str,
        target_language: &str,
    ) -> Result<Vec<String>, ProviderError> {
        let request = TranslateRequest {
            contents,
            mime_type: content_type.mime_type(),
            source_language_code: source_language,
            target_language_code: target_language,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.access_token)
            .json(&request)
            .send()
            .await?;
        let response = check_response_status(response).await?;

        let body = response.text().await?;
        parse_response(&body)
    }
}

/// Extracts translated strings in response order.
///
/// The API omits `translations` entirely when nothing was translated.
fn parse_response(body: &str) -> Result<Vec<String>, ProviderError> {
    let response: TranslateResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

    Ok(response
        .translations
        .into_iter()
        .map(|t| t.translated_text)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> ProviderConfig {
        ProviderConfig {
            project_id: "balmy-project".to_string(),
            access_token: "token".to_string(),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn test_endpoint() {
        let provider = GoogleTranslateProvider::new(configured()).unwrap();
        assert_eq!(
            provider.endpoint(),
            "https://translation.googleapis.com/v3/projects/balmy-project/locations/global:translateText"
        );
    }

    #[test]
    fn test_unconfigured_rejected() {
        let result = GoogleTranslateProvider::new(ProviderConfig::default());
        assert!(matches!(result, Err(ProviderError::InvalidConfig(_))));
    }

    #[test]
    fn test_request_body_shape() {
        let contents = vec!["Hello".to_string()];
        let request = TranslateRequest {
            contents: &contents,
            mime_type: ContentType::Html.mime_type(),
            source_language_code: "en",
            target_language_code: "zh-CN",
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["contents"][0], "Hello");
        assert_eq!(json["mimeType"], "text/html");
        assert_eq!(json["sourceLanguageCode"], "en");
        assert_eq!(json["targetLanguageCode"], "zh-CN");
    }

    #[test]
    fn test_parse_response() {
        let body = r#"{"translations":[{"translatedText":"你好"},{"translatedText":"世界"}]}"#;
        assert_eq!(parse_response(body).unwrap(), vec!["你好", "世界"]);
    }

    #[test]
    fn test_parse_response_without_translations() {
        assert!(parse_response("{}").unwrap().is_empty());
    }

    #[test]
    fn test_parse_response_invalid_json() {
        assert!(matches!(
            parse_response("not json"),
            Err(ProviderError::InvalidResponse(_))
        ));
    }
}
