use std::future::Future;

use core_config::ServiceConfig;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::{debug, info, warn};

use crate::request::ChatRequest;
use crate::sse::SseFragmentStream;
use crate::{CorrectionError, CorrectionService, FragmentStream};

/// Streaming chat-completions client.
#[derive(Debug, Clone)]
pub struct OpenAiService {
    client: reqwest::Client,
    settings: ServiceConfig,
    api_key: String,
}

impl OpenAiService {
    /// Fails with [`CorrectionError::MissingApiKey`] when no key is available, so a missing
    /// credential is reported before any text is sent.
    pub fn new(settings: ServiceConfig, api_key: Option<String>) -> Result<Self, CorrectionError> {
        let api_key = api_key
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| CorrectionError::MissingApiKey(settings.api_key_env.clone()))?;
        let client = reqwest::Client::builder().build()?;
        info!(
            target: "service.openai",
            model = settings.model.as_str(),
            endpoint = settings.endpoint.as_str(),
            "client_ready"
        );
        Ok(Self {
            client,
            settings,
            api_key,
        })
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }
}

impl CorrectionService for OpenAiService {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn correct(
        &self,
        original: &str,
    ) -> impl Future<Output = Result<FragmentStream, CorrectionError>> + Send {
        let body = ChatRequest::for_text(&self.settings, original).to_body();
        let request = self
            .client
            .post(&self.settings.endpoint)
            .bearer_auth(&self.api_key)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "text/event-stream");
        async move {
            let body = body?;
            debug!(target: "service.openai", body_len = body.len(), "request_sending");
            let response = request.body(body).send().await?;
            let status = response.status();
            if !status.is_success() {
                let detail = response.text().await.unwrap_or_default();
                warn!(
                    target: "service.openai",
                    status = status.as_u16(),
                    detail_len = detail.len(),
                    "request_rejected"
                );
                return Err(CorrectionError::from_status(status.as_u16(), &detail));
            }
            debug!(target: "service.openai", status = status.as_u16(), "stream_opened");
            let stream: FragmentStream = Box::pin(SseFragmentStream::new(response.bytes_stream()));
            Ok(stream)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_is_reported_up_front() {
        let settings = ServiceConfig::default();
        let err = OpenAiService::new(settings.clone(), None).unwrap_err();
        assert_eq!(err, CorrectionError::MissingApiKey("OPENAI_API_KEY".into()));
        let err = OpenAiService::new(settings, Some("   ".into())).unwrap_err();
        assert!(matches!(err, CorrectionError::MissingApiKey(_)));
    }

    #[test]
    fn builds_with_key() {
        let service = OpenAiService::new(ServiceConfig::default(), Some("sk-test".into())).unwrap();
        assert_eq!(service.name(), "openai");
        assert_eq!(service.model(), "gpt-4o-mini");
    }
}
