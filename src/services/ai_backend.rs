/*!
 * # AI Backend Client
 *
 * Contract with the document-analysis worker: a health probe, a file upload
 * that returns extracted content, and a per-document analysis call. The
 * worker is optional infrastructure; callers degrade to a basic check when
 * any of these fail.
 */

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::config::AiBackendConfig;
use crate::entities::enums::AiMode;
use crate::models::DocumentCategory;

#[derive(Debug, Error)]
pub enum AiBackendError {
    #[error("AI backend request failed: {0}")]
    Transport(String),
    #[error("AI backend returned status {0}")]
    Status(u16),
    #[error("AI backend response could not be decoded: {0}")]
    Decode(String),
    #[error("AI backend circuit breaker is open")]
    CircuitOpen,
}

impl From<reqwest::Error> for AiBackendError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AiBackendError::Decode(err.to_string())
        } else {
            AiBackendError::Transport(err.to_string())
        }
    }
}

impl From<CircuitBreakerError<AiBackendError>> for AiBackendError {
    fn from(err: CircuitBreakerError<AiBackendError>) -> Self {
        match err {
            CircuitBreakerError::CircuitOpen => AiBackendError::CircuitOpen,
            CircuitBreakerError::ServiceFailure(inner) => inner,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    #[serde(default)]
    pub ai_mode: Option<String>,
    #[serde(default)]
    pub ollama_model: Option<String>,
}

impl HealthReport {
    pub fn mode(&self) -> AiMode {
        AiMode::from_reported(self.ai_mode.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedDocument {
    pub document_id: String,
    #[serde(default)]
    pub content: Value,
}

/// One document handed to the worker together with the supplier's context.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessRequest {
    pub document_id: String,
    pub content: Value,
    pub document_type: DocumentCategory,
    pub filename: String,
    pub supplier_email: String,
    pub supplier_name: String,
    pub form_data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProcessedDocument {
    #[serde(default, deserialize_with = "text_or_json")]
    pub analysis_results: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub compliance_results: Option<String>,
    #[serde(default, deserialize_with = "text_or_json")]
    pub risk_assessment: Option<String>,
    #[serde(default)]
    pub document_type_mismatch: bool,
    #[serde(default)]
    pub document_type_detected: Option<String>,
    #[serde(default)]
    pub ai_processing: Option<Value>,
    #[serde(default)]
    pub extracted_data: Option<Value>,
}

/// Worker responses carry free text, but older workers send objects; keep
/// either as text.
fn text_or_json<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn health(&self) -> Result<HealthReport, AiBackendError>;

    async fn upload(
        &self,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<UploadedDocument, AiBackendError>;

    async fn process_document(
        &self,
        request: ProcessRequest,
    ) -> Result<ProcessedDocument, AiBackendError>;
}

/// HTTP client for the analysis worker, guarded by a circuit breaker.
pub struct HttpAiBackend {
    client: reqwest::Client,
    config: AiBackendConfig,
    breaker: CircuitBreaker,
}

impl HttpAiBackend {
    pub fn new(config: AiBackendConfig) -> Result<Self, AiBackendError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let breaker = CircuitBreaker::new(
            config.circuit_breaker_failure_threshold,
            Duration::from_secs(config.circuit_breaker_timeout_secs),
            1,
        );
        Ok(Self {
            client,
            config,
            breaker,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, AiBackendError> {
        let status = response.status();
        if !status.is_success() {
            return Err(AiBackendError::Status(status.as_u16()));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| AiBackendError::Decode(e.to_string()))
    }
}

#[async_trait]
impl AiBackend for HttpAiBackend {
    #[instrument(skip(self))]
    async fn health(&self) -> Result<HealthReport, AiBackendError> {
        let url = self.url("health");
        let client = &self.client;
        let timeout = self.config.health_timeout();
        let result = self
            .breaker
            .call(move || async move {
                let response = client
                    .get(url)
                    .header(reqwest::header::ACCEPT, "application/json")
                    .timeout(timeout)
                    .send()
                    .await?;
                Self::read_json::<HealthReport>(response).await
            })
            .await;
        if let Err(e) = &result {
            warn!(error = %e, "AI backend health probe failed");
        }
        result.map_err(AiBackendError::from)
    }

    #[instrument(skip(self, bytes), fields(len = bytes.len()))]
    async fn upload(
        &self,
        file_name: &str,
        bytes: Bytes,
    ) -> Result<UploadedDocument, AiBackendError> {
        let url = self.url("upload");
        let client = &self.client;
        let file_name = file_name.to_string();
        self.breaker
            .call(move || async move {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(file_name)
                    .mime_str("application/pdf")?;
                let form = reqwest::multipart::Form::new().part("file", part);
                let response = client.post(url).multipart(form).send().await?;
                Self::read_json::<UploadedDocument>(response).await
            })
            .await
            .map_err(AiBackendError::from)
    }

    #[instrument(skip(self, request), fields(document_type = %request.document_type, filename = %request.filename))]
    async fn process_document(
        &self,
        request: ProcessRequest,
    ) -> Result<ProcessedDocument, AiBackendError> {
        let url = self.url("process-document");
        let client = &self.client;
        let processed = self
            .breaker
            .call(move || async move {
                let response = client.post(url).json(&request).send().await?;
                Self::read_json::<ProcessedDocument>(response).await
            })
            .await
            .map_err(AiBackendError::from)?;
        debug!(
            mismatch = processed.document_type_mismatch,
            "document processed by AI backend"
        );
        Ok(processed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, failure_threshold: u32) -> HttpAiBackend {
        HttpAiBackend::new(AiBackendConfig {
            base_url: format!("{}/", server.uri()),
            circuit_breaker_failure_threshold: failure_threshold,
            ..AiBackendConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn health_reports_mode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"status": "healthy", "ai_mode": "ollama", "ollama_model": "llama3.1"}),
            ))
            .mount(&server)
            .await;

        let report = backend(&server, 5).health().await.unwrap();
        assert_eq!(report.mode(), AiMode::Ollama);
        assert_eq!(report.ollama_model.as_deref(), Some("llama3.1"));
    }

    #[tokio::test]
    async fn upload_then_process_document() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/upload"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"document_id": "doc-1", "content": "Bank letter"})),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/process-document"))
            .and(body_partial_json(json!({
                "document_id": "doc-1",
                "document_type": "bankConfirmation"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "analysis_results": {"summary": "letterhead present"},
                "compliance_results": "Compliant",
                "risk_assessment": "Low Risk",
                "document_type_mismatch": true,
                "document_type_detected": "invoice"
            })))
            .mount(&server)
            .await;

        let client = backend(&server, 5);
        let uploaded = client
            .upload("bank.pdf", Bytes::from_static(b"%PDF-1.4"))
            .await
            .unwrap();
        assert_eq!(uploaded.document_id, "doc-1");

        let processed = client
            .process_document(ProcessRequest {
                document_id: uploaded.document_id,
                content: uploaded.content,
                document_type: DocumentCategory::BankConfirmation,
                filename: "bank.pdf".into(),
                supplier_email: "sales@acme.example".into(),
                supplier_name: "Acme".into(),
                form_data: json!({}),
            })
            .await
            .unwrap();
        assert!(processed.document_type_mismatch);
        assert_eq!(
            processed.analysis_results.as_deref(),
            Some(r#"{"summary":"letterhead present"}"#)
        );
        assert_eq!(processed.document_type_detected.as_deref(), Some("invoice"));
    }

    #[tokio::test]
    async fn repeated_failures_open_the_circuit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let client = backend(&server, 1);
        assert_matches!(client.health().await, Err(AiBackendError::Status(503)));
        assert_matches!(client.health().await, Err(AiBackendError::CircuitOpen));
    }
}
