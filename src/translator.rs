use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::TranslatorConfig;

const API_VERSION: &str = "3.0";

/// Text to translate and the language to translate it into.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationRequest {
    pub text: String,
    pub target_language: String,
}

#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("translator request failed")]
    Request(#[source] reqwest::Error),
    #[error("translator API error ({status}): {body}")]
    Status { status: StatusCode, body: String },
    #[error("failed to parse translator response")]
    Decode(#[source] serde_json::Error),
    #[error("translator returned no translations")]
    Empty,
}

/// Anything that can turn a [`TranslationRequest`] into translated text.
#[async_trait]
pub trait Translate: Send + Sync {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError>;
}

#[derive(Debug, Serialize)]
struct TextItem<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct TranslateResult {
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// Client for the Azure Translator text API.
pub struct AzureTranslator {
    client: reqwest::Client,
    config: TranslatorConfig,
}

impl AzureTranslator {
    pub fn new(config: TranslatorConfig) -> Result<Self, TranslationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(TranslationError::Request)?;
        Ok(Self { client, config })
    }

    fn url(&self) -> String {
        format!("{}/translate", self.config.endpoint.trim_end_matches('/'))
    }
}

#[async_trait]
impl Translate for AzureTranslator {
    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        info!(
            "Translating \"{}\" to \"{}\"",
            request.text, request.target_language
        );

        let url = self.url();
        let trace_id = uuid::Uuid::new_v4().to_string();
        debug!("Sending request to translator: {} (trace id {})", url, trace_id);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("api-version", API_VERSION),
                ("to", request.target_language.trim()),
            ])
            .header("Ocp-Apim-Subscription-Key", &self.config.api_key)
            .header("Ocp-Apim-Subscription-Region", &self.config.region)
            .header("Content-Type", "application/json")
            .header("X-ClientTraceId", trace_id)
            .json(&[TextItem {
                text: &request.text,
            }])
            .send()
            .await
            .map_err(TranslationError::Request)?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(TranslationError::Status { status, body });
        }

        let body = response.text().await.map_err(TranslationError::Request)?;
        let translated = extract_translation(&body)?;

        info!("Translated text: {}", translated);
        Ok(translated)
    }
}

/// Pull `[0].translations[0].text` out of a translator response body.
fn extract_translation(body: &str) -> Result<String, TranslationError> {
    let results: Vec<TranslateResult> =
        serde_json::from_str(body).map_err(TranslationError::Decode)?;

    results
        .into_iter()
        .next()
        .and_then(|r| r.translations.into_iter().next())
        .map(|t| t.text)
        .ok_or(TranslationError::Empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;
    use std::time::Duration;

    fn translator(endpoint: String) -> AzureTranslator {
        AzureTranslator::new(TranslatorConfig {
            api_key: "test-key".to_string(),
            endpoint,
            region: "westeurope".to_string(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request(text: &str, lang: &str) -> TranslationRequest {
        TranslationRequest {
            text: text.to_string(),
            target_language: lang.to_string(),
        }
    }

    #[test]
    fn test_extract_first_translation() {
        let body = r#"[
            {"detectedLanguage": {"language": "en", "score": 1.0},
             "translations": [{"text": "hola", "to": "es"}, {"text": "salut", "to": "fr"}]},
            {"translations": [{"text": "ignored"}]}
        ]"#;
        assert_eq!(extract_translation(body).unwrap(), "hola");
    }

    #[test]
    fn test_extract_rejects_missing_or_empty() {
        assert!(matches!(
            extract_translation("[]"),
            Err(TranslationError::Empty)
        ));
        assert!(matches!(
            extract_translation(r#"[{"translations": []}]"#),
            Err(TranslationError::Empty)
        ));
        assert!(matches!(
            extract_translation(r#"[{"something": "else"}]"#),
            Err(TranslationError::Decode(_))
        ));
        assert!(matches!(
            extract_translation("<html>oops</html>"),
            Err(TranslationError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_translate_sends_expected_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/translate")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api-version".into(), "3.0".into()),
                Matcher::UrlEncoded("to".into(), "es".into()),
            ]))
            .match_header("Ocp-Apim-Subscription-Key", "test-key")
            .match_header("Ocp-Apim-Subscription-Region", "westeurope")
            .match_header("content-type", "application/json")
            .match_header(
                "X-ClientTraceId",
                Matcher::Regex(
                    "^[0-9a-f]{8}-[0-9a-f]{4}-4[0-9a-f]{3}-[0-9a-f]{4}-[0-9a-f]{12}$".into(),
                ),
            )
            .match_body(Matcher::Json(json!([{ "text": "hello" }])))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"translations":[{"text":"hola","to":"es"}]}]"#)
            .create_async()
            .await;

        // Trailing slash on the endpoint must not produce `//translate`
        let translator = translator(format!("{}/", server.url()));
        let translated = translator.translate(&request("hello", "es")).await.unwrap();

        assert_eq!(translated, "hola");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_translate_server_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/translate")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let err = translator(server.url())
            .translate(&request("hello", "es"))
            .await
            .unwrap_err();
        match err {
            TranslationError::Status { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_translate_malformed_json() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/translate")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body("{not json")
            .create_async()
            .await;

        let err = translator(server.url())
            .translate(&request("hello", "es"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Decode(_)));
    }

    #[tokio::test]
    async fn test_translate_error_status_with_truncated_body() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Promise 100 bytes of body, send 5, then hang up
        let server = tokio::spawn(async move {
            if let Ok((mut socket, _)) = listener.accept().await {
                let mut buf = [0u8; 4096];
                let _ = socket.read(&mut buf).await;
                let _ = socket
                    .write_all(
                        b"HTTP/1.1 503 Service Unavailable\r\ncontent-length: 100\r\n\r\nshort",
                    )
                    .await;
                let _ = socket.shutdown().await;
            }
        });

        let err = translator(format!("http://{addr}"))
            .translate(&request("hello", "es"))
            .await
            .unwrap_err();
        match err {
            TranslationError::Status { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body, "<unreadable body>");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_translate_times_out_on_silent_server() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept connections and hold them open without answering
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let translator = AzureTranslator::new(TranslatorConfig {
            api_key: "test-key".to_string(),
            endpoint: format!("http://{addr}"),
            region: "westeurope".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap();

        let err = translator
            .translate(&request("hello", "es"))
            .await
            .unwrap_err();
        match err {
            TranslationError::Request(e) => assert!(e.is_timeout(), "not a timeout: {e:?}"),
            other => panic!("unexpected error: {other:?}"),
        }
        server.abort();
    }

    #[tokio::test]
    async fn test_translate_connection_refused() {
        // Nothing listens on port 9 locally
        let err = translator("http://127.0.0.1:9".to_string())
            .translate(&request("hello", "es"))
            .await
            .unwrap_err();
        assert!(matches!(err, TranslationError::Request(_)));
    }
}
