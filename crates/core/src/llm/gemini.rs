use crate::config::Settings;
use crate::llm::error::LlmDiagnosticsError;
use crate::llm::{Citation, Commentary, CommentaryClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 2048;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_output_tokens: u32,
    grounding: bool,
}

impl GeminiClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_ai_api_key()?.to_string();
        let base_url =
            std::env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_output_tokens = std::env::var("GEMINI_MAX_OUTPUT_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_OUTPUT_TOKENS);
        let grounding = std::env::var("GEMINI_GROUNDING")
            .map(|s| !matches!(s.trim(), "0" | "false" | "off"))
            .unwrap_or(true);

        let timeout_secs = std::env::var("GEMINI_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_output_tokens,
            grounding,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![RequestPart {
                    text: prompt.to_string(),
                }],
            }],
            tools: self.grounding.then(|| {
                vec![Tool {
                    google_search: serde_json::json!({}),
                }]
            }),
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
            },
        }
    }

    async fn generate_content(
        &self,
        req: GenerateContentRequest,
    ) -> anyhow::Result<GenerateContentResponse> {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_str(&self.api_key)?);

        let model = self.model.trim_start_matches("models/");
        let url = format!(
            "{}/v1beta/models/{model}:generateContent",
            self.base_url.trim_end_matches('/')
        );
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Gemini request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Gemini response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            let message = raw_response_json
                .as_ref()
                .and_then(|v| v.pointer("/error/message"))
                .and_then(|v| v.as_str())
                .unwrap_or(text.as_str())
                .to_string();
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "http",
                status: Some(status.as_u16()),
                detail: format!("status={status} message={message}"),
                raw_response_json,
            }
            .into());
        }

        serde_json::from_str::<GenerateContentResponse>(&text).map_err(|err| {
            anyhow::Error::from(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "decode",
                status: Some(status.as_u16()),
                detail: format!("failed to decode Gemini response: {err}"),
                raw_response_json: serde_json::from_str(&text).ok(),
            })
        })
    }

    fn into_commentary(res: GenerateContentResponse) -> anyhow::Result<Commentary> {
        let candidate = res.candidates.into_iter().next().ok_or_else(|| LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage: "empty_candidates",
            status: None,
            detail: "response contained no candidates".to_string(),
            raw_response_json: None,
        })?;

        let mut text = String::new();
        for part in candidate.content.map(|c| c.parts).unwrap_or_default() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
        }

        let mut sources: Vec<Citation> = Vec::new();
        let chunks = candidate
            .grounding_metadata
            .map(|m| m.grounding_chunks)
            .unwrap_or_default();
        for chunk in chunks {
            let Some(web) = chunk.web else { continue };
            let Some(uri) = web.uri.filter(|u| !u.trim().is_empty()) else {
                continue;
            };
            if sources.iter().any(|s| s.uri == uri) {
                continue;
            }
            sources.push(Citation {
                title: web.title.unwrap_or_else(|| uri.clone()),
                uri,
            });
        }

        if text.trim().is_empty() {
            return Err(LlmDiagnosticsError {
                provider: Provider::Gemini,
                stage: "empty_text",
                status: None,
                detail: format!("finish_reason={:?}", candidate.finish_reason),
                raw_response_json: None,
            }
            .into());
        }

        Ok(Commentary {
            text: text.trim().to_string(),
            sources,
        })
    }
}

#[async_trait::async_trait]
impl CommentaryClient for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    async fn generate(&self, prompt: &str) -> anyhow::Result<Commentary> {
        let t0 = std::time::Instant::now();
        let res = self.generate_content(self.request(prompt)).await?;
        let commentary = Self::into_commentary(res)?;
        tracing::info!(
            model = %self.model,
            prompt_chars = prompt.chars().count(),
            sources = commentary.sources.len(),
            elapsed_ms = t0.elapsed().as_millis(),
            "Gemini commentary generated"
        );
        Ok(commentary)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<RequestPart>,
}

#[derive(Debug, Clone, Serialize)]
struct RequestPart {
    text: String,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    google_search: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Clone, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroundingMetadata {
    #[serde(default)]
    grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Deserialize)]
struct GroundingChunk {
    #[serde(default)]
    web: Option<WebSource>,
}

#[derive(Debug, Clone, Deserialize)]
struct WebSource {
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    title: Option<String>,
}
