use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: &'static str,
    pub status: Option<u16>,
    pub detail: String,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM error (provider={:?}, stage={}): {}",
            self.provider, self.stage, self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    ModelNotFound,
    Other,
}

/// Only the provider's HTTP-stage answer decides; transport and decode
/// failures are always `Other`.
pub fn classify(err: &anyhow::Error) -> FailureKind {
    let Some(diag) = err.downcast_ref::<LlmDiagnosticsError>() else {
        return FailureKind::Other;
    };
    if diag.status == Some(404) {
        return FailureKind::ModelNotFound;
    }
    if diag.stage == "http" && diag.detail.to_ascii_lowercase().contains("not found") {
        FailureKind::ModelNotFound
    } else {
        FailureKind::Other
    }
}

/// User-facing text shown in place of commentary when the AI call fails.
pub fn advisory_message(err: &anyhow::Error) -> String {
    match classify(err) {
        FailureKind::ModelNotFound => {
            "AI 模型目前無法使用（找不到指定模型），請確認模型設定後再試。".to_string()
        }
        FailureKind::Other => "AI 分析暫時無法取得，請稍後再試。".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_404_diagnostics_as_model_not_found() {
        let err: anyhow::Error = LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage: "http",
            status: Some(404),
            detail: "status=404".to_string(),
            raw_response_json: None,
        }
        .into();
        assert_eq!(classify(&err), FailureKind::ModelNotFound);
        assert!(advisory_message(&err).contains("找不到"));
    }

    fn diagnostics(stage: &'static str, status: Option<u16>, detail: &str) -> anyhow::Error {
        LlmDiagnosticsError {
            provider: Provider::Gemini,
            stage,
            status,
            detail: detail.to_string(),
            raw_response_json: None,
        }
        .into()
    }

    #[test]
    fn classifies_http_message_content() {
        let err = diagnostics(
            "http",
            Some(400),
            "status=400 message=models/gemini-x is not found for API version v1beta",
        );
        assert_eq!(classify(&err), FailureKind::ModelNotFound);

        let err = anyhow::anyhow!("connection reset by peer");
        assert_eq!(classify(&err), FailureKind::Other);
        assert!(advisory_message(&err).contains("稍後再試"));
    }

    #[test]
    fn ignores_not_found_text_outside_http_stage() {
        let err = diagnostics("decode", None, "invalid type: string \"404 not found\"");
        assert_eq!(classify(&err), FailureKind::Other);

        let err = anyhow::anyhow!("HTTP 404 Not Found").context("Gemini request failed");
        assert_eq!(classify(&err), FailureKind::Other);
    }

    #[test]
    fn diagnostics_survive_added_context() {
        let err = diagnostics("http", Some(404), "status=404").context("overview commentary failed");
        assert_eq!(classify(&err), FailureKind::ModelNotFound);
    }
}
