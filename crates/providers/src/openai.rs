use crate::{
    EmbedResponse, EmbeddingProvider, FindingsProvider, ProviderError, RawFinding, ReviewRequest,
};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: String,
    pub embedding_model: String,
    pub review_model: String,
}

#[derive(Clone)]
pub struct OpenAiProvider {
    client: Client,
    cfg: Arc<OpenAiConfig>,
}

impl OpenAiProvider {
    pub fn new(cfg: OpenAiConfig) -> Self {
        Self {
            client: Client::new(),
            cfg: Arc::new(cfg),
        }
    }
}

#[derive(Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[async_trait::async_trait]
impl EmbeddingProvider for OpenAiProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        let body = EmbedRequest {
            model: &self.cfg.embedding_model,
            input: texts,
        };

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "embeddings endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: EmbeddingApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::MalformedResponse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        Ok(EmbedResponse {
            vectors: parsed.data.into_iter().map(|d| d.embedding).collect(),
        })
    }
}

#[async_trait::async_trait]
impl FindingsProvider for OpenAiProvider {
    async fn review(&self, request: &ReviewRequest) -> Result<Vec<RawFinding>, ProviderError> {
        #[derive(serde::Serialize)]
        struct ChatMessage<'a> {
            role: &'static str,
            content: &'a str,
        }
        #[derive(serde::Serialize)]
        struct ChatRequest<'a> {
            model: &'a str,
            messages: Vec<ChatMessage<'a>>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessageResp,
        }
        #[derive(Deserialize)]
        struct ChatMessageResp {
            content: String,
        }
        #[derive(Deserialize)]
        struct ChatApiResponse {
            choices: Vec<Choice>,
        }

        let prompt = build_review_prompt(request);
        let body = ChatRequest {
            model: &self.cfg.review_model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
        };

        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.cfg.base_url))
            .bearer_auth(&self.cfg.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(ProviderError::RequestFailed(format!(
                "chat endpoint returned {}",
                resp.status()
            )));
        }

        let parsed: ChatApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        Ok(parse_findings(&content, &request.clause_id))
    }
}

pub(crate) fn build_review_prompt(request: &ReviewRequest) -> String {
    let mut prompt = format!(
        "Review the contract clause below against the reference passages. \
         Reply with a JSON array of findings, each an object with \"text\", \
         optional \"clause_hint\", optional \"category\".\n\nClause {} ({}):\n{}\n",
        request.clause_id, request.clause_title, request.clause_text
    );
    for passage in &request.context {
        prompt.push_str(&format!(
            "\n[{}] {}\n{}\n",
            passage.source, passage.title, passage.snippet
        ));
    }
    prompt
}

/// Parses the reviewer reply. Replies are expected to be a JSON array of
/// findings, possibly wrapped in a markdown fence; anything unparseable is
/// kept verbatim as a single finding so reviewer output is never lost.
pub(crate) fn parse_findings(content: &str, clause_id: &str) -> Vec<RawFinding> {
    let trimmed = strip_code_fence(content);
    if let Ok(findings) = serde_json::from_str::<Vec<RawFinding>>(trimmed) {
        return findings;
    }
    if trimmed.trim().is_empty() {
        return Vec::new();
    }
    tracing::debug!(clause = clause_id, "reviewer reply was not JSON, keeping as one finding");
    vec![RawFinding {
        text: trimmed.trim().to_string(),
        clause_hint: Some(clause_id.to_string()),
        category: None,
        quote_start: None,
        quote_end: None,
    }]
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_array_reply() {
        let reply = r#"[{"text": "Missing notice period", "category": "termination"}]"#;
        let findings = parse_findings(reply, "abc-c001");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].text, "Missing notice period");
        assert_eq!(findings[0].category.as_deref(), Some("termination"));
        assert!(findings[0].clause_hint.is_none());
    }

    #[test]
    fn parses_fenced_reply() {
        let reply = "```json\n[{\"text\": \"ok\"}]\n```";
        let findings = parse_findings(reply, "abc-c001");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].text, "ok");
    }

    #[test]
    fn keeps_prose_reply_as_single_finding() {
        let findings = parse_findings("The clause lacks a governing-law election.", "abc-c002");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].clause_hint.as_deref(), Some("abc-c002"));
    }

    #[test]
    fn empty_reply_yields_no_findings() {
        assert!(parse_findings("   ", "abc-c003").is_empty());
    }
}
