//! LM Studio provider: OpenAI-compatible endpoints on a local server, no
//! auth. Preferred when documents must not leave the machine.

use crate::{
    EmbedResponse, EmbeddingProvider, FindingsProvider, ProviderError, RawFinding, ReviewRequest,
};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Clone)]
pub struct LmStudioConfig {
    pub base_url: String,
    pub embedding_model: String,
    pub review_model: String,
}

#[derive(Clone)]
pub struct LmStudioProvider {
    client: Client,
    cfg: Arc<LmStudioConfig>,
}

impl LmStudioProvider {
    pub fn new(cfg: LmStudioConfig) -> Self {
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
impl EmbeddingProvider for LmStudioProvider {
    async fn embed(&self, texts: &[String]) -> Result<EmbedResponse, ProviderError> {
        #[derive(serde::Serialize)]
        struct EmbedRequest<'a> {
            model: &'a str,
            input: &'a [String],
        }

        let resp = self
            .client
            .post(format!("{}/v1/embeddings", self.cfg.base_url))
            .json(&EmbedRequest {
                model: &self.cfg.embedding_model,
                input: texts,
            })
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
impl FindingsProvider for LmStudioProvider {
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

        let prompt = crate::openai::build_review_prompt(request);
        let resp = self
            .client
            .post(format!("{}/v1/chat/completions", self.cfg.base_url))
            .json(&ChatRequest {
                model: &self.cfg.review_model,
                messages: vec![ChatMessage {
                    role: "user",
                    content: &prompt,
                }],
            })
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

        Ok(crate::openai::parse_findings(&content, &request.clause_id))
    }
}
