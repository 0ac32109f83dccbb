use providers::openai::{OpenAiConfig, OpenAiProvider};
use providers::{ContextPassage, EmbeddingProvider, FindingsProvider, ProviderError, ReviewRequest};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(base_url: String) -> OpenAiProvider {
    OpenAiProvider::new(OpenAiConfig {
        api_key: "test-key".to_string(),
        base_url,
        embedding_model: "text-embedding-3-small".to_string(),
        review_model: "gpt-4o-mini".to_string(),
    })
}

fn review_request() -> ReviewRequest {
    ReviewRequest {
        clause_id: "9f3ab2c1-c002".to_string(),
        clause_title: "Article 2 (Termination)".to_string(),
        clause_text: "Either party may terminate for material breach.".to_string(),
        context: vec![ContextPassage {
            source: "primary_law".to_string(),
            title: "Termination of continuing obligations".to_string(),
            snippet: "A contract may be terminated where performance fails.".to_string(),
        }],
    }
}

#[tokio::test]
async fn embed_sends_the_model_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "text-embedding-3-small"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"embedding": [0.1, 0.2]},
                {"embedding": [0.3, 0.4]}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let texts = vec!["first clause".to_string(), "second clause".to_string()];
    let response = provider.embed(&texts).await.unwrap();

    assert_eq!(response.vectors.len(), 2);
    assert_eq!(response.vectors[0], vec![0.1, 0.2]);
    assert_eq!(response.vectors[1], vec![0.3, 0.4]);
}

#[tokio::test]
async fn embed_rejects_a_vector_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"embedding": [0.1, 0.2]}]
        })))
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let texts = vec!["one".to_string(), "two".to_string()];
    let err = provider.embed(&texts).await.unwrap_err();

    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}

#[tokio::test]
async fn embed_surfaces_http_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let err = provider
        .embed(&["text".to_string()])
        .await
        .unwrap_err();

    match err {
        ProviderError::RequestFailed(message) => assert!(message.contains("500")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn review_parses_a_json_findings_reply() {
    let reply = r#"[{"text": "No cure period before termination", "category": "termination", "quote_start": 17, "quote_end": 46}]"#;
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{"message": {"content": reply}}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let findings = provider.review(&review_request()).await.unwrap();

    assert_eq!(findings.len(), 1);
    assert_eq!(findings[0].text, "No cure period before termination");
    assert_eq!(findings[0].category.as_deref(), Some("termination"));
    assert_eq!(findings[0].quote_start, Some(17));
    assert_eq!(findings[0].quote_end, Some(46));
}

#[tokio::test]
async fn review_surfaces_http_failures() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let err = provider.review(&review_request()).await.unwrap_err();

    assert!(matches!(err, ProviderError::RequestFailed(_)));
}
