use providers::lmstudio::{LmStudioConfig, LmStudioProvider};
use providers::{EmbeddingProvider, ProviderError};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(base_url: String) -> LmStudioProvider {
    LmStudioProvider::new(LmStudioConfig {
        base_url,
        embedding_model: "nomic-embed-text".to_string(),
        review_model: "qwen2.5-7b-instruct".to_string(),
    })
}

#[tokio::test]
async fn embed_posts_to_the_local_endpoint_without_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .and(body_partial_json(json!({"model": "nomic-embed-text"})))
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
    assert_eq!(response.vectors[1], vec![0.3, 0.4]);
}

#[tokio::test]
async fn embed_rejects_a_vector_count_mismatch() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": []
        })))
        .mount(&server)
        .await;

    let provider = provider(server.uri());
    let texts = vec!["one".to_string()];
    let err = provider.embed(&texts).await.unwrap_err();

    assert!(matches!(err, ProviderError::MalformedResponse(_)));
}
