//! Integration tests for the HTTP backends against a mock server

use serde_json::json;
use std::sync::Arc;
use summa::config::PipelineSettings;
use summa::error::{ApiError, ConfigError};
use summa::pipeline::SummaryPipeline;
use summa::provider::{ProviderConfig, ProviderFactory, ProviderType};
use summa::types::Item;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

fn gemini_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(ProviderType::Gemini)
        .with_api_key("test-key")
        .with_endpoint(server.uri())
}

fn ollama_config(server: &MockServer) -> ProviderConfig {
    ProviderConfig::new(ProviderType::Ollama).with_endpoint(server.uri())
}

async fn mount_gemini_models(server: &MockServer, models: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(header("x-goog-api-key", "test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "models": models })))
        .mount(server)
        .await;
}

/// Answers every generate call with one summary per item in the prompt.
fn summaries_for(prompt: &str) -> String {
    let count = prompt.matches("--ITEM--ID:").count();
    let summaries: Vec<String> = (0..count).map(|i| format!("Item {i} was summarized")).collect();
    serde_json::to_string(&summaries).unwrap()
}

#[tokio::test]
async fn test_gemini_connect_validates_model() {
    let server = MockServer::start().await;
    mount_gemini_models(
        &server,
        json!([
            { "name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent"] },
            { "name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"] }
        ]),
    )
    .await;

    let client = ProviderFactory::connect(&gemini_config(&server)).await.unwrap();
    assert_eq!(client.provider_name(), "gemini");
    assert_eq!(client.model_name(), "gemini-2.5-flash");
}

#[tokio::test]
async fn test_gemini_unknown_model_lists_available() {
    let server = MockServer::start().await;
    mount_gemini_models(
        &server,
        json!([{ "name": "models/gemini-2.5-pro", "supportedGenerationMethods": ["generateContent"] }]),
    )
    .await;

    let err = ProviderFactory::connect(&gemini_config(&server)).await.err().unwrap();
    match err {
        ConfigError::UnknownModel { model, available } => {
            assert_eq!(model, "gemini-2.5-flash");
            assert!(available.contains("gemini-2.5-pro"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_gemini_non_generating_model_is_rejected() {
    let server = MockServer::start().await;
    mount_gemini_models(
        &server,
        json!([{ "name": "models/text-embedding-004", "supportedGenerationMethods": ["embedContent"] }]),
    )
    .await;

    let config = gemini_config(&server).with_model("text-embedding-004");
    let err = ProviderFactory::connect(&config).await.err().unwrap();
    assert!(matches!(err, ConfigError::UnsupportedModel(_)));
}

#[tokio::test]
async fn test_gemini_model_listing_follows_pages() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "models/gemini-2.5-flash", "supportedGenerationMethods": ["generateContent"] }]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "models/gemini-1.5-pro", "supportedGenerationMethods": ["generateContent"] }],
            "nextPageToken": "page-2"
        })))
        .mount(&server)
        .await;

    let client = ProviderFactory::create_client(&gemini_config(&server)).unwrap();
    let models = client.list_models().await.unwrap();
    let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(names, vec!["models/gemini-1.5-pro", "models/gemini-2.5-flash"]);
    assert!(client.validate().await.is_ok());
}

#[tokio::test]
async fn test_gemini_rejected_key_is_a_credential_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(403).set_body_string("API key not valid"))
        .mount(&server)
        .await;

    let err = ProviderFactory::connect(&gemini_config(&server)).await.err().unwrap();
    assert!(matches!(err, ConfigError::MissingCredential(_)));
}

#[tokio::test]
async fn test_gemini_generate_joins_candidate_parts() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [{ "role": "user", "parts": [{ "text": "hello" }] }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{ "text": "[\"A\"," }, { "text": "\"B\"]" }] } }]
        })))
        .mount(&server)
        .await;

    let client = ProviderFactory::create_client(&gemini_config(&server)).unwrap();
    assert_eq!(client.generate("hello").await.unwrap(), "[\"A\",\"B\"]");
}

#[tokio::test]
async fn test_gemini_rate_limit_is_transient() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .mount(&server)
        .await;

    let client = ProviderFactory::create_client(&gemini_config(&server)).unwrap();
    let err = client.generate("hello").await.unwrap_err();
    assert!(matches!(err, ApiError::ProviderRateLimit(_)));
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_ollama_connect_requires_pulled_model() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "llama3:8b" }]
        })))
        .mount(&server)
        .await;

    let err = ProviderFactory::connect(&ollama_config(&server)).await.err().unwrap();
    assert!(matches!(err, ConfigError::UnknownModel { .. }));

    let client = ProviderFactory::connect(&ollama_config(&server).with_model("llama3:8b"))
        .await
        .unwrap();
    assert_eq!(client.model_name(), "llama3:8b");
}

#[tokio::test]
async fn test_ollama_unreachable_server_fails_fast() {
    let config = ProviderConfig::new(ProviderType::Ollama).with_endpoint("http://127.0.0.1:1");
    let err = ProviderFactory::connect(&config).await.err().unwrap();
    assert!(matches!(err, ConfigError::Unreachable { .. }));
}

#[tokio::test]
async fn test_ollama_generate_sends_sampling_options() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .and(body_partial_json(json!({
            "model": "gemma3:1b",
            "prompt": "hello",
            "stream": false,
            "options": { "num_predict": 2000 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "response": "[\"Hi.\"]" })))
        .mount(&server)
        .await;

    let client = ProviderFactory::create_client(&ollama_config(&server)).unwrap();
    assert_eq!(client.generate("hello").await.unwrap(), "[\"Hi.\"]");
}

#[tokio::test]
async fn test_pipeline_end_to_end_over_ollama() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": [{ "name": "gemma3:1b" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/generate"))
        .respond_with(|request: &Request| {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            let prompt = body["prompt"].as_str().unwrap_or_default();
            ResponseTemplate::new(200).set_body_json(json!({ "response": summaries_for(prompt) }))
        })
        .mount(&server)
        .await;

    let client = ProviderFactory::connect(&ollama_config(&server)).await.unwrap();
    let pipeline = SummaryPipeline::new(Arc::clone(&client), &PipelineSettings::default());
    let items: Vec<Item> = (0..40)
        .map(|i| Item::new(format!("c{i}"), format!("The soup at table {i} was cold")))
        .collect();

    let outcomes = pipeline.run_all(&items).await.unwrap();
    assert_eq!(outcomes.len(), 40);
    assert!(outcomes.values().all(|outcome| outcome.is_success()));

    // Ramp 10, 15, then the remaining 15: one call per batch.
    let generate_calls = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|request| request.url.path() == "/api/generate")
        .count();
    assert_eq!(generate_calls, 3);
}
