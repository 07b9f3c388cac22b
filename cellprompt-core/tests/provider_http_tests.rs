//! End-to-end dispatch against mocked provider HTTP endpoints

use cellprompt_core::config::{CellpromptConfig, ProviderConfiguration};
use cellprompt_core::{
    CellOutput, Client, ClientError, OutputShape, Prompt, PromptBuilder, ProviderError, ProviderId,
};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(server: &MockServer, provider: ProviderId, model: &str) -> CellpromptConfig {
    let mut configuration = ProviderConfiguration::new(provider, model).with_base_url(server.uri());
    if provider.requires_api_key() {
        configuration = configuration.with_api_key("sk-test");
    }

    let mut config = CellpromptConfig::with_providers(vec![configuration]);
    config.resilience.retry.initial_delay_ms = 1;
    config.resilience.retry.max_delay_ms = 5;
    config.resilience.retry.jitter = false;
    config.cache.enabled = false;
    config
}

fn prompt() -> Prompt {
    PromptBuilder::new()
        .system("You are a spreadsheet assistant.")
        .user("What is 2+2?")
        .build()
}

fn openai_answer(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 12, "completion_tokens": 1 }
    })
}

fn openai_tool_call() -> Value {
    json!({
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": "call_1",
                    "type": "function",
                    "function": { "name": "read_file", "arguments": "{\"path\":\"notes.txt\"}" }
                }]
            },
            "finish_reason": "tool_calls"
        }]
    })
}

#[tokio::test]
async fn test_retries_503_exactly_max_plus_one() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
        .mount(&server)
        .await;

    let config = config(&server, ProviderId::OpenAi, "gpt-4o-mini");
    let client = Client::from_config(&config).unwrap();

    let err = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Provider(ProviderError::ServerError { status_code: 503, .. })
    ));
    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), config.resilience.retry.max_retries as usize + 1);
}

#[tokio::test]
async fn test_authentication_error_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": {"message": "bad key"}})))
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::OpenAi, "gpt-4o-mini")).unwrap();
    let err = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ClientError::Provider(ProviderError::AuthenticationError {
            status_code: Some(401),
            ..
        })
    ));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_not_found_keeps_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(404)
                .set_body_json(json!({"error": {"message": "The model `gpt-9` does not exist"}})),
        )
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::OpenAi, "gpt-9")).unwrap();
    let err = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        ClientError::Provider(provider_error) => {
            assert_eq!(provider_error.status_code(), Some(404));
            assert!(provider_error.to_string().contains("The model `gpt-9` does not exist"));
        }
        other => panic!("unexpected {:?}", other),
    }
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancellation_stops_in_flight_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_string("slow")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::OpenAi, "gpt-4o-mini")).unwrap();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = client.send(prompt(), ProviderId::OpenAi, &cancel).await.unwrap_err();
    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(2));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_retry_after_is_honoured() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "1"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_answer("4")))
        .mount(&server)
        .await;

    // Retry-After is capped by max_delay_ms
    let mut config = config(&server, ProviderId::OpenAi, "gpt-4o-mini");
    config.resilience.retry.max_delay_ms = 2_000;
    let client = Client::from_config(&config).unwrap();
    let started = Instant::now();
    let result = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.last_assistant_text(), Some("4"));
    assert!(started.elapsed() >= Duration::from_millis(900));
    assert_eq!(server.received_requests().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_openai_wire_shape_and_structured_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "temperature": 1.0,
            "max_completion_tokens": 64,
            "response_format": { "type": "json_schema" }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_answer(r#"{"data":["a","b","c"]}"#)))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::OpenAi, "gpt-4o-mini")).unwrap();
    let prompt = PromptBuilder::new()
        .system("s")
        .user("three letters")
        .temperature(0.5)
        .max_output_tokens(64)
        .output_shape(OutputShape::Row)
        .build();

    let cell = client
        .send_to_cell(prompt, ProviderId::OpenAi, &CancellationToken::new())
        .await;
    assert_eq!(
        cell,
        CellOutput::Grid(vec![vec!["a".to_string(), "b".to_string(), "c".to_string()]])
    );
}

#[tokio::test]
async fn test_echoed_temperature_is_mapped_back() {
    let server = MockServer::start().await;
    let mut answer = openai_answer("ok");
    answer["choices"][0]["message"]["temperature"] = json!(1.0);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "temperature": 1.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(answer))
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::OpenAi, "gpt-4o-mini")).unwrap();
    let prompt = PromptBuilder::new().system("s").user("x").temperature(0.5).build();
    let result = client
        .send(prompt, ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap();

    let temperature = result.options.temperature.unwrap();
    assert!((temperature - 0.5).abs() < 1e-6);
}

#[tokio::test]
async fn test_anthropic_wire_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "sk-test"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({
            "model": "claude-sonnet-4-5",
            "system": "You are a spreadsheet assistant.",
            "max_tokens": 4096,
            "messages": [{ "role": "user" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": "4" }],
            "stop_reason": "end_turn",
            "usage": { "input_tokens": 20, "output_tokens": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::Anthropic, "claude-sonnet-4-5")).unwrap();
    let result = client
        .send(prompt(), ProviderId::Anthropic, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.last_assistant_text(), Some("4"));
    assert_eq!(result.messages.len(), 3);
}

#[tokio::test]
async fn test_ollama_wire_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "details": {} })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({
            "model": "llama3.2",
            "stream": false,
            "options": { "num_predict": 32 }
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama3.2",
            "message": { "role": "assistant", "content": "4" },
            "done": true,
            "prompt_eval_count": 10,
            "eval_count": 1
        })))
        .expect(2)
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::Ollama, "llama3.2")).unwrap();
    let cancel = CancellationToken::new();
    for question in ["2+2", "1+3"] {
        let prompt = PromptBuilder::new()
            .system("s")
            .user(question)
            .max_output_tokens(32)
            .build();
        let result = client.send(prompt, ProviderId::Ollama, &cancel).await.unwrap();
        assert_eq!(result.last_assistant_text(), Some("4"));
    }
}

#[tokio::test]
async fn test_ollama_pull_does_not_block_other_models() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .and(body_partial_json(json!({ "model": "ready" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "details": {} })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/show"))
        .and(body_partial_json(json!({ "model": "slow" })))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "model 'slow' not found" })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/pull"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "status": "success" }))
                .set_delay(Duration::from_secs(3)),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": { "role": "assistant", "content": "4" },
            "done": true
        })))
        .mount(&server)
        .await;

    let client = Client::from_config(&config(&server, ProviderId::Ollama, "ready")).unwrap();
    let cancel = CancellationToken::new();
    let ask = |model: &str| PromptBuilder::new().system("s").user("2+2").model(model).build();

    let slow = client.send(ask("slow"), ProviderId::Ollama, &cancel);
    let ready = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let started = Instant::now();
        let result = client.send(ask("ready"), ProviderId::Ollama, &cancel).await;
        (result, started.elapsed())
    };
    let (slow, (ready, elapsed)) = tokio::join!(slow, ready);

    assert_eq!(slow.unwrap().last_assistant_text(), Some("4"));
    assert_eq!(ready.unwrap().last_assistant_text(), Some("4"));
    assert!(elapsed < Duration::from_secs(1), "ready model waited {:?}", elapsed);
}

#[tokio::test]
async fn test_cache_issues_one_network_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_answer("4")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, ProviderId::OpenAi, "gpt-4o-mini");
    config.cache.enabled = true;
    let client = Client::from_config(&config).unwrap();
    let cancel = CancellationToken::new();

    let first = client.send(prompt(), ProviderId::OpenAi, &cancel).await.unwrap();
    let second = client.send(prompt(), ProviderId::OpenAi, &cancel).await.unwrap();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_tool_round_trip_over_http() {
    init_tracing();
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("notes.txt"), "budget: 1200").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call()))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "messages": [{}, {}, {}, { "role": "tool", "tool_call_id": "call_1" }]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_answer("1200")))
        .expect(1)
        .mount(&server)
        .await;

    let mut config = config(&server, ProviderId::OpenAi, "gpt-4o-mini");
    config.cache.enabled = true;
    config.tools.file_reader = true;
    config.tools.file_root = Some(root.path().to_path_buf());
    let client = Client::from_config(&config).unwrap();

    let result = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result.last_assistant_text(), Some("1200"));
    assert!(result.has_tool_messages());
    assert!(client.cache().is_empty());

    let first: Value = server.received_requests().await.unwrap()[0].body_json().unwrap();
    assert_eq!(first["tools"][0]["function"]["name"], "read_file");
}

#[tokio::test]
async fn test_tool_loop_terminates() {
    let root = tempfile::tempdir().unwrap();
    std::fs::write(root.path().join("notes.txt"), "again").unwrap();

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(openai_tool_call()))
        .mount(&server)
        .await;

    let mut config = config(&server, ProviderId::OpenAi, "gpt-4o-mini");
    config.tools.file_reader = true;
    config.tools.file_root = Some(root.path().to_path_buf());
    config.tools.max_tool_depth = 2;
    let client = Client::from_config(&config).unwrap();

    let err = client
        .send(prompt(), ProviderId::OpenAi, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ToolLoopExceeded { max_depth: 2 }));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
