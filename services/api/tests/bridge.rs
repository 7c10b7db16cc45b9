mod common;

use base64::{Engine, engine::general_purpose::STANDARD};
use common::{MockUpstream, TestApp, next_frame, quiet_timings, send_json, test_config};
use futures_util::SinkExt;
use serde_json::{Value, json};
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;

async fn connected_pair(query: &str) -> (TestApp, MockUpstream, common::ClientSocket) {
    let upstream = MockUpstream::spawn().await;
    let app = TestApp::spawn(test_config(&upstream.url, Some("sk-test")), quiet_timings()).await;
    let client = app.connect_speech(query).await;
    app.wait_for_connections(1).await;
    (app, upstream, client)
}

fn appended_bytes(event: &Value) -> usize {
    let audio = event["audio"].as_str().unwrap();
    STANDARD.decode(audio).unwrap().len()
}

#[tokio::test]
async fn test_audio_over_threshold_is_sent_as_one_chunk() {
    let (_app, mut upstream, mut client) = connected_pair("").await;

    client
        .send(Message::Binary(vec![7u8; 5000].into()))
        .await
        .unwrap();

    let append = upstream.expect("input_audio_buffer.append").await;
    assert_eq!(appended_bytes(&append), 5000);

    let rest = upstream.drain_for(Duration::from_millis(200)).await;
    assert!(rest.iter().all(|e| e["type"] != "input_audio_buffer.append"));
}

#[tokio::test]
async fn test_small_frames_are_held_until_threshold() {
    let (_app, mut upstream, mut client) = connected_pair("").await;

    for _ in 0..3 {
        client
            .send(Message::Binary(vec![1u8; 1000].into()))
            .await
            .unwrap();
    }
    let early = upstream.drain_for(Duration::from_millis(150)).await;
    assert!(early.is_empty());

    client
        .send(Message::Binary(vec![1u8; 2000].into()))
        .await
        .unwrap();
    let append = upstream.expect("input_audio_buffer.append").await;
    assert_eq!(appended_bytes(&append), 5000);
}

#[tokio::test]
async fn test_commit_flushes_then_requests_one_response() {
    let (_app, mut upstream, mut client) = connected_pair("").await;

    client
        .send(Message::Binary(vec![2u8; 1000].into()))
        .await
        .unwrap();
    send_json(&mut client, json!({"type": "commit_audio"})).await;

    let append = upstream.expect("input_audio_buffer.append").await;
    assert_eq!(appended_bytes(&append), 1000);
    upstream.expect("input_audio_buffer.commit").await;
    upstream.expect("response.create").await;

    send_json(&mut client, json!({"type": "commit_audio"})).await;
    let rest = upstream.drain_for(Duration::from_millis(200)).await;
    assert!(rest.iter().all(|e| e["type"] != "response.create"));
}

#[tokio::test]
async fn test_session_created_triggers_configuration() {
    let (_app, mut upstream, _client) = connected_pair("?voice=shimmer&temperature=1.1").await;

    upstream.send_event(json!({"type": "session.created", "session": {"id": "sess_1"}}));

    let update = upstream.expect("session.update").await;
    assert_eq!(update["session"]["voice"], "shimmer");
    assert_eq!(update["session"]["temperature"], 1.1);
    assert_eq!(update["session"]["input_audio_format"], "pcm16");
}

#[tokio::test]
async fn test_configuration_fallback_without_session_created() {
    let mut upstream = MockUpstream::spawn().await;
    let timings = coach_api::state::SessionTimings {
        config_fallback: Duration::from_millis(100),
        ..quiet_timings()
    };
    let app = TestApp::spawn(test_config(&upstream.url, Some("sk-test")), timings).await;
    let _client = app.connect_speech("").await;

    let update = upstream.expect("session.update").await;
    assert_eq!(update["session"]["voice"], "alloy");
}

#[tokio::test]
async fn test_audio_delta_is_relayed_as_binary() {
    let (_app, upstream, mut client) = connected_pair("").await;

    upstream.send_event(json!({
        "type": "response.audio.delta",
        "delta": STANDARD.encode([1u8, 2, 3, 4]),
    }));

    match next_frame(&mut client, common::WAIT).await {
        Some(Message::Binary(data)) => assert_eq!(&data[..], &[1, 2, 3, 4]),
        other => panic!("expected binary audio, got {other:?}"),
    }
}

#[tokio::test]
async fn test_get_feedback_is_rate_limited() {
    let (_app, upstream, mut client) = connected_pair("").await;

    upstream.send_event(json!({
        "type": "response.audio_transcript.done",
        "transcript": "You stayed calm and listened. Rating: 7/10",
    }));
    tokio::time::sleep(Duration::from_millis(150)).await;

    send_json(&mut client, json!({"type": "get_feedback"})).await;
    send_json(&mut client, json!({"type": "get_feedback"})).await;

    let Some(Message::Text(text)) = next_frame(&mut client, common::WAIT).await else {
        panic!("expected a feedback frame");
    };
    let feedback: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(feedback["type"], "training_feedback");
    assert_eq!(feedback["grade"], 7);
    assert!(feedback["feedback"].as_str().unwrap().contains("stayed calm"));

    assert!(next_frame(&mut client, Duration::from_millis(300)).await.is_none());
}

#[tokio::test]
async fn test_malformed_client_json_keeps_connection_open() {
    let (_app, _upstream, mut client) = connected_pair("").await;

    client
        .send(Message::Text("{not json".into()))
        .await
        .unwrap();
    send_json(&mut client, json!({"type": "dance"})).await;
    send_json(&mut client, json!({"type": "get_feedback"})).await;

    let Some(Message::Text(text)) = next_frame(&mut client, common::WAIT).await else {
        panic!("expected a feedback frame");
    };
    let feedback: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(feedback["grade"], Value::Null);
}

#[tokio::test]
async fn test_connect_failure_closes_with_internal_error() {
    let config = test_config("ws://127.0.0.1:9/v1/realtime", None);
    let app = TestApp::spawn(config, quiet_timings()).await;
    let mut client = app.connect_speech("").await;

    match next_frame(&mut client, common::WAIT).await {
        Some(Message::Close(Some(frame))) => {
            assert_eq!(u16::from(frame.code), 1011);
            assert_eq!(frame.reason.as_str(), "Failed to connect to OpenAI");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(app.state.registry.len().await, 0);
}

#[tokio::test]
async fn test_upstream_close_sends_error_then_closes() {
    let (app, upstream, mut client) = connected_pair("").await;

    upstream.outgoing.send(Message::Close(None)).unwrap();

    let Some(Message::Text(text)) = next_frame(&mut client, common::WAIT).await else {
        panic!("expected an error frame");
    };
    let error: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(error["type"], "error");
    assert_eq!(error["error"], "Internal server error");

    assert!(matches!(
        next_frame(&mut client, common::WAIT).await,
        Some(Message::Close(_)) | None
    ));
    app.wait_for_connections(0).await;
}

#[tokio::test]
async fn test_client_disconnect_tears_down_registry_entry() {
    let (app, mut upstream, mut client) = connected_pair("").await;
    assert_eq!(app.state.registry.len().await, 1);

    client.close(None).await.unwrap();

    app.wait_for_connections(0).await;
    // Upstream socket is closed by the teardown, so the mock stops forwarding.
    let rest = upstream.drain_for(Duration::from_millis(200)).await;
    assert!(rest.iter().all(|e| e["type"] != "response.create"));
}

#[tokio::test]
async fn test_queued_audio_is_delivered_before_upstream_close() {
    let (_app, upstream, mut client) = connected_pair("").await;

    for chunk in [[1u8, 1], [2, 2], [3, 3]] {
        upstream.send_event(json!({
            "type": "response.audio.delta",
            "delta": STANDARD.encode(chunk),
        }));
    }
    upstream.outgoing.send(Message::Close(None)).unwrap();

    for expected in [[1u8, 1], [2, 2], [3, 3]] {
        match next_frame(&mut client, common::WAIT).await {
            Some(Message::Binary(data)) => assert_eq!(&data[..], &expected),
            other => panic!("expected binary audio, got {other:?}"),
        }
    }
    let Some(Message::Text(text)) = next_frame(&mut client, common::WAIT).await else {
        panic!("expected an error frame after the audio");
    };
    let error: Value = serde_json::from_str(text.as_str()).unwrap();
    assert_eq!(error["type"], "error");
}
