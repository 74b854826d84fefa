// Integration tests for the streaming protocol client
//
// The transport is replaced by an in-memory connector, so failover order,
// the handshake, and state reporting can be checked deterministically.

mod common;

use common::{params, wait_until, MockConnector};
use std::sync::Arc;
use std::time::Duration;
use voxlink::audio::AudioChunk;
use voxlink::protocol::{
    ClientSettings, Command, ConnectionState, ConnectionStatus, ServerMessage, StreamingClient,
};
use voxlink::TransportError;

const WAIT: Duration = Duration::from_secs(2);

fn endpoints(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn client_for(connector: &MockConnector) -> StreamingClient {
    let client = StreamingClient::new(Arc::new(connector.clone()), ClientSettings::default());
    connector.observe(client.status());
    client
}

fn connecting(endpoint: &str) -> ConnectionStatus {
    ConnectionStatus {
        state: ConnectionState::Connecting,
        endpoint: Some(endpoint.to_string()),
    }
}

#[tokio::test]
async fn test_failover_walks_candidates_in_order() {
    let connector = MockConnector::failing(&["ws://a", "ws://b"]);
    let client = client_for(&connector);

    let connected = client
        .connect(&endpoints(&["ws://a", "ws://b", "ws://c"]), params("rec-1"))
        .await
        .unwrap();

    assert_eq!(connected, "ws://c");
    assert_eq!(connector.attempted(), endpoints(&["ws://a", "ws://b", "ws://c"]));
    assert_eq!(
        *connector.observed.lock().unwrap(),
        vec![connecting("ws://a"), connecting("ws://b"), connecting("ws://c")]
    );
    assert_eq!(client.state(), ConnectionState::Connected);
    assert_eq!(
        client.status().borrow().endpoint.as_deref(),
        Some("ws://c")
    );
}

#[tokio::test]
async fn test_failover_announces_backup_servers() {
    let connector = MockConnector::failing(&["ws://a"]);
    let client = client_for(&connector);
    let mut messages = client.subscribe();

    client
        .connect(&endpoints(&["ws://a", "ws://b"]), params("rec-1"))
        .await
        .unwrap();

    match messages.try_recv().unwrap() {
        ServerMessage::Info(text) => assert!(text.contains("backup"), "{}", text),
        other => panic!("expected info, got {:?}", other),
    }
}

#[tokio::test]
async fn test_exhausted_candidates_end_in_error_with_message() {
    let connector = MockConnector::failing(&["ws://a", "ws://b"]);
    let client = client_for(&connector);
    let mut messages = client.subscribe();

    let result = client
        .connect(&endpoints(&["ws://a", "ws://b"]), params("rec-1"))
        .await;

    match result {
        Err(TransportError::Exhausted { attempted, .. }) => assert_eq!(attempted, 2),
        other => panic!("expected Exhausted, got {:?}", other),
    }
    assert_eq!(client.state(), ConnectionState::Error);
    assert_eq!(connector.attempted().len(), 2);

    let mut saw_error = false;
    while let Ok(message) = messages.try_recv() {
        if matches!(message, ServerMessage::Error(_)) {
            saw_error = true;
        }
    }
    assert!(saw_error, "exhaustion should surface an error message");
}

#[tokio::test]
async fn test_empty_candidate_list_is_an_error() {
    let connector = MockConnector::default();
    let client = client_for(&connector);

    let result = client.connect(&[], params("rec-1")).await;

    assert!(matches!(result, Err(TransportError::NoCandidates)));
    assert_eq!(client.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_reconnect_restarts_from_first_candidate() {
    let connector = MockConnector::failing(&["ws://a"]);
    let client = client_for(&connector);
    let list = endpoints(&["ws://a", "ws://b"]);

    client.connect(&list, params("rec-1")).await.unwrap();
    client.disconnect();
    client.connect(&list, params("rec-2")).await.unwrap();

    assert_eq!(
        connector.attempted(),
        endpoints(&["ws://a", "ws://b", "ws://a", "ws://b"])
    );
}

#[tokio::test]
async fn test_handshake_is_first_frame() {
    let connector = MockConnector::default();
    let client = client_for(&connector);

    client
        .connect(&endpoints(&["ws://a"]), params("rec-7"))
        .await
        .unwrap();
    client.send_audio_chunk(&AudioChunk::new(0, &[1, 2, 3, 4], 16000, 2, 0));

    assert!(wait_until(WAIT, || connector.sent_frames().len() == 2).await);
    let frames = connector.sent_frames();

    let config = &frames[0];
    assert_eq!(config["type"], "config");
    assert_eq!(config["recording_id"], "rec-7");
    assert_eq!(config["user_id"], "user-1");
    assert_eq!(config["source_language"], "cs");
    assert_eq!(config["target_language"], "en");
    assert_eq!(config["llm_provider"], "ollama");
    assert_eq!(config["transcription_provider"], "local");
    assert!(config["timestamp"].is_i64());

    assert_eq!(frames[1]["type"], "audio");
}

#[tokio::test]
async fn test_audio_is_dropped_unless_connected() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    let chunk = AudioChunk::new(0, &[0; 8], 16000, 2, 0);

    assert!(!client.send_audio_chunk(&chunk));
    assert!(!client.send_command(Command::Pause));
    assert!(connector.sent_frames().is_empty());
}

#[tokio::test]
async fn test_audio_frame_carries_base64_pcm_and_sequence() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    client
        .connect(&endpoints(&["ws://a"]), params("rec-1"))
        .await
        .unwrap();

    for seq in 0..5u64 {
        let chunk = AudioChunk::new(seq, &[seq as i16, -1], 16000, 2, seq * 100);
        assert!(client.send_audio_chunk(&chunk));
    }

    assert!(wait_until(WAIT, || connector.sent_of_type("audio").len() == 5).await);
    let audio = connector.sent_of_type("audio");
    let sequences: Vec<u64> = audio.iter().map(|f| f["sequence"].as_u64().unwrap()).collect();
    assert_eq!(sequences, vec![0, 1, 2, 3, 4]);

    use base64::Engine;
    let pcm = base64::engine::general_purpose::STANDARD
        .decode(audio[3]["data"].as_str().unwrap())
        .unwrap();
    assert_eq!(pcm, vec![3, 0, 0xFF, 0xFF]);
    assert_eq!(audio[3]["recording_id"], "rec-1");
}

#[tokio::test]
async fn test_commands_merge_session_identity() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    client
        .connect(&endpoints(&["ws://a"]), params("rec-3"))
        .await
        .unwrap();

    client.send_command(Command::LanguageSwap {
        source_language: "en".into(),
        target_language: "cs".into(),
        segment_id: "rec-3_seg000".into(),
    });
    client.request_tts("good morning", "cs");
    client.request_tts("   ", "cs");
    client.send_command(Command::EndRecording {
        name: "Recording 2026-01-01 10:00".into(),
    });

    assert!(wait_until(WAIT, || connector.sent_frames().len() == 4).await);
    let frames = connector.sent_frames();

    assert_eq!(frames[1]["type"], "language_swap");
    assert_eq!(frames[1]["recording_id"], "rec-3");
    assert_eq!(frames[1]["user_id"], "user-1");
    assert_eq!(frames[1]["segment_id"], "rec-3_seg000");

    assert_eq!(frames[2]["type"], "tts");
    assert_eq!(frames[2]["text"], "good morning");
    assert_eq!(frames[2]["voice"], "cs");

    assert_eq!(frames[3]["type"], "end_recording");
    assert_eq!(frames[3]["name"], "Recording 2026-01-01 10:00");
}

#[tokio::test]
async fn test_server_messages_are_forwarded_and_junk_dropped() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    let mut messages = client.subscribe();
    client
        .connect(&endpoints(&["ws://a"]), params("rec-1"))
        .await
        .unwrap();

    connector.server_says("{not json");
    connector.server_says(r#"{"type":"heartbeat","data":1}"#);
    connector.server_says(r#"{"type":"transcription","data":"ahoj"}"#);

    let message = tokio::time::timeout(WAIT, messages.recv()).await.unwrap().unwrap();
    assert_eq!(message, ServerMessage::Transcription("ahoj".into()));
    assert_eq!(client.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn test_failure_while_connected_is_error_without_failover() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    client
        .connect(&endpoints(&["ws://a", "ws://b"]), params("rec-1"))
        .await
        .unwrap();

    connector.break_link();

    assert!(wait_until(WAIT, || client.state() == ConnectionState::Error).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(connector.attempted(), endpoints(&["ws://a"]));
}

#[tokio::test]
async fn test_server_close_is_clean_disconnect() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    client
        .connect(&endpoints(&["ws://a"]), params("rec-1"))
        .await
        .unwrap();

    connector.hang_up();

    assert!(wait_until(WAIT, || client.state() == ConnectionState::Disconnected).await);
}

#[tokio::test]
async fn test_disconnect_is_idempotent_and_flushes_queue() {
    let connector = MockConnector::default();
    let client = client_for(&connector);
    client
        .connect(&endpoints(&["ws://a"]), params("rec-1"))
        .await
        .unwrap();

    client.send_command(Command::EndRecording { name: "x".into() });
    client.disconnect();
    client.disconnect();

    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(wait_until(WAIT, || connector.closed.load(std::sync::atomic::Ordering::SeqCst)).await);
    assert_eq!(connector.sent_of_type("end_recording").len(), 1);
}
