//! Chunk reassembly and notification ordering across many chunkings.

use std::sync::Arc;

use chat_relay::llm::providers::scripted::ScriptedProvider;
use chat_relay::transport::ChatMessage;
use chat_relay::{ChatClient, ChatRequest, CompletionPipeline};
use futures_util::StreamExt;

use crate::helpers::{RecordingNotifier, start_relay, test_settings};

const TEXT: &str = "Grüße, 世界! 💬 ok";

/// Every way of cutting `text` at char boundaries into at most three pieces.
fn chunkings(text: &str) -> Vec<Vec<String>> {
    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(i, _)| i)
        .chain(std::iter::once(text.len()))
        .collect();

    let mut out = vec![Vec::new(), vec![text.to_owned()]];
    for &i in &bounds {
        for &j in bounds.iter().filter(|&&j| j >= i) {
            out.push(vec![
                text[..i].to_owned(),
                text[i..j].to_owned(),
                text[j..].to_owned(),
            ]);
        }
    }
    out
}

#[tokio::test]
async fn pipeline_output_is_exact_concatenation() {
    for chunks in chunkings(TEXT) {
        let expected = chunks.concat();
        let notifier = RecordingNotifier::new();
        let pipeline = CompletionPipeline::new(
            Arc::new(ScriptedProvider::new(chunks.clone())),
            Arc::clone(&notifier) as Arc<dyn chat_relay::Notifier>,
            test_settings().with_notify_on_empty_response(true),
        );

        let stream = pipeline
            .start(ChatRequest::new(vec![ChatMessage::user("q")]))
            .await
            .unwrap();
        let bytes: Vec<u8> = stream
            .map(|chunk| chunk.unwrap().to_vec())
            .collect::<Vec<_>>()
            .await
            .concat();
        assert_eq!(String::from_utf8(bytes).unwrap(), expected, "chunks: {chunks:?}");

        notifier.wait_for_delivery().await;
        let events = notifier.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].assistant_message.content, expected);
    }
}

#[tokio::test]
async fn client_reassembles_reply_over_http() {
    for chunks in [
        vec![],
        vec![TEXT.to_owned()],
        TEXT.chars().map(String::from).collect(),
    ] {
        let expected = chunks.concat();
        let server = start_relay(ScriptedProvider::new(chunks), RecordingNotifier::new()).await;

        let mut client = ChatClient::new(server.chat_url());
        assert_eq!(client.send("q").await.unwrap().content, expected);
    }
}

#[tokio::test]
async fn each_completed_exchange_notifies_exactly_once() {
    let notifier = RecordingNotifier::new();
    let server = start_relay(ScriptedProvider::new(["x", "y"]), Arc::clone(&notifier)).await;

    let mut client = ChatClient::new(server.chat_url());
    for turn in 0..3 {
        client.send(&format!("turn {turn}")).await.unwrap();
        notifier.wait_for_delivery().await;
    }

    let events = notifier.events();
    assert_eq!(events.len(), 3);
    for (turn, event) in events.iter().enumerate() {
        assert_eq!(event.user_message.content, format!("turn {turn}"));
        assert_eq!(event.assistant_message.content, "xy");
    }
    let mut ids: Vec<_> = events.iter().map(|e| e.exchange_id.clone()).collect();
    ids.dedup();
    assert_eq!(ids.len(), 3);
    assert_eq!(client.transcript().len(), 6);
}
