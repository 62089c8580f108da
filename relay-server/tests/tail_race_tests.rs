//! A tail opened while a run is publishing must see every event exactly once,
//! whether it arrives through history or through the live subscription.

use futures::StreamExt;
use proptest::prelude::*;
use relay_core::Event;
use relay_server::{Relay, ServerConfig};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::time::Duration;

fn seq_event(seq: u64) -> Event {
    Event::raw("t", "r", json!({"seq": seq}))
}

/// Sequence numbers of every `data:` frame in the collected output.
fn frame_seqs(output: &str) -> Vec<u64> {
    output
        .split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .filter_map(|payload| serde_json::from_str::<Value>(payload).ok())
        .filter_map(|value| value.pointer("/event/seq").and_then(Value::as_u64))
        .collect()
}

async fn tail_sees_each_event_once(before: u64, during: u64, delay_us: u64) {
    let dir = tempfile::tempdir().unwrap();
    let relay = Relay::new(ServerConfig::new(dir.path())).unwrap();

    for seq in 0..before {
        relay.publish_event("race", &seq_event(seq)).await;
    }

    let publisher = {
        let relay = relay.clone();
        tokio::spawn(async move {
            for seq in before..before + during {
                relay.publish_event("race", &seq_event(seq)).await;
                tokio::task::yield_now().await;
            }
        })
    };

    tokio::time::sleep(Duration::from_micros(delay_us)).await;
    let stream = relay.open_tail("race").await.unwrap();
    futures::pin_mut!(stream);
    publisher.await.unwrap();

    let total = (before + during) as usize;
    let mut output = String::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while frame_seqs(&output).len() < total {
        match tokio::time::timeout_at(deadline, stream.next()).await {
            Ok(Some(chunk)) => output.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap()),
            _ => break,
        }
    }

    let mut counts: HashMap<u64, usize> = HashMap::new();
    for seq in frame_seqs(&output) {
        *counts.entry(seq).or_default() += 1;
    }
    for seq in 0..before + during {
        assert_eq!(counts.get(&seq), Some(&1), "event {seq} delivered {:?} times", counts.get(&seq));
    }
    assert_eq!(counts.len(), total);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn concurrent_publish_and_tail_deliver_exactly_once(
        before in 0u64..20,
        during in 1u64..40,
        delay_us in 0u64..500,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(tail_sees_each_event_once(before, during, delay_us));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_tails_opened_mid_run_each_see_everything() {
    let dir = tempfile::tempdir().unwrap();
    let relay = Relay::new(ServerConfig::new(dir.path())).unwrap();

    let publisher = {
        let relay = relay.clone();
        tokio::spawn(async move {
            for seq in 0..50 {
                relay.publish_event("fan", &seq_event(seq)).await;
                tokio::task::yield_now().await;
            }
        })
    };

    let mut tails = Vec::new();
    for _ in 0..8 {
        tails.push(Box::pin(relay.open_tail("fan").await.unwrap()));
        tokio::task::yield_now().await;
    }
    publisher.await.unwrap();

    for mut tail in tails {
        let mut output = String::new();
        while frame_seqs(&output).len() < 50 {
            let chunk = tokio::time::timeout(Duration::from_secs(5), tail.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            output.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        assert_eq!(frame_seqs(&output), (0..50).collect::<Vec<_>>());
    }
}
