//! Property-based tests for delta compaction.

use proptest::prelude::*;
use relay_core::Event;
use relay_store::compact_events;
use serde_json::{Value, json};

// ============================================================================
// Generators
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Kind {
    Text,
    Tool,
}

impl Kind {
    fn id_field(self) -> &'static str {
        match self {
            Kind::Text => "messageId",
            Kind::Tool => "toolCallId",
        }
    }

    fn types(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Kind::Text => ("TEXT_MESSAGE_START", "TEXT_MESSAGE_CONTENT", "TEXT_MESSAGE_END"),
            Kind::Tool => ("TOOL_CALL_START", "TOOL_CALL_ARGS", "TOOL_CALL_END"),
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Start(Kind, String),
    Delta(Kind, String, String),
    End(Kind, String),
    Other(String),
}

fn event(value: Value) -> Event {
    serde_json::from_value(value).unwrap()
}

fn to_event(op: &Op) -> Event {
    match op {
        Op::Start(kind, id) => event(json!({"type": kind.types().0, kind.id_field(): id})),
        Op::Delta(kind, id, delta) => {
            event(json!({"type": kind.types().1, kind.id_field(): id, "delta": delta}))
        }
        Op::End(kind, id) => event(json!({"type": kind.types().2, kind.id_field(): id})),
        Op::Other(kind) => event(json!({"type": kind, "threadId": "t", "runId": "r"})),
    }
}

fn arb_kind() -> impl Strategy<Value = Kind> {
    prop_oneof![Just(Kind::Text), Just(Kind::Tool)]
}

/// Small id alphabet so sequences collide and overlap often. The empty id
/// exercises the pass-through path.
fn arb_id() -> impl Strategy<Value = String> {
    prop_oneof![Just("a".to_string()), Just("b".to_string()), Just(String::new())]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_kind(), arb_id()).prop_map(|(k, id)| Op::Start(k, id)),
        (arb_kind(), arb_id(), "[a-z ]{0,4}").prop_map(|(k, id, d)| Op::Delta(k, id, d)),
        (arb_kind(), arb_id()).prop_map(|(k, id)| Op::End(k, id)),
        prop_oneof![
            Just("RUN_STARTED".to_string()),
            Just("STATE_DELTA".to_string()),
            Just("CUSTOM".to_string()),
            Just("RUN_FINISHED".to_string()),
        ]
        .prop_map(Op::Other),
    ]
}

/// A log in which every sequence is eventually closed.
fn arb_terminated_log() -> impl Strategy<Value = Vec<Event>> {
    prop::collection::vec(arb_op(), 0..40).prop_map(|ops| {
        let mut events: Vec<Event> = ops.iter().map(to_event).collect();
        for kind in [Kind::Text, Kind::Tool] {
            for id in ["a", "b"] {
                events.push(to_event(&Op::End(kind, id.to_string())));
            }
        }
        events
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Compacting an already compacted log yields the same log.
    #[test]
    fn prop_compaction_is_idempotent(log in arb_terminated_log()) {
        let once = compact_events(&log);
        let twice = compact_events(&once);
        prop_assert_eq!(twice, once);
    }

    /// A sequence compacts to start, one merged fragment, end, then whatever
    /// arrived while it was open.
    #[test]
    fn prop_sequence_order_is_preserved(
        kind in arb_kind(),
        fragments in prop::collection::vec("[A-Za-z0-9 {}:\"]{0,6}", 1..12),
        others in prop::collection::vec(prop_oneof![Just("CUSTOM"), Just("STATE_DELTA")], 0..4),
    ) {
        let id = "seq".to_string();
        let mut log = vec![to_event(&Op::Start(kind, id.clone()))];
        for (i, fragment) in fragments.iter().enumerate() {
            log.push(to_event(&Op::Delta(kind, id.clone(), fragment.clone())));
            if let Some(other) = others.get(i) {
                log.push(to_event(&Op::Other(other.to_string())));
            }
        }
        log.push(to_event(&Op::End(kind, id.clone())));

        let compacted = compact_events(&log);
        let expected_others = others.len().min(fragments.len());
        prop_assert_eq!(compacted.len(), 3 + expected_others);

        prop_assert_eq!(&compacted[0], &log[0]);
        let merged = fragments.concat();
        let expected = match kind {
            Kind::Text => Event::text_message_content(id.clone(), merged),
            Kind::Tool => Event::tool_call_args(id.clone(), merged),
        };
        prop_assert_eq!(&compacted[1], &expected);
        prop_assert_eq!(&compacted[2], log.last().unwrap());
        for (event, other) in compacted[3..].iter().zip(&others) {
            prop_assert_eq!(event.event_type(), *other);
        }
    }

    /// Events outside any sequence are never dropped or reordered.
    #[test]
    fn prop_plain_events_pass_through(
        kinds in prop::collection::vec(prop_oneof![Just("RUN_STARTED"), Just("CUSTOM"), Just("RAW")], 0..20)
    ) {
        let log: Vec<Event> = kinds.iter().map(|k| to_event(&Op::Other(k.to_string()))).collect();
        prop_assert_eq!(compact_events(&log), log);
    }
}

#[test]
fn single_unterminated_sequence_is_stable_under_recompaction() {
    let log = vec![
        to_event(&Op::Other("RUN_STARTED".into())),
        to_event(&Op::Start(Kind::Text, "m".into())),
        to_event(&Op::Delta(Kind::Text, "m".into(), "half".into())),
        to_event(&Op::Other("CUSTOM".into())),
        to_event(&Op::Delta(Kind::Text, "m".into(), " done".into())),
    ];

    let once = compact_events(&log);
    assert_eq!(once.len(), 4);
    assert_eq!(once[2], Event::text_message_content("m", "half done"));
    assert_eq!(once[3].event_type(), "CUSTOM");
    assert_eq!(compact_events(&once), once);
}
