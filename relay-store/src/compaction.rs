//! Delta compaction for replaying finished runs.
//!
//! A streamed text message or tool call arrives as a start event, any number
//! of delta events and an end event. Compaction folds the deltas of each
//! sequence into a single delta event so a client joining after the run has
//! finished receives a short, equivalent history.

use relay_core::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequenceKind {
    TextMessage,
    ToolCall,
}

enum Step<'a> {
    Start(SequenceKind, &'a str),
    Delta(SequenceKind, &'a str, &'a str),
    End(SequenceKind, &'a str),
    /// A streaming event without a usable id.
    PassThrough,
    /// Any event outside the streaming kinds.
    Other,
}

fn id_of(id: &Option<String>) -> Option<&str> {
    id.as_deref().filter(|id| !id.is_empty())
}

fn classify(event: &Event) -> Step<'_> {
    use SequenceKind::{TextMessage, ToolCall};

    let step = match event {
        Event::TextMessageStart(e) => id_of(&e.message_id).map(|id| Step::Start(TextMessage, id)),
        Event::TextMessageContent(e) => id_of(&e.message_id)
            .map(|id| Step::Delta(TextMessage, id, e.delta.as_deref().unwrap_or_default())),
        Event::TextMessageEnd(e) => id_of(&e.message_id).map(|id| Step::End(TextMessage, id)),
        Event::ToolCallStart(e) => id_of(&e.tool_call_id).map(|id| Step::Start(ToolCall, id)),
        Event::ToolCallArgs(e) => id_of(&e.tool_call_id)
            .map(|id| Step::Delta(ToolCall, id, e.delta.as_deref().unwrap_or_default())),
        Event::ToolCallEnd(e) => id_of(&e.tool_call_id).map(|id| Step::End(ToolCall, id)),
        _ => return Step::Other,
    };
    step.unwrap_or(Step::PassThrough)
}

struct PendingSequence {
    kind: SequenceKind,
    id: String,
    start: Event,
    deltas: Vec<String>,
    others: Vec<Event>,
}

impl PendingSequence {
    fn new(kind: SequenceKind, id: &str, start: Event) -> Self {
        Self { kind, id: id.to_string(), start, deltas: Vec::new(), others: Vec::new() }
    }

    fn matches(&self, kind: SequenceKind, id: &str) -> bool {
        self.kind == kind && self.id == id
    }

    /// Emit start, merged delta (if any fragment arrived), end, then buffered
    /// events.
    fn flush_into(self, out: &mut Vec<Event>, end: Option<Event>) {
        out.push(self.start);
        if !self.deltas.is_empty() {
            let merged = self.deltas.concat();
            out.push(match self.kind {
                SequenceKind::TextMessage => Event::text_message_content(self.id, merged),
                SequenceKind::ToolCall => Event::tool_call_args(self.id, merged),
            });
        }
        out.extend(end);
        out.extend(self.others);
    }
}

/// Merge streamed deltas of every text message and tool call sequence.
///
/// Events outside the streaming kinds that arrive while sequences are open
/// are buffered into *every* open sequence and replayed after each of them
/// closes, so an event can appear once per sequence it overlapped. Sequences
/// still open at the end of input are flushed text messages first, then tool
/// calls, each group in the order it opened.
///
/// Compacting the output again returns it unchanged, unless two or more
/// sequences were left open at the end of input with events buffered into
/// both of them.
pub fn compact_events(events: &[Event]) -> Vec<Event> {
    let mut out = Vec::with_capacity(events.len() / 2 + 1);
    let mut open: Vec<PendingSequence> = Vec::new();

    for event in events {
        match classify(event) {
            Step::Start(kind, id) => {
                // A repeated start replaces the captured one; fragments keep accumulating.
                match open.iter_mut().find(|s| s.matches(kind, id)) {
                    Some(sequence) => sequence.start = event.clone(),
                    None => open.push(PendingSequence::new(kind, id, event.clone())),
                }
            }
            Step::Delta(kind, id, delta) => {
                match open.iter_mut().find(|s| s.matches(kind, id)) {
                    Some(sequence) => sequence.deltas.push(delta.to_string()),
                    None => out.push(event.clone()),
                }
            }
            Step::End(kind, id) => match open.iter().position(|s| s.matches(kind, id)) {
                Some(pos) => open.remove(pos).flush_into(&mut out, Some(event.clone())),
                None => out.push(event.clone()),
            },
            Step::PassThrough => out.push(event.clone()),
            Step::Other if open.is_empty() => out.push(event.clone()),
            Step::Other => {
                for sequence in &mut open {
                    sequence.others.push(event.clone());
                }
            }
        }
    }

    let (text, tools): (Vec<_>, Vec<_>) =
        open.into_iter().partition(|s| s.kind == SequenceKind::TextMessage);
    for sequence in text.into_iter().chain(tools) {
        sequence.flush_into(&mut out, None);
    }

    out
}
