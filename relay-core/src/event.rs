//! AG-UI event records as they flow through the relay.
//!
//! The kinds the relay interprets (run lifecycle, text message and tool call
//! streaming sequences) are strongly typed. Everything else, including kinds
//! the upstream protocol may add later, is carried as an open JSON object in
//! [`Event::Other`]. Every typed variant keeps the fields it does not model in
//! [`EventEnvelope::extra`], so a parse/serialize cycle never loses data.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const RUN_STARTED: &str = "RUN_STARTED";
pub const RUN_FINISHED: &str = "RUN_FINISHED";
pub const RUN_ERROR: &str = "RUN_ERROR";
pub const TEXT_MESSAGE_START: &str = "TEXT_MESSAGE_START";
pub const TEXT_MESSAGE_CONTENT: &str = "TEXT_MESSAGE_CONTENT";
pub const TEXT_MESSAGE_END: &str = "TEXT_MESSAGE_END";
pub const TOOL_CALL_START: &str = "TOOL_CALL_START";
pub const TOOL_CALL_ARGS: &str = "TOOL_CALL_ARGS";
pub const TOOL_CALL_END: &str = "TOOL_CALL_END";
pub const CUSTOM: &str = "CUSTOM";
pub const RAW: &str = "RAW";
pub const META: &str = "META";

const TYPE_FIELD: &str = "type";
const THREAD_ID_FIELD: &str = "threadId";
const RUN_ID_FIELD: &str = "runId";
const TIMESTAMP_FIELD: &str = "timestamp";

/// Fields shared by every typed event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    /// Epoch milliseconds per protocol; older logs may hold RFC 3339 strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunErrorEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageStartEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageContentEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessageEndEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallStartEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallArgsEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delta: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallEndEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(flatten)]
    pub envelope: EventEnvelope,
}

/// A single AG-UI event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RunStarted(EventEnvelope),
    RunFinished(EventEnvelope),
    RunError(RunErrorEvent),
    TextMessageStart(TextMessageStartEvent),
    TextMessageContent(TextMessageContentEvent),
    TextMessageEnd(TextMessageEndEvent),
    ToolCallStart(ToolCallStartEvent),
    ToolCallArgs(ToolCallArgsEvent),
    ToolCallEnd(ToolCallEndEvent),
    /// Any other record, kept verbatim including its `type` field (if any).
    Other(Map<String, Value>),
}

impl Event {
    /// Parse one JSON object into an event.
    pub fn parse(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Build an event from a decoded JSON object.
    ///
    /// A known kind whose fields do not fit the typed shape degrades to
    /// [`Event::Other`] instead of failing.
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let Some(kind) = fields.get(TYPE_FIELD).and_then(Value::as_str) else {
            return Event::Other(fields);
        };

        let typed = match kind {
            RUN_STARTED => typed_body(&fields).map(Event::RunStarted),
            RUN_FINISHED => typed_body(&fields).map(Event::RunFinished),
            RUN_ERROR => typed_body(&fields).map(Event::RunError),
            TEXT_MESSAGE_START => typed_body(&fields).map(Event::TextMessageStart),
            TEXT_MESSAGE_CONTENT => typed_body(&fields).map(Event::TextMessageContent),
            TEXT_MESSAGE_END => typed_body(&fields).map(Event::TextMessageEnd),
            TOOL_CALL_START => typed_body(&fields).map(Event::ToolCallStart),
            TOOL_CALL_ARGS => typed_body(&fields).map(Event::ToolCallArgs),
            TOOL_CALL_END => typed_body(&fields).map(Event::ToolCallEnd),
            _ => None,
        };

        typed.unwrap_or(Event::Other(fields))
    }

    /// Flatten the event back into the JSON object that goes on the wire.
    pub fn to_fields(&self) -> serde_json::Result<Map<String, Value>> {
        let (kind, body) = match self {
            Event::RunStarted(e) => (RUN_STARTED, serde_json::to_value(e)?),
            Event::RunFinished(e) => (RUN_FINISHED, serde_json::to_value(e)?),
            Event::RunError(e) => (RUN_ERROR, serde_json::to_value(e)?),
            Event::TextMessageStart(e) => (TEXT_MESSAGE_START, serde_json::to_value(e)?),
            Event::TextMessageContent(e) => (TEXT_MESSAGE_CONTENT, serde_json::to_value(e)?),
            Event::TextMessageEnd(e) => (TEXT_MESSAGE_END, serde_json::to_value(e)?),
            Event::ToolCallStart(e) => (TOOL_CALL_START, serde_json::to_value(e)?),
            Event::ToolCallArgs(e) => (TOOL_CALL_ARGS, serde_json::to_value(e)?),
            Event::ToolCallEnd(e) => (TOOL_CALL_END, serde_json::to_value(e)?),
            Event::Other(fields) => return Ok(fields.clone()),
        };

        let mut fields = match body {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        fields.insert(TYPE_FIELD.to_string(), Value::String(kind.to_string()));
        Ok(fields)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// The `type` discriminator, or an empty string when an untyped record
    /// has none.
    pub fn event_type(&self) -> &str {
        match self {
            Event::RunStarted(_) => RUN_STARTED,
            Event::RunFinished(_) => RUN_FINISHED,
            Event::RunError(_) => RUN_ERROR,
            Event::TextMessageStart(_) => TEXT_MESSAGE_START,
            Event::TextMessageContent(_) => TEXT_MESSAGE_CONTENT,
            Event::TextMessageEnd(_) => TEXT_MESSAGE_END,
            Event::ToolCallStart(_) => TOOL_CALL_START,
            Event::ToolCallArgs(_) => TOOL_CALL_ARGS,
            Event::ToolCallEnd(_) => TOOL_CALL_END,
            Event::Other(fields) => fields.get(TYPE_FIELD).and_then(Value::as_str).unwrap_or(""),
        }
    }

    pub fn is_run_finished(&self) -> bool {
        matches!(self, Event::RunFinished(_))
    }

    fn envelope(&self) -> Option<&EventEnvelope> {
        match self {
            Event::RunStarted(e) | Event::RunFinished(e) => Some(e),
            Event::RunError(e) => Some(&e.envelope),
            Event::TextMessageStart(e) => Some(&e.envelope),
            Event::TextMessageContent(e) => Some(&e.envelope),
            Event::TextMessageEnd(e) => Some(&e.envelope),
            Event::ToolCallStart(e) => Some(&e.envelope),
            Event::ToolCallArgs(e) => Some(&e.envelope),
            Event::ToolCallEnd(e) => Some(&e.envelope),
            Event::Other(_) => None,
        }
    }

    fn envelope_mut(&mut self) -> Option<&mut EventEnvelope> {
        match self {
            Event::RunStarted(e) | Event::RunFinished(e) => Some(e),
            Event::RunError(e) => Some(&mut e.envelope),
            Event::TextMessageStart(e) => Some(&mut e.envelope),
            Event::TextMessageContent(e) => Some(&mut e.envelope),
            Event::TextMessageEnd(e) => Some(&mut e.envelope),
            Event::ToolCallStart(e) => Some(&mut e.envelope),
            Event::ToolCallArgs(e) => Some(&mut e.envelope),
            Event::ToolCallEnd(e) => Some(&mut e.envelope),
            Event::Other(_) => None,
        }
    }

    pub fn thread_id(&self) -> Option<&str> {
        match self {
            Event::Other(fields) => fields.get(THREAD_ID_FIELD).and_then(Value::as_str),
            _ => self.envelope().and_then(|e| e.thread_id.as_deref()),
        }
    }

    pub fn run_id(&self) -> Option<&str> {
        match self {
            Event::Other(fields) => fields.get(RUN_ID_FIELD).and_then(Value::as_str),
            _ => self.envelope().and_then(|e| e.run_id.as_deref()),
        }
    }

    /// Backfill `threadId`/`runId` when they are absent, null or empty.
    pub fn ensure_ids(&mut self, thread_id: &str, run_id: &str) {
        if let Event::Other(fields) = self {
            for (key, value) in [(THREAD_ID_FIELD, thread_id), (RUN_ID_FIELD, run_id)] {
                if is_blank(fields.get(key)) {
                    fields.insert(key.to_string(), Value::String(value.to_string()));
                }
            }
            return;
        }

        if let Some(envelope) = self.envelope_mut() {
            if envelope.thread_id.as_deref().is_none_or(str::is_empty) {
                envelope.thread_id = Some(thread_id.to_string());
            }
            if envelope.run_id.as_deref().is_none_or(str::is_empty) {
                envelope.run_id = Some(run_id.to_string());
            }
        }
    }

    /// Overwrite `threadId` unconditionally.
    pub fn set_thread_id(&mut self, thread_id: &str) {
        match self {
            Event::Other(fields) => {
                fields.insert(THREAD_ID_FIELD.to_string(), Value::String(thread_id.to_string()));
            }
            _ => {
                if let Some(envelope) = self.envelope_mut() {
                    envelope.thread_id = Some(thread_id.to_string());
                }
            }
        }
    }

    pub fn timestamp(&self) -> Option<&Value> {
        match self {
            Event::Other(fields) => fields.get(TIMESTAMP_FIELD).filter(|v| !v.is_null()),
            _ => self.envelope().and_then(|e| e.timestamp.as_ref()),
        }
    }

    pub fn set_timestamp(&mut self, timestamp: Option<Value>) {
        match self {
            Event::Other(fields) => match timestamp {
                Some(value) => {
                    fields.insert(TIMESTAMP_FIELD.to_string(), value);
                }
                None => {
                    fields.remove(TIMESTAMP_FIELD);
                }
            },
            _ => {
                if let Some(envelope) = self.envelope_mut() {
                    envelope.timestamp = timestamp;
                }
            }
        }
    }

    pub fn run_started(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Event::RunStarted(EventEnvelope {
            thread_id: Some(thread_id.into()),
            run_id: Some(run_id.into()),
            ..Default::default()
        })
    }

    pub fn run_finished(thread_id: impl Into<String>, run_id: impl Into<String>) -> Self {
        Event::RunFinished(EventEnvelope {
            thread_id: Some(thread_id.into()),
            run_id: Some(run_id.into()),
            ..Default::default()
        })
    }

    pub fn run_error(
        thread_id: impl Into<String>,
        run_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::RunError(RunErrorEvent {
            message: Some(message.into()),
            code: None,
            envelope: EventEnvelope {
                thread_id: Some(thread_id.into()),
                run_id: Some(run_id.into()),
                ..Default::default()
            },
        })
    }

    /// A `RAW` escape-hatch event wrapping a platform-specific payload.
    pub fn raw(thread_id: impl Into<String>, run_id: impl Into<String>, payload: Value) -> Self {
        let mut fields = Map::new();
        fields.insert(TYPE_FIELD.to_string(), Value::String(RAW.to_string()));
        fields.insert(THREAD_ID_FIELD.to_string(), Value::String(thread_id.into()));
        fields.insert(RUN_ID_FIELD.to_string(), Value::String(run_id.into()));
        fields.insert("event".to_string(), payload);
        Event::Other(fields)
    }

    /// A bare content event carrying only its message id and delta.
    pub fn text_message_content(message_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Event::TextMessageContent(TextMessageContentEvent {
            message_id: Some(message_id.into()),
            delta: Some(delta.into()),
            envelope: EventEnvelope::default(),
        })
    }

    /// A bare args event carrying only its tool call id and delta.
    pub fn tool_call_args(tool_call_id: impl Into<String>, delta: impl Into<String>) -> Self {
        Event::ToolCallArgs(ToolCallArgsEvent {
            tool_call_id: Some(tool_call_id.into()),
            delta: Some(delta.into()),
            envelope: EventEnvelope::default(),
        })
    }
}

fn typed_body<T: serde::de::DeserializeOwned>(fields: &Map<String, Value>) -> Option<T> {
    let mut body = fields.clone();
    body.remove(TYPE_FIELD);
    serde_json::from_value(Value::Object(body)).ok()
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_fields().map_err(serde::ser::Error::custom)?.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Map::<String, Value>::deserialize(deserializer).map(Event::from_fields)
    }
}
