//! Event Envelope Decoder (spec §4.4): turns the raw push-subscription body
//! of `POST /pubsub/spec-status` into a validated [`StatusEvent`]. Every
//! failure mode here is `bad_input` — nothing in this module ever reaches
//! the store.

use base64::Engine;
use scheduler_types::{truncate_snippet, SchedulerError, SpecStatus, StatusEvent};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct PushEnvelope {
    message: PushMessage,
    #[serde(default)]
    #[allow(dead_code)]
    subscription: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PushMessage {
    data: String,
    #[serde(default)]
    #[serde(rename = "messageId")]
    message_id: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    #[serde(rename = "publishTime")]
    publish_time: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    attributes: Option<serde_json::Value>,
}

/// Shape of the inner JSON after base64-decoding `message.data` (spec §6).
#[derive(Debug, Deserialize)]
struct InnerStatusPayload {
    plan_id: String,
    spec_index: i64,
    status: SpecStatus,
    #[serde(default)]
    stage: Option<String>,
}

/// Decode and validate a raw push envelope body into a [`StatusEvent`]
/// (spec §4.4 steps 1-5). Any structural problem is `bad_input`.
pub fn decode(body: &[u8]) -> Result<StatusEvent, SchedulerError> {
    let envelope: PushEnvelope = serde_json::from_slice(body)
        .map_err(|e| SchedulerError::BadInput(format!("malformed push envelope: {e}")))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(envelope.message.data.as_bytes())
        .map_err(|e| SchedulerError::BadInput(format!("malformed base64 in message.data: {e}")))?;

    let raw_text = String::from_utf8(decoded)
        .map_err(|e| SchedulerError::BadInput(format!("message.data is not valid UTF-8: {e}")))?;

    let value: serde_json::Value = serde_json::from_str(&raw_text)
        .map_err(|e| SchedulerError::BadInput(format!("message.data is not valid JSON: {e}")))?;

    if !value.is_object() {
        return Err(SchedulerError::BadInput(
            "message.data must decode to a JSON object".to_string(),
        ));
    }

    let payload: InnerStatusPayload = serde_json::from_value(value)
        .map_err(|e| SchedulerError::BadInput(format!("status event failed validation: {e}")))?;

    if payload.plan_id.trim().is_empty() {
        return Err(SchedulerError::BadInput("plan_id must not be empty".to_string()));
    }
    if payload.spec_index < 0 {
        return Err(SchedulerError::BadInput(
            "spec_index must be non-negative".to_string(),
        ));
    }

    Ok(StatusEvent {
        plan_id: payload.plan_id,
        spec_index: payload.spec_index as u32,
        status: payload.status,
        stage: payload.stage,
        message_id: envelope.message.message_id.unwrap_or_default(),
        raw_snippet: truncate_snippet(&raw_text),
    })
}
