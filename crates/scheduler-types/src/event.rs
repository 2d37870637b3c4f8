//! The decoded inbound status event (spec §4.4, inner JSON payload).

use serde::{Deserialize, Serialize};

use crate::plan::SpecStatus;

/// A validated status event, decoded and schema-checked from a webhook
/// envelope's inner payload. Construction (envelope parsing, base64 and
/// JSON decoding, schema validation) lives in `scheduler-core`; this type
/// is the stable shape the kernel consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEvent {
    pub plan_id: String,
    pub spec_index: u32,
    pub status: SpecStatus,
    #[serde(default)]
    pub stage: Option<String>,
    /// Empty string disables deduplication for this delivery (spec §9).
    #[serde(default)]
    pub message_id: String,
    /// Decoded inner-JSON text, truncated to [`crate::HISTORY_SNIPPET_MAX_BYTES`].
    pub raw_snippet: String,
}
