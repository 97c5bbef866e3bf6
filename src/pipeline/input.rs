//! Input parsing: the raw `payload` text → a JSON offer record.
//!
//! ## Why insist on an object?
//!
//! Every field the normaliser looks for is a key of the top-level record. A
//! payload that parses as an array or a bare string would silently render an
//! empty offer, which is worse than a 400 telling the caller what they sent.

use crate::context::type_name;
use crate::error::OfertusError;
use serde_json::Value;
use tracing::debug;

/// Parse the offer payload. Fails unless it is valid JSON describing an object.
pub fn parse_payload(raw: &str) -> Result<Value, OfertusError> {
    let value: Value = serde_json::from_str(raw).map_err(|e| OfertusError::InvalidPayload {
        detail: e.to_string(),
    })?;
    ensure_object(value)
}

/// Accept an already-parsed record (JSON request bodies).
pub fn ensure_object(value: Value) -> Result<Value, OfertusError> {
    match value {
        Value::Object(ref map) => {
            debug!("Offer payload with {} top-level keys", map.len());
            Ok(value)
        }
        other => Err(OfertusError::PayloadNotObject {
            found: type_name(&other),
        }),
    }
}
