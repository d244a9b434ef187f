//! Event decoder
//!
//! Turns one raw stream message into an [`AgentEvent`]. Only the envelope is
//! validated (a JSON object with a string `step`); step-specific payloads are
//! passed through as JSON so that new server-side fields never break the client.

use crate::{
    Error, Result,
    events::{AgentEvent, FinalResponse, StepKind},
};
use serde_json::{Map, Value};
use tracing::trace;

/// Message used when the pipeline reports an error without any text
const UNKNOWN_PIPELINE_ERROR: &str = "Unknown pipeline error";

/// Decode one raw message payload into an [`AgentEvent`]
pub fn decode_event(raw: &str) -> Result<AgentEvent> {
    let value: Value = serde_json::from_str(raw.trim())
        .map_err(|e| Error::MalformedEvent(format!("invalid JSON: {}", e)))?;

    let Value::Object(mut object) = value else {
        return Err(Error::MalformedEvent(
            "event payload is not a JSON object".to_string(),
        ));
    };

    let step = match object.remove("step") {
        Some(Value::String(step)) if !step.is_empty() => step,
        Some(_) => {
            return Err(Error::MalformedEvent(
                "`step` field is not a non-empty string".to_string(),
            ));
        }
        None => return Err(Error::MalformedEvent("missing `step` field".to_string())),
    };

    let message = take_string(&mut object, "message");
    trace!(step = %step, "Decoded event envelope");

    let event = match step.as_str() {
        "start" => AgentEvent::Start { message },
        "complete" => {
            let final_response = object.remove("final_response").ok_or_else(|| {
                Error::MalformedEvent("`complete` event without `final_response`".to_string())
            })?;
            let final_response: FinalResponse = serde_json::from_value(final_response)
                .map_err(|e| Error::MalformedEvent(format!("invalid `final_response`: {}", e)))?;
            AgentEvent::Complete {
                message,
                final_response,
            }
        }
        "error" => AgentEvent::Error {
            message: message.unwrap_or_else(|| UNKNOWN_PIPELINE_ERROR.to_string()),
        },
        other => {
            let data = take_data(&mut object);
            match StepKind::from_wire(other) {
                Some(kind) => AgentEvent::Step {
                    kind,
                    message: message.unwrap_or_default(),
                    data,
                },
                None => AgentEvent::Other {
                    step,
                    message,
                    data,
                },
            }
        }
    };

    Ok(event)
}

fn take_string(object: &mut Map<String, Value>, key: &str) -> Option<String> {
    match object.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(Value::Null) | None => None,
        // Non-string notes are still worth showing
        Some(other) => Some(other.to_string()),
    }
}

fn take_data(object: &mut Map<String, Value>) -> Option<Value> {
    object.remove("data").filter(|data| !data.is_null())
}
