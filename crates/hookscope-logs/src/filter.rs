use serde::Deserialize;
use serde_json::Value;

/// Marker substring identifying internal builder request traffic
pub const INTERNAL_REQUEST_MARKER: &str = "hooks-builder-req";

/// Schema probe for the suppression lookup. Every field is optional so a
/// payload of any other shape deserializes to "no match" or fails outright;
/// either way the record is kept.
#[derive(Debug, Deserialize)]
struct PayloadProbe {
    #[serde(default)]
    id: Option<RequestId>,
}

#[derive(Debug, Deserialize)]
struct RequestId {
    #[serde(rename = "_Request", default)]
    request: Option<String>,
}

/// Whether a parsed payload marks the record as internal builder traffic
/// that never reaches the store
pub fn is_internal_noise(payload: Option<&Value>) -> bool {
    let Some(value) = payload else {
        return false;
    };
    let Ok(probe) = PayloadProbe::deserialize(value) else {
        return false;
    };

    probe
        .id
        .and_then(|id| id.request)
        .is_some_and(|request| request.contains(INTERNAL_REQUEST_MARKER))
}
