//! Wire message model.
//!
//! Every frame on the wire is a UTF-8 JSON object whose `op` field selects
//! its semantic kind. [`BridgeMessage`] wraps that object with typed
//! accessors for the envelope fields the engine routes on (`op`, `id`,
//! `topic`, `service`); everything else stays schemaless JSON for the
//! caller to interpret.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::BridgeError;

// ── Operation codes ─────────────────────────────────────────────────

/// Operation code constants.
pub mod op {
    /// Topic publication delivered to subscribers.
    pub const PUBLISH: &str = "publish";
    /// Inbound service invocation for this client to serve.
    pub const CALL_SERVICE: &str = "call_service";
    /// Response to a service call this client issued.
    pub const SERVICE_RESPONSE: &str = "service_response";
    /// Reserved for server status reports. Not built in; register a
    /// handler to consume it.
    pub const STATUS: &str = "status";
    /// Reserved for PNG-compressed message envelopes. Not built in;
    /// register a handler and decode with [`crate::codec::png`].
    pub const PNG: &str = "png";
}

/// Operation codes with built-in routing. These cannot be taken over by a
/// registered handler.
pub const BUILTIN_OPS: [&str; 3] = [op::PUBLISH, op::CALL_SERVICE, op::SERVICE_RESPONSE];

// ── BridgeMessage ───────────────────────────────────────────────────

/// A single protocol message: a JSON object carrying an `op` discriminator.
///
/// Constructed messages always contain `op`. Decoded frames are validated
/// to contain one, so [`BridgeMessage::op`] is total.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct BridgeMessage {
    fields: Map<String, Value>,
}

impl BridgeMessage {
    /// An empty message with the given operation code.
    pub fn new(op: &str) -> Self {
        let mut fields = Map::new();
        let _ = fields.insert("op".into(), Value::String(op.into()));
        Self { fields }
    }

    /// A `publish` message delivering `msg` on `topic`.
    pub fn publish(topic: &str, msg: Value) -> Self {
        Self::new(op::PUBLISH)
            .with_field("topic", Value::String(topic.into()))
            .with_field("msg", msg)
    }

    /// A `call_service` request with the caller-chosen request id.
    pub fn call_service(service: &str, id: &str, args: Value) -> Self {
        Self::new(op::CALL_SERVICE)
            .with_field("id", Value::String(id.into()))
            .with_field("service", Value::String(service.into()))
            .with_field("args", args)
    }

    /// A `service_response` answering the request identified by `id`.
    pub fn service_response(service: &str, id: &str, result: bool, values: Value) -> Self {
        Self::new(op::SERVICE_RESPONSE)
            .with_field("id", Value::String(id.into()))
            .with_field("service", Value::String(service.into()))
            .with_field("result", Value::Bool(result))
            .with_field("values", values)
    }

    /// Set a field, replacing any previous value.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: Value) -> Self {
        let _ = self.fields.insert(key.into(), value);
        self
    }

    /// Parse a text frame. Requires a JSON object with a string `op` field.
    pub fn decode(text: &str) -> Result<Self, BridgeError> {
        let value: Value = serde_json::from_str(text).map_err(|e| BridgeError::Decoding {
            detail: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Convert a parsed JSON value into a message, validating the envelope.
    pub fn from_value(value: Value) -> Result<Self, BridgeError> {
        let Value::Object(fields) = value else {
            return Err(BridgeError::Decoding {
                detail: "frame is not a JSON object".into(),
            });
        };
        match fields.get("op") {
            Some(Value::String(_)) => Ok(Self { fields }),
            Some(_) => Err(BridgeError::Decoding {
                detail: "'op' is not a string".into(),
            }),
            None => Err(BridgeError::Decoding {
                detail: "missing 'op' field".into(),
            }),
        }
    }

    /// Serialize to the wire format.
    pub fn encode(&self) -> Result<String, BridgeError> {
        serde_json::to_string(&self.fields).map_err(|e| BridgeError::Encoding {
            detail: e.to_string(),
        })
    }

    /// The whole message as a JSON value.
    pub fn to_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// The operation code.
    pub fn op(&self) -> &str {
        self.fields.get("op").and_then(Value::as_str).unwrap_or("")
    }

    /// The request id, if present.
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    /// The topic name, if present.
    pub fn topic(&self) -> Option<&str> {
        self.fields.get("topic").and_then(Value::as_str)
    }

    /// The service name, if present.
    pub fn service(&self) -> Option<&str> {
        self.fields.get("service").and_then(Value::as_str)
    }

    /// Raw access to any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

// ── ServiceResponse ─────────────────────────────────────────────────

/// Result payload of a completed service call, detached from the protocol
/// envelope. Built only on success; immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ServiceResponse {
    values: Value,
}

impl ServiceResponse {
    /// Wrap the `values` payload of a `service_response` message.
    pub fn new(values: Value) -> Self {
        Self { values }
    }

    /// The response payload.
    pub fn values(&self) -> &Value {
        &self.values
    }

    /// Consume the response, yielding the payload.
    pub fn into_values(self) -> Value {
        self.values
    }

    /// Look up one field of an object-shaped payload.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::errors::BridgeError;

    // -- Wire format --

    #[test]
    fn publish_wire_format() {
        let msg = BridgeMessage::publish("/cmd_vel", json!({"linear": {"x": 0.5}}));
        let encoded = msg.encode().unwrap();
        let parsed: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(parsed["op"], "publish");
        assert_eq!(parsed["topic"], "/cmd_vel");
        assert_eq!(parsed["msg"]["linear"]["x"], 0.5);
    }

    #[test]
    fn call_service_wire_format() {
        let msg = BridgeMessage::call_service("/add_two_ints", "call:1", json!({"a": 2, "b": 3}));
        let parsed: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed["op"], "call_service");
        assert_eq!(parsed["service"], "/add_two_ints");
        assert_eq!(parsed["id"], "call:1");
        assert_eq!(parsed["args"]["b"], 3);
    }

    #[test]
    fn service_response_wire_format() {
        let msg = BridgeMessage::service_response("/add_two_ints", "call:1", true, json!({"sum": 5}));
        let parsed: Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(parsed["op"], "service_response");
        assert_eq!(parsed["result"], true);
        assert_eq!(parsed["values"]["sum"], 5);
    }

    #[test]
    fn with_field_replaces_existing() {
        let msg = BridgeMessage::new("status")
            .with_field("level", json!("warning"))
            .with_field("level", json!("error"));
        assert_eq!(msg.get("level"), Some(&json!("error")));
    }

    // -- Decoding --

    #[test]
    fn decode_extracts_envelope_fields() {
        let msg = BridgeMessage::decode(
            r#"{"op":"publish","topic":"/scan","msg":{"ranges":[1.0,2.0]}}"#,
        )
        .unwrap();
        assert_eq!(msg.op(), "publish");
        assert_eq!(msg.topic(), Some("/scan"));
        assert_eq!(msg.id(), None);
        assert_eq!(msg.get("msg").unwrap()["ranges"][0], 1.0);
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = BridgeMessage::decode("{not json").unwrap_err();
        assert_matches!(err, BridgeError::Decoding { .. });
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = BridgeMessage::decode(r#"["op","publish"]"#).unwrap_err();
        assert_matches!(err, BridgeError::Decoding { detail } if detail.contains("not a JSON object"));
    }

    #[test]
    fn decode_rejects_missing_op() {
        let err = BridgeMessage::decode(r#"{"topic":"/scan"}"#).unwrap_err();
        assert_matches!(err, BridgeError::Decoding { detail } if detail.contains("missing 'op'"));
    }

    #[test]
    fn decode_rejects_non_string_op() {
        let err = BridgeMessage::decode(r#"{"op":42}"#).unwrap_err();
        assert_matches!(err, BridgeError::Decoding { detail } if detail.contains("not a string"));
    }

    // -- ServiceResponse --

    #[test]
    fn service_response_payload_access() {
        let resp = ServiceResponse::new(json!({"sum": 5}));
        assert_eq!(resp.get("sum"), Some(&json!(5)));
        assert_eq!(resp.values()["sum"], 5);
        assert_eq!(resp.into_values(), json!({"sum": 5}));
    }

    #[test]
    fn service_response_non_object_payload() {
        let resp = ServiceResponse::new(json!("error text"));
        assert_eq!(resp.get("anything"), None);
        assert_eq!(resp.values(), &json!("error text"));
    }

    // -- Round-trip --

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            any::<f64>()
                .prop_filter("finite", |f| f.is_finite())
                .prop_map(Value::from),
            "[a-zA-Z0-9_/]{0,12}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 24, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::hash_map("[a-z_]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn encode_decode_preserves_fields(extra in arb_json(), id in "[a-z0-9:]{1,10}") {
            let msg = BridgeMessage::new("service_response")
                .with_field("id", Value::String(id))
                .with_field("values", extra);
            let decoded = BridgeMessage::decode(&msg.encode().unwrap()).unwrap();
            prop_assert_eq!(decoded, msg);
        }
    }
}
