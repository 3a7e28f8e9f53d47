use crate::error::{Result, SegmentError};
use ahash::AHashMap;
use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A single payload field value.
///
/// A closed set of variants rather than an open JSON value, so clause and
/// value handling stays exhaustive at compile time. Arbitrary field names
/// are still allowed at the [`Payload`] level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PayloadValue {
    Keyword(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
    List(Vec<PayloadValue>),
    Object(BTreeMap<String, PayloadValue>),
}

/// A structured document attached to a point. At most one per point id,
/// last write wins.
pub type Payload = BTreeMap<String, PayloadValue>;

/// Payload as kept by the payload store: either an already-structured
/// document or an opaque blob plus the encoding it was ingested under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StoredPayload {
    Structured(Payload),
    Opaque { encoding: String, data: Bytes },
}

// ---------------------------------------------------------------------------
// JSON conversion
// ---------------------------------------------------------------------------

/// Convert a JSON object into a [`Payload`]. Non-object roots are rejected;
/// `null` fields are dropped.
pub fn payload_from_json(value: serde_json::Value) -> Result<Payload> {
    match value {
        serde_json::Value::Object(map) => {
            let mut payload = Payload::new();
            for (key, v) in map {
                if let Some(converted) = value_from_json(v) {
                    payload.insert(key, converted);
                }
            }
            Ok(payload)
        }
        other => Err(SegmentError::Serialization(format!(
            "payload must be a JSON object, got {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn value_from_json(value: serde_json::Value) -> Option<PayloadValue> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::Bool(b) => Some(PayloadValue::Bool(b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(PayloadValue::Integer(i))
            } else {
                n.as_f64().map(PayloadValue::Float)
            }
        }
        serde_json::Value::String(s) => Some(PayloadValue::Keyword(s)),
        serde_json::Value::Array(items) => Some(PayloadValue::List(
            items.into_iter().filter_map(value_from_json).collect(),
        )),
        serde_json::Value::Object(map) => Some(PayloadValue::Object(
            map.into_iter()
                .filter_map(|(k, v)| value_from_json(v).map(|v| (k, v)))
                .collect(),
        )),
    }
}

/// Render a [`Payload`] back as a JSON object.
pub fn payload_to_json(payload: &Payload) -> serde_json::Value {
    serde_json::Value::Object(
        payload
            .iter()
            .map(|(k, v)| (k.clone(), value_to_json(v)))
            .collect(),
    )
}

fn value_to_json(value: &PayloadValue) -> serde_json::Value {
    match value {
        PayloadValue::Keyword(s) => serde_json::Value::String(s.clone()),
        PayloadValue::Integer(i) => serde_json::Value::from(*i),
        PayloadValue::Float(f) => serde_json::Value::from(*f),
        PayloadValue::Bool(b) => serde_json::Value::Bool(*b),
        PayloadValue::List(items) => {
            serde_json::Value::Array(items.iter().map(value_to_json).collect())
        }
        PayloadValue::Object(map) => serde_json::Value::Object(
            map.iter().map(|(k, v)| (k.clone(), value_to_json(v))).collect(),
        ),
    }
}

// ---------------------------------------------------------------------------
// Flattening for filters and field indexes
// ---------------------------------------------------------------------------

/// Scalar view of a payload field as seen by filters and field indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlatValue {
    Keyword(String),
    Integer(i64),
    Float(f64),
}

/// Payload flattened to `field path -> scalar values`.
///
/// Nested objects contribute their leaves under `outer__inner` paths,
/// list elements all land under the list's own path, bools become the
/// keywords `"true"`/`"false"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlattenedPayload {
    entries: AHashMap<String, Vec<FlatValue>>,
}

impl FlattenedPayload {
    #[inline]
    pub fn get(&self, key: &str) -> Option<&[FlatValue]> {
        self.entries.get(key).map(|v| v.as_slice())
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[FlatValue])> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push(&mut self, key: String, value: FlatValue) {
        self.entries.entry(key).or_default().push(value);
    }
}

/// Separator joining nested object keys into a flat field path.
pub const NESTED_KEY_SEPARATOR: &str = "__";

/// Flatten a payload for filter evaluation and field indexing.
pub fn flatten_payload(payload: &Payload) -> FlattenedPayload {
    let mut flat = FlattenedPayload::default();
    for (key, value) in payload {
        flatten_value(&mut flat, key.clone(), value);
    }
    flat
}

fn flatten_value(flat: &mut FlattenedPayload, key: String, value: &PayloadValue) {
    match value {
        PayloadValue::Keyword(s) => flat.push(key, FlatValue::Keyword(s.clone())),
        PayloadValue::Integer(i) => flat.push(key, FlatValue::Integer(*i)),
        PayloadValue::Float(f) => flat.push(key, FlatValue::Float(*f)),
        PayloadValue::Bool(b) => flat.push(key, FlatValue::Keyword(b.to_string())),
        PayloadValue::List(items) => {
            // scalar elements only; containers inside lists are not indexable
            for item in items {
                match item {
                    PayloadValue::Keyword(s) => {
                        flat.push(key.clone(), FlatValue::Keyword(s.clone()))
                    }
                    PayloadValue::Integer(i) => flat.push(key.clone(), FlatValue::Integer(*i)),
                    PayloadValue::Float(f) => flat.push(key.clone(), FlatValue::Float(*f)),
                    PayloadValue::Bool(b) => {
                        flat.push(key.clone(), FlatValue::Keyword(b.to_string()))
                    }
                    PayloadValue::List(_) | PayloadValue::Object(_) => {}
                }
            }
        }
        PayloadValue::Object(map) => {
            for (inner_key, inner) in map {
                let joined = format!("{key}{NESTED_KEY_SEPARATOR}{inner_key}");
                flatten_value(flat, joined, inner);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Opaque payload decoding
// ---------------------------------------------------------------------------

/// Decoder for payloads ingested as opaque blobs. Implementations are
/// registered per encoding name on the [`DecoderRegistry`].
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, data: &[u8]) -> anyhow::Result<Payload>;
}

/// Built-in decoder for JSON-encoded payload blobs.
pub struct JsonPayloadDecoder;

impl PayloadDecoder for JsonPayloadDecoder {
    fn decode(&self, data: &[u8]) -> anyhow::Result<Payload> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        payload_from_json(value).map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Encoding name the built-in JSON decoder is registered under.
pub const JSON_ENCODING: &str = "json";

/// Registry of payload decoders, keyed by encoding name.
pub struct DecoderRegistry {
    decoders: RwLock<AHashMap<String, Arc<dyn PayloadDecoder>>>,
}

impl DecoderRegistry {
    /// Registry with the built-in `"json"` decoder.
    pub fn with_defaults() -> Self {
        let registry = Self {
            decoders: RwLock::new(AHashMap::new()),
        };
        registry.register(JSON_ENCODING, Arc::new(JsonPayloadDecoder));
        registry
    }

    pub fn register(&self, encoding: &str, decoder: Arc<dyn PayloadDecoder>) {
        self.decoders.write().insert(encoding.to_string(), decoder);
    }

    /// Decode a blob under the named encoding.
    pub fn decode(&self, encoding: &str, data: &[u8]) -> Result<Payload> {
        let decoder = self
            .decoders
            .read()
            .get(encoding)
            .cloned()
            .ok_or_else(|| SegmentError::UnknownEncoding(encoding.to_string()))?;
        decoder
            .decode(data)
            .map_err(|e| SegmentError::Serialization(format!("decode '{encoding}' payload: {e}")))
    }

    /// Materialize a stored payload as a structured document.
    pub fn resolve(&self, stored: &StoredPayload) -> Result<Payload> {
        match stored {
            StoredPayload::Structured(payload) => Ok(payload.clone()),
            StoredPayload::Opaque { encoding, data } => self.decode(encoding, data),
        }
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Payload {
        payload_from_json(serde_json::json!({
            "text": "I am document 7",
            "granularity": 5,
            "weight": 1.5,
            "active": true,
            "tags": ["a", "b"],
            "inner": { "float": 2005 }
        }))
        .unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let json = serde_json::json!({
            "text": "hello",
            "count": 3,
            "ratio": 0.5,
            "flag": false,
            "nested": { "k": "v" },
            "list": [1, 2]
        });
        let payload = payload_from_json(json.clone()).unwrap();
        assert_eq!(payload_to_json(&payload), json);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(payload_from_json(serde_json::json!([1, 2])).is_err());
        assert!(payload_from_json(serde_json::json!("text")).is_err());
    }

    #[test]
    fn test_null_fields_dropped() {
        let payload = payload_from_json(serde_json::json!({"a": null, "b": 1})).unwrap();
        assert!(!payload.contains_key("a"));
        assert!(payload.contains_key("b"));
    }

    #[test]
    fn test_flatten_nested_and_lists() {
        let flat = flatten_payload(&sample_payload());

        assert_eq!(
            flat.get("inner__float"),
            Some(&[FlatValue::Integer(2005)][..])
        );
        assert_eq!(
            flat.get("tags"),
            Some(
                &[
                    FlatValue::Keyword("a".to_string()),
                    FlatValue::Keyword("b".to_string())
                ][..]
            )
        );
        assert_eq!(
            flat.get("active"),
            Some(&[FlatValue::Keyword("true".to_string())][..])
        );
        assert_eq!(flat.get("weight"), Some(&[FlatValue::Float(1.5)][..]));
        assert!(flat.get("missing").is_none());
    }

    #[test]
    fn test_decoder_registry() {
        let registry = DecoderRegistry::with_defaults();
        let blob = serde_json::to_vec(&serde_json::json!({"k": "v"})).unwrap();
        let payload = registry.decode(JSON_ENCODING, &blob).unwrap();
        assert_eq!(
            payload.get("k"),
            Some(&PayloadValue::Keyword("v".to_string()))
        );

        match registry.decode("msgpack", &blob) {
            Err(SegmentError::UnknownEncoding(enc)) => assert_eq!(enc, "msgpack"),
            other => panic!("expected UnknownEncoding, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_resolve_opaque() {
        let registry = DecoderRegistry::with_defaults();
        let blob = serde_json::to_vec(&serde_json::json!({"text": "doc"})).unwrap();
        let stored = StoredPayload::Opaque {
            encoding: JSON_ENCODING.to_string(),
            data: Bytes::from(blob),
        };
        let payload = registry.resolve(&stored).unwrap();
        assert_eq!(
            payload.get("text"),
            Some(&PayloadValue::Keyword("doc".to_string()))
        );
    }
}
