//! The channel value type and its tagged codec.
//!
//! Channel items must satisfy a round-trip contract: decoding an encoded
//! value reproduces it exactly. The codec is an explicitly tagged JSON
//! scheme — `{"t": "Int", "v": 3}` — so the receiving side never has to
//! guess a type from its shape, and nothing on the wire is ever evaluated
//! as code.

use serde::{Deserialize, Serialize};

use crate::ProtocolError;

/// One self-contained channel item.
///
/// Covers null, booleans, integers, floats, strings, and containers built
/// from those. Maps keep insertion order as a pair list, so the round trip
/// is byte-faithful rather than merely set-equal.
///
/// `PartialEq` but not `Eq`: floats. Non-finite floats are rejected at
/// encode time because JSON cannot carry them (see [`Value::to_bytes`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v")]
pub enum Value {
    /// The absent value.
    Null,
    /// A boolean.
    Bool(bool),
    /// A signed 64-bit integer.
    Int(i64),
    /// A 64-bit float. Must be finite to cross the wire.
    Float(f64),
    /// A UTF-8 string.
    Str(String),
    /// An ordered sequence of values.
    List(Vec<Value>),
    /// An ordered string-keyed mapping.
    Map(Vec<(String, Value)>),
}

impl Value {
    /// Encodes this value for a `ChannelData` payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::NonFiniteFloat`] for NaN or infinities
    /// anywhere in the value — serde_json would silently write `null` for
    /// them, which breaks the round-trip contract at the far end.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        self.check_finite()?;
        serde_json::to_vec(self).map_err(ProtocolError::Encode)
    }

    /// Decodes a `ChannelData` payload back into a value.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for malformed or untagged payloads.
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }

    fn check_finite(&self) -> Result<(), ProtocolError> {
        match self {
            Self::Float(f) if !f.is_finite() => {
                Err(ProtocolError::NonFiniteFloat(*f))
            }
            Self::List(items) => {
                items.iter().try_for_each(Self::check_finite)
            }
            Self::Map(entries) => {
                entries.iter().try_for_each(|(_, v)| v.check_finite())
            }
            _ => Ok(()),
        }
    }
}

// Conversions so call sites can write `channel.send(42.into())` instead of
// spelling out the variant.

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: Value) {
        let bytes = value.to_bytes().expect("should encode");
        let decoded = Value::from_bytes(&bytes).expect("should decode");
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_round_trip_scalars() {
        round_trip(Value::Null);
        round_trip(Value::Bool(true));
        round_trip(Value::Bool(false));
        round_trip(Value::Int(0));
        round_trip(Value::Int(i64::MIN));
        round_trip(Value::Int(i64::MAX));
        round_trip(Value::Str(String::new()));
        round_trip(Value::Str("hello, peer".into()));
        round_trip(Value::Str("snowman \u{2603} and emoji \u{1F980}".into()));
    }

    #[test]
    fn test_round_trip_floats_exactly() {
        // serde_json prints floats with shortest-round-trip formatting, so
        // awkward values must survive bit-for-bit.
        for f in [0.0, -0.0, 0.1, 1.0 / 3.0, f64::MIN_POSITIVE, 1e300] {
            let bytes = Value::Float(f).to_bytes().expect("should encode");
            match Value::from_bytes(&bytes).expect("should decode") {
                Value::Float(g) => {
                    assert_eq!(g.to_bits(), f.to_bits(), "float {f} mangled")
                }
                other => panic!("expected float, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_round_trip_nested_containers() {
        round_trip(Value::List(vec![
            Value::Int(1),
            Value::Str("two".into()),
            Value::Null,
            Value::List(vec![Value::Bool(false)]),
        ]));
        round_trip(Value::Map(vec![
            ("z".into(), Value::Int(26)),
            ("a".into(), Value::Int(1)),
            (
                "nested".into(),
                Value::Map(vec![("k".into(), Value::List(vec![]))]),
            ),
        ]));
    }

    #[test]
    fn test_map_preserves_insertion_order() {
        let value = Value::Map(vec![
            ("b".into(), Value::Int(2)),
            ("a".into(), Value::Int(1)),
        ]);
        let bytes = value.to_bytes().expect("should encode");
        let decoded = Value::from_bytes(&bytes).expect("should decode");

        match decoded {
            Value::Map(entries) => {
                assert_eq!(entries[0].0, "b");
                assert_eq!(entries[1].0, "a");
            }
            other => panic!("expected map, got {other:?}"),
        }
    }

    #[test]
    fn test_encoding_is_tagged() {
        let bytes = Value::Int(3).to_bytes().expect("should encode");
        let json: serde_json::Value =
            serde_json::from_slice(&bytes).expect("valid json");
        assert_eq!(json["t"], "Int");
        assert_eq!(json["v"], 3);
    }

    #[test]
    fn test_non_finite_floats_fail_at_encode_time() {
        for f in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let result = Value::Float(f).to_bytes();
            assert!(
                matches!(result, Err(ProtocolError::NonFiniteFloat(_))),
                "{f} should be rejected"
            );
        }
    }

    #[test]
    fn test_non_finite_float_inside_container_is_caught() {
        let value = Value::List(vec![
            Value::Int(1),
            Value::Map(vec![("bad".into(), Value::Float(f64::NAN))]),
        ]);
        assert!(matches!(
            value.to_bytes(),
            Err(ProtocolError::NonFiniteFloat(_))
        ));
    }

    #[test]
    fn test_from_bytes_rejects_untagged_json() {
        // Plain JSON without the tag envelope is not a valid payload.
        assert!(matches!(
            Value::from_bytes(b"42"),
            Err(ProtocolError::Decode(_))
        ));
        assert!(matches!(
            Value::from_bytes(b"not json"),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_from_conversions() {
        assert_eq!(Value::from(7i64), Value::Int(7));
        assert_eq!(Value::from(true), Value::Bool(true));
        assert_eq!(Value::from("s"), Value::Str("s".into()));
        assert_eq!(Value::from(2.5f64), Value::Float(2.5));
        assert_eq!(
            Value::from(vec![Value::Null]),
            Value::List(vec![Value::Null])
        );
    }
}
