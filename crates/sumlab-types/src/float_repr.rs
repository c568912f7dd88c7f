//! Serde helpers for floats that may overflow.
//!
//! `serde_json` writes infinities and NaN as `null`, which does not read back
//! as `f64`. Finite values stay plain JSON numbers; the others are written as
//! the strings `"inf"`, `"-inf"` and `"nan"`.

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

/// Wire shape of a float field.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum FloatRepr {
    Number(f64),
    /// One of `"inf"`, `"-inf"` or `"nan"`.
    Special(String),
}

fn special(value: f64) -> Option<&'static str> {
    if value.is_nan() {
        Some("nan")
    } else if value == f64::INFINITY {
        Some("inf")
    } else if value == f64::NEG_INFINITY {
        Some("-inf")
    } else {
        None
    }
}

fn from_repr<E: de::Error>(repr: FloatRepr) -> Result<f64, E> {
    match repr {
        FloatRepr::Number(v) => Ok(v),
        FloatRepr::Special(s) => match s.as_str() {
            "inf" | "+inf" => Ok(f64::INFINITY),
            "-inf" => Ok(f64::NEG_INFINITY),
            "nan" => Ok(f64::NAN),
            other => Err(E::invalid_value(
                de::Unexpected::Str(other),
                &"a number, \"inf\", \"-inf\" or \"nan\"",
            )),
        },
    }
}

pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    match special(*value) {
        Some(tag) => serializer.serialize_str(tag),
        None => serializer.serialize_f64(*value),
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    from_repr(FloatRepr::deserialize(deserializer)?)
}

struct Wire(f64);

impl Serialize for Wire {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize(&self.0, serializer)
    }
}

pub fn serialize_option<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_some(&Wire(*v)),
        None => serializer.serialize_none(),
    }
}

pub fn deserialize_option<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Option::<FloatRepr>::deserialize(deserializer)?
        .map(from_repr)
        .transpose()
}
