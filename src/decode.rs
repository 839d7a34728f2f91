//! Conversion between typed values and the generic configuration tree
//!
//! Time values travel through the tree as ```{"RFC3339": "<timestamp>"}``` maps, see [rfc3339].

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::context::ConfigRawData;
use crate::error::{DiError, Result};

/// Convert any serializable value into another shape, e.g. a struct into a map
pub fn decode<T: DeserializeOwned>(from: &impl Serialize) -> Result<T> {
    let value = serde_json::to_value(from)?;
    Ok(serde_json::from_value(value)?)
}

/// Convert a serializable value into a raw configuration tree
pub fn to_raw(from: &impl Serialize) -> Result<ConfigRawData> {
    match serde_json::to_value(from)? {
        Value::Object(map) => Ok(map),
        _ => Err(DiError::DecodeShape {
            expected: "configuration map",
        }),
    }
}

/// Serde adapter for ```chrono::DateTime<Utc>``` fields.
///
/// Serializes as ```{"RFC3339": "2024-01-02T03:04:05.000000006Z"}```, deserializes from
/// that form or from a bare RFC3339 string.
///
/// ```
/// use chrono::{DateTime, Utc};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Token {
///     #[serde(with = "kizuna::decode::rfc3339")]
///     expires_at: DateTime<Utc>,
/// }
/// ```
pub mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub const KEY: &str = "RFC3339";

    #[derive(Serialize, Deserialize)]
    struct Encoded {
        #[serde(rename = "RFC3339")]
        rfc3339: String,
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Accepted {
        Encoded(Encoded),
        Plain(String),
    }

    pub fn serialize<S: Serializer>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        Encoded {
            rfc3339: time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = match Accepted::deserialize(deserializer)? {
            Accepted::Encoded(encoded) => encoded.rfc3339,
            Accepted::Plain(plain) => plain,
        };
        DateTime::parse_from_rfc3339(&raw)
            .map(|time| time.with_timezone(&Utc))
            .map_err(D::Error::custom)
    }
}
