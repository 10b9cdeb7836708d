//! Per-epoch metric logs and the accumulated training history.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric name to scalar value for one epoch.
///
/// Non-finite values are encoded as `"inf"`, `"-inf"` and `"nan"` so they
/// survive the JSON round trip.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpochLog {
    values: BTreeMap<String, f64>,
}

impl EpochLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(key.into(), value)
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    /// The `loss` entry every epoch must report.
    pub fn loss(&self) -> Option<f64> {
        self.get("loss")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for EpochLog {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// JSON-safe scalar.
#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Number(f64),
    Text(String),
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Scalar::Number(value)
        } else if value.is_nan() {
            Scalar::Text("nan".into())
        } else if value > 0.0 {
            Scalar::Text("inf".into())
        } else {
            Scalar::Text("-inf".into())
        }
    }
}

impl Scalar {
    fn into_f64<E: de::Error>(self) -> Result<f64, E> {
        match self {
            Scalar::Number(v) => Ok(v),
            Scalar::Text(s) => match s.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(E::custom(format!("invalid scalar '{other}'"))),
            },
        }
    }
}

impl Serialize for EpochLog {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (k, v) in &self.values {
            map.serialize_entry(k, &Scalar::from(*v))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for EpochLog {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, Scalar>::deserialize(deserializer)?;
        let values = raw
            .into_iter()
            .map(|(k, v)| Ok((k, v.into_f64()?)))
            .collect::<Result<_, D::Error>>()?;
        Ok(Self { values })
    }
}

/// Serde adapter for a lone `f64` that may be non-finite.
pub mod scalar {
    use super::Scalar;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        Scalar::from(*value).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Scalar::deserialize(deserializer)?.into_f64()
    }
}

/// Serde adapter for `f32` sequences such as tensor data. Finite values stay
/// plain numbers; non-finite ones use the string encoding.
pub mod scalar_seq {
    use super::{Scalar, SerializeSeq};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(values: &[f32], serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for &v in values {
            if v.is_finite() {
                seq.serialize_element(&v)?;
            } else {
                seq.serialize_element(&Scalar::from(f64::from(v)))?;
            }
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f32>, D::Error> {
        Vec::<Scalar>::deserialize(deserializer)?
            .into_iter()
            .map(|s| s.into_f64().map(|v| v as f32))
            .collect()
    }
}

/// Ordered record of every epoch log seen by a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    entries: Vec<EpochLog>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_entry(&mut self, log: EpochLog) {
        self.entries.push(log);
    }

    pub fn entries(&self) -> &[EpochLog] {
        &self.entries
    }

    pub fn last(&self) -> Option<&EpochLog> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Values of one metric across all entries that report it.
    pub fn series(&self, key: &str) -> Vec<f64> {
        self.entries.iter().filter_map(|e| e.get(key)).collect()
    }
}
