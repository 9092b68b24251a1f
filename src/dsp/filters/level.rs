//! Linear and decibel gain parsing.

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer};

pub fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// Linear gain expressed in dB. Silence maps to a large negative value
/// instead of `-inf`.
pub fn linear_to_db(gain: f32) -> f32 {
    20.0 * gain.abs().max(f32::MIN_POSITIVE).log10()
}

/// Parse `"0.5"`, `"-6db"` or `"3 dB"` into a linear gain.
pub fn parse_gain(value: &str) -> Option<f32> {
    let lower = value.trim().to_ascii_lowercase();
    let gain = match lower.strip_suffix("db") {
        Some(db) => db_to_linear(db.trim().parse().ok()?),
        None => lower.parse().ok()?,
    };
    gain.is_finite().then_some(gain)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum GainValue {
    Number(f32),
    Text(String),
}

/// Deserialize a linear gain written either as a number or as a dB string.
pub fn deserialize_linear_gain<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    match GainValue::deserialize(deserializer)? {
        GainValue::Number(gain) => Ok(gain),
        GainValue::Text(text) => parse_gain(&text).ok_or_else(|| {
            D::Error::custom(format!(
                "invalid gain \"{}\", expected a number or a string like \"-6db\"",
                text
            ))
        }),
    }
}
