//! Serde helpers storing `U256` amounts as base-10 strings.
//!
//! Deserialization also accepts JSON integers and `0x`-prefixed hex strings.

use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum Repr {
    Text(String),
    Number(u64),
}

impl Repr {
    fn into_u256<E: serde::de::Error>(self) -> Result<U256, E> {
        match self {
            Repr::Number(n) => Ok(U256::from(n)),
            Repr::Text(s) => s
                .trim()
                .parse::<U256>()
                .map_err(|e| E::custom(format!("invalid amount {s:?}: {e}"))),
        }
    }
}

pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
    match Option::<Repr>::deserialize(deserializer)? {
        Some(repr) => repr.into_u256(),
        None => Ok(U256::ZERO),
    }
}

pub mod option {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.collect_str(v),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        Option::<Repr>::deserialize(deserializer)?
            .map(Repr::into_u256)
            .transpose()
    }
}

/// Treat an explicit JSON `null` like a missing field.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
