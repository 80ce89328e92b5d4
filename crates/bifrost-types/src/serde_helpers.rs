// Copyright 2026 Bifrost Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
//! Serde adapters for the numeric encodings ThorNode uses on the wire.

use serde::{Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber<N> {
    String(String),
    Number(N),
}

/// `u128` written as a decimal string, read from either a string or a number.
pub mod u128_string {
    use super::*;

    /// Serializes as a decimal string.
    pub fn serialize<S>(value: &u128, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    /// Deserializes from a decimal string or a JSON number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u128, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StringOrNumber::<u64>::deserialize(deserializer)? {
            StringOrNumber::String(s) if s.is_empty() => Ok(0),
            StringOrNumber::String(s) => {
                s.parse().map_err(serde::de::Error::custom)
            }
            StringOrNumber::Number(n) => Ok(u128::from(n)),
        }
    }
}

/// `i64` written as a decimal string, read from either a string or a number.
pub mod i64_string {
    use super::*;

    /// Serializes as a decimal string.
    pub fn serialize<S>(value: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    /// Deserializes from a decimal string or a JSON number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StringOrNumber::<i64>::deserialize(deserializer)? {
            StringOrNumber::String(s) if s.is_empty() => Ok(0),
            StringOrNumber::String(s) => {
                s.parse().map_err(serde::de::Error::custom)
            }
            StringOrNumber::Number(n) => Ok(n),
        }
    }
}

/// `u64` written as a decimal string, read from either a string or a number.
pub mod u64_string {
    use super::*;

    /// Serializes as a decimal string.
    pub fn serialize<S>(value: &u64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    /// Deserializes from a decimal string or a JSON number.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match StringOrNumber::<u64>::deserialize(deserializer)? {
            StringOrNumber::String(s) if s.is_empty() => Ok(0),
            StringOrNumber::String(s) => {
                s.parse().map_err(serde::de::Error::custom)
            }
            StringOrNumber::Number(n) => Ok(n),
        }
    }
}

/// Treats a JSON `null` as the type's default.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
