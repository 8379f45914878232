use std::{collections::HashMap, fmt::Display, str::FromStr};

use serde::{de::Error, Deserialize, Deserializer};

pub(crate) fn deserialize_string_option<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let value = Option::<String>::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(ref value) => Ok(Some(T::from_str(value).map_err(Error::custom)?)),
    }
}

pub(crate) fn deserialize_tags<'de, D, T>(deserializer: D) -> Result<HashMap<String, T>, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
    T::Err: Display,
{
    let str_tags = HashMap::<String, String>::deserialize(deserializer)?;
    str_tags
        .into_iter()
        .map(|(tag, value)| Ok((tag, T::from_str(&value).map_err(Error::custom)?)))
        .collect()
}
