//! Pagination cursors.
//!
//! Key-value stores resume from the key attributes of the last item read;
//! listing-style stores hand back an opaque continuation token. Both shapes
//! are a [`PageKey`], and either can be turned into an opaque string for
//! transport through [`PageKey::encode`].

use std::collections::BTreeMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::CursorError;
use crate::query::value::Value;

/// Field name under which a continuation token appears in key-map form.
pub const NEXT_TOKEN: &str = "nextToken";

/// Position to resume a paged read from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageKey {
    /// Key attribute name to value, as reported by the store.
    Keys(BTreeMap<String, Value>),
    /// Opaque continuation token of a listing store.
    Token(String),
}

impl PageKey {
    /// Builds a key-map cursor from `(attribute, value)` pairs.
    pub fn from_keys<I, K, V>(keys: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        PageKey::Keys(
            keys.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Wraps a continuation token.
    pub fn token(token: impl Into<String>) -> Self {
        PageKey::Token(token.into())
    }

    /// Key attributes, when this is a key-map cursor.
    pub fn as_keys(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            PageKey::Keys(keys) => Some(keys),
            PageKey::Token(_) => None,
        }
    }

    /// Continuation token, when this is a token cursor.
    pub fn as_token(&self) -> Option<&str> {
        match self {
            PageKey::Token(token) => Some(token),
            PageKey::Keys(_) => None,
        }
    }

    /// Key-map view; tokens appear under [`NEXT_TOKEN`].
    pub fn to_key_map(&self) -> BTreeMap<String, Value> {
        match self {
            PageKey::Keys(keys) => keys.clone(),
            PageKey::Token(token) => {
                BTreeMap::from([(NEXT_TOKEN.to_string(), Value::String(token.clone()))])
            }
        }
    }

    /// Encodes the cursor as a URL-safe opaque string.
    ///
    /// Fails when a key value is a non-finite float, since JSON has no
    /// spelling for it and the cursor could not be decoded again.
    pub fn encode(&self) -> Result<String, CursorError> {
        if let PageKey::Keys(keys) = self {
            if let Some((name, _)) = keys.iter().find(|(_, v)| !is_finite(v)) {
                return Err(CursorError::NonFiniteNumber(name.clone()));
            }
        }
        let json = serde_json::to_vec(self)?;
        Ok(URL_SAFE_NO_PAD.encode(json))
    }

    /// Decodes a string produced by [`PageKey::encode`].
    pub fn decode(encoded: &str) -> Result<Self, CursorError> {
        let bytes = URL_SAFE_NO_PAD.decode(encoded.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn is_finite(value: &Value) -> bool {
    match value {
        Value::Float(f) => f.is_finite(),
        Value::List(items) => items.iter().all(is_finite),
        Value::Map(fields) => fields.values().all(is_finite),
        _ => true,
    }
}
