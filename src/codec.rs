//! Store <-> blob transform
//!
//! The blob is a JSON object, one property per key. When obfuscation is on,
//! the JSON text is XORed byte-by-byte against a repeating secret and then
//! base64-encoded. This is light obfuscation only, not encryption: anyone
//! holding the secret (or a few known bytes of plaintext) can reverse it.

use crate::error::PersistError;
use crate::settings::Settings;
use crate::store::Store;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::warn;

/// Serializer for the whole store
#[derive(Clone, Debug, Default)]
pub struct Codec {
    pretty: bool,
    secret: Option<Vec<u8>>,
}

impl Codec {
    /// Plain JSON codec
    pub fn new(pretty: bool) -> Self {
        Self {
            pretty,
            secret: None,
        }
    }

    /// Enable XOR obfuscation with `secret`
    ///
    /// An empty secret would leave the text unchanged, so it disables
    /// obfuscation and logs a warning instead.
    pub fn with_secret(mut self, secret: impl AsRef<[u8]>) -> Self {
        let secret = secret.as_ref();
        if secret.is_empty() {
            warn!("encryption enabled with an empty secret; writing plain JSON");
            self.secret = None;
        } else {
            self.secret = Some(secret.to_vec());
        }
        self
    }

    /// Build the codec described by `settings`
    pub fn from_settings(settings: &Settings) -> Self {
        let codec = Self::new(settings.pretty_print);
        if settings.use_encryption {
            codec.with_secret(settings.encryption_key.as_bytes())
        } else {
            codec
        }
    }

    pub fn is_obfuscated(&self) -> bool {
        self.secret.is_some()
    }

    /// Serialize the whole store into the blob handed to a backend
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Encode`] if a value cannot be serialized.
    pub fn encode(&self, store: &Store) -> Result<String, PersistError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(store.as_map())
        } else {
            serde_json::to_string(store.as_map())
        }
        .map_err(PersistError::Encode)?;

        match &self.secret {
            Some(secret) => Ok(STANDARD.encode(xor(text.as_bytes(), secret))),
            None => Ok(text),
        }
    }

    /// Turn a backend blob back into a store
    ///
    /// # Errors
    ///
    /// Returns [`PersistError::Decode`] for invalid base64, a wrong secret,
    /// malformed JSON or a top level that is not an object.
    pub fn decode(&self, blob: &str) -> Result<Store, PersistError> {
        let text = match &self.secret {
            Some(secret) => {
                let bytes = STANDARD
                    .decode(blob.trim())
                    .map_err(|e| PersistError::Decode(format!("invalid base64: {e}")))?;
                String::from_utf8(xor(&bytes, secret))
                    .map_err(|_| PersistError::Decode("deobfuscated text is not UTF-8".into()))?
            }
            None => blob.to_string(),
        };

        match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => Ok(Store::from_map(map)),
            Ok(other) => Err(PersistError::Decode(format!(
                "expected a JSON object at the top level, found {}",
                type_name(&other)
            ))),
            Err(e) => Err(PersistError::Decode(format!("invalid JSON: {e}"))),
        }
    }
}

fn xor(data: &[u8], secret: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(secret.iter().cycle())
        .map(|(byte, key)| byte ^ key)
        .collect()
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
