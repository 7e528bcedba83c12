//! Value ↔ token conversion.
//!
//! A token is `base64(UTF-16LE(JSON(value)))` using the standard, padded
//! alphabet. It only ever contains `[A-Za-z0-9+/=]`, so it can be written as
//! one line without escaping.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Encode `value` as a single newline-free token.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let json = serde_json::to_string(value).map_err(CodecError::Serialize)?;
    let utf16: Vec<u8> = json
        .encode_utf16()
        .flat_map(|unit| unit.to_le_bytes())
        .collect();
    Ok(STANDARD.encode(utf16))
}

/// Decode a token produced by [`encode`] into a typed value.
pub fn decode<T: DeserializeOwned>(token: &str) -> Result<T, CodecError> {
    let json = decode_text(token)?;
    serde_json::from_str(&json).map_err(CodecError::Json)
}

/// Decode a token into an untyped JSON value.
pub fn decode_value(token: &str) -> Result<serde_json::Value, CodecError> {
    decode(token)
}

/// Undo the base64 and UTF-16LE layers, yielding the JSON text.
pub fn decode_text(token: &str) -> Result<String, CodecError> {
    let bytes = STANDARD.decode(token)?;
    if bytes.len() % 2 != 0 {
        return Err(CodecError::Utf16("odd byte count"));
    }
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    String::from_utf16(&units).map_err(|_| CodecError::Utf16("unpaired surrogate"))
}
