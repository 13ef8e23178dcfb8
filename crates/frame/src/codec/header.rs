use bytes::{BufMut, Bytes, BytesMut};

use crate::codec::EncodeError;
use crate::ensure;

/// Encodes a header name as ASCII bytes.
pub fn encode_header_name(name: &str) -> Result<Bytes, EncodeError> {
    ensure!(name.is_ascii(), EncodeError::non_ascii(name));
    Ok(Bytes::copy_from_slice(name.as_bytes()))
}

/// Encodes a header value as Latin-1: every char up to `U+00FF` becomes exactly one byte.
pub fn encode_header_value(value: &str) -> Result<Bytes, EncodeError> {
    if value.is_ascii() {
        return Ok(Bytes::copy_from_slice(value.as_bytes()));
    }

    let mut buf = BytesMut::with_capacity(value.len());
    for c in value.chars() {
        let byte = u8::try_from(u32::from(c)).map_err(|_| EncodeError::non_latin1(value))?;
        buf.put_u8(byte);
    }
    Ok(buf.freeze())
}

/// Encodes one header pair, name first.
pub fn encode_header(name: &str, value: &str) -> Result<(Bytes, Bytes), EncodeError> {
    Ok((encode_header_name(name)?, encode_header_value(value)?))
}

pub fn decode_header_name(bytes: &[u8]) -> Result<String, EncodeError> {
    ensure!(bytes.is_ascii(), EncodeError::non_ascii(String::from_utf8_lossy(bytes)));
    // ascii is valid utf-8
    Ok(bytes.iter().map(|&b| char::from(b)).collect())
}

/// Decodes Latin-1 bytes; every byte maps to the char with the same code point, so this never fails.
pub fn decode_header_value(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_name_round_trip() {
        let encoded = encode_header_name("Content-Type").unwrap();
        assert_eq!(encoded.as_ref(), b"Content-Type");
        assert_eq!(decode_header_name(&encoded).unwrap(), "Content-Type");
    }

    #[test]
    fn non_ascii_name_is_rejected() {
        assert_eq!(encode_header_name("X-Größe"), Err(EncodeError::non_ascii("X-Größe")));
        assert!(decode_header_name(&[0x58, 0xE9]).is_err());
    }

    #[test]
    fn latin1_value_round_trip() {
        let value = "café; naïve ÿ";
        let encoded = encode_header_value(value).unwrap();
        // one byte per char, not utf-8
        assert_eq!(encoded.len(), value.chars().count());
        assert_eq!(encoded[3], 0xE9);
        assert_eq!(decode_header_value(&encoded), value);
    }

    #[test]
    fn every_latin1_char_round_trips() {
        let value: String = (0u8..=255).map(char::from).collect();
        let encoded = encode_header_value(&value).unwrap();
        assert_eq!(encoded.len(), 256);
        assert_eq!(decode_header_value(&encoded), value);
    }

    #[test]
    fn value_outside_latin1_is_rejected() {
        assert_eq!(encode_header_value("price €5"), Err(EncodeError::non_latin1("price €5")));
    }

    #[test]
    fn encode_pair() {
        let (name, value) = encode_header("Set-Cookie", "a=b").unwrap();
        assert_eq!(name.as_ref(), b"Set-Cookie");
        assert_eq!(value.as_ref(), b"a=b");
    }
}
