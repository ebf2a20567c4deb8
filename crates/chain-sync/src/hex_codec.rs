//! `0x`-prefixed hex parsing into the event store's fixed-width
//! [`event_store::byte_array::ByteArray`] types. Big-integer wire fields
//! (`difficulty`, `gasLimit`, ...) arrive as variable-length hex and must be
//! left-padded to the fixed 32-byte big-endian representation the store
//! indexes on (§9 "Big integers").

use {crate::error::ConversionError, event_store::byte_array::ByteArray};

fn strip_prefix(value: &str) -> &str {
    value.strip_prefix("0x").unwrap_or(value)
}

/// Parses a hex string into exactly `N` bytes, left-padding with zeros if
/// the input is shorter (the common case for small quantities like `nonce`
/// or `value`). Errors if the decoded value would overflow `N` bytes.
pub fn parse_padded<const N: usize>(value: &str) -> Result<ByteArray<N>, ConversionError> {
    let stripped = strip_prefix(value);
    let even = if stripped.len() % 2 == 1 {
        format!("0{stripped}")
    } else {
        stripped.to_string()
    };
    let decoded = hex::decode(&even).map_err(|err| ConversionError::Hex(value.to_string(), err))?;
    if decoded.len() > N {
        return Err(ConversionError::TooWide(value.to_string(), N));
    }
    let mut bytes = [0u8; N];
    bytes[N - decoded.len()..].copy_from_slice(&decoded);
    Ok(ByteArray(bytes))
}

/// Parses a hex string expected to be exactly `N` bytes wide (hashes,
/// addresses): no padding, a width mismatch is an error.
pub fn parse_exact<const N: usize>(value: &str) -> Result<ByteArray<N>, ConversionError> {
    let stripped = strip_prefix(value);
    let decoded = hex::decode(stripped).map_err(|err| ConversionError::Hex(value.to_string(), err))?;
    let bytes: [u8; N] = decoded
        .try_into()
        .map_err(|_| ConversionError::TooWide(value.to_string(), N))?;
    Ok(ByteArray(bytes))
}

pub fn parse_bytes(value: &str) -> Result<Vec<u8>, ConversionError> {
    let stripped = strip_prefix(value);
    hex::decode(stripped).map_err(|err| ConversionError::Hex(value.to_string(), err))
}

pub fn parse_i64(value: &str) -> Result<i64, ConversionError> {
    let stripped = strip_prefix(value);
    i64::from_str_radix(stripped, 16).map_err(|_| ConversionError::TooWide(value.to_string(), 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_short_quantities() {
        let parsed: ByteArray<32> = parse_padded("0x5").unwrap();
        assert_eq!(parsed.0[31], 5);
        assert!(parsed.0[..31].iter().all(|b| *b == 0));
    }

    #[test]
    fn rejects_overflowing_quantities() {
        let err = parse_padded::<4>("0x1_0000_0000_00").unwrap_err();
        assert!(matches!(err, ConversionError::Hex(_, _) | ConversionError::TooWide(_, _)));
    }

    #[test]
    fn parses_exact_width_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        let parsed: ByteArray<32> = parse_exact(&hash).unwrap();
        assert_eq!(parsed.0[0], 0xab);
    }

    #[test]
    fn rejects_wrong_width_hash() {
        let short = "0xabcd";
        let err = parse_exact::<32>(short).unwrap_err();
        assert!(matches!(err, ConversionError::TooWide(_, _)));
    }
}
