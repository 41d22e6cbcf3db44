//! Conversions between 160-bit on-ledger currency codes and display symbols.
//!
//! Non-standard currencies are stored as 40 hex digits that usually hold an
//! ASCII ticker right-padded with zero bytes. Decoding is lossy: trailing
//! nulls and non-printable bytes are dropped and cannot be recovered.

/// Length of a 160-bit currency code in hex digits.
pub const CURRENCY_HEX_LEN: usize = 40;

/// Decode a 40-hex-digit currency code into a printable symbol.
///
/// Never fails: malformed hex (odd length, non-hex digits) yields an empty
/// string.
pub fn decode(hex_code: &str) -> String {
    let bytes = match hex::decode(hex_code.trim()) {
        Ok(b) => b,
        Err(_) => return String::new(),
    };

    let end = bytes.iter().rposition(|&b| b != 0).map(|i| i + 1).unwrap_or(0);

    let printable: String = bytes[..end]
        .iter()
        .filter(|b| (0x20..=0x7E).contains(*b))
        .map(|&b| b as char)
        .collect();

    printable.trim().to_string()
}

/// Encode a symbol as a 40-hex-digit currency code.
///
/// Each byte becomes two uppercase hex digits, the result is right-padded
/// with zero bytes to 40 digits and truncated if the symbol alone is longer.
/// Non-ASCII characters contribute their UTF-8 bytes.
pub fn encode_padded(symbol: &str) -> String {
    let mut encoded = hex::encode_upper(symbol.as_bytes());
    encoded.truncate(CURRENCY_HEX_LEN);
    while encoded.len() < CURRENCY_HEX_LEN {
        encoded.push('0');
    }
    encoded
}

/// True for exactly 40 hex digits.
pub fn is_currency_hex(code: &str) -> bool {
    code.len() == CURRENCY_HEX_LEN && code.chars().all(|c| c.is_ascii_hexdigit())
}

/// True for a 3-character standard code other than the native asset.
pub fn is_standard_code(code: &str) -> bool {
    code.len() == 3
        && code.chars().all(|c| c.is_ascii_graphic())
        && !code.eq_ignore_ascii_case("XRP")
}

/// Human-readable symbol for any valid currency field.
pub fn display_symbol(code: &str) -> String {
    if is_currency_hex(code) {
        decode(code)
    } else {
        code.to_string()
    }
}
