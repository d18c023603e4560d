//! Utility functions for the lilo-rust-ble crate.

/// Render a byte as the two-character lowercase hex code devices use.
///
/// # Example
///
/// ```
/// use lilo_rust_ble::byte_to_hex_code;
///
/// assert_eq!(byte_to_hex_code(0x02), "02");
/// ```
#[inline]
pub fn byte_to_hex_code(value: u8) -> String {
    format!("{:02x}", value)
}

/// Parse a two-character hex code.
///
/// Returns `None` unless `code` is exactly two hex digits.
///
/// # Example
///
/// ```
/// use lilo_rust_ble::hex_code_to_byte;
///
/// assert_eq!(hex_code_to_byte("03"), Some(3));
/// assert_eq!(hex_code_to_byte("3"), None);
/// ```
pub fn hex_code_to_byte(code: &str) -> Option<u8> {
    if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(code, 16).ok()
}
