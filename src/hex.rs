#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FromHexError {
    /// An invalid character was found. Valid ones are: `0...9`, `a...f`
    /// or `A...F`.
    InvalidHexCharacter,

    /// The field is wider than the integer it decodes into.
    Overflow,
}

fn val(c: u8) -> Result<u8, FromHexError> {
    match c {
        b'A'..=b'F' => Ok(c - b'A' + 10),
        b'a'..=b'f' => Ok(c - b'a' + 10),
        b'0'..=b'9' => Ok(c - b'0'),
        _ => Err(FromHexError::InvalidHexCharacter),
    }
}

/// Decode a fixed-width ASCII hex field, most significant digit first.
///
/// Unlike `u16::from_str_radix`, no sign or whitespace is accepted: every
/// byte of `field` must be a hex digit.
pub fn field_to_u16(field: &[u8]) -> Result<u16, FromHexError> {
    if field.len() > 4 {
        return Err(FromHexError::Overflow);
    }

    field
        .iter()
        .try_fold(0u16, |acc, &c| Ok(acc << 4 | u16::from(val(c)?)))
}
