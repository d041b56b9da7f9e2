//! Activation and recovery code parsing.
//!
//! An activation code is four dash-separated groups of five characters from
//! the Base32 alphabet (A–Z, 2–7), e.g. `BBBBB-BBBBB-BBBBB-BTA6Q`. The final
//! character is a check character: interpreting the leading 19 characters as
//! a base-32 number and reducing it modulo 10 must match the final
//! character's alphabet index modulo 10.
//!
//! A detached ECDSA signature may ride along after a `#` separator; the
//! session verifies it against the master server public key during the first
//! activation step.
//!
//! Recovery codes share the grammar (without a signature) and pair with a
//! ten-digit decimal PUK.

use crate::{Error, Result};

/// Separator between the code and its detached signature.
pub const SIGNATURE_SEPARATOR: char = '#';

/// Length of the textual code including dashes.
pub const CODE_LENGTH: usize = 23;

const GROUP_LENGTH: usize = 5;
const DASH_POSITIONS: [usize; 3] = [5, 11, 17];

/// Parsed activation code with an optional detached signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationCode {
    /// The 23-character code, dashes included.
    pub activation_code: String,
    /// Detached Base64 signature of the code string, when scanned from a QR
    /// code.
    pub activation_signature: Option<String>,
}

/// Alphabet index of a Base32 character (A–Z, 2–7), or `None` for anything
/// else.
fn char_value(c: char) -> Option<u32> {
    match c {
        'A'..='Z' => Some(c as u32 - 'A' as u32),
        '2'..='7' => Some(c as u32 - '2' as u32 + 26),
        _ => None,
    }
}

/// Structural validation: length, dash placement, alphabet.
fn has_valid_structure(code: &str) -> bool {
    if code.len() != CODE_LENGTH || !code.is_ascii() {
        return false;
    }
    for (i, c) in code.chars().enumerate() {
        if DASH_POSITIONS.contains(&i) {
            if c != '-' {
                return false;
            }
        } else if char_value(c).is_none() {
            return false;
        }
    }
    true
}

/// Check-character validation over a structurally valid code.
fn has_valid_checksum(code: &str) -> bool {
    let values: Vec<u32> = code.chars().filter_map(char_value).collect();
    debug_assert_eq!(values.len(), 20);

    // Horner evaluation of the leading 19 digits as a base-32 number mod 10.
    let checksum = values[..19].iter().fold(0u32, |acc, &v| (acc * 32 + v) % 10);
    values[19] % 10 == checksum
}

/// Whether `code` is a well-formed activation code with a correct check
/// character.
pub fn validate_activation_code(code: &str) -> bool {
    has_valid_structure(code) && has_valid_checksum(code)
}

/// Parse a bare activation code (no signature part).
///
/// # Errors
///
/// [`Error::WrongParam`] for a malformed structure, [`Error::Encryption`] for
/// a failed check character — a scanning or transmission error is
/// indistinguishable from tampering at this point.
pub fn parse_activation_code(code: &str) -> Result<ActivationCode> {
    if code.contains(SIGNATURE_SEPARATOR) {
        return Err(Error::WrongParam(
            "Unexpected signature part in activation code".into(),
        ));
    }
    if !has_valid_structure(code) {
        return Err(Error::WrongParam("Malformed activation code".into()));
    }
    if !has_valid_checksum(code) {
        return Err(Error::Encryption("Activation code check failed".into()));
    }
    Ok(ActivationCode {
        activation_code: code.to_owned(),
        activation_signature: None,
    })
}

/// Parse an activation code in the `CODE#SIGNATURE` form scanned from a QR
/// code. The signature part may be absent.
pub fn parse_activation_code_with_signature(input: &str) -> Result<ActivationCode> {
    match input.split_once(SIGNATURE_SEPARATOR) {
        None => parse_activation_code(input),
        Some((code, signature)) => {
            if signature.is_empty() || signature.contains(SIGNATURE_SEPARATOR) {
                return Err(Error::WrongParam("Malformed signature part".into()));
            }
            let mut parsed = parse_activation_code(code)?;
            parsed.activation_signature = Some(signature.to_owned());
            Ok(parsed)
        }
    }
}

/// Whether `code` is a well-formed recovery code. Recovery codes use the
/// activation code grammar and never carry a signature.
pub fn validate_recovery_code(code: &str) -> bool {
    validate_activation_code(code)
}

/// Whether `puk` is a valid recovery PUK: exactly ten decimal digits.
pub fn validate_recovery_puk(puk: &str) -> bool {
    puk.len() == 10 && puk.chars().all(|c| c.is_ascii_digit())
}

/// Validate and auto-correct one typed character of an activation code.
///
/// Lowercase letters are uppercased and the easily confused `0`/`1` map to
/// `O`/`I`. Returns `None` when the character cannot appear in a code.
pub fn validate_typed_character(c: char) -> Option<char> {
    let corrected = match c {
        '0' => 'O',
        '1' => 'I',
        'a'..='z' => c.to_ascii_uppercase(),
        _ => c,
    };
    char_value(corrected).map(|_| corrected)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_CODE: &str = "BBBBB-BBBBB-BBBBB-BTA6Q";

    #[test]
    fn test_parse_valid_code() {
        let parsed = parse_activation_code(VALID_CODE).unwrap();
        assert_eq!(parsed.activation_code, VALID_CODE);
        assert!(parsed.activation_signature.is_none());
    }

    #[test]
    fn test_parse_is_idempotent() {
        let once = parse_activation_code(VALID_CODE).unwrap();
        let twice = parse_activation_code(&once.activation_code).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_parse_with_signature() {
        let parsed =
            parse_activation_code_with_signature(&format!("{VALID_CODE}#QUJD")).unwrap();
        assert_eq!(parsed.activation_code, VALID_CODE);
        assert_eq!(parsed.activation_signature.as_deref(), Some("QUJD"));
    }

    #[test]
    fn test_parse_rejects_empty_signature() {
        assert!(parse_activation_code_with_signature(&format!("{VALID_CODE}#")).is_err());
    }

    #[test]
    fn test_malformed_structure_is_wrong_param() {
        for code in [
            "",
            "BBBBB",
            "BBBBB-BBBBB-BBBBB-BTA6",   // short
            "BBBBB-BBBBB-BBBBB-BTA6QQ", // long
            "BBBBBB-BBBB-BBBBB-BTA6Q",  // dash misplaced
            "BBBBB-BBBBB-BBBBB-BTA61",  // '1' not in alphabet
            "bbbbb-bbbbb-bbbbb-bta6q",  // lowercase
        ] {
            match parse_activation_code(code) {
                Err(Error::WrongParam(_)) => {}
                other => panic!("{code:?} gave {other:?}"),
            }
        }
    }

    #[test]
    fn test_bad_checksum_is_encryption() {
        // 'Q' -> 'R' breaks the check character.
        match parse_activation_code("BBBBB-BBBBB-BBBBB-BTA6R") {
            Err(Error::Encryption(_)) => {}
            other => panic!("expected Encryption, got {other:?}"),
        }
        // Flipping a leading character breaks it too.
        match parse_activation_code("CBBBB-BBBBB-BBBBB-BTA6Q") {
            Err(Error::Encryption(_)) => {}
            other => panic!("expected Encryption, got {other:?}"),
        }
    }

    /// Exhaustive flip of the check character: exactly the alphabet indices
    /// congruent to the checksum mod 10 survive.
    #[test]
    fn test_check_character_flip_survival() {
        let survivors: Vec<char> = "ABCDEFGHIJKLMNOPQRSTUVWXYZ234567"
            .chars()
            .filter(|&c| {
                let candidate = format!("BBBBB-BBBBB-BBBBB-BTA6{c}");
                validate_activation_code(&candidate)
            })
            .collect();
        // Indices 6, 16, 26 -> 'G', 'Q', '2'.
        assert_eq!(survivors, vec!['G', 'Q', '2']);
    }

    #[test]
    fn test_recovery_puk_validation() {
        assert!(validate_recovery_puk("0123456789"));
        assert!(!validate_recovery_puk("012345678"));
        assert!(!validate_recovery_puk("01234567890"));
        assert!(!validate_recovery_puk("012345678a"));
    }

    #[test]
    fn test_typed_character_correction() {
        assert_eq!(validate_typed_character('0'), Some('O'));
        assert_eq!(validate_typed_character('1'), Some('I'));
        assert_eq!(validate_typed_character('b'), Some('B'));
        assert_eq!(validate_typed_character('B'), Some('B'));
        assert_eq!(validate_typed_character('7'), Some('7'));
        assert_eq!(validate_typed_character('8'), None);
        assert_eq!(validate_typed_character('-'), None);
    }
}
