//! Phone normalization — candidate numbers must normalize to E.164 before a
//! call slot is consumed. Unparseable numbers fail the single entry with no
//! network call.

/// Normalizes a raw candidate phone number to E.164.
///
/// Accepted inputs, after stripping spaces, dots, dashes and parentheses:
/// - `+` followed by 8–15 digits (already international)
/// - bare 10 digits (NANP local) → `+1` prefix
/// - 11 digits with a leading `1` → `+` prefix
pub fn normalize_phone(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let has_plus = trimmed.starts_with('+');

    let digits: String = trimmed
        .chars()
        .filter(|c| c.is_ascii_digit())
        .collect();

    // Reject inputs carrying anything besides digits and punctuation.
    let stray = trimmed
        .chars()
        .any(|c| !c.is_ascii_digit() && !matches!(c, '+' | ' ' | '-' | '.' | '(' | ')'));
    if stray {
        return Err(format!("phone number '{raw}' contains invalid characters"));
    }

    if has_plus {
        if (8..=15).contains(&digits.len()) {
            return Ok(format!("+{digits}"));
        }
        return Err(format!("phone number '{raw}' is not a valid E.164 number"));
    }

    match digits.len() {
        10 => Ok(format!("+1{digits}")),
        11 if digits.starts_with('1') => Ok(format!("+{digits}")),
        _ => Err(format!("phone number '{raw}' is not a valid E.164 number")),
    }
}
