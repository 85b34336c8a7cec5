//! Whitespace-insensitive token comparison, exact or numeric

use crate::compare::reader::{ByteCursor, Readable};
use crate::compare::{ComparisonResult, Divergence};
use crate::error::StructuredError;

const MAX_SHOWN: usize = 64;

/// How two tokens are matched
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum TokenRule {
    Exact,
    Numeric { abs_tolerance: f64, rel_tolerance: f64 },
}

impl TokenRule {
    fn matches(&self, expected: &[u8], actual: &[u8]) -> bool {
        if expected == actual {
            return true;
        }
        match *self {
            TokenRule::Exact => false,
            TokenRule::Numeric {
                abs_tolerance,
                rel_tolerance,
            } => match (parse_number(expected), parse_number(actual)) {
                (Some(e), Some(a)) => numbers_match(e, a, abs_tolerance, rel_tolerance),
                _ => false,
            },
        }
    }
}

/// Parse a token that looks like a decimal number
fn parse_number(token: &[u8]) -> Option<f64> {
    let looks_numeric = token.iter().any(u8::is_ascii_digit)
        && token
            .iter()
            .all(|&b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'));
    if !looks_numeric {
        return None;
    }
    std::str::from_utf8(token).ok()?.parse().ok()
}

fn numbers_match(expected: f64, actual: f64, abs_tolerance: f64, rel_tolerance: f64) -> bool {
    if expected == actual {
        return true;
    }
    if !expected.is_finite() || !actual.is_finite() {
        return false;
    }
    let diff = (expected - actual).abs();
    diff <= abs_tolerance || diff <= rel_tolerance * expected.abs()
}

fn shown(token: &[u8]) -> String {
    let text = String::from_utf8_lossy(token);
    if text.chars().count() > MAX_SHOWN {
        let cut: String = text.chars().take(MAX_SHOWN).collect();
        format!("{cut}...")
    } else {
        text.into_owned()
    }
}

fn count_rest(cursor: &mut ByteCursor<'_>) -> Result<u64, StructuredError> {
    let mut count = 0;
    while cursor.next_token()?.is_some() {
        count += 1;
    }
    Ok(count)
}

/// Compare token sequences
///
/// Stops at the first differing token. When one side runs out first the
/// other is counted to the end so the message can give both totals.
pub(crate) fn compare(
    expected: &mut dyn Readable,
    actual: &mut dyn Readable,
    rule: TokenRule,
) -> Result<ComparisonResult, StructuredError> {
    let mut expected = ByteCursor::new(expected);
    let mut actual = ByteCursor::new(actual);
    let mut index: u64 = 0;

    loop {
        let e = expected.next_token()?;
        let a = actual.next_token()?;

        match (e, a) {
            (None, None) => return Ok(ComparisonResult::matched()),
            (Some(e), Some(a)) => {
                if !rule.matches(&e, &a) {
                    let message = format!(
                        "token {index} differs: expected '{}', found '{}'",
                        shown(&e),
                        shown(&a)
                    );
                    return Ok(ComparisonResult::mismatch(Divergence::Token { index }, message));
                }
            }
            (Some(_), None) => {
                let total = index + 1 + count_rest(&mut expected)?;
                let message = format!("expected {total} tokens, found {index}");
                return Ok(ComparisonResult::mismatch(Divergence::Token { index }, message));
            }
            (None, Some(_)) => {
                let total = index + 1 + count_rest(&mut actual)?;
                let message = format!("expected {index} tokens, found {total}");
                return Ok(ComparisonResult::mismatch(Divergence::Token { index }, message));
            }
        }
        index += 1;
    }
}
