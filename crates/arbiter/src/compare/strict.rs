//! Byte-exact comparison

use crate::compare::reader::{ByteCursor, Readable};
use crate::compare::{ComparisonResult, Divergence};
use crate::error::StructuredError;

fn describe_byte(byte: Option<u8>) -> String {
    match byte {
        Some(byte) => format!("'{}'", byte.escape_ascii()),
        None => "end of output".to_string(),
    }
}

/// Compare two streams byte for byte
///
/// With `allow_trailing_newline`, one side may carry a single extra `\n`
/// at the very end.
pub(crate) fn compare(
    expected: &mut dyn Readable,
    actual: &mut dyn Readable,
    allow_trailing_newline: bool,
) -> Result<ComparisonResult, StructuredError> {
    let mut expected = ByteCursor::new(expected);
    let mut actual = ByteCursor::new(actual);

    loop {
        let position = expected.position();
        let e = expected.next_byte()?;
        let a = actual.next_byte()?;

        match (e, a) {
            (None, None) => return Ok(ComparisonResult::matched()),
            (Some(x), Some(y)) if x == y => continue,
            (None, Some(b'\n')) if allow_trailing_newline && actual.peek()?.is_none() => {
                return Ok(ComparisonResult::matched());
            }
            (Some(b'\n'), None) if allow_trailing_newline && expected.peek()?.is_none() => {
                return Ok(ComparisonResult::matched());
            }
            _ => {
                let message = format!(
                    "first difference at line {}, column {}: expected {}, found {}",
                    position.line,
                    position.column,
                    describe_byte(e),
                    describe_byte(a),
                );
                return Ok(ComparisonResult::mismatch(
                    Divergence::Byte {
                        offset: position.offset,
                        line: position.line,
                        column: position.column,
                    },
                    message,
                ));
            }
        }
    }
}
