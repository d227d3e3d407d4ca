/// Unescaping of DKV Script string literals.
///
/// Supported escapes:
/// - `\n`, `\r`, `\t`, `\0`, `\\`, `\"`, `\'`
/// - `\uNNNN` (4 hex digits) and `\UNNNNNNNN` (8 hex digits)
/// - `\` followed by a newline (line continuation; both are dropped)
use bumpalo::Bump;
use core::{fmt, iter::Peekable, str::CharIndices};

/// Errors that can occur when unescaping string literals.
///
/// Positions are byte offsets into the literal content (without the quotes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnescapeError {
    /// Unknown escape sequence (e.g., `\q`)
    InvalidEscape { pos: usize, seq: String },
    /// Non-hex character inside a Unicode escape
    InvalidHexDigit { pos: usize, seq: String },
    /// Unicode escape cut short by the end of the literal
    IncompleteUnicodeEscape {
        pos: usize,
        expected: usize,
        got: usize,
    },
    /// Escape names a surrogate or a value above U+10FFFF
    InvalidUnicodeScalar { pos: usize, value: u32 },
}

impl UnescapeError {
    pub fn pos(&self) -> usize {
        match self {
            UnescapeError::InvalidEscape { pos, .. }
            | UnescapeError::InvalidHexDigit { pos, .. }
            | UnescapeError::IncompleteUnicodeEscape { pos, .. }
            | UnescapeError::InvalidUnicodeScalar { pos, .. } => *pos,
        }
    }
}

impl fmt::Display for UnescapeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnescapeError::InvalidEscape { seq, .. } => {
                write!(f, "invalid escape sequence '{}'", seq)
            }
            UnescapeError::InvalidHexDigit { seq, .. } => {
                write!(f, "invalid hex digit in '{}'", seq)
            }
            UnescapeError::IncompleteUnicodeEscape { expected, got, .. } => {
                write!(
                    f,
                    "incomplete Unicode escape: expected {} digits, got {}",
                    expected, got
                )
            }
            UnescapeError::InvalidUnicodeScalar { value, .. } => {
                write!(f, "invalid Unicode scalar value U+{:X}", value)
            }
        }
    }
}

/// Unescape the content of a string literal (without the surrounding quotes).
///
/// Returns the input itself when it contains no backslash; otherwise the
/// unescaped text is allocated in `arena`.
///
/// ```ignore
/// let arena = Bump::new();
/// assert_eq!(unescape_string(&arena, r"SET k\tv").unwrap(), "SET k\tv");
/// ```
pub fn unescape_string<'a>(arena: &'a Bump, input: &'a str) -> Result<&'a str, UnescapeError> {
    if !input.contains('\\') {
        return Ok(input);
    }

    let mut output = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();

    while let Some((pos, ch)) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }

        match chars.next() {
            Some((_, 'n')) => output.push('\n'),
            Some((_, 'r')) => output.push('\r'),
            Some((_, 't')) => output.push('\t'),
            Some((_, '0')) => output.push('\0'),
            Some((_, '\\')) => output.push('\\'),
            Some((_, '"')) => output.push('"'),
            Some((_, '\'')) => output.push('\''),
            Some((_, '\n')) => {}
            Some((_, 'u')) => output.push(read_unicode_escape(&mut chars, pos, 'u', 4)?),
            Some((_, 'U')) => output.push(read_unicode_escape(&mut chars, pos, 'U', 8)?),
            Some((_, other)) => {
                return Err(UnescapeError::InvalidEscape {
                    pos,
                    seq: format!("\\{}", other),
                });
            }
            None => {
                return Err(UnescapeError::InvalidEscape {
                    pos,
                    seq: "\\".to_string(),
                });
            }
        }
    }

    Ok(arena.alloc_str(&output))
}

fn read_unicode_escape(
    chars: &mut Peekable<CharIndices<'_>>,
    pos: usize,
    marker: char,
    digits: usize,
) -> Result<char, UnescapeError> {
    let mut value = 0u32;
    for got in 0..digits {
        match chars.next() {
            Some((_, ch)) => match ch.to_digit(16) {
                Some(digit) => value = (value << 4) | digit,
                None => {
                    return Err(UnescapeError::InvalidHexDigit {
                        pos,
                        seq: format!("\\{}{}", marker, ch),
                    });
                }
            },
            None => {
                return Err(UnescapeError::IncompleteUnicodeEscape {
                    pos,
                    expected: digits,
                    got,
                });
            }
        }
    }
    char::from_u32(value).ok_or(UnescapeError::InvalidUnicodeScalar { pos, value })
}
