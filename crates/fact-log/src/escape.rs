//! Term escaping for the fact log.
//!
//! Four characters carry structure in the log and may not appear raw inside a
//! term. Each is written as the escape character followed by a one-letter code:
//!
//! | raw | escaped |
//! |-----|---------|
//! | `~` | `~q`    |
//! | `\|` | `~p`    |
//! | `(` | `~s`    |
//! | `)` | `~e`    |

use std::borrow::Cow;

use thiserror::Error;

/// Opens a record.
pub const OPEN: char = '(';
/// Closes a record.
pub const CLOSE: char = ')';
/// Separates the predicate and terms of a record.
pub const SEPARATOR: char = '|';
/// Introduces an escape sequence.
pub const ESCAPE: char = '~';

/// Problems found while unescaping a term.
///
/// These never abort decoding: the offending characters are kept verbatim and
/// the caller decides whether to report them.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// The escape character was followed by a code that names no control character.
    #[error("unrecognized escape code {code:?} at offset {offset}")]
    UnknownCode { code: char, offset: usize },

    /// The escape character was the last character of the term.
    #[error("dangling escape at offset {offset}")]
    Dangling { offset: usize },
}

fn code_for(ch: char) -> Option<char> {
    match ch {
        ESCAPE => Some('q'),
        SEPARATOR => Some('p'),
        OPEN => Some('s'),
        CLOSE => Some('e'),
        _ => None,
    }
}

fn char_for(code: char) -> Option<char> {
    match code {
        'q' => Some(ESCAPE),
        'p' => Some(SEPARATOR),
        's' => Some(OPEN),
        'e' => Some(CLOSE),
        _ => None,
    }
}

/// Escape every control character in `term`.
///
/// Borrows when the term contains nothing to escape.
pub fn quote_term(term: &str) -> Cow<'_, str> {
    if !term.chars().any(|ch| code_for(ch).is_some()) {
        return Cow::Borrowed(term);
    }
    let mut buf = String::with_capacity(term.len() + 4);
    for ch in term.chars() {
        match code_for(ch) {
            Some(code) => {
                buf.push(ESCAPE);
                buf.push(code);
            }
            None => buf.push(ch),
        }
    }
    Cow::Owned(buf)
}

/// Reverse [`quote_term`].
///
/// Unknown or dangling escapes are kept as written and reported alongside the
/// decoded text.
pub fn unquote_term(raw: &str) -> (String, Vec<EscapeError>) {
    let mut buf = String::with_capacity(raw.len());
    let mut errors = Vec::new();
    let mut chars = raw.char_indices();
    while let Some((offset, ch)) = chars.next() {
        if ch != ESCAPE {
            buf.push(ch);
            continue;
        }
        match chars.next() {
            Some((_, code)) => match char_for(code) {
                Some(decoded) => buf.push(decoded),
                None => {
                    errors.push(EscapeError::UnknownCode { code, offset });
                    buf.push(ESCAPE);
                    buf.push(code);
                }
            },
            None => {
                errors.push(EscapeError::Dangling { offset });
                buf.push(ESCAPE);
            }
        }
    }
    (buf, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_terms_are_borrowed() {
        assert!(matches!(quote_term("/nix/store/abc-system"), Cow::Borrowed(_)));
    }

    #[test]
    fn control_characters_are_escaped() {
        assert_eq!(quote_term("a(b|c)~d"), "a~sb~pc~e~qd");
    }

    #[test]
    fn unquote_reverses_quote() {
        let (term, errors) = unquote_term("a~sb~pc~e~qd");
        assert_eq!(term, "a(b|c)~d");
        assert!(errors.is_empty());
    }

    #[test]
    fn unknown_code_is_kept_and_reported() {
        let (term, errors) = unquote_term("x~zy");
        assert_eq!(term, "x~zy");
        assert_eq!(errors, vec![EscapeError::UnknownCode { code: 'z', offset: 1 }]);
    }

    #[test]
    fn dangling_escape_is_kept_and_reported() {
        let (term, errors) = unquote_term("abc~");
        assert_eq!(term, "abc~");
        assert_eq!(errors, vec![EscapeError::Dangling { offset: 3 }]);
    }

    #[test]
    fn decoding_continues_after_bad_escape() {
        let (term, errors) = unquote_term("~x~p");
        assert_eq!(term, "~x|");
        assert_eq!(errors.len(), 1);
    }
}
