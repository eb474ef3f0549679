//! Fact log codec for hive build state.
//!
//! A fact is an ordered tuple `(predicate, term…)`. The log is plain text: each
//! fact is written as `(predicate|term|term)` followed by a newline, with the
//! control characters inside every piece escaped (see [`escape`]).
//!
//! Decoding is forgiving:
//! - bad escape sequences are kept verbatim and reported, never fatal;
//! - a trailing record with no closing delimiter (a crash mid-write) ends the
//!   log without producing a fact or consuming any bytes.
//!
//! The codec is pure; reading and writing files is left to the caller.

pub mod escape;

pub use escape::{quote_term, unquote_term, EscapeError, CLOSE, ESCAPE, OPEN, SEPARATOR};

/// Record terminator written after every fact.
pub const TERMINATOR: char = '\n';

/// One persisted tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fact {
    pub predicate: String,
    pub terms: Vec<String>,
}

impl Fact {
    /// Create a fact from a predicate and its terms.
    pub fn new<I, T>(predicate: impl Into<String>, terms: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Fact {
            predicate: predicate.into(),
            terms: terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// A fact decoded from the log, together with any escape problems found in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFact {
    pub fact: Fact,
    pub errors: Vec<EscapeError>,
}

/// Append the encoding of one fact to `buf`.
pub fn append_fact<S: AsRef<str>>(buf: &mut String, predicate: &str, terms: &[S]) {
    buf.push(OPEN);
    buf.push_str(&quote_term(predicate));
    for term in terms {
        buf.push(SEPARATOR);
        buf.push_str(&quote_term(term.as_ref()));
    }
    buf.push(CLOSE);
    buf.push(TERMINATOR);
}

/// Encode a sequence of facts in order.
pub fn encode<'a>(facts: impl IntoIterator<Item = &'a Fact>) -> String {
    let mut buf = String::new();
    for fact in facts {
        append_fact(&mut buf, &fact.predicate, &fact.terms);
    }
    buf
}

/// Locate the next record in `input`.
///
/// Returns the raw record body (between the delimiters) and the number of
/// bytes consumed through its closing delimiter. When no record starts in
/// `input` the whole input is consumed; when a record starts but never closes,
/// nothing is produced and nothing is consumed.
pub fn split_fact(input: &str) -> (Option<&str>, usize) {
    let Some(open) = input.find(OPEN) else {
        return (None, input.len());
    };
    let start = open + OPEN.len_utf8();
    match input[start..].find(CLOSE) {
        Some(len) => (
            Some(&input[start..start + len]),
            start + len + CLOSE.len_utf8(),
        ),
        None => (None, 0),
    }
}

/// Split a raw record body into predicate and terms, unescaping each piece.
pub fn parse_fact(body: &str) -> ParsedFact {
    let mut errors = Vec::new();
    let mut pieces = body.split(SEPARATOR).map(|raw| {
        let (piece, mut piece_errors) = unquote_term(raw);
        errors.append(&mut piece_errors);
        piece
    });
    let predicate = pieces.next().unwrap_or_default();
    let terms = pieces.collect();
    ParsedFact {
        fact: Fact { predicate, terms },
        errors,
    }
}

/// Streaming decoder over an encoded log.
///
/// Yields facts in file order and stops at the end of input or at the first
/// unterminated record.
#[derive(Debug, Clone)]
pub struct Facts<'a> {
    rest: &'a str,
    consumed: usize,
}

impl<'a> Facts<'a> {
    pub fn new(input: &'a str) -> Self {
        Facts {
            rest: input,
            consumed: 0,
        }
    }

    /// Bytes consumed so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Whether decoding stopped on a record with no closing delimiter.
    pub fn is_truncated(&self) -> bool {
        self.rest.contains(OPEN)
    }
}

impl Iterator for Facts<'_> {
    type Item = ParsedFact;

    fn next(&mut self) -> Option<ParsedFact> {
        let (body, n) = split_fact(self.rest);
        self.rest = &self.rest[n..];
        self.consumed += n;
        body.map(parse_fact)
    }
}

/// Decode every complete fact in `input`, discarding escape diagnostics.
pub fn decode(input: &str) -> Vec<Fact> {
    Facts::new(input).map(|parsed| parsed.fact).collect()
}

/// Feed each complete fact to `process`, stopping at the first error.
///
/// Returns the number of bytes consumed.
pub fn process_facts<E>(
    input: &str,
    mut process: impl FnMut(ParsedFact) -> Result<(), E>,
) -> Result<usize, E> {
    let mut facts = Facts::new(input);
    for parsed in facts.by_ref() {
        process(parsed)?;
    }
    Ok(facts.consumed())
}

/// In-memory, append-only fact log.
#[derive(Debug, Clone, Default)]
pub struct FactLog {
    buf: String,
}

impl FactLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one fact.
    pub fn append<S: AsRef<str>>(&mut self, predicate: &str, terms: &[S]) {
        append_fact(&mut self.buf, predicate, terms);
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    /// Iterate over the facts appended so far.
    pub fn facts(&self) -> Facts<'_> {
        Facts::new(&self.buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_predicate_and_terms() {
        let mut log = FactLog::new();
        log.append("result-v0", &["web", "/nix/store/abc-web"]);
        assert_eq!(log.as_str(), "(result-v0|web|/nix/store/abc-web)\n");
    }

    #[test]
    fn encodes_predicate_without_terms() {
        let mut buf = String::new();
        append_fact::<&str>(&mut buf, "marker", &[]);
        assert_eq!(buf, "(marker)\n");
    }

    #[test]
    fn split_consumes_through_close() {
        let (body, n) = split_fact("(a|b)\n(c)\n");
        assert_eq!(body, Some("a|b"));
        assert_eq!(n, 5);
    }

    #[test]
    fn split_without_open_consumes_everything() {
        assert_eq!(split_fact("\n\n  "), (None, 4));
    }

    #[test]
    fn split_unterminated_consumes_nothing() {
        assert_eq!(split_fact("(result-v0|web"), (None, 0));
    }

    #[test]
    fn parse_empty_body_yields_empty_predicate() {
        let parsed = parse_fact("");
        assert_eq!(parsed.fact, Fact::new("", Vec::<String>::new()));
    }

    #[test]
    fn parse_unescapes_each_piece_independently() {
        let parsed = parse_fact("p~q|a~pb|~s~e");
        assert_eq!(parsed.fact, Fact::new("p~", ["a|b", "()"]));
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn parse_reports_bad_escapes_without_failing() {
        let parsed = parse_fact("p|~x|ok");
        assert_eq!(parsed.fact, Fact::new("p", ["~x", "ok"]));
        assert_eq!(parsed.errors.len(), 1);
    }

    #[test]
    fn decode_skips_noise_between_records() {
        let facts = decode("junk (a|1) more junk\n(b|2)\n");
        assert_eq!(facts, vec![Fact::new("a", ["1"]), Fact::new("b", ["2"])]);
    }

    #[test]
    fn truncated_tail_is_not_an_error() {
        let mut facts = Facts::new("(a|1)\n(b|2");
        assert_eq!(facts.next().map(|p| p.fact), Some(Fact::new("a", ["1"])));
        assert!(facts.next().is_none());
        assert!(facts.is_truncated());
        assert_eq!(facts.consumed(), 5);
    }

    #[test]
    fn process_stops_on_callback_error() {
        let mut seen = Vec::new();
        let result = process_facts("(a)\n(b)\n(c)\n", |parsed| {
            if parsed.fact.predicate == "b" {
                return Err("stop");
            }
            seen.push(parsed.fact.predicate);
            Ok(())
        });
        assert_eq!(result, Err("stop"));
        assert_eq!(seen, vec!["a".to_string()]);
    }

    #[test]
    fn fact_log_replays_in_append_order() {
        let mut log = FactLog::new();
        log.append("result-v0", &["a", "/out/1"]);
        log.append("result-v0", &["a", "/out/2"]);
        let facts: Vec<_> = log.facts().map(|p| p.fact).collect();
        assert_eq!(facts[0].terms[1], "/out/1");
        assert_eq!(facts[1].terms[1], "/out/2");
    }
}
