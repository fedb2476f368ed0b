//! Lexical view of SQL text
//!
//! Splits a statement into code, string literals and comments so that
//! keyword and table scans only ever look at code. [`mask`] keeps byte
//! offsets stable, so a match found in the masked text can be spliced back
//! into the original.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SUBQUERY_START: Regex = Regex::new(r"(?i)^\s*(?:SELECT|WITH)\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Code,
    /// `'...'`, quotes included; `''` is an escaped quote
    Literal,
    /// `--` up to, not including, the newline
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    pub kind: SegmentKind,
    pub text: &'a str,
}

pub fn segments(sql: &str) -> Vec<Segment<'_>> {
    let bytes = sql.as_bytes();
    let mut out = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let (kind, end) = match (bytes[i], bytes.get(i + 1)) {
            (b'\'', _) => (SegmentKind::Literal, literal_end(bytes, i)),
            (b'-', Some(b'-')) => (
                SegmentKind::LineComment,
                find_from(bytes, i, b"\n").unwrap_or(bytes.len()),
            ),
            (b'/', Some(b'*')) => (
                SegmentKind::BlockComment,
                find_from(bytes, i + 2, b"*/").map_or(bytes.len(), |p| p + 2),
            ),
            _ => {
                i += 1;
                continue;
            }
        };
        if start < i {
            out.push(Segment {
                kind: SegmentKind::Code,
                text: &sql[start..i],
            });
        }
        out.push(Segment {
            kind,
            text: &sql[i..end],
        });
        start = end;
        i = end;
    }

    if start < bytes.len() {
        out.push(Segment {
            kind: SegmentKind::Code,
            text: &sql[start..],
        });
    }
    out
}

fn literal_end(bytes: &[u8], open: usize) -> usize {
    let mut i = open + 1;
    while i < bytes.len() {
        if bytes[i] == b'\'' {
            if bytes.get(i + 1) == Some(&b'\'') {
                i += 2;
                continue;
            }
            return i + 1;
        }
        i += 1;
    }
    bytes.len()
}

fn find_from(bytes: &[u8], from: usize, needle: &[u8]) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

/// Blank out literal contents (quotes kept) and whole comments with spaces.
/// The result has the same byte length as `sql`.
pub fn mask(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    for segment in segments(sql) {
        match segment.kind {
            SegmentKind::Code => out.push_str(segment.text),
            SegmentKind::Literal => {
                let closed = segment.text.len() > 1 && segment.text.ends_with('\'');
                let inner = segment.text.len() - if closed { 2 } else { 1 };
                out.push('\'');
                out.extend(std::iter::repeat(' ').take(inner));
                if closed {
                    out.push('\'');
                }
            }
            SegmentKind::LineComment | SegmentKind::BlockComment => {
                out.extend(std::iter::repeat(' ').take(segment.text.len()))
            }
        }
    }
    out
}

/// True when byte offset `pos` of already-masked SQL sits inside parentheses
/// that do not open a subquery, as in `TRIM(' ' FROM x)` or
/// `EXTRACT(YEAR FROM d)`.
pub fn inside_function_call(masked: &str, pos: usize) -> bool {
    let mut scopes: Vec<bool> = Vec::new();
    for (i, c) in masked[..pos.min(masked.len())].char_indices() {
        match c {
            '(' => scopes.push(!SUBQUERY_START.is_match(&masked[i + 1..])),
            ')' => {
                scopes.pop();
            }
            _ => {}
        }
    }
    scopes.last().copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments() {
        let kinds: Vec<(SegmentKind, &str)> =
            segments("SELECT 'it''s' -- note\nFROM /* x */ t")
                .iter()
                .map(|s| (s.kind, s.text))
                .collect();
        assert_eq!(
            kinds,
            vec![
                (SegmentKind::Code, "SELECT "),
                (SegmentKind::Literal, "'it''s'"),
                (SegmentKind::Code, " "),
                (SegmentKind::LineComment, "-- note"),
                (SegmentKind::Code, "\nFROM "),
                (SegmentKind::BlockComment, "/* x */"),
                (SegmentKind::Code, " t"),
            ]
        );
    }

    #[test]
    fn test_mask_keeps_offsets() {
        let sql = "SELECT t.CaseId FROM DUI.v_caseheaders t WHERE t.Narrative = 'released from custody'";
        let masked = mask(sql);
        assert_eq!(masked.len(), sql.len());
        assert!(!masked.contains("custody"));
        assert!(masked.ends_with("= '                     '"));

        assert_eq!(mask("DROP/**/TABLE x"), "DROP    TABLE x");
        assert_eq!(mask("a -- gone\nb"), "a        \nb");
        assert_eq!(mask("x = 'café'").len(), "x = 'café'".len());
        // Unterminated literal runs to the end
        assert_eq!(mask("x = 'open"), "x = '    ");
    }

    #[test]
    fn test_function_scope() {
        let sql = "SELECT TRIM(' ' FROM t.Narrative) FROM (SELECT a FROM b) q";
        let masked = mask(sql);
        let froms: Vec<bool> = masked
            .match_indices("FROM")
            .map(|(pos, _)| inside_function_call(&masked, pos))
            .collect();
        assert_eq!(froms, vec![true, false, false]);
    }
}
