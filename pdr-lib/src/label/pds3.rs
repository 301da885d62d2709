//! Tolerant PDS3 ODL/PVL label parsing.
//!
//! Real-world labels break the grammar in many small ways, so parsing is line oriented:
//! a statement starts on a line that looks like `KEY = VALUE` and continues across any
//! following lines until its quotes and brackets are balanced and a new statement begins.
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use super::{Block, LabelFormat, Metadata, Quantity, Value};
use crate::{DecodeWarning, Error, Result};

/// Maximum number of bytes searched for an attached label.
pub const DEFAULT_LABEL_LIMIT: usize = 1000 * 1024;

const BLOCK_OPENERS: [&str; 4] = ["OBJECT", "GROUP", "BEGIN_OBJECT", "BEGIN_GROUP"];
const BLOCK_CLOSERS: [&str; 2] = ["END_OBJECT", "END_GROUP"];
/// Pointers that legitimately repeat and are never indexed.
const UNINDEXED_POINTERS: [&str; 3] = ["^STRUCTURE", "^DESCRIPTION", "^PDS_OBJECT"];

/// Returns the leading label portion of `head`.
///
/// The label ends after a line consisting of `END` or at the first run of three NUL bytes.
/// When neither is found the whole buffer is returned.
pub fn trim_label(head: &[u8]) -> &[u8] {
    let mut from = 0;
    while let Some(pos) = find(&head[from..], b"\nEND") {
        let end = from + pos + 4;
        let rest = &head[end..];
        let pad = rest.iter().take_while(|b| **b == b' ').count();
        match rest.get(pad) {
            None | Some(b'\r') | Some(b'\n') => return &head[..end],
            _ => from = end,
        }
    }
    if let Some(pos) = find(head, b"\x00\x00\x00") {
        return &head[..pos];
    }
    head
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse PDS3 label text into [Metadata].
///
/// # Errors
/// [Error::LabelSyntax] when the text contains no statements at all, or when a quoted
/// string or bracketed collection is never closed.
pub fn parse(text: &str) -> Result<Metadata> {
    let (block, warnings) = parse_block(text)?;
    let fieldnames = block.all_keys();
    Ok(
        Metadata::new(block, fieldnames, LabelFormat::Pds3, text.to_string())
            .with_warnings(warnings),
    )
}

/// Parse label text into a bare [Block], e.g., for `^STRUCTURE` format files.
pub fn parse_block(text: &str) -> Result<(Block, Vec<DecodeWarning>)> {
    let mut warnings = Vec::new();
    let uncommented = strip_comments(text);
    let statements = chunk_statements(&uncommented, &mut warnings)?;
    trace!(count = statements.len(), "chunked label statements");

    let mut root = Block::new();
    let mut stack: Vec<(String, Block)> = Vec::new();
    for st in statements {
        let key = st.key.to_ascii_uppercase();
        if BLOCK_OPENERS.contains(&key.as_str()) {
            let name = match literalize(&st.value) {
                Value::Text(s) => s,
                other => other.to_string(),
            };
            stack.push((name, Block::new()));
        } else if BLOCK_CLOSERS.contains(&key.as_str()) {
            // Closer names are not checked against the opener.
            match stack.pop() {
                Some((name, block)) => {
                    current(&mut root, &mut stack).push(name, Value::Block(block));
                }
                None => debug!(line = st.line, "ignoring {key} outside of any block"),
            }
        } else {
            current(&mut root, &mut stack).push(st.key, literalize(&st.value));
        }
    }
    if !stack.is_empty() {
        let names: Vec<String> = stack.iter().map(|(n, _)| n.clone()).collect();
        warn!(?names, "label ended with open blocks");
        warnings.push(DecodeWarning::new(
            "LABEL",
            format!("blocks never closed: {}", names.join(", ")),
        ));
    }
    while let Some((name, block)) = stack.pop() {
        current(&mut root, &mut stack).push(name, Value::Block(block));
    }

    index_duplicate_pointers(&mut root);
    Ok((root, warnings))
}

fn current<'a>(root: &'a mut Block, stack: &'a mut [(String, Block)]) -> &'a mut Block {
    match stack.last_mut() {
        Some((_, block)) => block,
        None => root,
    }
}

/// Remove `/* ... */` comments outside quoted strings, keeping line breaks so line numbers
/// stay meaningful. A comment that is never closed ends at the end of its line.
fn strip_comments(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut in_quote = false;
    let mut last = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' => in_quote = !in_quote,
            b'/' if !in_quote && bytes.get(i + 1) == Some(&b'*') => {
                out.push_str(&text[last..i]);
                let end = match text[i + 2..].find("*/") {
                    Some(pos) => i + 2 + pos + 2,
                    None => text[i..].find('\n').map_or(text.len(), |pos| i + pos),
                };
                out.extend(text[i..end].chars().filter(|c| *c == '\n'));
                last = end;
                i = end;
                continue;
            }
            _ => {}
        }
        i += 1;
    }
    out.push_str(&text[last..]);
    out
}

#[derive(Debug)]
struct Statement {
    line: usize,
    key: String,
    value: String,
    /// Never emitted; kept only so its continuation lines are consumed.
    discard: bool,
    in_quote: bool,
    depth: i32,
}

impl Statement {
    fn new(line: usize, key: &str, value: &str) -> Self {
        let mut st = Self {
            line,
            key: key.to_string(),
            value: String::new(),
            discard: false,
            in_quote: false,
            depth: 0,
        };
        st.append(value);
        st
    }

    fn append(&mut self, text: &str) {
        if !self.value.is_empty() {
            self.value.push(' ');
        }
        self.value.push_str(text);
        for c in text.chars() {
            match c {
                '"' => self.in_quote = !self.in_quote,
                '(' | '{' if !self.in_quote => self.depth += 1,
                ')' | '}' if !self.in_quote => self.depth -= 1,
                _ => {}
            }
        }
    }

    fn is_open(&self) -> bool {
        self.in_quote || self.depth > 0
    }
}

/// Index of the first `=` outside double quotes.
fn top_level_eq(s: &str) -> Option<usize> {
    let mut in_quote = false;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            '=' if !in_quote => return Some(i),
            _ => {}
        }
    }
    None
}

fn first_word(line: &str) -> &str {
    line.split(|c: char| c.is_whitespace() || c == '=')
        .next()
        .unwrap_or_default()
}

fn is_assignment(line: &str) -> bool {
    if BLOCK_CLOSERS.contains(&first_word(line).to_ascii_uppercase().as_str()) {
        return true;
    }
    if top_level_eq(line).is_none() {
        return false;
    }
    // Prose continuation lines sometimes contain '='; keys are upper case.
    let start: String = line.chars().take(8).collect();
    start == start.to_uppercase()
}

fn is_terminal(line: &str) -> bool {
    line.eq_ignore_ascii_case("END")
}

fn chunk_statements(text: &str, warnings: &mut Vec<DecodeWarning>) -> Result<Vec<Statement>> {
    let mut statements: Vec<Statement> = Vec::new();
    let mut current: Option<Statement> = None;
    let mut orphan: Option<(usize, String)> = None;

    let flush = |current: &mut Option<Statement>, statements: &mut Vec<Statement>| {
        if let Some(st) = current.take() {
            if !st.discard {
                statements.push(st);
            }
        }
    };

    for (lineno, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let lineno = lineno + 1;
        if let Some(st) = current.as_mut() {
            if st.is_open() {
                st.append(line);
                continue;
            }
        }
        if is_terminal(line) {
            flush(&mut current, &mut statements);
            break;
        }
        if !is_assignment(line) {
            match current.as_mut() {
                Some(st) => st.append(line),
                None => {
                    debug!(line = lineno, "ignoring text outside of any statement");
                    orphan.get_or_insert((lineno, line.to_string()));
                }
            }
            continue;
        }
        flush(&mut current, &mut statements);
        let (key, head) = match top_level_eq(line) {
            Some(pos) => (line[..pos].trim(), line[pos + 1..].trim()),
            None => (line, ""),
        };
        let mut st = Statement::new(lineno, key, head);
        if top_level_eq(head).is_some() {
            warn!(line = lineno, key, "skipping statement with extra '='");
            warnings.push(DecodeWarning::new(
                "LABEL",
                format!("skipped statement with extra '=' at line {lineno}: {key}"),
            ));
            st.discard = true;
        }
        current = Some(st);
    }

    if let Some(st) = current.as_ref() {
        if st.is_open() {
            let text = text.lines().nth(st.line - 1).unwrap_or_default().trim();
            return Err(Error::LabelSyntax {
                line: st.line,
                text: text.to_string(),
            });
        }
    }
    flush(&mut current, &mut statements);

    if statements.is_empty() {
        if let Some((line, text)) = orphan {
            return Err(Error::LabelSyntax { line, text });
        }
    }
    Ok(statements)
}

/// Split on `sep` outside quotes and brackets.
fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0;
    let mut in_quote = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '"' => in_quote = !in_quote,
            '(' | '{' if !in_quote => depth += 1,
            ')' | '}' if !in_quote => depth -= 1,
            c if c == sep && !in_quote && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&s[start..]);
    parts
}

fn parse_based(s: &str) -> Option<i64> {
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s.strip_prefix('+').unwrap_or(s)),
    };
    let body = body.strip_suffix('#')?;
    let (base, digits) = body.split_once('#')?;
    let base: u32 = base.parse().ok()?;
    if !(2..=16).contains(&base) {
        return None;
    }
    i64::from_str_radix(digits, base).ok().map(|v| sign * v)
}

/// Integer or real literal. Words like `inf` or `NaN` are not numbers in a label.
pub(crate) fn parse_number(s: &str) -> Option<Value> {
    let s = s.trim();
    if s.is_empty() || !s.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if let Some(v) = parse_based(s) {
        return Some(Value::Integer(v));
    }
    if !s
        .chars()
        .all(|c| c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E'))
    {
        return None;
    }
    if let Ok(v) = s.parse::<i64>() {
        return Some(Value::Integer(v));
    }
    s.parse::<f64>().ok().map(Value::Real)
}

fn unquote(s: &str) -> Option<&str> {
    for q in ['"', '\''] {
        if s.len() >= 2 && s.starts_with(q) && s.ends_with(q) {
            let inner = &s[1..s.len() - 1];
            if !inner.contains(q) {
                return Some(inner);
            }
        }
    }
    None
}

fn parse_collection(inner: &str) -> Vec<Value> {
    split_top_level(inner, ',')
        .into_iter()
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(literalize)
        .collect()
}

fn parse_quantity(s: &str) -> Option<Value> {
    let body = s.strip_suffix('>')?;
    let open = body.rfind('<')?;
    let units = body[open + 1..].trim();
    let value = parse_number(&body[..open])?.as_f64()?;
    Some(Value::Quantity(Quantity::new(value, Some(units))))
}

/// Interpret the text of a statement value.
///
/// Numbers (including based integers like `16#FF#`) and quantities become numeric,
/// `( )` and `{ }` become collections, quoted strings lose their quotes. Anything else is
/// kept as text.
pub fn literalize(raw: &str) -> Value {
    let s = raw.trim();
    if let Some(inner) = unquote(s) {
        return Value::Text(inner.to_string());
    }
    if s.starts_with('(') && s.ends_with(')') {
        return Value::Sequence(parse_collection(&s[1..s.len() - 1]));
    }
    if s.starts_with('{') && s.ends_with('}') {
        return Value::Set(parse_collection(&s[1..s.len() - 1]));
    }
    if let Some(v) = parse_number(s) {
        return v;
    }
    if let Some(v) = parse_quantity(s) {
        return v;
    }
    Value::Text(s.to_string())
}

/// Rename repeated pointers (`^X` -> `^X_0`, `^X_1`, ...) together with their blocks so
/// every object keeps a distinct name. Occurrences are numbered in label order.
fn index_duplicate_pointers(root: &mut Block) {
    let mut counts: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for key in root.all_keys() {
        if key.starts_with('^') {
            let count = counts.entry(key.clone()).or_default();
            if *count == 0 {
                order.push(key);
            }
            *count += 1;
        }
    }
    for pointer in order {
        if counts[&pointer] < 2 || UNINDEXED_POINTERS.contains(&pointer.as_str()) {
            continue;
        }
        debug!(%pointer, count = counts[&pointer], "indexing duplicate pointer");
        rename_in_order(root, &pointer, &mut 0, false);
        rename_in_order(root, &pointer[1..], &mut 0, true);
    }
}

fn rename_in_order(block: &mut Block, key: &str, counter: &mut usize, blocks_only: bool) {
    for (k, v) in block.entries_mut().iter_mut() {
        if k == key && (!blocks_only || v.is_block()) {
            *k = format!("{key}_{counter}");
            *counter += 1;
        }
        if let Value::Block(child) = v {
            rename_in_order(child, key, counter, blocks_only);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals() {
        assert_eq!(literalize("12"), Value::Integer(12));
        assert_eq!(literalize("-1.5E+03"), Value::Real(-1500.0));
        assert_eq!(literalize("2#0111#"), Value::Integer(7));
        assert_eq!(literalize("16#FF#"), Value::Integer(255));
        assert_eq!(literalize("\"MEOW.CAT\""), Value::from("MEOW.CAT"));
        assert_eq!(literalize("LILY"), Value::from("LILY"));
        assert_eq!(literalize("NaN"), Value::from("NaN"));
        assert_eq!(literalize("2003-01-01T00:00:00"), Value::from("2003-01-01T00:00:00"));
        assert_eq!(
            literalize("-0.785042 <rad>"),
            Value::Quantity(Quantity::new(-0.785042, Some("rad")))
        );
    }

    #[test]
    fn pointer_tuple_is_mixed_sequence() {
        let v = literalize("(\"FILE.DAT\", 1000 <BYTES>)");
        let items = v.as_slice().unwrap();
        assert_eq!(items[0], Value::from("FILE.DAT"));
        assert!(items[1].as_quantity().unwrap().is_bytes());
        assert_eq!(items[1].as_f64(), Some(1000.0));
    }

    #[test]
    fn collections_tolerate_trailing_commas() {
        assert_eq!(
            literalize("(1, 2, \"x, y\",)"),
            Value::Sequence(vec![1.into(), 2.into(), "x, y".into()])
        );
        assert_eq!(literalize("{A}"), Value::Set(vec!["A".into()]));
        assert_eq!(
            literalize("((1, 2), (3))"),
            Value::Sequence(vec![
                Value::Sequence(vec![1.into(), 2.into()]),
                Value::Sequence(vec![3.into()])
            ])
        );
    }

    #[test]
    fn comments_are_stripped_outside_quotes() {
        let text = "A = 1 /* one */\nB = \"/* kept */\"\n/* multi\nline */C = 3\n";
        let out = strip_comments(text);
        assert_eq!(out, "A = 1 \nB = \"/* kept */\"\n\nC = 3\n");
    }

    #[test]
    fn trim_label_at_end_line() {
        let data = b"A = 1\r\nEND_OBJECT = X\r\nEND\r\n\x01\x02binary";
        assert_eq!(trim_label(data), b"A = 1\r\nEND_OBJECT = X\r\nEND");
        assert_eq!(trim_label(b"A = 1\x00\x00\x00\x00"), b"A = 1");
        assert_eq!(trim_label(b"A = 1"), b"A = 1");
    }

    #[test]
    fn extra_equals_statement_is_skipped() {
        let (block, warnings) = parse_block("A = B = C\nD = 4\n").unwrap();
        assert!(!block.contains_key("A"));
        assert_eq!(block.get("D"), Some(&Value::Integer(4)));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn equals_inside_quotes_is_kept() {
        let (block, _) = parse_block("MRO:DESC = \"PH=7,\n  STIRRED\"\n").unwrap();
        assert_eq!(block.get("MRO:DESC"), Some(&Value::from("PH=7, STIRRED")));
    }

    #[test]
    fn duplicate_pointers_are_indexed() {
        let text = "^TABLE = 1\n^TABLE = 5\nOBJECT = TABLE\nA = 1\nEND_OBJECT = TABLE\n\
                    OBJECT = TABLE\nA = 2\nEND_OBJECT\n^STRUCTURE = \"A.FMT\"\n^STRUCTURE = \"B.FMT\"\n";
        let (block, _) = parse_block(text).unwrap();
        let keys: Vec<&str> = block.keys().collect();
        assert_eq!(
            keys,
            ["^TABLE_0", "^TABLE_1", "TABLE_0", "TABLE_1", "^STRUCTURE", "^STRUCTURE"]
        );
        assert_eq!(block.find_block("TABLE_1").unwrap().get("A"), Some(&Value::Integer(2)));
    }

    #[test]
    fn unterminated_quote_is_an_error() {
        let err = parse_block("A = 1\nB = \"never closed\nC = 3\n").unwrap_err();
        match err {
            Error::LabelSyntax { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            parse_block("this is not a label\nat all\n"),
            Err(Error::LabelSyntax { line: 1, .. })
        ));
        assert!(parse_block("").unwrap().0.is_empty());
    }

    #[test]
    fn end_stops_parsing() {
        let (block, _) = parse_block("A = 1\nEND\nB = 2\n").unwrap();
        assert_eq!(block.len(), 1);
    }
}
