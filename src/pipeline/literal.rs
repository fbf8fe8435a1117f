//! Permissive literal parser
//!
//! Parses the data-literal dialect language models fall back to when asked
//! for JSON: single-quoted strings, `True`/`False`/`None`, tuples, trailing
//! commas and adjacent string concatenation. The result is a
//! [`serde_json::Value`], so downstream validation sees one representation.

use crate::types::{AppError, Result};
use serde_json::{Map, Number, Value};

/// Same nesting limit serde_json applies
const MAX_DEPTH: usize = 128;

/// Parse a complete literal. Trailing non-whitespace is an error.
pub fn parse_literal(input: &str) -> Result<Value> {
    let mut parser = Parser::new(input);
    parser.skip_ws();
    let value = parser.value()?;
    parser.skip_ws();
    if let Some(c) = parser.peek() {
        return Err(parser.error(&format!("unexpected trailing '{}'", c)));
    }
    Ok(value)
}

struct Parser<'a> {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    fn new(source: &'a str) -> Self {
        Self {
            chars: source.chars().collect(),
            pos: 0,
            depth: 0,
            source,
        }
    }

    fn error(&self, message: &str) -> AppError {
        let preview: String = self.source.chars().take(60).collect();
        AppError::Validation(format!(
            "literal parse error at {}: {} (input starts {:?})",
            self.pos, message, preview
        ))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                // comment to end of line
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    fn expect(&mut self, want: char) -> Result<()> {
        match self.bump() {
            Some(c) if c == want => Ok(()),
            Some(c) => Err(self.error(&format!("expected '{}', found '{}'", want, c))),
            None => Err(self.error(&format!("expected '{}', found end of input", want))),
        }
    }

    fn value(&mut self) -> Result<Value> {
        match self.peek() {
            Some('{') => self.nested(Self::dict),
            Some('[') => self.nested(|p| p.sequence('[', ']').map(|(items, _)| Value::Array(items))),
            Some('(') => self.nested(Self::tuple),
            Some('\'') | Some('"') => self.strings().map(Value::String),
            Some(c) if c == '-' || c == '+' || c == '.' || c.is_ascii_digit() => self.number(),
            Some(c) if c.is_alphabetic() || c == '_' => self.word(),
            Some(c) => Err(self.error(&format!("unexpected '{}'", c))),
            None => Err(self.error("unexpected end of input")),
        }
    }

    /// Run a container parser one level deeper, refusing past `MAX_DEPTH`
    fn nested(&mut self, parse: impl FnOnce(&mut Self) -> Result<Value>) -> Result<Value> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(&format!("nesting deeper than {} levels", MAX_DEPTH)));
        }
        self.depth += 1;
        let value = parse(self);
        self.depth -= 1;
        value
    }

    fn dict(&mut self) -> Result<Value> {
        self.expect('{')?;
        let mut map = Map::new();
        loop {
            self.skip_ws();
            if self.peek() == Some('}') {
                self.pos += 1;
                return Ok(Value::Object(map));
            }

            let key = match self.value()? {
                Value::String(s) => s,
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(self.error("dictionary keys must be scalars")),
            };
            self.skip_ws();
            self.expect(':')?;
            self.skip_ws();
            let value = self.value()?;
            map.insert(key, value);

            self.skip_ws();
            match self.bump() {
                Some(',') => continue,
                Some('}') => return Ok(Value::Object(map)),
                Some(c) => return Err(self.error(&format!("expected ',' or '}}', found '{}'", c))),
                None => return Err(self.error("unterminated dictionary")),
            }
        }
    }

    /// Comma-separated values between `open` and `close`. Also reports
    /// whether a separating comma was seen, which tells `(x)` from `(x,)`.
    fn sequence(&mut self, open: char, close: char) -> Result<(Vec<Value>, bool)> {
        self.expect(open)?;
        let mut items = Vec::new();
        let mut saw_comma = false;
        loop {
            self.skip_ws();
            if self.peek() == Some(close) {
                self.pos += 1;
                return Ok((items, saw_comma));
            }

            items.push(self.value()?);

            self.skip_ws();
            match self.bump() {
                Some(',') => saw_comma = true,
                Some(c) if c == close => return Ok((items, saw_comma)),
                Some(c) => {
                    return Err(self.error(&format!("expected ',' or '{}', found '{}'", close, c)));
                }
                None => return Err(self.error("unterminated sequence")),
            }
        }
    }

    fn tuple(&mut self) -> Result<Value> {
        let (mut items, saw_comma) = self.sequence('(', ')')?;
        if items.len() == 1 && !saw_comma {
            // parenthesized expression, not a tuple
            return Ok(items.remove(0));
        }
        Ok(Value::Array(items))
    }

    /// One or more adjacent string literals, concatenated
    fn strings(&mut self) -> Result<String> {
        let mut out = self.string()?;
        loop {
            let save = self.pos;
            self.skip_ws();
            match self.peek() {
                Some('\'') | Some('"') => out.push_str(&self.string()?),
                _ => {
                    self.pos = save;
                    return Ok(out);
                }
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        let triple = self.peek() == Some(quote) && self.chars.get(self.pos + 1) == Some(&quote);
        if triple {
            self.pos += 2;
        }

        let mut out = String::new();
        loop {
            let c = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            if c == quote {
                if !triple {
                    return Ok(out);
                }
                if self.peek() == Some(quote) && self.chars.get(self.pos + 1) == Some(&quote) {
                    self.pos += 2;
                    return Ok(out);
                }
                out.push(c);
                continue;
            }
            if c != '\\' {
                out.push(c);
                continue;
            }

            let escaped = self.bump().ok_or_else(|| self.error("dangling escape"))?;
            match escaped {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                '0' => out.push('\0'),
                '\\' => out.push('\\'),
                '\'' => out.push('\''),
                '"' => out.push('"'),
                '\n' => {}
                'u' => out.push(self.unicode_escape(4)?),
                'U' => out.push(self.unicode_escape(8)?),
                'x' => out.push(self.unicode_escape(2)?),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            }
        }
    }

    fn unicode_escape(&mut self, digits: usize) -> Result<char> {
        let mut code = 0u32;
        for _ in 0..digits {
            let c = self.bump().ok_or_else(|| self.error("truncated escape"))?;
            let d = c
                .to_digit(16)
                .ok_or_else(|| self.error(&format!("invalid hex digit '{}'", c)))?;
            code = code * 16 + d;
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
    }

    fn number(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
                self.pos += 1;
            } else {
                break;
            }
        }
        let raw: String = self.chars[start..self.pos]
            .iter()
            .filter(|c| **c != '_')
            .collect();
        let raw = raw.strip_prefix('+').unwrap_or(&raw);

        if let Ok(i) = raw.parse::<i64>() {
            return Ok(Value::Number(i.into()));
        }
        raw.parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| self.error(&format!("invalid number '{}'", raw)))
    }

    fn word(&mut self) -> Result<Value> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        match word.as_str() {
            "True" | "true" => Ok(Value::Bool(true)),
            "False" | "false" => Ok(Value::Bool(false)),
            "None" | "null" => Ok(Value::Null),
            // string prefixes such as r'..' or u".."
            "r" | "u" | "R" | "U" if matches!(self.peek(), Some('\'') | Some('"')) => {
                self.strings().map(Value::String)
            }
            _ => Err(self.error(&format!("unknown identifier '{}'", word))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case("{'a': 1}", json!({"a": 1}))]
    #[case("{'ok': True, 'no': False, 'nil': None}", json!({"ok": true, "no": false, "nil": null}))]
    #[case("['x', 'y',]", json!(["x", "y"]))]
    #[case("('x', 'y')", json!(["x", "y"]))]
    #[case("('solo',)", json!(["solo"]))]
    #[case("('solo')", json!("solo"))]
    #[case("{\"k\": 'mixed \"quotes\"'}", json!({"k": "mixed \"quotes\""}))]
    #[case("'it\\'s'", json!("it's"))]
    #[case("'con' 'cat'", json!("concat"))]
    #[case("-3.5", json!(-3.5))]
    #[case("1_000", json!(1000))]
    #[case("'''tri\nple'''", json!("tri\nple"))]
    #[case("{'nested': {'list': [1, (2, 3)]}}", json!({"nested": {"list": [1, [2, 3]]}}))]
    fn test_parse_literal(#[case] input: &str, #[case] expected: Value) {
        assert_eq!(parse_literal(input).unwrap(), expected);
    }

    #[rstest]
    #[case("{'a': 1")]
    #[case("{'a' 1}")]
    #[case("[1, 2] extra")]
    #[case("undefined_name")]
    #[case("'unterminated")]
    #[case("")]
    fn test_parse_literal_errors(#[case] input: &str) {
        assert!(parse_literal(input).is_err());
    }

    #[test]
    fn test_nesting_limit() {
        let within = format!("{}{}", "[".repeat(MAX_DEPTH), "]".repeat(MAX_DEPTH));
        assert!(parse_literal(&within).is_ok());

        let beyond = format!("{}{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        let err = parse_literal(&beyond).unwrap_err();
        assert!(err.to_string().contains("nesting deeper than 128 levels"));
    }
}
