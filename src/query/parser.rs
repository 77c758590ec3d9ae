//! Recursive-descent parser for the URL filter grammar.
//!
//! ```text
//! expr       := term { ("and" | "or") term }      (one connector per level)
//! term       := "(" expr ")" | function | comparison
//! function   := "substringof" "(" literal "," property ")"
//!             | "startswith"  "(" property "," literal ")"
//!             | "endswith"    "(" property "," literal ")"
//! comparison := property ("eq"|"ne"|"gt"|"ge"|"lt"|"le") literal
//! ```
//!
//! Malformed input, stray trailing tokens, and groups mixing `and` with `or`
//! at a single nesting level all parse to `None`.

use serde_json::{Number, Value};

use super::predicate::{ComparisonOp, GroupOp, Predicate};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Open,
    Close,
    Comma,
    /// Single-quoted string, quotes stripped.
    Str(String),
    /// Any unquoted run: property names, operators, connectors, literals.
    Word(String),
}

fn tokenize(input: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::Open);
            }
            ')' => {
                chars.next();
                tokens.push(Token::Close);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '\'' => {
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => s.push(c),
                        // Unterminated string.
                        None => return None,
                    }
                }
                tokens.push(Token::Str(s));
            }
            _ => {
                let mut word = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_whitespace() || matches!(c, '(' | ')' | ',' | '\'') {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token::Word(word));
            }
        }
    }
    Some(tokens)
}

/// Types an unquoted literal: `true`/`false` (case-insensitive) become
/// booleans, numeric text becomes a number, anything else stays a string.
fn type_literal(word: &str) -> Value {
    if word.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if word.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if let Ok(n) = word.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = word.parse::<f64>() {
        if let Some(n) = Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    Value::String(word.to_string())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let t = self.tokens.get(self.pos).cloned();
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, token: Token) -> Option<()> {
        (self.next()? == token).then_some(())
    }

    fn word(&mut self) -> Option<String> {
        match self.next()? {
            Token::Word(w) => Some(w),
            _ => None,
        }
    }

    fn literal(&mut self) -> Option<Value> {
        match self.next()? {
            Token::Str(s) => Some(Value::String(s)),
            Token::Word(w) => Some(type_literal(&w)),
            _ => None,
        }
    }

    fn expr(&mut self) -> Option<Predicate> {
        let mut children = vec![self.term()?];
        let mut group_op: Option<GroupOp> = None;
        while let Some(Token::Word(w)) = self.peek() {
            let op = match w.as_str() {
                "and" => GroupOp::And,
                "or" => GroupOp::Or,
                _ => return None,
            };
            if *group_op.get_or_insert(op) != op {
                // Mixed connectors at one level are ambiguous.
                return None;
            }
            self.pos += 1;
            children.push(self.term()?);
        }
        match group_op {
            Some(op) => Some(Predicate::Group { op, children }),
            None => children.pop(),
        }
    }

    fn term(&mut self) -> Option<Predicate> {
        if self.peek() == Some(&Token::Open) {
            self.pos += 1;
            let inner = self.expr()?;
            self.expect(Token::Close)?;
            return Some(inner);
        }
        let head = self.word()?;
        match head.as_str() {
            "substringof" => {
                self.expect(Token::Open)?;
                let value = self.literal()?;
                self.expect(Token::Comma)?;
                let property = self.word()?;
                self.expect(Token::Close)?;
                Some(Predicate::Comparison {
                    property,
                    op: ComparisonOp::Contains,
                    value,
                })
            }
            "startswith" | "endswith" => {
                let op = if head == "startswith" {
                    ComparisonOp::StartsWith
                } else {
                    ComparisonOp::EndsWith
                };
                self.expect(Token::Open)?;
                let property = self.word()?;
                self.expect(Token::Comma)?;
                let value = self.literal()?;
                self.expect(Token::Close)?;
                Some(Predicate::Comparison {
                    property,
                    op,
                    value,
                })
            }
            _ => {
                let op = ComparisonOp::from_keyword(&self.word()?)?;
                let value = self.literal()?;
                Some(Predicate::Comparison {
                    property: head,
                    op,
                    value,
                })
            }
        }
    }
}

pub(super) fn parse(input: &str) -> Option<Predicate> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut parser = Parser {
        tokens: tokenize(trimmed)?,
        pos: 0,
    };
    let predicate = parser.expr()?;
    // Anything left over means the input was not a single expression.
    (parser.pos == parser.tokens.len()).then_some(predicate)
}

// ============================================================================
// Tests
// ============================================================================
