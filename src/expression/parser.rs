//! Expression parser for step attributes and input templates

use super::value::Value;
use super::ParseError;

/// Expression syntax tree
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Literal value
    Literal(Value),
    /// Variable reference (e.g., `item`)
    Variable(String),
    /// Field access (e.g., `result.output`)
    Field { target: Box<Expr>, name: String },
    /// Index access (e.g., `items[0]`, `hostvars['web1']`)
    Index { target: Box<Expr>, index: Box<Expr> },
    /// List constructor
    List(Vec<Expr>),
    /// Map constructor
    Map(Vec<(String, Expr)>),
    /// String with `${...}` interpolations
    Template(Vec<TemplatePart>),
    /// Negation
    Not(Box<Expr>),
    /// Numeric negation
    Negate(Box<Expr>),
    /// Comparison operation
    Comparison {
        left: Box<Expr>,
        op: ComparisonOp,
        right: Box<Expr>,
    },
    /// Logical operation
    Logical {
        left: Box<Expr>,
        op: LogicalOp,
        right: Box<Expr>,
    },
    /// Addition or subtraction
    Arithmetic {
        left: Box<Expr>,
        op: ArithmeticOp,
        right: Box<Expr>,
    },
}

/// Piece of a template string
#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Text(String),
    Interpolation(Expr),
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ComparisonOp {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Equal => "==",
            ComparisonOp::NotEqual => "!=",
            ComparisonOp::GreaterThan => ">",
            ComparisonOp::LessThan => "<",
            ComparisonOp::GreaterThanOrEqual => ">=",
            ComparisonOp::LessThanOrEqual => "<=",
        }
    }
}

/// Logical operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogicalOp {
    And,
    Or,
}

/// Arithmetic operators
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArithmeticOp {
    Add,
    Subtract,
}

impl ArithmeticOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Subtract => "-",
        }
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    String(String),
    Number(f64),
    Bool(bool),
    Null,
    ComparisonOp(ComparisonOp),
    LogicalOp(LogicalOp),
    Not,
    Plus,
    Minus,
    Dot,
    Comma,
    Colon,
    LeftParen,
    RightParen,
    LeftBracket,
    RightBracket,
    LeftBrace,
    RightBrace,
}

/// Parse a bare expression string
pub fn parse_expression(input: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(input).map_err(|message| ParseError::new(input, message))?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser
        .parse_logical_or()
        .map_err(|message| ParseError::new(input, message))?;

    if let Some(token) = parser.peek() {
        return Err(ParseError::new(
            input,
            format!("unexpected trailing token {token:?}"),
        ));
    }

    Ok(expr)
}

/// Parse a template string, where `${...}` segments hold expressions
///
/// `$${` escapes a literal `${`.
pub fn parse_template(input: &str) -> Result<Expr, ParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut parts = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'$') && chars.get(i + 2) == Some(&'{') {
            text.push_str("${");
            i += 3;
            continue;
        }

        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            let end = find_interpolation_end(&chars, i + 2)
                .ok_or_else(|| ParseError::new(input, "unterminated `${` interpolation"))?;
            let inner: String = chars[i + 2..end].iter().collect();
            let expr = parse_expression(&inner)?;

            if !text.is_empty() {
                parts.push(TemplatePart::Text(std::mem::take(&mut text)));
            }
            parts.push(TemplatePart::Interpolation(expr));
            i = end + 1;
            continue;
        }

        text.push(chars[i]);
        i += 1;
    }

    if parts.is_empty() {
        return Ok(Expr::Literal(Value::String(text)));
    }

    if !text.is_empty() {
        parts.push(TemplatePart::Text(text));
    }

    Ok(Expr::Template(parts))
}

/// Find the `}` closing an interpolation, skipping nested braces and quoted strings
fn find_interpolation_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (offset, &ch) in chars[start..].iter().enumerate() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None => match ch {
                '\'' | '"' => quote = Some(ch),
                '{' => depth += 1,
                '}' if depth == 0 => return Some(start + offset),
                '}' => depth -= 1,
                _ => {}
            },
        }
    }

    None
}

/// Tokenize the input string
fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();

        match ch {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '\'' | '"' => {
                let (string, consumed) = consume_string(&chars[i..])?;
                tokens.push(Token::String(string));
                i += consumed;
            }
            '(' => push(&mut tokens, &mut i, Token::LeftParen),
            ')' => push(&mut tokens, &mut i, Token::RightParen),
            '[' => push(&mut tokens, &mut i, Token::LeftBracket),
            ']' => push(&mut tokens, &mut i, Token::RightBracket),
            '{' => push(&mut tokens, &mut i, Token::LeftBrace),
            '}' => push(&mut tokens, &mut i, Token::RightBrace),
            ',' => push(&mut tokens, &mut i, Token::Comma),
            ':' => push(&mut tokens, &mut i, Token::Colon),
            '.' => push(&mut tokens, &mut i, Token::Dot),
            '+' => push(&mut tokens, &mut i, Token::Plus),
            '-' => push(&mut tokens, &mut i, Token::Minus),
            '!' if next == Some('=') => {
                tokens.push(Token::ComparisonOp(ComparisonOp::NotEqual));
                i += 2;
            }
            '!' => push(&mut tokens, &mut i, Token::Not),
            '=' if next == Some('=') => {
                tokens.push(Token::ComparisonOp(ComparisonOp::Equal));
                i += 2;
            }
            '=' => return Err("expected '==' for equality comparison".to_string()),
            '>' if next == Some('=') => {
                tokens.push(Token::ComparisonOp(ComparisonOp::GreaterThanOrEqual));
                i += 2;
            }
            '>' => push(&mut tokens, &mut i, Token::ComparisonOp(ComparisonOp::GreaterThan)),
            '<' if next == Some('=') => {
                tokens.push(Token::ComparisonOp(ComparisonOp::LessThanOrEqual));
                i += 2;
            }
            '<' => push(&mut tokens, &mut i, Token::ComparisonOp(ComparisonOp::LessThan)),
            '&' if next == Some('&') => {
                tokens.push(Token::LogicalOp(LogicalOp::And));
                i += 2;
            }
            '&' => return Err("expected '&&' for logical AND".to_string()),
            '|' if next == Some('|') => {
                tokens.push(Token::LogicalOp(LogicalOp::Or));
                i += 2;
            }
            '|' => return Err("expected '||' for logical OR".to_string()),
            _ if ch.is_ascii_digit() => {
                let (number, consumed) = consume_number(&chars[i..])?;
                tokens.push(Token::Number(number));
                i += consumed;
            }
            _ if ch.is_alphabetic() || ch == '_' => {
                let word: String = chars[i..]
                    .iter()
                    .take_while(|c| c.is_alphanumeric() || **c == '_')
                    .collect();
                i += word.chars().count();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "null" => Token::Null,
                    _ => Token::Ident(word),
                });
            }
            _ => return Err(format!("unexpected character '{ch}'")),
        }
    }

    Ok(tokens)
}

fn push(tokens: &mut Vec<Token>, i: &mut usize, token: Token) {
    tokens.push(token);
    *i += 1;
}

/// Consume a quoted string, returning its contents and the number of chars consumed
fn consume_string(chars: &[char]) -> Result<(String, usize), String> {
    let quote = chars[0];
    let mut result = String::new();
    let mut i = 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                result.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((result, i + 1)),
            c => {
                result.push(c);
                i += 1;
            }
        }
    }

    Err(format!("expected '{quote}' but reached end of input"))
}

/// Consume a number; a dot is only part of the number when a digit follows it
fn consume_number(chars: &[char]) -> Result<(f64, usize), String> {
    let mut end = 0;
    while end < chars.len() && chars[end].is_ascii_digit() {
        end += 1;
    }

    if end + 1 < chars.len() && chars[end] == '.' && chars[end + 1].is_ascii_digit() {
        end += 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
    }

    let text: String = chars[..end].iter().collect();
    text.parse::<f64>()
        .map(|n| (n, end))
        .map_err(|_| format!("invalid number: {text}"))
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
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {expected:?}, found {token:?}")),
            None => Err(format!("expected {expected:?}, reached end of expression")),
        }
    }

    /// Parse logical OR expressions (lowest precedence)
    fn parse_logical_or(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_logical_and()?;

        while let Some(Token::LogicalOp(LogicalOp::Or)) = self.peek() {
            self.pos += 1;
            let right = self.parse_logical_and()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::Or,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse logical AND expressions
    fn parse_logical_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;

        while let Some(Token::LogicalOp(LogicalOp::And)) = self.peek() {
            self.pos += 1;
            let right = self.parse_comparison()?;
            left = Expr::Logical {
                left: Box::new(left),
                op: LogicalOp::And,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    /// Parse comparison expressions
    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let left = self.parse_additive()?;

        if let Some(Token::ComparisonOp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.parse_additive()?;
            return Ok(Expr::Comparison {
                left: Box::new(left),
                op,
                right: Box::new(right),
            });
        }

        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithmeticOp::Add,
                Some(Token::Minus) => ArithmeticOp::Subtract,
                _ => break,
            };
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::Arithmetic {
                left: Box::new(left),
                op,
                right: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Not) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(Expr::Negate(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, String> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    let name = match self.next() {
                        Some(Token::Ident(name)) => name,
                        // `items.0` style access on lists
                        Some(Token::Number(n)) if n.fract() == 0.0 => {
                            expr = Expr::Index {
                                target: Box::new(expr),
                                index: Box::new(Expr::Literal(Value::Number(n))),
                            };
                            continue;
                        }
                        other => return Err(format!("expected field name after '.', found {other:?}")),
                    };
                    expr = Expr::Field {
                        target: Box::new(expr),
                        name,
                    };
                }
                Some(Token::LeftBracket) => {
                    self.pos += 1;
                    let index = self.parse_logical_or()?;
                    self.expect(Token::RightBracket)?;
                    expr = Expr::Index {
                        target: Box::new(expr),
                        index: Box::new(index),
                    };
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.next() {
            Some(Token::LeftParen) => {
                let inner = self.parse_logical_or()?;
                self.expect(Token::RightParen)?;
                Ok(inner)
            }
            Some(Token::LeftBracket) => {
                let mut items = Vec::new();
                while self.peek() != Some(&Token::RightBracket) {
                    items.push(self.parse_logical_or()?);
                    if self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(Token::RightBracket)?;
                Ok(Expr::List(items))
            }
            Some(Token::LeftBrace) => {
                let mut entries = Vec::new();
                while self.peek() != Some(&Token::RightBrace) {
                    let key = match self.next() {
                        Some(Token::Ident(key)) | Some(Token::String(key)) => key,
                        other => return Err(format!("expected map key, found {other:?}")),
                    };
                    self.expect(Token::Colon)?;
                    entries.push((key, self.parse_logical_or()?));
                    if self.peek() == Some(&Token::Comma) {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                self.expect(Token::RightBrace)?;
                Ok(Expr::Map(entries))
            }
            Some(Token::Ident(name)) => Ok(Expr::Variable(name)),
            Some(Token::String(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::Number(n)) => Ok(Expr::Literal(Value::Number(n))),
            Some(Token::Bool(b)) => Ok(Expr::Literal(Value::Bool(b))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(token) => Err(format!("unexpected token {token:?}")),
            None => Err("unexpected end of expression".to_string()),
        }
    }
}
