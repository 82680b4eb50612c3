use crate::ExpressionError;
use serde_json::Value as Json;

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Json),
    Array(Vec<Expr>),
    /// `$json`, `$context`, `$config`, `$steps`
    Root(String),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call {
        namespace: String,
        name: String,
        args: Vec<Expr>,
    },
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    Dot,
    Comma,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Question,
    Colon,
    OrOr,
    AndAnd,
    Bang,
    Minus,
    Op(CompareOp),
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
        }
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>, ExpressionError> {
        let mut tokens = Vec::new();
        while let Some(&(pos, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            let token = match c {
                '.' => self.single(Token::Dot),
                ',' => self.single(Token::Comma),
                '(' => self.single(Token::LParen),
                ')' => self.single(Token::RParen),
                '[' => self.single(Token::LBracket),
                ']' => self.single(Token::RBracket),
                '?' => self.single(Token::Question),
                ':' => self.single(Token::Colon),
                '-' => self.single(Token::Minus),
                '|' => self.pair('|', Token::OrOr, pos)?,
                '&' => self.pair('&', Token::AndAnd, pos)?,
                '=' => {
                    self.chars.next();
                    self.expect_char('=', pos)?;
                    self.eat_char('=');
                    Token::Op(CompareOp::Eq)
                }
                '!' => {
                    self.chars.next();
                    if self.eat_char('=') {
                        self.eat_char('=');
                        Token::Op(CompareOp::Ne)
                    } else {
                        Token::Bang
                    }
                }
                '<' => {
                    self.chars.next();
                    if self.eat_char('=') {
                        Token::Op(CompareOp::Le)
                    } else {
                        Token::Op(CompareOp::Lt)
                    }
                }
                '>' => {
                    self.chars.next();
                    if self.eat_char('=') {
                        Token::Op(CompareOp::Ge)
                    } else {
                        Token::Op(CompareOp::Gt)
                    }
                }
                '"' | '\'' => self.string(c, pos)?,
                c if c.is_ascii_digit() => self.number(pos)?,
                c if c == '$' || c == '_' || c.is_alphabetic() => self.ident(),
                other => {
                    return Err(ExpressionError::Syntax {
                        position: pos,
                        message: format!("unexpected character '{}'", other),
                    })
                }
            };
            tokens.push((pos, token));
        }
        Ok(tokens)
    }

    fn single(&mut self, token: Token) -> Token {
        self.chars.next();
        token
    }

    fn eat_char(&mut self, expected: char) -> bool {
        if matches!(self.chars.peek(), Some(&(_, c)) if c == expected) {
            self.chars.next();
            true
        } else {
            false
        }
    }

    fn expect_char(&mut self, expected: char, pos: usize) -> Result<(), ExpressionError> {
        if self.eat_char(expected) {
            Ok(())
        } else {
            Err(ExpressionError::Syntax {
                position: pos,
                message: format!("expected '{}'", expected),
            })
        }
    }

    fn pair(&mut self, c: char, token: Token, pos: usize) -> Result<Token, ExpressionError> {
        self.chars.next();
        self.expect_char(c, pos)?;
        Ok(token)
    }

    fn string(&mut self, quote: char, pos: usize) -> Result<Token, ExpressionError> {
        self.chars.next();
        let mut out = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                c if c == quote => return Ok(Token::Str(out)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => out.push('\n'),
                    Some((_, 't')) => out.push('\t'),
                    Some((_, other)) => out.push(other),
                    None => break,
                },
                other => out.push(other),
            }
        }
        Err(ExpressionError::Syntax {
            position: pos,
            message: "unterminated string literal".to_string(),
        })
    }

    fn number(&mut self, start: usize) -> Result<Token, ExpressionError> {
        let mut end = start;
        let mut seen_dot = false;
        while let Some(&(i, c)) = self.chars.peek() {
            let fraction = c == '.'
                && !seen_dot
                && self.src[i + 1..].starts_with(|d: char| d.is_ascii_digit());
            if c.is_ascii_digit() || fraction {
                seen_dot |= fraction;
                end = i + 1;
                self.chars.next();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| ExpressionError::Syntax {
                position: start,
                message: format!("invalid number '{}'", text),
            })
    }

    fn ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(&(_, c)) = self.chars.peek() {
            if c == '$' || c == '_' || c.is_alphanumeric() {
                name.push(c);
                self.chars.next();
            } else {
                break;
            }
        }
        Token::Ident(name)
    }
}

/// Parse the source between `{{` and `}}`.
pub fn parse_expression(src: &str) -> Result<Expr, ExpressionError> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        len: src.len(),
    };
    let expr = parser.ternary()?;
    if let Some((pos, token)) = parser.tokens.get(parser.pos) {
        return Err(ExpressionError::Syntax {
            position: *pos,
            message: format!("unexpected {:?}", token),
        });
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    len: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map(|(p, _)| *p).unwrap_or(self.len)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: Token, what: &str) -> Result<(), ExpressionError> {
        if self.eat(&token) {
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: String) -> ExpressionError {
        ExpressionError::Syntax {
            position: self.position(),
            message,
        }
    }

    fn ternary(&mut self) -> Result<Expr, ExpressionError> {
        let cond = self.or()?;
        if self.eat(&Token::Question) {
            let then = self.ternary()?;
            self.expect(Token::Colon, "':' in ternary")?;
            let otherwise = self.ternary()?;
            return Ok(Expr::Ternary(
                Box::new(cond),
                Box::new(then),
                Box::new(otherwise),
            ));
        }
        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.and()?;
        while self.eat(&Token::OrOr) {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.comparison()?;
        while self.eat(&Token::AndAnd) {
            let right = self.comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.unary()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.unary()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ExpressionError> {
        if self.eat(&Token::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        if self.eat(&Token::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ExpressionError> {
        let mut expr = self.primary()?;
        loop {
            if self.eat(&Token::Dot) {
                match self.next() {
                    Some(Token::Ident(name)) => expr = Expr::Member(Box::new(expr), name),
                    Some(Token::Number(n)) if n.fract() == 0.0 => {
                        expr = Expr::Index(Box::new(expr), Box::new(Expr::Literal(number_literal(n))))
                    }
                    _ => return Err(self.error("expected property name after '.'".into())),
                }
            } else if self.eat(&Token::LBracket) {
                let index = self.ternary()?;
                self.expect(Token::RBracket, "']'")?;
                expr = Expr::Index(Box::new(expr), Box::new(index));
            } else {
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.next() {
            Some(Token::Number(n)) => Ok(Expr::Literal(number_literal(n))),
            Some(Token::Str(s)) => Ok(Expr::Literal(Json::String(s))),
            Some(Token::LParen) => {
                let inner = self.ternary()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Some(Token::LBracket) => {
                let items = self.list(Token::RBracket)?;
                Ok(Expr::Array(items))
            }
            Some(Token::Ident(name)) => match name.as_str() {
                "true" => Ok(Expr::Literal(Json::Bool(true))),
                "false" => Ok(Expr::Literal(Json::Bool(false))),
                "null" => Ok(Expr::Literal(Json::Null)),
                root if root.starts_with('$') => Ok(Expr::Root(name)),
                _ => self.call(name),
            },
            Some(other) => {
                self.pos -= 1;
                Err(self.error(format!("unexpected {:?}", other)))
            }
            None => Err(self.error("unexpected end of expression".into())),
        }
    }

    /// `namespace.function(args...)`; bare identifiers are never variables.
    fn call(&mut self, namespace: String) -> Result<Expr, ExpressionError> {
        if !self.eat(&Token::Dot) {
            return Err(self.error(format!(
                "unknown identifier '{}' (references must start with $)",
                namespace
            )));
        }
        let name = match self.next() {
            Some(Token::Ident(name)) => name,
            _ => return Err(self.error("expected function name".into())),
        };
        self.expect(Token::LParen, "'(' after function name")?;
        let args = self.list(Token::RParen)?;
        Ok(Expr::Call {
            namespace,
            name,
            args,
        })
    }

    fn list(&mut self, close: Token) -> Result<Vec<Expr>, ExpressionError> {
        let mut items = Vec::new();
        if self.eat(&close) {
            return Ok(items);
        }
        loop {
            items.push(self.ternary()?);
            if self.eat(&close) {
                return Ok(items);
            }
            self.expect(Token::Comma, "',' or closing bracket")?;
        }
    }
}

pub(crate) fn number_literal(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < i64::MAX as f64 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}
