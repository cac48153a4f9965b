//! Recursive descent parser for translated formula expressions.
//!
//! GRAMMAR:
//!   expression     --> or_expr
//!   or_expr        --> and_expr ( "or" and_expr )*
//!   and_expr       --> comparison ( "and" comparison )*
//!   comparison     --> additive ( ("==" | "!=" | "<" | "<=" | ">" | ">=") additive )*
//!   additive       --> multiplicative ( ("+" | "-") multiplicative )*
//!   multiplicative --> unary ( ("*" | "/" | "//" | "%") unary )*
//!   unary          --> ("+" | "-") unary | power
//!   power          --> primary ( "**" unary )?
//!   primary        --> NUMBER | STRING | "True" | "False" | "None"
//!                    | NAME | NAME "(" arguments? ")"
//!                    | "(" expression ")" | "(" expression "," ... ")"
//!                    | "[" arguments? "]"
//!
//! The node set is closed: anything the grammar cannot express (attribute
//! access, subscripts, lambdas, `not`, conditional expressions) is rejected
//! here with [`EvalError::DisallowedExpression`].

use crate::error::{EvalError, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOperator {
    Plus,
    Minus,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BoolOperator {
    And,
    Or,
}

/// Expression tree produced by [`parse_expression`].
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    BinaryOp {
        op: BinaryOperator,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    /// `first op1 e1 op2 e2 ...`, evaluated pairwise like a chain.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CompareOperator, Expr)>,
    },
    BoolOp {
        op: BoolOperator,
        operands: Vec<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    NameRef(String),
    Sequence(Vec<Expr>),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    /// Syntax the grammar never accepts but recognizes to report clearly.
    Other(String),
    Eof,
}

/// Keywords of constructs outside the whitelist.
const DISALLOWED_KEYWORDS: &[&str] = &[
    "not", "lambda", "if", "else", "in", "is", "for", "await", "yield",
];

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer { src, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut it = self.src[self.pos..].chars();
        it.next();
        it.next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn tokenize(mut self) -> Result<Vec<(usize, Token)>> {
        let mut tokens = Vec::new();
        loop {
            while self.peek_char().is_some_and(char::is_whitespace) {
                self.bump();
            }
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                tokens.push((start, Token::Eof));
                return Ok(tokens);
            };
            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.peek_second().is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(c)?,
                c if c.is_alphabetic() || c == '_' => self.ident(),
                _ => self.symbol(),
            };
            tokens.push((start, token));
        }
    }

    fn number(&mut self) -> Result<Token> {
        let start = self.pos;
        while self.peek_char().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.bump();
        }
        if matches!(self.peek_char(), Some('e' | 'E')) {
            let save = self.pos;
            self.bump();
            if matches!(self.peek_char(), Some('+' | '-')) {
                self.bump();
            }
            if self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                    self.bump();
                }
            } else {
                self.pos = save;
            }
        }
        let text = &self.src[start..self.pos];
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| EvalError::Parse {
                offset: start,
                message: format!("invalid number literal '{}'", text),
            })
    }

    fn string(&mut self, quote: char) -> Result<Token> {
        let start = self.pos;
        self.bump();
        let mut out = String::new();
        loop {
            match self.bump() {
                None => {
                    return Err(EvalError::Parse {
                        offset: start,
                        message: "unterminated string literal".to_string(),
                    });
                }
                Some('\\') => match self.bump() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some(other) => out.push(other),
                    None => out.push('\\'),
                },
                Some(c) if c == quote => return Ok(Token::Str(out)),
                Some(c) => out.push(c),
            }
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_alphanumeric() || c == '_')
        {
            self.bump();
        }
        Token::Ident(self.src[start..self.pos].to_string())
    }

    fn symbol(&mut self) -> Token {
        let c = self.bump().unwrap_or('\0');
        let next = self.peek_char();
        let mut two = |tok: Token| {
            self.bump();
            tok
        };
        match (c, next) {
            ('*', Some('*')) => two(Token::DoubleStar),
            ('/', Some('/')) => two(Token::DoubleSlash),
            ('=', Some('=')) => two(Token::EqEq),
            ('!', Some('=')) => two(Token::NotEq),
            ('<', Some('=')) => two(Token::LtE),
            ('>', Some('=')) => two(Token::GtE),
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('[', _) => Token::LBracket,
            (']', _) => Token::RBracket,
            (',', _) => Token::Comma,
            ('+', _) => Token::Plus,
            ('-', _) => Token::Minus,
            ('*', _) => Token::Star,
            ('/', _) => Token::Slash,
            ('%', _) => Token::Percent,
            ('<', _) => Token::Lt,
            ('>', _) => Token::Gt,
            (other, _) => Token::Other(other.to_string()),
        }
    }
}

/// Deepest nesting of parentheses, call arguments, unary operators and
/// exponents the parser accepts.
pub const MAX_NESTING_DEPTH: usize = 64;

/// Most operators in one left-associative chain such as `a + b - c`.
pub const MAX_CHAIN_LENGTH: usize = 4096;

struct Parser {
    tokens: Vec<(usize, Token)>,
    index: usize,
    depth: usize,
}

/// Parse translated expression text into an [`Expr`] tree.
pub fn parse_expression(src: &str) -> Result<Expr> {
    let tokens = Lexer::new(src).tokenize()?;
    let mut parser = Parser {
        tokens,
        index: 0,
        depth: 0,
    };
    if parser.current() == &Token::Eof {
        return Err(parser.error("empty expression"));
    }
    let expr = parser.expression()?;
    match parser.current() {
        Token::Eof => Ok(expr),
        other => Err(parser.unexpected(&other.clone())),
    }
}

impl Parser {
    fn current(&self) -> &Token {
        &self.tokens[self.index.min(self.tokens.len() - 1)].1
    }

    fn offset(&self) -> usize {
        self.tokens[self.index.min(self.tokens.len() - 1)].0
    }

    fn advance(&mut self) {
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
    }

    fn error(&self, message: impl Into<String>) -> EvalError {
        EvalError::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn unexpected(&self, token: &Token) -> EvalError {
        match token {
            Token::Other(s) if s == "." => {
                EvalError::DisallowedExpression("attribute access".to_string())
            }
            Token::LBracket => EvalError::DisallowedExpression("subscript".to_string()),
            Token::LParen => EvalError::DisallowedExpression("call of a non-name".to_string()),
            Token::Ident(word) if DISALLOWED_KEYWORDS.contains(&word.as_str()) => {
                EvalError::DisallowedExpression(word.clone())
            }
            other => self.error(format!("unexpected token {:?}", other)),
        }
    }

    fn expect(&mut self, expected: Token) -> Result<()> {
        if self.current() == &expected {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!(
                "expected {:?}, found {:?}",
                expected,
                self.current()
            )))
        }
    }

    fn is_keyword(&self, word: &str) -> bool {
        matches!(self.current(), Token::Ident(w) if w == word)
    }

    fn expression(&mut self) -> Result<Expr> {
        self.nested(Parser::or_expr)
    }

    /// Run `parse` one nesting level deeper.
    fn nested(&mut self, parse: fn(&mut Parser) -> Result<Expr>) -> Result<Expr> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(EvalError::NestingTooDeep {
                limit: MAX_NESTING_DEPTH,
            });
        }
        self.depth += 1;
        let expr = parse(self);
        self.depth -= 1;
        expr
    }

    fn chain_link(&self, links: usize) -> Result<()> {
        if links > MAX_CHAIN_LENGTH {
            return Err(EvalError::ChainTooLong {
                limit: MAX_CHAIN_LENGTH,
            });
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let first = self.and_expr()?;
        if !self.is_keyword("or") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.is_keyword("or") {
            self.advance();
            operands.push(self.and_expr()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::Or,
            operands,
        })
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let first = self.comparison()?;
        if !self.is_keyword("and") {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.is_keyword("and") {
            self.advance();
            operands.push(self.comparison()?);
        }
        Ok(Expr::BoolOp {
            op: BoolOperator::And,
            operands,
        })
    }

    fn comparison(&mut self) -> Result<Expr> {
        let first = self.additive()?;
        let mut rest = Vec::new();
        loop {
            let op = match self.current() {
                Token::EqEq => CompareOperator::Eq,
                Token::NotEq => CompareOperator::NotEq,
                Token::Lt => CompareOperator::Lt,
                Token::LtE => CompareOperator::LtE,
                Token::Gt => CompareOperator::Gt,
                Token::GtE => CompareOperator::GtE,
                _ => break,
            };
            self.advance();
            rest.push((op, self.additive()?));
        }
        if rest.is_empty() {
            Ok(first)
        } else {
            Ok(Expr::Compare {
                first: Box::new(first),
                rest,
            })
        }
    }

    fn additive(&mut self) -> Result<Expr> {
        let mut left = self.multiplicative()?;
        let mut links = 0;
        loop {
            let op = match self.current() {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Sub,
                _ => break,
            };
            links += 1;
            self.chain_link(links)?;
            self.advance();
            let right = self.multiplicative()?;
            left = Expr::BinaryOp {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.unary()?;
        let mut links = 0;
        loop {
            let op = match self.current() {
                Token::Star => BinaryOperator::Mul,
                Token::Slash => BinaryOperator::Div,
                Token::DoubleSlash => BinaryOperator::FloorDiv,
                Token::Percent => BinaryOperator::Mod,
                _ => break,
            };
            links += 1;
            self.chain_link(links)?;
            self.advance();
            let right = self.unary()?;
            left = Expr::BinaryOp {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        let op = match self.current() {
            Token::Plus => UnaryOperator::Plus,
            Token::Minus => UnaryOperator::Minus,
            _ => return self.power(),
        };
        self.advance();
        let operand = self.nested(Parser::unary)?;
        Ok(Expr::UnaryOp {
            op,
            operand: Box::new(operand),
        })
    }

    fn power(&mut self) -> Result<Expr> {
        let base = self.primary()?;
        if self.current() == &Token::DoubleStar {
            self.advance();
            // Right associative; `2 ** -1` is allowed.
            let exponent = self.nested(Parser::unary)?;
            return Ok(Expr::BinaryOp {
                op: BinaryOperator::Pow,
                lhs: Box::new(base),
                rhs: Box::new(exponent),
            });
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr> {
        let token = self.current().clone();
        let expr = match token {
            Token::Number(n) => {
                self.advance();
                Expr::Literal(Literal::Number(n))
            }
            Token::Str(s) => {
                self.advance();
                Expr::Literal(Literal::Text(s))
            }
            Token::Ident(name) => {
                if DISALLOWED_KEYWORDS.contains(&name.as_str()) {
                    return Err(EvalError::DisallowedExpression(name));
                }
                self.advance();
                let literal = match name.as_str() {
                    "True" => Some(Literal::Bool(true)),
                    "False" => Some(Literal::Bool(false)),
                    "None" => Some(Literal::Null),
                    _ => None,
                };
                if let Some(literal) = literal {
                    Expr::Literal(literal)
                } else if self.current() == &Token::LParen {
                    self.advance();
                    let args = self.arguments(Token::RParen)?;
                    Expr::Call { name, args }
                } else {
                    Expr::NameRef(name)
                }
            }
            Token::LParen => {
                self.advance();
                if self.current() == &Token::RParen {
                    self.advance();
                    Expr::Sequence(Vec::new())
                } else {
                    let first = self.expression()?;
                    if self.current() == &Token::Comma {
                        let mut items = vec![first];
                        while self.current() == &Token::Comma {
                            self.advance();
                            if self.current() == &Token::RParen {
                                break;
                            }
                            items.push(self.expression()?);
                        }
                        self.expect(Token::RParen)?;
                        Expr::Sequence(items)
                    } else {
                        self.expect(Token::RParen)?;
                        first
                    }
                }
            }
            Token::LBracket => {
                self.advance();
                Expr::Sequence(self.arguments(Token::RBracket)?)
            }
            other => return Err(self.unexpected(&other)),
        };

        // Trailing postfix syntax (`x.attr`, `x[0]`, `f(1)(2)`) is outside
        // the grammar.
        match self.current() {
            Token::Other(s) if s == "." => Err(self.unexpected(&self.current().clone())),
            Token::LBracket | Token::LParen => Err(self.unexpected(&self.current().clone())),
            _ => Ok(expr),
        }
    }

    /// Comma separated expressions up to `close` (consumed). A trailing
    /// comma is accepted.
    fn arguments(&mut self, close: Token) -> Result<Vec<Expr>> {
        let mut args = Vec::new();
        if self.current() == &close {
            self.advance();
            return Ok(args);
        }
        loop {
            args.push(self.expression()?);
            if self.current() == &Token::Comma {
                self.advance();
                if self.current() == &close {
                    break;
                }
                continue;
            }
            break;
        }
        self.expect(close)?;
        Ok(args)
    }
}
