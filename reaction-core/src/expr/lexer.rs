//! Formula tokenizer.

use crate::error::EvalError;

/// Words with a fixed meaning in formulas. They are never dependencies and
/// cannot be declared as properties.
pub const KEYWORDS: &[&str] = &[
    "new",
    "function",
    "return",
    "true",
    "false",
    "null",
    "undefined",
    "typeof",
    "NaN",
    "Infinity",
];

/// Check whether `name` is a reserved word of the formula language.
pub fn is_keyword(name: &str) -> bool {
    KEYWORDS.contains(&name)
}

/// Check whether `name` matches `[A-Za-z_$][A-Za-z0-9_$]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_part),
        _ => false,
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_identifier_part(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Str(String),
    Ident(String),
    Keyword(&'static str),
    Punct(Punct),
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Punct {
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Dot,
    Colon,
    Semicolon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    Lt,
    Le,
    Gt,
    Ge,
    EqEq,
    EqEqEq,
    NotEq,
    NotEqEq,
    AndAnd,
    OrOr,
}

impl Punct {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Dot => ".",
            Self::Colon => ":",
            Self::Semicolon => ";",
            Self::Question => "?",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Bang => "!",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::EqEq => "==",
            Self::EqEqEq => "===",
            Self::NotEq => "!=",
            Self::NotEqEq => "!==",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
        }
    }
}

// Longest operators first so that `===` wins over `==`.
const OPERATORS: &[(&str, Punct)] = &[
    ("===", Punct::EqEqEq),
    ("!==", Punct::NotEqEq),
    ("==", Punct::EqEq),
    ("!=", Punct::NotEq),
    ("<=", Punct::Le),
    (">=", Punct::Ge),
    ("&&", Punct::AndAnd),
    ("||", Punct::OrOr),
    ("(", Punct::LParen),
    (")", Punct::RParen),
    ("[", Punct::LBracket),
    ("]", Punct::RBracket),
    ("{", Punct::LBrace),
    ("}", Punct::RBrace),
    (",", Punct::Comma),
    (".", Punct::Dot),
    (":", Punct::Colon),
    (";", Punct::Semicolon),
    ("?", Punct::Question),
    ("+", Punct::Plus),
    ("-", Punct::Minus),
    ("*", Punct::Star),
    ("/", Punct::Slash),
    ("%", Punct::Percent),
    ("!", Punct::Bang),
    ("<", Punct::Lt),
    (">", Punct::Gt),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte offset of the token in the source.
    pub offset: usize,
}

/// Split formula source into tokens, terminated by [`TokenKind::Eof`].
pub fn tokenize(source: &str) -> Result<Vec<Token>, EvalError> {
    Lexer { source, pos: 0 }.run()
}

struct Lexer<'src> {
    source: &'src str,
    pos: usize,
}

impl<'src> Lexer<'src> {
    fn run(mut self) -> Result<Vec<Token>, EvalError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace();
            let offset = self.pos;
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    offset,
                });
                return Ok(tokens);
            };
            let kind = if c.is_ascii_digit() || (c == '.' && self.peek_at(1).is_some_and(|n| n.is_ascii_digit())) {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if is_identifier_start(c) {
                self.word()
            } else {
                self.operator()?
            };
            tokens.push(Token { kind, offset });
        }
    }

    fn rest(&self) -> &'src str {
        &self.source[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_at(&self, n: usize) -> Option<char> {
        self.rest().chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.bump();
        }
    }

    fn eat_digits(&mut self) -> usize {
        let mut count = 0;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
            count += 1;
        }
        count
    }

    fn number(&mut self) -> Result<TokenKind, EvalError> {
        let start = self.pos;
        self.eat_digits();
        if self.peek() == Some('.') {
            self.bump();
            self.eat_digits();
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let checkpoint = self.pos;
            self.bump();
            if matches!(self.peek(), Some('+' | '-')) {
                self.bump();
            }
            if self.eat_digits() == 0 {
                self.pos = checkpoint;
            }
        }
        if self.peek().is_some_and(is_identifier_start) {
            return Err(EvalError::syntax(self.pos, "identifier starts immediately after numeric literal"));
        }
        let text = &self.source[start..self.pos];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| EvalError::syntax(start, format!("invalid number '{}'", text)))
    }

    fn string(&mut self, quote: char) -> Result<TokenKind, EvalError> {
        let start = self.pos;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(EvalError::syntax(start, "unterminated string literal")),
                Some(c) if c == quote => return Ok(TokenKind::Str(text)),
                Some('\\') => {
                    let escaped = self
                        .bump()
                        .ok_or_else(|| EvalError::syntax(start, "unterminated string literal"))?;
                    match escaped {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        '0' => text.push('\0'),
                        'u' => text.push(self.unicode_escape()?),
                        other => text.push(other),
                    }
                }
                Some(c) => text.push(c),
            }
        }
    }

    fn unicode_escape(&mut self) -> Result<char, EvalError> {
        let start = self.pos;
        let hex: String = (0..4).filter_map(|_| self.bump()).collect();
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| EvalError::syntax(start, "invalid unicode escape"))
    }

    fn word(&mut self) -> TokenKind {
        let start = self.pos;
        while self.peek().is_some_and(is_identifier_part) {
            self.bump();
        }
        let word = &self.source[start..self.pos];
        match KEYWORDS.iter().find(|k| **k == word) {
            Some(keyword) => TokenKind::Keyword(*keyword),
            None => TokenKind::Ident(word.to_string()),
        }
    }

    fn operator(&mut self) -> Result<TokenKind, EvalError> {
        let rest = self.rest();
        for (text, punct) in OPERATORS {
            if rest.starts_with(text) {
                self.pos += text.len();
                return Ok(TokenKind::Punct(*punct));
            }
        }
        let c = self.peek().unwrap_or('\0');
        Err(EvalError::syntax(self.pos, format!("unexpected character '{}'", c)))
    }
}
