use std::fmt;

use crate::error::ParseError;

/// Token types produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// An identifier or keyword. Dotted paths (`foo.Bar`, `.pkg.Msg`) form one token.
    Ident(String),
    /// An unsigned integer literal (decimal, hex or octal).
    Int(u64),
    /// A floating point literal.
    Float(f64),
    /// A string literal with escapes already processed.
    Str(String),
    /// A single punctuation character: `{ } [ ] ( ) < > = ; , : - +`
    Symbol(char),
    /// End of input
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Ident(s) => write!(f, "'{s}'"),
            Token::Int(n) => write!(f, "'{n}'"),
            Token::Float(v) => write!(f, "'{v}'"),
            Token::Str(s) => write!(f, "\"{s}\""),
            Token::Symbol(c) => write!(f, "'{c}'"),
            Token::Eof => f.write_str("end of input"),
        }
    }
}

/// A token with its source location.
#[derive(Debug, Clone)]
pub struct Located {
    pub token: Token,
    pub line: usize,
}

/// Tokenizer for `.proto` text.
pub struct Lexer<'a> {
    input: &'a [u8],
    pos: usize,
    line: usize,
    stack: Vec<Located>,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            input: input.as_bytes(),
            pos: 0,
            line: 1,
            stack: Vec::new(),
        }
    }

    /// Line of the next token to be returned.
    pub fn current_line(&self) -> usize {
        match self.stack.last() {
            Some(tok) => tok.line,
            None => self.line,
        }
    }

    pub fn next_token(&mut self) -> Result<Located, ParseError> {
        if let Some(tok) = self.stack.pop() {
            return Ok(tok);
        }
        self.lex()
    }

    pub fn peek_token(&mut self) -> Result<Located, ParseError> {
        let tok = self.next_token()?;
        self.stack.push(tok.clone());
        Ok(tok)
    }

    /// Return a token so that the next call to `next_token` yields it again.
    pub fn push_back(&mut self, tok: Located) {
        self.stack.push(tok);
    }

    fn peek_byte(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_byte_at(&self, offset: usize) -> Option<u8> {
        self.input.get(self.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        if b == b'\n' {
            self.line += 1;
        }
        Some(b)
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), ParseError> {
        loop {
            match self.peek_byte() {
                Some(b' ') | Some(b'\t') | Some(b'\r') | Some(b'\n') | Some(0x0b) | Some(0x0c) => {
                    self.advance();
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'/') => {
                    while let Some(b) = self.advance() {
                        if b == b'\n' {
                            break;
                        }
                    }
                }
                Some(b'/') if self.peek_byte_at(1) == Some(b'*') => {
                    let line = self.line;
                    self.pos += 2;
                    loop {
                        match self.advance() {
                            Some(b'*') if self.peek_byte() == Some(b'/') => {
                                self.pos += 1;
                                break;
                            }
                            Some(_) => {}
                            None => {
                                return Err(ParseError::Syntax {
                                    line,
                                    message: "unterminated block comment".into(),
                                })
                            }
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn lex(&mut self) -> Result<Located, ParseError> {
        self.skip_whitespace_and_comments()?;
        let line = self.line;

        let b = match self.peek_byte() {
            Some(b) => b,
            None => {
                return Ok(Located {
                    token: Token::Eof,
                    line,
                })
            }
        };

        let token = match b {
            b'"' | b'\'' => Token::Str(self.read_string(b)?),
            b'0'..=b'9' => self.read_number()?,
            b'.' if self.peek_byte_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                self.read_number()?
            }
            b'.' if self.peek_byte_at(1).is_some_and(is_ident_start) => {
                self.pos += 1;
                let mut name = String::from(".");
                name.push_str(&self.read_ident());
                Token::Ident(name)
            }
            c if is_ident_start(c) => Token::Ident(self.read_ident()),
            b'{' | b'}' | b'[' | b']' | b'(' | b')' | b'<' | b'>' | b'=' | b';' | b','
            | b':' | b'-' | b'+' | b'.' => {
                self.pos += 1;
                Token::Symbol(b as char)
            }
            _ => {
                let ch = self.current_char();
                return Err(ParseError::IllegalCharacter { line, ch });
            }
        };

        Ok(Located { token, line })
    }

    fn current_char(&self) -> char {
        std::str::from_utf8(&self.input[self.pos..])
            .ok()
            .and_then(|s| s.chars().next())
            .unwrap_or(self.input[self.pos] as char)
    }

    /// Read an identifier, joining `.`-separated segments into one path.
    fn read_ident(&mut self) -> String {
        let start = self.pos;
        loop {
            while self.peek_byte().is_some_and(is_ident_char) {
                self.pos += 1;
            }
            if self.peek_byte() == Some(b'.') && self.peek_byte_at(1).is_some_and(is_ident_start) {
                self.pos += 1;
                continue;
            }
            break;
        }
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_number(&mut self) -> Result<Token, ParseError> {
        let line = self.line;
        let start = self.pos;

        if self.peek_byte() == Some(b'0') && matches!(self.peek_byte_at(1), Some(b'x') | Some(b'X')) {
            self.pos += 2;
            let digits_start = self.pos;
            while self.peek_byte().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits = self.slice(digits_start);
            let value = u64::from_str_radix(&digits, 16).map_err(|_| ParseError::Syntax {
                line,
                message: format!("illegal hexadecimal number '{}'", self.slice(start)),
            })?;
            self.check_number_end(start)?;
            return Ok(Token::Int(value));
        }

        let mut is_float = false;
        while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek_byte() == Some(b'.') {
            is_float = true;
            self.pos += 1;
            while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek_byte(), Some(b'e') | Some(b'E')) {
            is_float = true;
            self.pos += 1;
            if matches!(self.peek_byte(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            let exp_start = self.pos;
            while self.peek_byte().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
            if self.pos == exp_start {
                return Err(ParseError::Syntax {
                    line,
                    message: format!("illegal number '{}'", self.slice(start)),
                });
            }
        }
        self.check_number_end(start)?;

        let text = self.slice(start);
        if is_float {
            let value = text.parse::<f64>().map_err(|_| ParseError::Syntax {
                line,
                message: format!("illegal number '{text}'"),
            })?;
            return Ok(Token::Float(value));
        }

        let (digits, radix) = if text.len() > 1 && text.starts_with('0') {
            (&text[1..], 8)
        } else {
            (text.as_str(), 10)
        };
        let value = u64::from_str_radix(digits, radix).map_err(|_| ParseError::Syntax {
            line,
            message: format!("illegal number '{text}'"),
        })?;
        Ok(Token::Int(value))
    }

    fn check_number_end(&self, start: usize) -> Result<(), ParseError> {
        if self.peek_byte().is_some_and(is_ident_char) {
            let mut end = self.pos;
            while self.input.get(end).copied().is_some_and(is_ident_char) {
                end += 1;
            }
            return Err(ParseError::Syntax {
                line: self.line,
                message: format!(
                    "illegal number '{}'",
                    String::from_utf8_lossy(&self.input[start..end])
                ),
            });
        }
        Ok(())
    }

    fn slice(&self, start: usize) -> String {
        String::from_utf8_lossy(&self.input[start..self.pos]).into_owned()
    }

    fn read_string(&mut self, quote: u8) -> Result<String, ParseError> {
        let line = self.line;
        self.pos += 1;
        let mut bytes = Vec::new();
        loop {
            let b = match self.peek_byte() {
                Some(b'\n') | None => return Err(ParseError::UnterminatedString { line }),
                Some(b) => b,
            };
            self.pos += 1;
            if b == quote {
                break;
            }
            if b != b'\\' {
                bytes.push(b);
                continue;
            }
            let escaped = self
                .peek_byte()
                .ok_or(ParseError::UnterminatedString { line })?;
            self.pos += 1;
            match escaped {
                b'a' => bytes.push(0x07),
                b'b' => bytes.push(0x08),
                b'f' => bytes.push(0x0c),
                b'n' => bytes.push(b'\n'),
                b'r' => bytes.push(b'\r'),
                b't' => bytes.push(b'\t'),
                b'v' => bytes.push(0x0b),
                b'x' | b'X' => {
                    let mut value = 0u32;
                    let mut count = 0;
                    while count < 2 {
                        match self.peek_byte().and_then(|c| (c as char).to_digit(16)) {
                            Some(d) => {
                                value = value * 16 + d;
                                self.pos += 1;
                                count += 1;
                            }
                            None => break,
                        }
                    }
                    if count == 0 {
                        return Err(ParseError::Syntax {
                            line,
                            message: "\\x escape without hex digits".into(),
                        });
                    }
                    bytes.push(value as u8);
                }
                b'0'..=b'7' => {
                    let mut value = (escaped - b'0') as u32;
                    let mut count = 1;
                    while count < 3 {
                        match self.peek_byte() {
                            Some(c @ b'0'..=b'7') => {
                                value = value * 8 + (c - b'0') as u32;
                                self.pos += 1;
                                count += 1;
                            }
                            _ => break,
                        }
                    }
                    let byte = u8::try_from(value).map_err(|_| ParseError::Syntax {
                        line,
                        message: format!("octal escape \\{value:o} is out of range"),
                    })?;
                    bytes.push(byte);
                }
                other => bytes.push(other),
            }
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
