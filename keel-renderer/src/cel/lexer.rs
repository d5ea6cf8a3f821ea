//! Tokenizer for expression source.

use crate::cel::error::CompileError;

/// Words the language reserves and rejects as identifiers.
const RESERVED: &[&str] = &[
    "as", "break", "const", "continue", "else", "for", "function", "if", "import", "let",
    "loop", "package", "namespace", "return", "var", "void", "while",
];

/// Whether `word` can never be used as an identifier.
pub fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word) || matches!(word, "true" | "false" | "null" | "in")
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Ident(String),
    /// Unsigned magnitude of an int literal; the parser applies sign and range.
    Int(u64),
    Uint(u64),
    Double(f64),
    Str(String),
    Bytes(Vec<u8>),
    True,
    False,
    Null,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Dot,
    Comma,
    Colon,
    Question,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Bang,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    /// 1-based column of the first character.
    pub column: usize,
}

pub fn tokenize(src: &str) -> Result<Vec<Spanned>, CompileError> {
    Lexer {
        chars: src.chars().collect(),
        pos: 0,
    }
    .run()
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn err(&self, column: usize, message: impl Into<String>) -> CompileError {
        CompileError::syntax(column, message)
    }

    fn run(mut self) -> Result<Vec<Spanned>, CompileError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_trivia();
            let column = self.pos + 1;
            let Some(c) = self.peek() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    column,
                });
                return Ok(tokens);
            };
            let token = match c {
                '0'..='9' => self.number()?,
                '.' if self.peek_at(1).is_some_and(|d| d.is_ascii_digit()) => self.number()?,
                '"' | '\'' => self.string(false, false)?,
                'r' | 'R' | 'b' | 'B' if self.string_prefix_len() > 0 => {
                    let len = self.string_prefix_len();
                    let prefix: String = self.chars[self.pos..self.pos + len].iter().collect();
                    let prefix = prefix.to_ascii_lowercase();
                    self.pos += len;
                    self.string(prefix.contains('r'), prefix.contains('b'))?
                }
                c if c == '_' || c.is_alphabetic() => self.word(column)?,
                _ => self.punct(column)?,
            };
            tokens.push(Spanned { token, column });
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '/' && self.peek_at(1) == Some('/') {
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

    /// Length of an `r`/`b`/`rb`/`br` prefix directly followed by a quote, or 0.
    fn string_prefix_len(&self) -> usize {
        let is_quote = |c: Option<char>| matches!(c, Some('"') | Some('\''));
        let first = self.peek().map(|c| c.to_ascii_lowercase());
        let second = self.peek_at(1).map(|c| c.to_ascii_lowercase());
        match (first, second) {
            (Some('r'), Some('b')) | (Some('b'), Some('r')) if is_quote(self.peek_at(2)) => 2,
            (Some('r'), _) | (Some('b'), _) if is_quote(self.peek_at(1)) => 1,
            _ => 0,
        }
    }

    fn word(&mut self, column: usize) -> Result<Token, CompileError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word: String = self.chars[start..self.pos].iter().collect();
        Ok(match word.as_str() {
            "true" => Token::True,
            "false" => Token::False,
            "null" => Token::Null,
            "in" => Token::In,
            w if RESERVED.contains(&w) => {
                return Err(self.err(column, format!("reserved identifier: {w}")))
            }
            _ => Token::Ident(word),
        })
    }

    fn number(&mut self) -> Result<Token, CompileError> {
        let column = self.pos + 1;
        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x') | Some('X')) {
            self.pos += 2;
            let start = self.pos;
            while self.peek().is_some_and(|c| c.is_ascii_hexdigit()) {
                self.pos += 1;
            }
            let digits: String = self.chars[start..self.pos].iter().collect();
            let value = u64::from_str_radix(&digits, 16)
                .map_err(|_| self.err(column, format!("invalid hex literal: 0x{digits}")))?;
            return Ok(self.int_suffix(value));
        }

        let start = self.pos;
        let mut is_double = false;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            is_double = true;
            self.pos += 1;
            while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            let sign = usize::from(matches!(self.peek_at(1), Some('+') | Some('-')));
            if self.peek_at(1 + sign).is_some_and(|c| c.is_ascii_digit()) {
                is_double = true;
                self.pos += 1 + sign;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        if is_double {
            let value = text
                .parse::<f64>()
                .map_err(|_| self.err(column, format!("invalid double literal: {text}")))?;
            return Ok(Token::Double(value));
        }
        let value = text
            .parse::<u64>()
            .map_err(|_| self.err(column, format!("integer literal out of range: {text}")))?;
        Ok(self.int_suffix(value))
    }

    fn int_suffix(&mut self, value: u64) -> Token {
        if matches!(self.peek(), Some('u') | Some('U')) {
            self.pos += 1;
            Token::Uint(value)
        } else {
            Token::Int(value)
        }
    }

    fn string(&mut self, raw: bool, bytes: bool) -> Result<Token, CompileError> {
        let column = self.pos + 1;
        let Some(quote) = self.bump() else {
            return Err(self.err(column, "expected string literal"));
        };
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }

        let mut out: Vec<u8> = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(self.err(column, "unterminated string literal"));
            };
            if c == quote {
                if !triple {
                    break;
                }
                if self.peek() == Some(quote) && self.peek_at(1) == Some(quote) {
                    self.pos += 2;
                    break;
                }
            } else if c == '\n' && !triple {
                return Err(self.err(column, "newline in string literal"));
            } else if c == '\\' && !raw {
                self.escape(column, bytes, &mut out)?;
                continue;
            }
            push_char(&mut out, c);
        }

        if bytes {
            Ok(Token::Bytes(out))
        } else {
            String::from_utf8(out)
                .map(Token::Str)
                .map_err(|_| self.err(column, "string literal is not valid UTF-8"))
        }
    }

    fn escape(&mut self, column: usize, bytes: bool, out: &mut Vec<u8>) -> Result<(), CompileError> {
        let Some(c) = self.bump() else {
            return Err(self.err(column, "unterminated escape sequence"));
        };
        let simple = match c {
            'a' => Some('\u{07}'),
            'b' => Some('\u{08}'),
            'f' => Some('\u{0C}'),
            'n' => Some('\n'),
            'r' => Some('\r'),
            't' => Some('\t'),
            'v' => Some('\u{0B}'),
            '\\' | '\'' | '"' | '`' | '?' => Some(c),
            _ => None,
        };
        if let Some(ch) = simple {
            push_char(out, ch);
            return Ok(());
        }
        match c {
            'x' | 'X' => {
                let code = self.hex_digits(column, 2)?;
                if bytes {
                    out.push(code as u8);
                } else {
                    push_code_point(out, code).ok_or_else(|| self.err(column, "invalid escape"))?;
                }
            }
            'u' if !bytes => {
                let code = self.hex_digits(column, 4)?;
                push_code_point(out, code)
                    .ok_or_else(|| self.err(column, "invalid unicode escape"))?;
            }
            'U' if !bytes => {
                let code = self.hex_digits(column, 8)?;
                push_code_point(out, code)
                    .ok_or_else(|| self.err(column, "invalid unicode escape"))?;
            }
            '0'..='3' => {
                let mut code = c.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    let digit = self
                        .bump()
                        .and_then(|d| d.to_digit(8))
                        .ok_or_else(|| self.err(column, "invalid octal escape"))?;
                    code = code * 8 + digit;
                }
                if bytes {
                    out.push(code as u8);
                } else {
                    push_code_point(out, code).ok_or_else(|| self.err(column, "invalid escape"))?;
                }
            }
            other => return Err(self.err(column, format!("invalid escape sequence: \\{other}"))),
        }
        Ok(())
    }

    fn hex_digits(&mut self, column: usize, count: usize) -> Result<u32, CompileError> {
        let mut code = 0u32;
        for _ in 0..count {
            let digit = self
                .bump()
                .and_then(|d| d.to_digit(16))
                .ok_or_else(|| self.err(column, "invalid hex escape"))?;
            code = code * 16 + digit;
        }
        Ok(code)
    }

    fn punct(&mut self, column: usize) -> Result<Token, CompileError> {
        let Some(c) = self.bump() else {
            return Ok(Token::Eof);
        };
        let next = self.peek();
        let two = |lexer: &mut Lexer, token: Token| {
            lexer.pos += 1;
            token
        };
        Ok(match (c, next) {
            ('=', Some('=')) => two(self, Token::EqEq),
            ('!', Some('=')) => two(self, Token::NotEq),
            ('<', Some('=')) => two(self, Token::Le),
            ('>', Some('=')) => two(self, Token::Ge),
            ('&', Some('&')) => two(self, Token::AndAnd),
            ('|', Some('|')) => two(self, Token::OrOr),
            ('(', _) => Token::LParen,
            (')', _) => Token::RParen,
            ('[', _) => Token::LBracket,
            (']', _) => Token::RBracket,
            ('{', _) => Token::LBrace,
            ('}', _) => Token::RBrace,
            ('.', _) => Token::Dot,
            (',', _) => Token::Comma,
            (':', _) => Token::Colon,
            ('?', _) => Token::Question,
            ('+', _) => Token::Plus,
            ('-', _) => Token::Minus,
            ('*', _) => Token::Star,
            ('/', _) => Token::Slash,
            ('%', _) => Token::Percent,
            ('!', _) => Token::Bang,
            ('<', _) => Token::Lt,
            ('>', _) => Token::Gt,
            (other, _) => return Err(self.err(column, format!("unexpected character '{other}'"))),
        })
    }
}

fn push_char(out: &mut Vec<u8>, c: char) {
    let mut buf = [0u8; 4];
    out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
}

fn push_code_point(out: &mut Vec<u8>, code: u32) -> Option<()> {
    let c = char::from_u32(code)?;
    push_char(out, c);
    Some(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
