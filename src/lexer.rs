use std::iter::Peekable;
use std::str::Chars;

use thiserror::Error;

use crate::token::Token;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LexError {
    #[error("Indentation of {width} spaces is not a multiple of two")]
    BadIndent { width: usize },
    #[error("Unexpected character '{character}'")]
    UnexpectedCharacter { character: char },
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Invalid integer literal '{literal}'")]
    InvalidIntegerLiteral { literal: String },
    #[error("Expected {expected}, got {found}")]
    Expect { expected: String, found: String },
}

pub type LexResult<T> = Result<T, LexError>;

fn keyword_token(word: &str) -> Option<Token> {
    let token = match word {
        "class" => Token::Class,
        "return" => Token::Return,
        "if" => Token::If,
        "else" => Token::Else,
        "def" => Token::Def,
        "print" => Token::Print,
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "None" => Token::None,
        "True" => Token::True,
        "False" => Token::False,
        _ => return None,
    };
    Some(token)
}

fn is_punctuation(c: char) -> bool {
    matches!(
        c,
        '.' | ','
            | '('
            | ')'
            | '+'
            | '-'
            | '*'
            | '/'
            | ':'
            | '@'
            | '%'
            | '$'
            | '^'
            | '&'
            | ';'
            | '?'
            | '{'
            | '}'
            | '['
            | ']'
    )
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> LexResult<Token> {
    let mut literal = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        literal.push(c);
        chars.next();
    }
    let value = literal
        .parse::<i64>()
        .map_err(|_| LexError::InvalidIntegerLiteral { literal })?;
    Ok(Token::Number(value))
}

fn read_word(chars: &mut Peekable<Chars<'_>>) -> Token {
    let mut word = String::new();
    while let Some(&c) = chars.peek() {
        if !(c.is_ascii_alphanumeric() || c == '_') {
            break;
        }
        word.push(c);
        chars.next();
    }
    keyword_token(&word).unwrap_or(Token::Id(word))
}

fn read_string(chars: &mut Peekable<Chars<'_>>, quote: char) -> LexResult<Token> {
    chars.next(); // opening quote
    let mut content = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(Token::Str(content)),
            Some('\\') => match chars.next() {
                Some('n') => content.push('\n'),
                Some('t') => content.push('\t'),
                Some(c @ ('\'' | '"')) => content.push(c),
                // Any other escape pair is dropped entirely.
                Some(_) => {}
                None => return Err(LexError::UnterminatedString),
            },
            Some(c) => content.push(c),
            None => return Err(LexError::UnterminatedString),
        }
    }
}

fn read_operator(chars: &mut Peekable<Chars<'_>>, first: char) -> Token {
    chars.next();
    if chars.peek() == Some(&'=') {
        chars.next();
        match first {
            '=' => Token::Eq,
            '!' => Token::NotEq,
            '<' => Token::LessOrEq,
            _ => Token::GreaterOrEq,
        }
    } else {
        Token::Char(first)
    }
}

/// Tokenizes the remainder of one source line, after leading indentation.
fn lex_line(content: &str, tokens: &mut Vec<Token>) -> LexResult<()> {
    let mut chars = content.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' => {
                chars.next();
            }
            '#' => break,
            '0'..='9' => tokens.push(read_number(&mut chars)?),
            '"' | '\'' => tokens.push(read_string(&mut chars, c)?),
            '=' | '!' | '<' | '>' => tokens.push(read_operator(&mut chars, c)),
            _ if c.is_ascii_alphabetic() || c == '_' => tokens.push(read_word(&mut chars)),
            _ if is_punctuation(c) => {
                chars.next();
                tokens.push(Token::Char(c));
            }
            other => return Err(LexError::UnexpectedCharacter { character: other }),
        }
    }
    Ok(())
}

/// Tokenizes a whole source text.
///
/// The input is consumed line by line. Lines that carry only whitespace or a
/// comment produce no tokens and leave the indentation level untouched. The
/// indent unit is two spaces; odd leading-space counts are rejected. At end of
/// input all open indentation levels are closed before the final `Eof`.
pub fn tokenize(input: &str) -> LexResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut indent_level = 0usize;

    for line in input.lines() {
        let content = line.trim_start_matches(' ');
        if content.is_empty() || content.starts_with('#') {
            continue;
        }

        let width = line.len() - content.len();
        if width % 2 != 0 {
            return Err(LexError::BadIndent { width });
        }
        let level = width / 2;
        while indent_level < level {
            tokens.push(Token::Indent);
            indent_level += 1;
        }
        while indent_level > level {
            tokens.push(Token::Dedent);
            indent_level -= 1;
        }

        lex_line(content, &mut tokens)?;
        if tokens.last() != Some(&Token::Newline) {
            tokens.push(Token::Newline);
        }
    }

    while indent_level > 0 {
        tokens.push(Token::Dedent);
        indent_level -= 1;
    }
    tokens.push(Token::Eof);
    Ok(tokens)
}

/// Cursor over a tokenized program.
///
/// `current` returns the head token; `advance` moves past it and returns the
/// new head. The cursor never runs off the end: once `Eof` is reached it stays
/// there.
pub struct Lexer {
    tokens: Vec<Token>,
    pos: usize,
}

impl Lexer {
    pub fn new(input: &str) -> LexResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    pub fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    pub fn advance(&mut self) -> &Token {
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        self.current()
    }

    pub fn expect(&self, expected: &Token) -> LexResult<()> {
        if self.current() == expected {
            Ok(())
        } else {
            Err(LexError::Expect {
                expected: expected.to_string(),
                found: self.current().to_string(),
            })
        }
    }

    pub fn expect_id(&self) -> LexResult<&str> {
        if let Token::Id(name) = self.current() {
            Ok(name)
        } else {
            Err(LexError::Expect {
                expected: "Id".to_string(),
                found: self.current().to_string(),
            })
        }
    }

    pub fn expect_next(&mut self, expected: &Token) -> LexResult<()> {
        self.advance();
        self.expect(expected)
    }
}
