use std::fmt;

/// Lexical token. Valued variants compare payload as well as tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Number(i64),
    Id(String),
    Str(String),
    Char(char),

    // Keywords
    Class,
    Return,
    If,
    Else,
    Def,
    Print,
    And,
    Or,
    Not,
    None,
    True,
    False,

    // Compound operators
    Eq,          // ==
    NotEq,       // !=
    LessOrEq,    // <=
    GreaterOrEq, // >=

    // Structural
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(value) => write!(f, "Number{{{value}}}"),
            Token::Id(name) => write!(f, "Id{{{name}}}"),
            Token::Str(value) => write!(f, "String{{{value}}}"),
            Token::Char(value) => write!(f, "Char{{{value}}}"),
            Token::Class => write!(f, "Class"),
            Token::Return => write!(f, "Return"),
            Token::If => write!(f, "If"),
            Token::Else => write!(f, "Else"),
            Token::Def => write!(f, "Def"),
            Token::Print => write!(f, "Print"),
            Token::And => write!(f, "And"),
            Token::Or => write!(f, "Or"),
            Token::Not => write!(f, "Not"),
            Token::None => write!(f, "None"),
            Token::True => write!(f, "True"),
            Token::False => write!(f, "False"),
            Token::Eq => write!(f, "Eq"),
            Token::NotEq => write!(f, "NotEq"),
            Token::LessOrEq => write!(f, "LessOrEq"),
            Token::GreaterOrEq => write!(f, "GreaterOrEq"),
            Token::Newline => write!(f, "Newline"),
            Token::Indent => write!(f, "Indent"),
            Token::Dedent => write!(f, "Dedent"),
            Token::Eof => write!(f, "Eof"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valued_tokens_compare_payload() {
        assert_eq!(Token::Number(57), Token::Number(57));
        assert_ne!(Token::Number(57), Token::Number(58));
        assert_eq!(Token::Id("x".to_string()), Token::Id("x".to_string()));
        assert_ne!(Token::Id("x".to_string()), Token::Str("x".to_string()));
        assert_ne!(Token::Char('+'), Token::Char('-'));
    }

    #[test]
    fn formats_tokens_for_error_messages() {
        assert_eq!(Token::Number(57).to_string(), "Number{57}");
        assert_eq!(Token::Id("count".to_string()).to_string(), "Id{count}");
        assert_eq!(Token::Char(':').to_string(), "Char{:}");
        assert_eq!(Token::Newline.to_string(), "Newline");
        assert_eq!(Token::GreaterOrEq.to_string(), "GreaterOrEq");
    }
}
