//! Execution driver.
//!
//! Wires the pipeline together: tokenize the source, parse it into the
//! executable node tree, then run the program once against an empty root
//! scope and the given output stream. Output produced before a failure has
//! already been written when the error surfaces, matching the streaming
//! behavior of `print`.

use std::io;

use thiserror::Error;

use crate::lexer::{LexError, Lexer};
use crate::parser::{self, ParseError};
use crate::runtime::{Closure, Context, RuntimeError, Unwind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterpreterError {
    #[error(transparent)]
    Lex(#[from] LexError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

pub fn run_program(source: &str, output: &mut dyn io::Write) -> Result<(), InterpreterError> {
    let lexer = Lexer::new(source)?;
    let program = parser::parse_program(lexer)?;

    let mut closure = Closure::new();
    let mut ctx = Context::new(output);
    match program.execute(&mut closure, &mut ctx) {
        Ok(_) => Ok(()),
        Err(Unwind::Return(_)) => Err(RuntimeError::ReturnOutsideMethod.into()),
        Err(Unwind::Error(error)) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn run(source: &str) -> String {
        let mut output = Vec::new();
        run_program(source, &mut output).expect("program should run");
        String::from_utf8(output).expect("output should be utf-8")
    }

    #[test]
    fn runs_a_program_end_to_end() {
        let source = indoc! {"
            x = 2 + 3
            print x
        "};
        assert_eq!(run(source), "5\n");
    }

    #[test]
    fn lex_errors_surface_with_their_kind() {
        let mut output = Vec::new();
        let err = run_program("x = 'oops\n", &mut output).expect_err("expected lex failure");
        assert_eq!(err, InterpreterError::Lex(LexError::UnterminatedString));
    }

    #[test]
    fn parse_errors_surface_with_their_kind() {
        let mut output = Vec::new();
        let err = run_program("else:\n", &mut output).expect_err("expected parse failure");
        assert!(matches!(err, InterpreterError::Parse(_)));
    }

    #[test]
    fn top_level_return_is_a_runtime_error() {
        let mut output = Vec::new();
        let err = run_program("return 1\n", &mut output).expect_err("expected runtime failure");
        assert_eq!(
            err,
            InterpreterError::Runtime(RuntimeError::ReturnOutsideMethod)
        );
    }

    #[test]
    fn output_before_a_failure_is_preserved() {
        let source = indoc! {"
            print 'before'
            print missing
        "};
        let mut output = Vec::new();
        let err = run_program(source, &mut output).expect_err("expected runtime failure");
        assert_eq!(
            err,
            InterpreterError::Runtime(RuntimeError::UndefinedName {
                name: "missing".to_string()
            })
        );
        assert_eq!(String::from_utf8(output).expect("utf-8"), "before\n");
    }
}
