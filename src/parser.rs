//! Recursive-descent parser.
//!
//! The parser owns a class table so that a call site `Name(args)` can be
//! resolved while parsing: when `Name` is a class in scope the call compiles
//! to instance construction, otherwise to a method call with an empty
//! receiver path. Base classes are looked up in the same table, which is why
//! a class must be defined before it is named as a parent.

use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;

use crate::ast::{BinaryOp, CompareOp, LogicalOp, Node};
use crate::lexer::{LexError, Lexer};
use crate::runtime::{Class, Method, ObjectHolder, Value};
use crate::token::Token;

const STRINGIFY_NAME: &str = "str";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unexpected token {token}")]
    Unexpected { token: String },
    #[error("Unknown base class '{name}'")]
    UnknownBaseClass { name: String },
    #[error("Duplicate definition of method '{method}' in class '{class_name}'")]
    DuplicateMethod { class_name: String, method: String },
    #[error(transparent)]
    Lex(#[from] LexError),
}

pub struct Parser {
    lexer: Lexer,
    classes: HashMap<String, Rc<Class>>,
}

impl Parser {
    pub fn new(lexer: Lexer) -> Self {
        Self {
            lexer,
            classes: HashMap::new(),
        }
    }

    pub fn parse_program(mut self) -> Result<Node, ParseError> {
        let mut statements = Vec::new();
        while !matches!(self.lexer.current(), Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        Ok(Node::Compound { statements })
    }

    fn parse_statement(&mut self) -> Result<Node, ParseError> {
        match self.lexer.current() {
            Token::Class => self.parse_class_def(),
            Token::If => self.parse_if(),
            Token::Print => self.parse_print(),
            Token::Return => self.parse_return(),
            Token::Id(_) => self.parse_assignment_or_call(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_class_def(&mut self) -> Result<Node, ParseError> {
        self.consume(&Token::Class)?;
        let name = self.consume_id()?;

        let parent = if matches!(self.lexer.current(), Token::Char('(')) {
            self.lexer.advance();
            let parent_name = self.consume_id()?;
            self.consume(&Token::Char(')'))?;
            let parent = self
                .classes
                .get(&parent_name)
                .cloned()
                .ok_or_else(|| ParseError::UnknownBaseClass { name: parent_name })?;
            Some(parent)
        } else {
            None
        };

        self.consume(&Token::Char(':'))?;
        self.consume(&Token::Newline)?;
        self.consume(&Token::Indent)?;

        let mut methods: Vec<Method> = Vec::new();
        while matches!(self.lexer.current(), Token::Def) {
            let method = self.parse_method_def()?;
            let duplicate = methods.iter().any(|existing| {
                existing.name == method.name
                    && existing.formal_params.len() == method.formal_params.len()
            });
            if duplicate {
                return Err(ParseError::DuplicateMethod {
                    class_name: name.clone(),
                    method: method.name,
                });
            }
            methods.push(method);
            self.consume_newlines();
        }
        if methods.is_empty() {
            return Err(self.unexpected());
        }
        self.consume(&Token::Dedent)?;

        let class = Rc::new(Class::new(name.clone(), methods, parent));
        self.classes.insert(name.clone(), class.clone());
        Ok(Node::ClassDefinition {
            name,
            class: ObjectHolder::own(Value::Class(class)),
        })
    }

    fn parse_method_def(&mut self) -> Result<Method, ParseError> {
        self.consume(&Token::Def)?;
        let name = self.consume_id()?;
        self.consume(&Token::Char('('))?;
        let mut formal_params = Vec::new();
        if matches!(self.lexer.current(), Token::Id(_)) {
            formal_params.push(self.consume_id()?);
            while matches!(self.lexer.current(), Token::Char(',')) {
                self.lexer.advance();
                formal_params.push(self.consume_id()?);
            }
        }
        self.consume(&Token::Char(')'))?;
        self.consume(&Token::Char(':'))?;
        let body = self.parse_suite()?;
        Ok(Method {
            name,
            formal_params,
            body: Node::MethodBody {
                body: Box::new(body),
            },
        })
    }

    fn parse_if(&mut self) -> Result<Node, ParseError> {
        self.consume(&Token::If)?;
        let condition = self.parse_expression()?;
        self.consume(&Token::Char(':'))?;
        let then_body = self.parse_suite()?;

        let else_body = if matches!(self.lexer.current(), Token::Else) {
            self.lexer.advance();
            self.consume(&Token::Char(':'))?;
            Some(Box::new(self.parse_suite()?))
        } else {
            None
        };

        Ok(Node::IfElse {
            condition: Box::new(condition),
            then_body: Box::new(then_body),
            else_body,
        })
    }

    fn parse_print(&mut self) -> Result<Node, ParseError> {
        self.consume(&Token::Print)?;
        let args = if matches!(self.lexer.current(), Token::Newline) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.consume(&Token::Newline)?;
        Ok(Node::Print { args })
    }

    fn parse_return(&mut self) -> Result<Node, ParseError> {
        self.consume(&Token::Return)?;
        let value = self.parse_expression()?;
        self.consume(&Token::Newline)?;
        Ok(Node::Return {
            value: Box::new(value),
        })
    }

    fn parse_assignment_or_call(&mut self) -> Result<Node, ParseError> {
        let path = self.parse_dotted()?;
        match self.lexer.current() {
            Token::Char('=') => {
                self.lexer.advance();
                let value = Box::new(self.parse_expression()?);
                self.consume(&Token::Newline)?;
                let mut path = path;
                let last = path.pop().unwrap_or_default();
                if path.is_empty() {
                    Ok(Node::Assignment { name: last, value })
                } else {
                    Ok(Node::FieldAssignment {
                        object: Box::new(Node::Variable { path }),
                        field: last,
                        value,
                    })
                }
            }
            Token::Char('(') => {
                let call = self.parse_call(path)?;
                self.consume(&Token::Newline)?;
                Ok(call)
            }
            _ => Err(self.unexpected()),
        }
    }

    /// `suite := NEWLINE INDENT stmt+ DEDENT`
    fn parse_suite(&mut self) -> Result<Node, ParseError> {
        self.consume(&Token::Newline)?;
        self.consume(&Token::Indent)?;
        let mut statements = Vec::new();
        while !matches!(self.lexer.current(), Token::Dedent | Token::Eof) {
            if self.consume_newlines() {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        if statements.is_empty() {
            return Err(self.unexpected());
        }
        self.consume(&Token::Dedent)?;
        Ok(Node::Compound { statements })
    }

    fn parse_expression(&mut self) -> Result<Node, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_and()?;
        while matches!(self.lexer.current(), Token::Or) {
            self.lexer.advance();
            let rhs = self.parse_and()?;
            expr = Node::Logical {
                op: LogicalOp::Or,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_not()?;
        while matches!(self.lexer.current(), Token::And) {
            self.lexer.advance();
            let rhs = self.parse_not()?;
            expr = Node::Logical {
                op: LogicalOp::And,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_not(&mut self) -> Result<Node, ParseError> {
        if matches!(self.lexer.current(), Token::Not) {
            self.lexer.advance();
            let argument = self.parse_comparison()?;
            return Ok(Node::Not {
                argument: Box::new(argument),
            });
        }
        self.parse_comparison()
    }

    /// Comparisons are non-associative: at most one operator per level.
    fn parse_comparison(&mut self) -> Result<Node, ParseError> {
        let expr = self.parse_additive()?;
        let op = match self.lexer.current() {
            Token::Eq => CompareOp::Equal,
            Token::NotEq => CompareOp::NotEqual,
            Token::LessOrEq => CompareOp::LessOrEqual,
            Token::GreaterOrEq => CompareOp::GreaterOrEqual,
            Token::Char('<') => CompareOp::Less,
            Token::Char('>') => CompareOp::Greater,
            _ => return Ok(expr),
        };
        self.lexer.advance();
        let rhs = self.parse_additive()?;
        Ok(Node::Comparison {
            op,
            lhs: Box::new(expr),
            rhs: Box::new(rhs),
        })
    }

    fn parse_additive(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_multiplicative()?;
        loop {
            let op = match self.lexer.current() {
                Token::Char('+') => BinaryOp::Add,
                Token::Char('-') => BinaryOp::Sub,
                _ => break,
            };
            self.lexer.advance();
            let rhs = self.parse_multiplicative()?;
            expr = Node::Binary {
                op,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_multiplicative(&mut self) -> Result<Node, ParseError> {
        let mut expr = self.parse_unary()?;
        loop {
            let op = match self.lexer.current() {
                Token::Char('*') => BinaryOp::Mul,
                Token::Char('/') => BinaryOp::Div,
                _ => break,
            };
            self.lexer.advance();
            let rhs = self.parse_unary()?;
            expr = Node::Binary {
                op,
                lhs: Box::new(expr),
                rhs: Box::new(rhs),
            };
        }
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Node, ParseError> {
        if matches!(self.lexer.current(), Token::Char('-')) {
            self.lexer.advance();
            let atom = self.parse_atom()?;
            return Ok(Node::Binary {
                op: BinaryOp::Sub,
                lhs: Box::new(Node::NumberLit(0)),
                rhs: Box::new(atom),
            });
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Node, ParseError> {
        match self.lexer.current() {
            Token::Number(value) => {
                let value = *value;
                self.lexer.advance();
                Ok(Node::NumberLit(value))
            }
            Token::Str(value) => {
                let value = value.clone();
                self.lexer.advance();
                Ok(Node::StringLit(value))
            }
            Token::True => {
                self.lexer.advance();
                Ok(Node::BoolLit(true))
            }
            Token::False => {
                self.lexer.advance();
                Ok(Node::BoolLit(false))
            }
            Token::None => {
                self.lexer.advance();
                Ok(Node::NoneLit)
            }
            Token::Char('(') => {
                self.lexer.advance();
                let expr = self.parse_expression()?;
                self.consume(&Token::Char(')'))?;
                Ok(expr)
            }
            Token::Id(_) => {
                let path = self.parse_dotted()?;
                if matches!(self.lexer.current(), Token::Char('(')) {
                    self.parse_call(path)
                } else {
                    Ok(Node::Variable { path })
                }
            }
            _ => Err(self.unexpected()),
        }
    }

    /// Compiles `dotted(args...)`, with the current token at `(`.
    ///
    /// A one-part path naming a class in scope constructs an instance; the
    /// `str` builtin with one argument becomes `Stringify`; anything else is
    /// a method call whose receiver is the dotted prefix (possibly empty).
    fn parse_call(&mut self, mut path: Vec<String>) -> Result<Node, ParseError> {
        self.consume(&Token::Char('('))?;
        let mut args = if matches!(self.lexer.current(), Token::Char(')')) {
            Vec::new()
        } else {
            self.parse_expr_list()?
        };
        self.consume(&Token::Char(')'))?;

        let method = path.pop().unwrap_or_default();
        if path.is_empty() {
            if let Some(class) = self.classes.get(&method) {
                return Ok(Node::NewInstance {
                    class: class.clone(),
                    args,
                });
            }
            if method == STRINGIFY_NAME && args.len() == 1 {
                let argument = args.remove(0);
                return Ok(Node::Stringify {
                    argument: Box::new(argument),
                });
            }
        }
        Ok(Node::MethodCall {
            receiver: Box::new(Node::Variable { path }),
            method,
            args,
        })
    }

    fn parse_dotted(&mut self) -> Result<Vec<String>, ParseError> {
        let mut path = vec![self.consume_id()?];
        while matches!(self.lexer.current(), Token::Char('.')) {
            self.lexer.advance();
            path.push(self.consume_id()?);
        }
        Ok(path)
    }

    fn parse_expr_list(&mut self) -> Result<Vec<Node>, ParseError> {
        let mut exprs = vec![self.parse_expression()?];
        while matches!(self.lexer.current(), Token::Char(',')) {
            self.lexer.advance();
            exprs.push(self.parse_expression()?);
        }
        Ok(exprs)
    }

    fn consume(&mut self, token: &Token) -> Result<(), ParseError> {
        self.lexer.expect(token)?;
        self.lexer.advance();
        Ok(())
    }

    fn consume_id(&mut self) -> Result<String, ParseError> {
        let name = self.lexer.expect_id()?.to_string();
        self.lexer.advance();
        Ok(name)
    }

    fn consume_newlines(&mut self) -> bool {
        let mut consumed = false;
        while matches!(self.lexer.current(), Token::Newline) {
            consumed = true;
            self.lexer.advance();
        }
        consumed
    }

    fn unexpected(&self) -> ParseError {
        ParseError::Unexpected {
            token: self.lexer.current().to_string(),
        }
    }
}

pub fn parse_program(lexer: Lexer) -> Result<Node, ParseError> {
    Parser::new(lexer).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    fn parse(source: &str) -> Result<Node, ParseError> {
        let lexer = Lexer::new(source).expect("tokenize should succeed");
        parse_program(lexer)
    }

    fn parse_statements(source: &str) -> Vec<Node> {
        match parse(source).expect("parse should succeed") {
            Node::Compound { statements } => statements,
            other => panic!("expected compound program, got {other:?}"),
        }
    }

    #[test]
    fn parses_assignment_with_precedence() {
        let statements = parse_statements("x = 1 + 2 * 3\n");
        let [Node::Assignment { name, value }] = statements.as_slice() else {
            panic!("expected single assignment, got {statements:?}");
        };
        assert_eq!(name, "x");
        let Node::Binary {
            op: BinaryOp::Add,
            rhs,
            ..
        } = value.as_ref()
        else {
            panic!("expected addition at the top, got {value:?}");
        };
        assert!(matches!(
            rhs.as_ref(),
            Node::Binary {
                op: BinaryOp::Mul,
                ..
            }
        ));
    }

    #[test]
    fn unary_minus_becomes_subtraction_from_zero() {
        let statements = parse_statements("x = -8\n");
        let [Node::Assignment { value, .. }] = statements.as_slice() else {
            panic!("expected assignment");
        };
        let Node::Binary {
            op: BinaryOp::Sub,
            lhs,
            rhs,
        } = value.as_ref()
        else {
            panic!("expected subtraction, got {value:?}");
        };
        assert!(matches!(lhs.as_ref(), Node::NumberLit(0)));
        assert!(matches!(rhs.as_ref(), Node::NumberLit(8)));
    }

    #[test]
    fn dotted_assignment_becomes_field_assignment() {
        let statements = parse_statements("self.counter.value = 1\n");
        let [Node::FieldAssignment { object, field, .. }] = statements.as_slice() else {
            panic!("expected field assignment");
        };
        assert_eq!(field, "value");
        assert!(matches!(
            object.as_ref(),
            Node::Variable { path } if path == &["self".to_string(), "counter".to_string()]
        ));
    }

    #[test]
    fn call_on_class_name_constructs_an_instance() {
        let source = indoc! {"
            class Counter:
              def add():
                return 1
            x = Counter()
            y = other()
        "};
        let statements = parse_statements(source);
        assert!(matches!(statements[0], Node::ClassDefinition { .. }));

        let Node::Assignment { value, .. } = &statements[1] else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Node::NewInstance { .. }));

        // An unknown bare name stays a method call with an empty receiver.
        let Node::Assignment { value, .. } = &statements[2] else {
            panic!("expected assignment");
        };
        let Node::MethodCall {
            receiver, method, ..
        } = value.as_ref()
        else {
            panic!("expected method call, got {value:?}");
        };
        assert_eq!(method, "other");
        assert!(matches!(
            receiver.as_ref(),
            Node::Variable { path } if path.is_empty()
        ));
    }

    #[test]
    fn str_call_becomes_stringify() {
        let statements = parse_statements("x = str(42)\n");
        let [Node::Assignment { value, .. }] = statements.as_slice() else {
            panic!("expected assignment");
        };
        assert!(matches!(value.as_ref(), Node::Stringify { .. }));
    }

    #[test]
    fn dotted_call_splits_receiver_and_method_name() {
        let statements = parse_statements("a.b.f(1, 2)\n");
        let [Node::MethodCall {
            receiver,
            method,
            args,
        }] = statements.as_slice()
        else {
            panic!("expected method call");
        };
        assert_eq!(method, "f");
        assert_eq!(args.len(), 2);
        assert!(matches!(
            receiver.as_ref(),
            Node::Variable { path } if path == &["a".to_string(), "b".to_string()]
        ));
    }

    #[test]
    fn parses_if_else_with_suites() {
        let source = indoc! {"
            if x < 3:
              print 1
            else:
              print 2
        "};
        let statements = parse_statements(source);
        let [Node::IfElse {
            condition,
            then_body,
            else_body,
        }] = statements.as_slice()
        else {
            panic!("expected if statement");
        };
        assert!(matches!(
            condition.as_ref(),
            Node::Comparison {
                op: CompareOp::Less,
                ..
            }
        ));
        assert!(matches!(then_body.as_ref(), Node::Compound { statements } if statements.len() == 1));
        assert!(else_body.is_some());
    }

    #[test]
    fn class_methods_are_wrapped_in_method_bodies() {
        let source = indoc! {"
            class Greeter:
              def greet(name):
                return name
        "};
        let statements = parse_statements(source);
        let [Node::ClassDefinition { name, class }] = statements.as_slice() else {
            panic!("expected class definition");
        };
        assert_eq!(name, "Greeter");
        let value = class.get().expect("class holder should not be empty");
        let borrowed = value.borrow();
        let Value::Class(class) = &*borrowed else {
            panic!("expected class value");
        };
        let method = class.method("greet", 1).expect("method should exist");
        assert_eq!(method.formal_params, vec!["name".to_string()]);
        assert!(matches!(method.body, Node::MethodBody { .. }));
    }

    #[test]
    fn base_class_must_be_defined_first() {
        let source = indoc! {"
            class Derived(Base):
              def f():
                return 1
        "};
        let err = parse(source).expect_err("expected unknown base class");
        assert_eq!(
            err,
            ParseError::UnknownBaseClass {
                name: "Base".to_string()
            }
        );
    }

    #[test]
    fn duplicate_method_arity_is_rejected() {
        let source = indoc! {"
            class X:
              def f(a):
                return 1
              def f(b):
                return 2
        "};
        let err = parse(source).expect_err("expected duplicate method");
        assert_eq!(
            err,
            ParseError::DuplicateMethod {
                class_name: "X".to_string(),
                method: "f".to_string()
            }
        );
    }

    #[test]
    fn overloading_by_arity_is_allowed() {
        let source = indoc! {"
            class X:
              def f(a):
                return 1
              def f(a, b):
                return 2
        "};
        parse(source).expect("arity overloads should parse");
    }

    #[test]
    fn def_outside_class_is_rejected() {
        let source = indoc! {"
            def f():
              return 1
        "};
        let err = parse(source).expect_err("expected parse failure");
        assert_eq!(
            err,
            ParseError::Unexpected {
                token: "Def".to_string()
            }
        );
    }

    #[test]
    fn missing_colon_is_a_cursor_expectation_failure() {
        let err = parse("if x\n  print 1\n").expect_err("expected failure");
        assert!(matches!(err, ParseError::Lex(LexError::Expect { .. })));
    }

    #[test]
    fn stray_operator_statement_is_unexpected() {
        let err = parse("+ 1\n").expect_err("expected failure");
        assert_eq!(
            err,
            ParseError::Unexpected {
                token: "Char{+}".to_string()
            }
        );
    }
}
