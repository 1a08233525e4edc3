//! Executable statement/expression tree.
//!
//! Statements and expressions share one node type: every variant answers
//! `execute(closure, ctx)` with a holder, which is empty for most statements.
//! Method bodies are wrapped in [`Node::MethodBody`], the only frame that
//! absorbs the non-local transfer raised by `return`.

use std::rc::Rc;

use crate::runtime::{
    ADD_METHOD, Class, Closure, Context, ExecResult, INIT_METHOD, Instance, ObjectHolder,
    RuntimeError, Unwind, Value, call_method, equal, greater, greater_or_equal, is_true, less,
    less_or_equal, not_equal, print_value,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    Or,
    And,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Equal,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
}

#[derive(Debug)]
pub enum Node {
    // Expressions
    NumberLit(i64),
    StringLit(String),
    BoolLit(bool),
    NoneLit,
    /// Dotted name `a.b.c`, resolved left to right through instance fields.
    /// An empty path always yields the empty holder.
    Variable {
        path: Vec<String>,
    },
    Stringify {
        argument: Box<Node>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Logical {
        op: LogicalOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    Not {
        argument: Box<Node>,
    },
    Comparison {
        op: CompareOp,
        lhs: Box<Node>,
        rhs: Box<Node>,
    },
    MethodCall {
        receiver: Box<Node>,
        method: String,
        args: Vec<Node>,
    },
    NewInstance {
        class: Rc<Class>,
        args: Vec<Node>,
    },

    // Statements
    Assignment {
        name: String,
        value: Box<Node>,
    },
    FieldAssignment {
        object: Box<Node>,
        field: String,
        value: Box<Node>,
    },
    Compound {
        statements: Vec<Node>,
    },
    IfElse {
        condition: Box<Node>,
        then_body: Box<Node>,
        else_body: Option<Box<Node>>,
    },
    Return {
        value: Box<Node>,
    },
    MethodBody {
        body: Box<Node>,
    },
    ClassDefinition {
        name: String,
        class: ObjectHolder,
    },
    Print {
        args: Vec<Node>,
    },
}

impl Node {
    pub fn execute(&self, closure: &mut Closure, ctx: &mut Context<'_>) -> ExecResult {
        match self {
            Node::NumberLit(value) => Ok(ObjectHolder::own(Value::Number(*value))),
            Node::StringLit(value) => Ok(ObjectHolder::own(Value::Str(value.clone()))),
            Node::BoolLit(value) => Ok(ObjectHolder::own(Value::Bool(*value))),
            Node::NoneLit => Ok(ObjectHolder::own(Value::None)),
            Node::Variable { path } => lookup_variable(path, closure),
            Node::Stringify { argument } => {
                let value = argument.execute(closure, ctx)?;
                let mut buffer = Vec::new();
                {
                    let mut sandbox = Context::new(&mut buffer);
                    print_value(&value, &mut sandbox)?;
                }
                let text = String::from_utf8_lossy(&buffer).into_owned();
                Ok(ObjectHolder::own(Value::Str(text)))
            }
            Node::Binary { op, lhs, rhs } => {
                let left = lhs.execute(closure, ctx)?;
                let right = rhs.execute(closure, ctx)?;
                apply_binary(*op, &left, &right, ctx)
            }
            Node::Logical { op, lhs, rhs } => {
                let left = lhs.execute(closure, ctx)?;
                match op {
                    LogicalOp::Or => {
                        if is_true(&left) {
                            return Ok(ObjectHolder::own(Value::Bool(true)));
                        }
                    }
                    LogicalOp::And => {
                        if !is_true(&left) {
                            return Ok(ObjectHolder::own(Value::Bool(false)));
                        }
                    }
                }
                let right = rhs.execute(closure, ctx)?;
                Ok(ObjectHolder::own(Value::Bool(is_true(&right))))
            }
            Node::Not { argument } => {
                let value = argument.execute(closure, ctx)?;
                Ok(ObjectHolder::own(Value::Bool(!is_true(&value))))
            }
            Node::Comparison { op, lhs, rhs } => {
                let left = lhs.execute(closure, ctx)?;
                let right = rhs.execute(closure, ctx)?;
                let result = match op {
                    CompareOp::Equal => equal(&left, &right, ctx)?,
                    CompareOp::NotEqual => not_equal(&left, &right, ctx)?,
                    CompareOp::Less => less(&left, &right, ctx)?,
                    CompareOp::Greater => greater(&left, &right, ctx)?,
                    CompareOp::LessOrEqual => less_or_equal(&left, &right, ctx)?,
                    CompareOp::GreaterOrEqual => greater_or_equal(&left, &right, ctx)?,
                };
                Ok(ObjectHolder::own(Value::Bool(result)))
            }
            Node::MethodCall {
                receiver,
                method,
                args,
            } => {
                let receiver = receiver.execute(closure, ctx)?;
                let Some(value) = receiver.get() else {
                    return Ok(ObjectHolder::none());
                };
                let callable = match &*value.borrow() {
                    Value::Instance(instance) => {
                        instance.class().has_method(method, args.len())
                    }
                    _ => false,
                };
                if !callable {
                    // Calls that cannot dispatch are silently empty.
                    return Ok(ObjectHolder::none());
                }
                let mut actual_args = Vec::with_capacity(args.len());
                for arg in args {
                    actual_args.push(arg.execute(closure, ctx)?);
                }
                call_method(&value, method, &actual_args, ctx)
            }
            Node::NewInstance { class, args } => {
                let mut actual_args = Vec::with_capacity(args.len());
                for arg in args {
                    actual_args.push(arg.execute(closure, ctx)?);
                }
                let instance = ObjectHolder::own(Value::Instance(Instance::new(class.clone())));
                if class.has_method(INIT_METHOD, actual_args.len()) {
                    if let Some(value) = instance.get() {
                        call_method(&value, INIT_METHOD, &actual_args, ctx)?;
                    }
                }
                Ok(instance)
            }
            Node::Assignment { name, value } => {
                let value = value.execute(closure, ctx)?;
                closure.insert(name.clone(), value.clone());
                Ok(value)
            }
            Node::FieldAssignment {
                object,
                field,
                value,
            } => {
                let object = object.execute(closure, ctx)?;
                let target = object.get().ok_or_else(|| RuntimeError::NoSuchField {
                    field: field.clone(),
                })?;
                if !matches!(&*target.borrow(), Value::Instance(_)) {
                    return Err(RuntimeError::NoSuchField {
                        field: field.clone(),
                    }
                    .into());
                }
                let value = value.execute(closure, ctx)?;
                if let Value::Instance(instance) = &mut *target.borrow_mut() {
                    instance.set_field(field.clone(), value.clone());
                }
                Ok(value)
            }
            Node::Compound { statements } => {
                for statement in statements {
                    statement.execute(closure, ctx)?;
                }
                Ok(ObjectHolder::none())
            }
            Node::IfElse {
                condition,
                then_body,
                else_body,
            } => {
                let condition = condition.execute(closure, ctx)?;
                if is_true(&condition) {
                    then_body.execute(closure, ctx)
                } else if let Some(else_body) = else_body {
                    else_body.execute(closure, ctx)
                } else {
                    Ok(ObjectHolder::none())
                }
            }
            Node::Return { value } => {
                let value = value.execute(closure, ctx)?;
                Err(Unwind::Return(value))
            }
            Node::MethodBody { body } => match body.execute(closure, ctx) {
                Ok(_) => Ok(ObjectHolder::none()),
                Err(Unwind::Return(value)) => Ok(value),
                Err(error) => Err(error),
            },
            Node::ClassDefinition { name, class } => {
                closure.insert(name.clone(), class.clone());
                Ok(ObjectHolder::none())
            }
            Node::Print { args } => {
                let mut first = true;
                for arg in args {
                    if !first {
                        ctx.write(format_args!(" "))?;
                    }
                    first = false;
                    let value = arg.execute(closure, ctx)?;
                    print_value(&value, ctx)?;
                }
                ctx.write(format_args!("\n"))?;
                Ok(ObjectHolder::none())
            }
        }
    }
}

fn lookup_variable(path: &[String], closure: &Closure) -> ExecResult {
    let Some((first, rest)) = path.split_first() else {
        return Ok(ObjectHolder::none());
    };
    let mut holder = closure
        .get(first)
        .ok_or_else(|| RuntimeError::UndefinedName {
            name: first.clone(),
        })?
        .clone();
    let mut current_name = first;
    for name in rest {
        let value = holder.get().ok_or_else(|| RuntimeError::NotAnObject {
            name: current_name.clone(),
        })?;
        let next = {
            let borrowed = value.borrow();
            let Value::Instance(instance) = &*borrowed else {
                return Err(RuntimeError::NotAnObject {
                    name: current_name.clone(),
                }
                .into());
            };
            instance
                .field(name)
                .ok_or_else(|| RuntimeError::UndefinedName { name: name.clone() })?
        };
        holder = next;
        current_name = name;
    }
    Ok(holder)
}

fn apply_binary(
    op: BinaryOp,
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    ctx: &mut Context<'_>,
) -> ExecResult {
    let l = lhs.get();
    let r = rhs.get();
    if let (Some(l), Some(r)) = (&l, &r) {
        let primitive = {
            let lv = l.borrow();
            let rv = r.borrow();
            match (op, &*lv, &*rv) {
                (BinaryOp::Add, Value::Number(a), Value::Number(b)) => {
                    Some(Ok(Value::Number(a + b)))
                }
                (BinaryOp::Add, Value::Str(a), Value::Str(b)) => {
                    Some(Ok(Value::Str(format!("{a}{b}"))))
                }
                (BinaryOp::Sub, Value::Number(a), Value::Number(b)) => {
                    Some(Ok(Value::Number(a - b)))
                }
                (BinaryOp::Mul, Value::Number(a), Value::Number(b)) => {
                    Some(Ok(Value::Number(a * b)))
                }
                (BinaryOp::Div, Value::Number(_), Value::Number(0)) => {
                    Some(Err(RuntimeError::DivisionByZero))
                }
                (BinaryOp::Div, Value::Number(a), Value::Number(b)) => {
                    Some(Ok(Value::Number(a / b)))
                }
                _ => None,
            }
        };
        match primitive {
            Some(Ok(value)) => return Ok(ObjectHolder::own(value)),
            Some(Err(error)) => return Err(error.into()),
            None => {}
        }
    }
    if matches!(op, BinaryOp::Add) {
        if let Some(l) = &l {
            let dispatches = matches!(
                &*l.borrow(),
                Value::Instance(instance) if instance.class().has_method(ADD_METHOD, 1)
            );
            if dispatches {
                return call_method(l, ADD_METHOD, std::slice::from_ref(rhs), ctx);
            }
        }
    }
    Err(RuntimeError::TypeMismatch {
        operation: op.symbol().to_string(),
    }
    .into())
}
