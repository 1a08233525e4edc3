//! Shared value model for the tree-walking interpreter.
//!
//! Every heap value lives behind an [`ObjectHolder`], a reference-counted
//! handle with a distinguished empty state. Holders are cheap to clone and
//! clones alias the same value, which is what gives assignments their
//! reference semantics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::ast::Node;

pub(crate) const INIT_METHOD: &str = "__init__";
pub(crate) const ADD_METHOD: &str = "__add__";
pub(crate) const STR_METHOD: &str = "__str__";
pub(crate) const EQ_METHOD: &str = "__eq__";
pub(crate) const LT_METHOD: &str = "__lt__";

const SELF_NAME: &str = "self";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Undefined name '{name}'")]
    UndefinedName { name: String },
    #[error("'{name}' is not an object")]
    NotAnObject { name: String },
    #[error("Operation '{operation}' is not supported for these operands")]
    TypeMismatch { operation: String },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Cannot assign field '{field}' on a non-object value")]
    NoSuchField { field: String },
    #[error("Return outside of a method body")]
    ReturnOutsideMethod,
    #[error("Failed to write program output: {0}")]
    Output(String),
}

/// Non-local transfer leaving a node's `execute`.
///
/// `Return` is not an error: it carries the value of a `return` statement up
/// to the nearest enclosing method body, which absorbs it. Only `Error`
/// reaches the driver.
#[derive(Debug)]
pub enum Unwind {
    Return(ObjectHolder),
    Error(RuntimeError),
}

impl From<RuntimeError> for Unwind {
    fn from(error: RuntimeError) -> Self {
        Unwind::Error(error)
    }
}

pub type ExecResult = Result<ObjectHolder, Unwind>;

/// Name-to-holder map backing one scope or one instance's fields.
pub type Closure = HashMap<String, ObjectHolder>;

pub type ValueRef = Rc<RefCell<Value>>;

#[derive(Debug)]
pub enum Value {
    Number(i64),
    Str(String),
    Bool(bool),
    Class(Rc<Class>),
    Instance(Instance),
    None,
}

/// A method as declared inside a `class` suite.
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub formal_params: Vec<String>,
    pub body: Node,
}

/// Class definition: a name, the declared methods, and an optional base
/// class. Base classes are resolved when the `class` statement is parsed, so
/// the chain can never form a cycle.
#[derive(Debug)]
pub struct Class {
    name: String,
    methods: Vec<Method>,
    parent: Option<Rc<Class>>,
}

impl Class {
    pub fn new(name: String, methods: Vec<Method>, parent: Option<Rc<Class>>) -> Self {
        Self {
            name,
            methods,
            parent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Finds the first method matching name and parameter count, searching
    /// this class before its ancestors.
    pub fn method(&self, name: &str, arity: usize) -> Option<&Method> {
        self.methods
            .iter()
            .find(|method| method.name == name && method.formal_params.len() == arity)
            .or_else(|| {
                self.parent
                    .as_ref()
                    .and_then(|parent| parent.method(name, arity))
            })
    }

    pub fn has_method(&self, name: &str, arity: usize) -> bool {
        self.method(name, arity).is_some()
    }
}

/// Object state: a pointer back to the class plus the instance's own fields.
/// Fields spring into existence on first assignment.
#[derive(Debug)]
pub struct Instance {
    class: Rc<Class>,
    fields: Closure,
}

impl Instance {
    pub fn new(class: Rc<Class>) -> Self {
        Self {
            class,
            fields: Closure::new(),
        }
    }

    pub fn class(&self) -> &Rc<Class> {
        &self.class
    }

    pub fn field(&self, name: &str) -> Option<ObjectHolder> {
        self.fields.get(name).cloned()
    }

    pub fn set_field(&mut self, name: String, value: ObjectHolder) {
        self.fields.insert(name, value);
    }
}

#[derive(Clone, Default)]
enum HolderData {
    #[default]
    Empty,
    Owned(ValueRef),
    Shared(Weak<RefCell<Value>>),
}

/// Reference-counted handle to a value, or the empty state meaning `None`.
#[derive(Clone, Default)]
pub struct ObjectHolder {
    data: HolderData,
}

impl ObjectHolder {
    /// Takes ownership of a freshly built value.
    pub fn own(value: Value) -> Self {
        Self::from_ref(Rc::new(RefCell::new(value)))
    }

    pub(crate) fn from_ref(data: ValueRef) -> Self {
        Self {
            data: HolderData::Owned(data),
        }
    }

    /// Returns a non-owning holder over an existing value. Used for the
    /// `self` binding inside a method activation, where an owning handle
    /// would let `self.x = self` create an unreclaimable cycle.
    pub fn share(value: &ValueRef) -> Self {
        Self {
            data: HolderData::Shared(Rc::downgrade(value)),
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<ValueRef> {
        match &self.data {
            HolderData::Empty => None,
            HolderData::Owned(data) => Some(data.clone()),
            HolderData::Shared(weak) => weak.upgrade(),
        }
    }

    /// True for the empty holder and for a held `Value::None`.
    pub fn is_none(&self) -> bool {
        match self.get() {
            None => true,
            Some(value) => matches!(&*value.borrow(), Value::None),
        }
    }
}

impl fmt::Debug for ObjectHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get() {
            None => write!(f, "ObjectHolder(empty)"),
            Some(value) => {
                let kind = match &*value.borrow() {
                    Value::Number(_) => "Number",
                    Value::Str(_) => "String",
                    Value::Bool(_) => "Bool",
                    Value::Class(_) => "Class",
                    Value::Instance(_) => "Instance",
                    Value::None => "None",
                };
                write!(f, "ObjectHolder({kind})")
            }
        }
    }
}

/// Execution context threading the program's output channel.
pub struct Context<'a> {
    output: &'a mut dyn io::Write,
}

impl<'a> Context<'a> {
    pub fn new(output: &'a mut dyn io::Write) -> Self {
        Self { output }
    }

    pub(crate) fn write(&mut self, args: fmt::Arguments<'_>) -> Result<(), RuntimeError> {
        self.output
            .write_fmt(args)
            .map_err(|error| RuntimeError::Output(error.to_string()))
    }
}

/// Truthiness: `True`, a non-zero number, or a non-empty string. Everything
/// else, including class objects and instances, is falsy.
pub fn is_true(object: &ObjectHolder) -> bool {
    match object.get() {
        None => false,
        Some(value) => match &*value.borrow() {
            Value::Bool(flag) => *flag,
            Value::Number(number) => *number != 0,
            Value::Str(text) => !text.is_empty(),
            _ => false,
        },
    }
}

/// Runs a method on `receiver` in a fresh activation scope seeded with the
/// formal parameters and a non-owning `self` binding.
///
/// Callers must have verified with `has_method` that the receiver is an
/// instance whose class resolves (name, arity).
pub(crate) fn call_method(
    receiver: &ValueRef,
    method_name: &str,
    actual_args: &[ObjectHolder],
    ctx: &mut Context<'_>,
) -> ExecResult {
    let class = match &*receiver.borrow() {
        Value::Instance(instance) => instance.class().clone(),
        _ => unreachable!("method call receiver must be an instance"),
    };
    let Some(method) = class.method(method_name, actual_args.len()) else {
        unreachable!("method lookup was verified by the caller");
    };

    let mut activation = Closure::new();
    for (param, arg) in method.formal_params.iter().zip(actual_args) {
        activation.insert(param.clone(), arg.clone());
    }
    activation.insert(SELF_NAME.to_string(), ObjectHolder::share(receiver));
    method.body.execute(&mut activation, ctx)
}

/// Renders a value on the context's output channel the way `print` does.
///
/// Instances render through their `__str__` method when one is defined;
/// otherwise an identity string based on the heap address is written.
pub fn print_value(object: &ObjectHolder, ctx: &mut Context<'_>) -> Result<(), Unwind> {
    let Some(value) = object.get() else {
        return Ok(ctx.write(format_args!("None"))?);
    };
    {
        let value_ref = value.borrow();
        match &*value_ref {
            Value::Number(number) => return Ok(ctx.write(format_args!("{number}"))?),
            Value::Str(text) => return Ok(ctx.write(format_args!("{text}"))?),
            Value::Bool(flag) => {
                let text = if *flag { "True" } else { "False" };
                return Ok(ctx.write(format_args!("{text}"))?);
            }
            Value::None => return Ok(ctx.write(format_args!("None"))?),
            Value::Class(class) => {
                return Ok(ctx.write(format_args!("Class {}", class.name()))?);
            }
            Value::Instance(instance) => {
                if !instance.class().has_method(STR_METHOD, 0) {
                    return Ok(ctx.write(format_args!(
                        "<{} object at {:p}>",
                        instance.class().name(),
                        Rc::as_ptr(&value)
                    ))?);
                }
            }
        }
    }
    let rendered = call_method(&value, STR_METHOD, &[], ctx)?;
    print_value(&rendered, ctx)
}

/// Equality over holders. Empty compares equal to empty, like-kind primitives
/// compare by payload, and an instance with `__eq__` decides for itself.
pub fn equal(lhs: &ObjectHolder, rhs: &ObjectHolder, ctx: &mut Context<'_>) -> Result<bool, Unwind> {
    if lhs.is_none() && rhs.is_none() {
        return Ok(true);
    }
    let mismatch = || RuntimeError::TypeMismatch {
        operation: "==".to_string(),
    };
    let (Some(l), Some(r)) = (lhs.get(), rhs.get()) else {
        return Err(mismatch().into());
    };
    {
        let lv = l.borrow();
        let rv = r.borrow();
        match (&*lv, &*rv) {
            (Value::Number(a), Value::Number(b)) => return Ok(a == b),
            (Value::Str(a), Value::Str(b)) => return Ok(a == b),
            (Value::Bool(a), Value::Bool(b)) => return Ok(a == b),
            _ => {}
        }
        match &*lv {
            Value::Instance(instance) if instance.class().has_method(EQ_METHOD, 1) => {}
            _ => return Err(mismatch().into()),
        }
    }
    let verdict = call_method(&l, EQ_METHOD, std::slice::from_ref(rhs), ctx)?;
    Ok(is_true(&verdict))
}

/// Strict ordering over holders. Defined on like-kind primitives and on
/// instances exposing `__lt__`; undefined on two empties.
pub fn less(lhs: &ObjectHolder, rhs: &ObjectHolder, ctx: &mut Context<'_>) -> Result<bool, Unwind> {
    let mismatch = || RuntimeError::TypeMismatch {
        operation: "<".to_string(),
    };
    let (Some(l), Some(r)) = (lhs.get(), rhs.get()) else {
        return Err(mismatch().into());
    };
    {
        let lv = l.borrow();
        let rv = r.borrow();
        match (&*lv, &*rv) {
            (Value::Number(a), Value::Number(b)) => return Ok(a < b),
            (Value::Str(a), Value::Str(b)) => return Ok(a < b),
            (Value::Bool(a), Value::Bool(b)) => return Ok(a < b),
            _ => {}
        }
        match &*lv {
            Value::Instance(instance) if instance.class().has_method(LT_METHOD, 1) => {}
            _ => return Err(mismatch().into()),
        }
    }
    let verdict = call_method(&l, LT_METHOD, std::slice::from_ref(rhs), ctx)?;
    Ok(is_true(&verdict))
}

// The derived comparisons intentionally recompose `equal` and `less`, so an
// instance's dunder methods may run more than once per comparison.

pub fn not_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    ctx: &mut Context<'_>,
) -> Result<bool, Unwind> {
    Ok(!equal(lhs, rhs, ctx)?)
}

pub fn less_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    ctx: &mut Context<'_>,
) -> Result<bool, Unwind> {
    Ok(less(lhs, rhs, ctx)? || equal(lhs, rhs, ctx)?)
}

pub fn greater(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    ctx: &mut Context<'_>,
) -> Result<bool, Unwind> {
    Ok(!less_or_equal(lhs, rhs, ctx)?)
}

pub fn greater_or_equal(
    lhs: &ObjectHolder,
    rhs: &ObjectHolder,
    ctx: &mut Context<'_>,
) -> Result<bool, Unwind> {
    Ok(!less(lhs, rhs, ctx)?)
}
