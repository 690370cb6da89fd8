use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

use crate::code::Instructions;

/// A function body compiled to its own instruction block. Captures nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
}

impl CompiledFunction {
    pub fn new(instructions: Instructions) -> Self {
        CompiledFunction { instructions }
    }
}

/// Every value the compiler or VM can produce.
#[derive(Debug, Clone)]
pub enum Value {
    Integer(BigInt),
    Boolean(bool),
    Nil,
    Function(Rc<CompiledFunction>),
}

pub const TRUE: Value = Value::Boolean(true);
pub const FALSE: Value = Value::Boolean(false);
pub const NIL: Value = Value::Nil;

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Nil => "nil",
            Value::Function(_) => "function",
        }
    }

    /// NIL and FALSE are falsy; everything else, including 0, is truthy.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Boolean(false))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Nil, Value::Nil) => true,
            (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        if b { TRUE } else { FALSE }
    }
}

impl From<BigInt> for Value {
    fn from(n: BigInt) -> Self {
        Value::Integer(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "NIL"),
            Value::Function(func) => write!(f, "<compiled function: {} bytes>", func.instructions.len()),
        }
    }
}
