use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::instrument;

use crate::ast::*;
use crate::codegen::fmt::format_expr;

#[derive(Debug, Clone)]
pub enum Value {
    Integer(BigInt),
    Boolean(bool),
    Nil,
    Text(Rc<str>),
    Closure(Rc<Closure>),
}

/// A lambda together with the environment it was created in.
pub struct Closure {
    pub param: String,
    pub body: Expr,
    env: Env,
}

// Environments can hold the closure itself, so only the code is printed
impl std::fmt::Debug for Closure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Closure").field("param", &self.param).field("body", &self.body).finish()
    }
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Boolean(_) => "boolean",
            Value::Nil => "nil",
            Value::Text(_) => "string",
            Value::Closure(_) => "function",
        }
    }

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
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(BigInt::from(n))
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Integer(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Nil => write!(f, "NIL"),
            Value::Text(s) => write!(f, "{}", s),
            Value::Closure(c) => write!(f, "lambda {} . {}", c.param, format_expr(&c.body)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Runtime error: {message}")]
pub struct RuntimeError {
    pub code: &'static str,
    pub message: String,
    pub span: Span,
}

impl RuntimeError {
    fn new(code: &'static str, msg: impl Into<String>, span: Span) -> Self {
        RuntimeError { code, message: msg.into(), span }
    }

    fn type_mismatch(op: &str, found: &Value, span: Span) -> Self {
        RuntimeError::new(
            "MAL-R002",
            format!("'{}' expects integer operands, found {}", op, found.type_name()),
            span,
        )
    }
}

type Result<T> = std::result::Result<T, RuntimeError>;

// ---- Environment ----

struct Scope {
    vars: HashMap<String, Value>,
    outer: Option<Env>,
}

/// A shared, chained scope. Closures keep their defining `Env` alive.
#[derive(Clone)]
struct Env(Rc<RefCell<Scope>>);

impl Env {
    fn global() -> Self {
        Env(Rc::new(RefCell::new(Scope { vars: HashMap::new(), outer: None })))
    }

    fn enclosed(&self) -> Self {
        Env(Rc::new(RefCell::new(Scope { vars: HashMap::new(), outer: Some(self.clone()) })))
    }

    fn get(&self, name: &str) -> Option<Value> {
        let scope = self.0.borrow();
        match scope.vars.get(name) {
            Some(v) => Some(v.clone()),
            None => scope.outer.as_ref()?.get(name),
        }
    }

    fn set(&self, name: &str, value: Value) {
        self.0.borrow_mut().vars.insert(name.to_string(), value);
    }
}

// ---- Interpreter ----

/// Tree-walking evaluator. Definitions persist across `run_with` calls.
pub struct Interpreter {
    globals: Env,
}

impl Default for Interpreter {
    fn default() -> Self {
        Interpreter::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Interpreter { globals: Env::global() }
    }

    /// Run every statement, handing each `puts` or expression statement value to `on_value`.
    #[instrument(skip_all, fields(statements = program.statements.len()))]
    pub fn run_with(&mut self, program: &Program, mut on_value: impl FnMut(&Value)) -> Result<()> {
        for stmt in &program.statements {
            match &stmt.node {
                StmtKind::Define { name, value } => {
                    let v = eval(value, &self.globals)?;
                    self.globals.set(name, v);
                }
                StmtKind::Puts { value } | StmtKind::Expression { value } => {
                    let v = eval(value, &self.globals)?;
                    on_value(&v);
                }
            }
        }
        Ok(())
    }

    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name)
    }
}

fn eval(expr: &Expr, env: &Env) -> Result<Value> {
    match &expr.node {
        ExprKind::Integer { value } => Ok(Value::Integer(value.clone())),
        ExprKind::Text { value } => Ok(Value::Text(Rc::from(value.as_str()))),
        ExprKind::Bool { value } => Ok(Value::Boolean(*value)),
        ExprKind::Nil => Ok(Value::Nil),
        ExprKind::Ident { name } => env.get(name).ok_or_else(|| {
            RuntimeError::new("MAL-R007", format!("identifier not found: {}", name), expr.span)
        }),
        ExprKind::Prefix { op, operand } => {
            let v = eval(operand, env)?;
            match (op, v) {
                (UnaryOp::Not, v) => Ok(Value::Boolean(matches!(v, Value::Boolean(false)))),
                (UnaryOp::Negate, Value::Integer(n)) => Ok(Value::Integer(-n)),
                (UnaryOp::Negate, other) => Err(RuntimeError::type_mismatch("-", &other, expr.span)),
            }
        }
        ExprKind::Infix { op: BinOp::And, left, right } => {
            if !eval(left, env)?.is_truthy() {
                return Ok(Value::Boolean(false));
            }
            Ok(Value::Boolean(eval(right, env)?.is_truthy()))
        }
        ExprKind::Infix { op: BinOp::Or, left, right } => {
            if eval(left, env)?.is_truthy() {
                return Ok(Value::Boolean(true));
            }
            Ok(Value::Boolean(eval(right, env)?.is_truthy()))
        }
        ExprKind::Infix { op, left, right } => {
            let l = eval(left, env)?;
            let r = eval(right, env)?;
            eval_infix(*op, l, r, expr.span)
        }
        ExprKind::If { condition, consequence, alternative } => {
            if eval(condition, env)?.is_truthy() {
                eval(consequence, env)
            } else if let Some(alt) = alternative {
                eval(alt, env)
            } else {
                Ok(Value::Nil)
            }
        }
        ExprKind::Lambda { param, body } => Ok(Value::Closure(Rc::new(Closure {
            param: param.clone(),
            body: (**body).clone(),
            env: env.clone(),
        }))),
        ExprKind::Apply { function, argument } => {
            let arg = eval(argument, env)?;
            match eval(function, env)? {
                Value::Closure(closure) => {
                    let call_env = closure.env.enclosed();
                    call_env.set(&closure.param, arg);
                    eval(&closure.body, &call_env)
                }
                other => Err(RuntimeError::new(
                    "MAL-R004",
                    format!("cannot call a value of type {}", other.type_name()),
                    function.span,
                )),
            }
        }
    }
}

fn eval_infix(op: BinOp, left: Value, right: Value, span: Span) -> Result<Value> {
    match op {
        BinOp::Equals => return Ok(Value::Boolean(left == right)),
        BinOp::NotEquals => return Ok(Value::Boolean(left != right)),
        _ => {}
    }
    let (l, r) = match (left, right) {
        (Value::Integer(l), Value::Integer(r)) => (l, r),
        (Value::Integer(_), other) | (other, _) => {
            return Err(RuntimeError::type_mismatch(op.symbol(), &other, span));
        }
    };
    let value = match op {
        BinOp::Add => Value::Integer(l + r),
        BinOp::Subtract => Value::Integer(l - r),
        BinOp::Multiply => Value::Integer(l * r),
        BinOp::Divide | BinOp::Modulo if r.is_zero() => {
            return Err(RuntimeError::new("MAL-R003", "division by zero", span));
        }
        BinOp::Divide => Value::Integer(l / r),
        BinOp::Modulo => Value::Integer(l % r),
        BinOp::GreaterThan => Value::Boolean(l > r),
        BinOp::LessThan => Value::Boolean(l < r),
        BinOp::Equals | BinOp::NotEquals | BinOp::And | BinOp::Or => {
            return Err(RuntimeError::new(
                "MAL-R006",
                format!("'{}' reached integer arithmetic", op.symbol()),
                span,
            ));
        }
    };
    Ok(value)
}
