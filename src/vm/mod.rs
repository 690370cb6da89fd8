use std::cmp::Ordering;
use std::rc::Rc;

use num_bigint::BigInt;
use num_traits::Zero;
use tracing::{debug, instrument, trace};

use crate::code::Opcode;
use crate::compiler::Bytecode;
use crate::value::{CompiledFunction, FALSE, NIL, TRUE, Value};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum VmError {
    #[error("stack underflow in {op}")]
    StackUnderflow { op: Opcode },
    #[error("{op} expects {expected}, found {found}")]
    TypeMismatch { op: Opcode, expected: &'static str, found: &'static str },
    #[error("division by zero in {op}")]
    DivisionByZero { op: Opcode },
    #[error("cannot call a value of type {found}")]
    NotCallable { found: &'static str },
    #[error("unknown opcode {op} at offset {offset}")]
    UnknownOpcode { op: u8, offset: usize },
    #[error("{op} at offset {offset} is missing its operand")]
    TruncatedOperand { op: Opcode, offset: usize },
    #[error("jump target {target} lies outside the {len}-byte block")]
    JumpOutOfRange { target: usize, len: usize },
    #[error("constant {index} is not in the pool")]
    ConstantOutOfRange { index: usize },
    #[error("global slot {index} read before it was set")]
    UnsetGlobal { index: usize },
    #[error("local slot {index} is outside the current frame")]
    LocalOutOfRange { index: usize },
    #[error("RETURN executed outside of a function")]
    ReturnOutsideFunction,
    #[error("function body ended without RETURN")]
    MissingReturn,
}

impl VmError {
    pub fn code(&self) -> &'static str {
        match self {
            VmError::StackUnderflow { .. } => "MAL-R001",
            VmError::TypeMismatch { .. } => "MAL-R002",
            VmError::DivisionByZero { .. } => "MAL-R003",
            VmError::NotCallable { .. } => "MAL-R004",
            VmError::UnsetGlobal { .. } => "MAL-R005",
            VmError::UnknownOpcode { .. }
            | VmError::TruncatedOperand { .. }
            | VmError::JumpOutOfRange { .. }
            | VmError::ConstantOutOfRange { .. }
            | VmError::LocalOutOfRange { .. }
            | VmError::ReturnOutsideFunction
            | VmError::MissingReturn => "MAL-R006",
        }
    }
}

pub type VmResult<T> = Result<T, VmError>;

// ── VM ───────────────────────────────────────────────────────────────

/// One activation: the block being executed and where its argument lives.
#[derive(Debug)]
struct Frame {
    function: Rc<CompiledFunction>,
    ip: usize,
    base: usize,
}

/// Runs one compiled program. Not reusable across programs.
#[derive(Debug)]
pub struct Vm {
    constants: Vec<Value>,
    stack: Vec<Value>,
    globals: Vec<Option<Value>>,
    frames: Vec<Frame>,
    last_popped: Option<Value>,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        let main = Rc::new(CompiledFunction::new(bytecode.instructions));
        Vm {
            constants: bytecode.constants,
            stack: Vec::with_capacity(256),
            globals: Vec::new(),
            frames: vec![Frame { function: main, ip: 0, base: 0 }],
            last_popped: None,
        }
    }

    /// Operand stack, bottom first.
    pub fn stack(&self) -> &[Value] {
        &self.stack
    }

    /// The value most recently discarded by POP.
    pub fn last_popped(&self) -> Option<&Value> {
        self.last_popped.as_ref()
    }

    pub fn global(&self, index: usize) -> Option<&Value> {
        self.globals.get(index).and_then(Option::as_ref)
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn run(&mut self) -> VmResult<()> {
        self.run_with(|_| {})
    }

    /// Run to completion, handing every value discarded by POP to `on_pop`.
    #[instrument(skip_all)]
    pub fn run_with(&mut self, mut on_pop: impl FnMut(&Value)) -> VmResult<()> {
        loop {
            let (op, operand, offset) = {
                let Some(frame) = self.frames.last() else {
                    return Ok(());
                };
                let ins = &frame.function.instructions;
                let offset = frame.ip;
                let Some(byte) = ins.read_u8(offset) else {
                    if self.frames.len() == 1 {
                        debug!(stack = self.stack.len(), "halted");
                        return Ok(());
                    }
                    return Err(VmError::MissingReturn);
                };
                let op = Opcode::try_from(byte).map_err(|op| VmError::UnknownOpcode { op, offset })?;
                let operand = match op.operand_widths() {
                    [1] => ins.read_u8(offset + 1).map(usize::from),
                    [2] => ins.read_u16(offset + 1).map(usize::from),
                    _ => Some(0),
                }
                .ok_or(VmError::TruncatedOperand { op, offset })?;
                (op, operand, offset)
            };
            trace!(offset, %op, operand, depth = self.stack.len(), "dispatch");
            self.frame_mut().ip = offset + op.encoded_len();

            match op {
                Opcode::Constant => {
                    let value = self
                        .constants
                        .get(operand)
                        .cloned()
                        .ok_or(VmError::ConstantOutOfRange { index: operand })?;
                    self.stack.push(value);
                }
                Opcode::Add => self.arithmetic(op, |l, r| Ok(l + r))?,
                Opcode::Sub => self.arithmetic(op, |l, r| Ok(l - r))?,
                Opcode::Mul => self.arithmetic(op, |l, r| Ok(l * r))?,
                Opcode::Div => self.arithmetic(op, |l, r| {
                    if r.is_zero() { Err(VmError::DivisionByZero { op }) } else { Ok(l / r) }
                })?,
                Opcode::Modulo => self.arithmetic(op, |l, r| {
                    if r.is_zero() { Err(VmError::DivisionByZero { op }) } else { Ok(l % r) }
                })?,
                Opcode::Pop => {
                    let value = self.pop(op)?;
                    on_pop(&value);
                    self.last_popped = Some(value);
                }
                Opcode::True => self.stack.push(TRUE),
                Opcode::False => self.stack.push(FALSE),
                Opcode::Nil => self.stack.push(NIL),
                Opcode::Equal | Opcode::NotEqual => {
                    let right = self.pop(op)?;
                    let left = self.pop(op)?;
                    let equal = left == right;
                    self.stack.push(Value::from(if op == Opcode::Equal { equal } else { !equal }));
                }
                Opcode::GreaterThan => self.compare(op, Ordering::is_gt)?,
                Opcode::LessThan => self.compare(op, Ordering::is_lt)?,
                Opcode::Not => {
                    let value = self.pop(op)?;
                    self.stack.push(Value::from(matches!(value, Value::Boolean(false))));
                }
                Opcode::Negate => match self.pop(op)? {
                    Value::Integer(n) => self.stack.push(Value::Integer(-n)),
                    other => {
                        return Err(VmError::TypeMismatch { op, expected: "integer", found: other.type_name() });
                    }
                },
                Opcode::JumpIfNotTrue => {
                    let condition = self.pop(op)?;
                    if !condition.is_truthy() {
                        self.jump(operand)?;
                    }
                }
                Opcode::Jump => self.jump(operand)?,
                Opcode::SetGlobal => {
                    let value = self.pop(op)?;
                    if self.globals.len() <= operand {
                        self.globals.resize(operand + 1, None);
                    }
                    self.globals[operand] = Some(value);
                }
                Opcode::GetGlobal => {
                    let value = self.global(operand).cloned().ok_or(VmError::UnsetGlobal { index: operand })?;
                    self.stack.push(value);
                }
                Opcode::GetLocal => {
                    let slot = self.frame().base + operand;
                    let value = self
                        .stack
                        .get(slot)
                        .cloned()
                        .ok_or(VmError::LocalOutOfRange { index: operand })?;
                    self.stack.push(value);
                }
                Opcode::Call => {
                    let function = match self.pop(op)? {
                        Value::Function(f) => f,
                        other => return Err(VmError::NotCallable { found: other.type_name() }),
                    };
                    // The argument stays on the stack as local 0
                    let base = self.stack.len().checked_sub(1).ok_or(VmError::StackUnderflow { op })?;
                    self.frames.push(Frame { function, ip: 0, base });
                    debug!(depth = self.frames.len(), base, "call");
                }
                Opcode::Return => {
                    if self.frames.len() == 1 {
                        return Err(VmError::ReturnOutsideFunction);
                    }
                    let result = self.pop(op)?;
                    let frame = self.frames.pop().ok_or(VmError::ReturnOutsideFunction)?;
                    self.stack.truncate(frame.base);
                    self.stack.push(result);
                    debug!(depth = self.frames.len(), "return");
                }
            }
        }
    }

    fn frame(&self) -> &Frame {
        &self.frames[self.frames.len() - 1]
    }

    fn frame_mut(&mut self) -> &mut Frame {
        let top = self.frames.len() - 1;
        &mut self.frames[top]
    }

    fn pop(&mut self, op: Opcode) -> VmResult<Value> {
        self.stack.pop().ok_or(VmError::StackUnderflow { op })
    }

    fn jump(&mut self, target: usize) -> VmResult<()> {
        let len = self.frame().function.instructions.len();
        if target > len {
            return Err(VmError::JumpOutOfRange { target, len });
        }
        self.frame_mut().ip = target;
        Ok(())
    }

    /// Pop right then left; both must be integers.
    fn integer_operands(&mut self, op: Opcode) -> VmResult<(BigInt, BigInt)> {
        let right = self.pop(op)?;
        let left = self.pop(op)?;
        match (left, right) {
            (Value::Integer(l), Value::Integer(r)) => Ok((l, r)),
            (Value::Integer(_), other) | (other, _) => {
                Err(VmError::TypeMismatch { op, expected: "integer", found: other.type_name() })
            }
        }
    }

    fn arithmetic(
        &mut self,
        op: Opcode,
        apply: impl FnOnce(&BigInt, &BigInt) -> VmResult<BigInt>,
    ) -> VmResult<()> {
        let (left, right) = self.integer_operands(op)?;
        let result = apply(&left, &right)?;
        self.stack.push(Value::Integer(result));
        Ok(())
    }

    fn compare(&mut self, op: Opcode, test: impl FnOnce(Ordering) -> bool) -> VmResult<()> {
        let (left, right) = self.integer_operands(op)?;
        self.stack.push(Value::from(test(left.cmp(&right))));
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────
