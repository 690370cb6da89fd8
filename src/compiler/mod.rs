use std::fmt;
use std::rc::Rc;

use tracing::{debug, instrument};

use crate::ast::*;
use crate::code::{Instructions, JUMP_PLACEHOLDER, Opcode};
use crate::value::{CompiledFunction, Value};

pub mod symbol_table;

use symbol_table::{SymbolScope, SymbolTable};

/// One-byte operands address at most this many constants, globals or locals.
pub const MAX_SLOTS: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("unresolved identifier: {name}")]
    UnresolvedIdentifier { name: String, span: Span },
    #[error("operator '{}' has no bytecode; run with the evaluator instead", op.symbol())]
    UnsupportedOperator { op: BinOp, span: Span },
    #[error("{kind} has no bytecode; run with the evaluator instead")]
    UnsupportedExpression { kind: &'static str, span: Span },
    #[error("'{name}' is a parameter of an enclosing function; functions cannot capture variables")]
    CapturedVariable { name: String, span: Span },
    #[error("constant pool is full ({MAX_SLOTS} entries)")]
    TooManyConstants { span: Span },
    #[error("global slots exhausted ({MAX_SLOTS} definitions) at '{name}'")]
    TooManyGlobals { name: String, span: Span },
    #[error("jump target {target} does not fit in 16 bits")]
    BlockTooLarge { target: usize, span: Span },
}

impl CompileError {
    pub fn code(&self) -> &'static str {
        match self {
            CompileError::UnresolvedIdentifier { .. } => "MAL-C001",
            CompileError::UnsupportedOperator { .. } => "MAL-C002",
            CompileError::UnsupportedExpression { .. } => "MAL-C003",
            CompileError::CapturedVariable { .. } => "MAL-C004",
            CompileError::TooManyConstants { .. } => "MAL-C005",
            CompileError::TooManyGlobals { .. } => "MAL-C006",
            CompileError::BlockTooLarge { .. } => "MAL-C007",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            CompileError::UnresolvedIdentifier { span, .. }
            | CompileError::UnsupportedOperator { span, .. }
            | CompileError::UnsupportedExpression { span, .. }
            | CompileError::CapturedVariable { span, .. }
            | CompileError::TooManyConstants { span }
            | CompileError::TooManyGlobals { span, .. }
            | CompileError::BlockTooLarge { span, .. } => *span,
        }
    }
}

type Result<T> = std::result::Result<T, CompileError>;

// ── Bytecode ─────────────────────────────────────────────────────────

/// Top-level instruction block plus the constant pool shared by every function.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub instructions: Instructions,
    pub constants: Vec<Value>,
}

impl fmt::Display for Bytecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "== main ==")?;
        write!(f, "{}", self.instructions)?;
        if self.constants.is_empty() {
            return Ok(());
        }
        writeln!(f, "== constants ==")?;
        for (i, constant) in self.constants.iter().enumerate() {
            writeln!(f, "{i}: {constant}")?;
            if let Value::Function(func) = constant {
                for line in func.instructions.to_string().lines() {
                    writeln!(f, "    {line}")?;
                }
            }
        }
        Ok(())
    }
}

// ── Compiler ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct EmittedInstruction {
    opcode: Opcode,
    position: usize,
}

/// An in-progress instruction block; one per function body being compiled.
#[derive(Debug, Default)]
struct CompilationScope {
    instructions: Instructions,
    last: Option<EmittedInstruction>,
    previous: Option<EmittedInstruction>,
}

pub struct Compiler {
    constants: Vec<Value>,
    symbols: SymbolTable,
    scopes: Vec<CompilationScope>,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

/// Compile a whole program; the first error aborts compilation.
pub fn compile(program: &Program) -> Result<Bytecode> {
    let mut compiler = Compiler::new();
    compiler.compile_program(program)?;
    Ok(compiler.bytecode())
}

/// Compile one expression without statement discipline, leaving its value on the stack.
pub fn compile_expression(expr: &Expr) -> Result<Bytecode> {
    let mut compiler = Compiler::new();
    compiler.compile_expr(expr)?;
    Ok(compiler.bytecode())
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            constants: Vec::new(),
            symbols: SymbolTable::new(),
            scopes: vec![CompilationScope::default()],
        }
    }

    pub fn bytecode(mut self) -> Bytecode {
        let main = self.scopes.pop().unwrap_or_default();
        Bytecode { instructions: main.instructions, constants: self.constants }
    }

    #[instrument(skip_all, fields(statements = program.statements.len()))]
    pub fn compile_program(&mut self, program: &Program) -> Result<()> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }
        debug!(
            bytes = self.scope().instructions.len(),
            constants = self.constants.len(),
            globals = self.symbols.num_definitions(),
            "compiled program"
        );
        Ok(())
    }

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match &stmt.node {
            StmtKind::Define { name, value } => {
                // A bare lambda sees its own name so it can recurse through the global;
                // any other value, even one that yields a lambda, is compiled first
                let symbol = if matches!(value.node, ExprKind::Lambda { .. }) {
                    let symbol = self.symbols.define(name);
                    self.compile_expr(value)?;
                    symbol
                } else {
                    self.compile_expr(value)?;
                    self.symbols.define(name)
                };
                if symbol.index >= MAX_SLOTS {
                    return Err(CompileError::TooManyGlobals { name: name.clone(), span: stmt.span });
                }
                self.emit(Opcode::SetGlobal, &[symbol.index]);
            }
            StmtKind::Puts { value } | StmtKind::Expression { value } => {
                self.compile_expr(value)?;
                self.emit(Opcode::Pop, &[]);
            }
        }
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        match &expr.node {
            ExprKind::Integer { value } => {
                let index = self.add_constant(Value::Integer(value.clone()), expr.span)?;
                self.emit(Opcode::Constant, &[index]);
            }
            ExprKind::Bool { value: true } => {
                self.emit(Opcode::True, &[]);
            }
            ExprKind::Bool { value: false } => {
                self.emit(Opcode::False, &[]);
            }
            ExprKind::Nil => {
                self.emit(Opcode::Nil, &[]);
            }
            ExprKind::Text { .. } => {
                return Err(CompileError::UnsupportedExpression {
                    kind: expr.node.kind_name(),
                    span: expr.span,
                });
            }
            ExprKind::Ident { name } => self.compile_ident(name, expr.span)?,
            ExprKind::Prefix { op, operand } => {
                self.compile_expr(operand)?;
                let opcode = match op {
                    UnaryOp::Not => Opcode::Not,
                    UnaryOp::Negate => Opcode::Negate,
                };
                self.emit(opcode, &[]);
            }
            ExprKind::Infix { op, left, right } => {
                let opcode = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Subtract => Opcode::Sub,
                    BinOp::Multiply => Opcode::Mul,
                    BinOp::Divide => Opcode::Div,
                    BinOp::Modulo => Opcode::Modulo,
                    BinOp::Equals => Opcode::Equal,
                    BinOp::NotEquals => Opcode::NotEqual,
                    BinOp::GreaterThan => Opcode::GreaterThan,
                    BinOp::LessThan => Opcode::LessThan,
                    BinOp::And | BinOp::Or => {
                        return Err(CompileError::UnsupportedOperator { op: *op, span: expr.span });
                    }
                };
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                self.emit(opcode, &[]);
            }
            ExprKind::If { condition, consequence, alternative } => {
                self.compile_expr(condition)?;
                let jump_if_not_true = self.emit(Opcode::JumpIfNotTrue, &[JUMP_PLACEHOLDER as usize]);

                self.compile_expr(consequence)?;
                self.remove_last_pop();
                let jump_over_alternative = self.emit(Opcode::Jump, &[JUMP_PLACEHOLDER as usize]);

                self.patch_jump(jump_if_not_true, expr.span)?;
                match alternative {
                    Some(alt) => {
                        self.compile_expr(alt)?;
                        self.remove_last_pop();
                    }
                    None => {
                        self.emit(Opcode::Nil, &[]);
                    }
                }
                self.patch_jump(jump_over_alternative, expr.span)?;
            }
            ExprKind::Lambda { param, body } => {
                self.enter_scope();
                self.symbols.define(param);
                let compiled = self.compile_expr(body);
                self.emit(Opcode::Return, &[]);
                let instructions = self.leave_scope();
                compiled?;
                debug!(param = %param, bytes = instructions.len(), "compiled function");
                let function = Value::Function(Rc::new(CompiledFunction::new(instructions)));
                let index = self.add_constant(function, expr.span)?;
                self.emit(Opcode::Constant, &[index]);
            }
            ExprKind::Apply { function, argument } => {
                self.compile_expr(argument)?;
                self.compile_expr(function)?;
                self.emit(Opcode::Call, &[]);
            }
        }
        Ok(())
    }

    fn compile_ident(&mut self, name: &str, span: Span) -> Result<()> {
        let symbol = self
            .symbols
            .resolve(name)
            .ok_or_else(|| CompileError::UnresolvedIdentifier { name: name.to_string(), span })?;
        match symbol.scope {
            SymbolScope::Global => self.emit(Opcode::GetGlobal, &[symbol.index]),
            SymbolScope::Local => self.emit(Opcode::GetLocal, &[symbol.index]),
            SymbolScope::Free => {
                return Err(CompileError::CapturedVariable { name: name.to_string(), span });
            }
        };
        Ok(())
    }

    // ── Emission ─────────────────────────────────────────────────────

    fn scope(&self) -> &CompilationScope {
        &self.scopes[self.scopes.len() - 1]
    }

    fn scope_mut(&mut self) -> &mut CompilationScope {
        let top = self.scopes.len() - 1;
        &mut self.scopes[top]
    }

    fn add_constant(&mut self, value: Value, span: Span) -> Result<usize> {
        if self.constants.len() >= MAX_SLOTS {
            return Err(CompileError::TooManyConstants { span });
        }
        self.constants.push(value);
        Ok(self.constants.len() - 1)
    }

    fn emit(&mut self, opcode: Opcode, operands: &[usize]) -> usize {
        let scope = self.scope_mut();
        let position = scope.instructions.push(opcode, operands);
        scope.previous = scope.last.replace(EmittedInstruction { opcode, position });
        position
    }

    fn remove_last_pop(&mut self) {
        let scope = self.scope_mut();
        if let Some(last) = scope.last.filter(|l| l.opcode == Opcode::Pop) {
            scope.instructions.truncate(last.position);
            scope.last = scope.previous.take();
        }
    }

    /// Point the jump at `position` to the current end of the block.
    fn patch_jump(&mut self, position: usize, span: Span) -> Result<()> {
        let target = self.scope().instructions.len();
        let target16 = u16::try_from(target).map_err(|_| CompileError::BlockTooLarge { target, span })?;
        debug!(position, target, "patching jump");
        self.scope_mut().instructions.patch_u16(position, target16);
        Ok(())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(CompilationScope::default());
        let outer = std::mem::take(&mut self.symbols);
        self.symbols = SymbolTable::enclosed(outer);
    }

    fn leave_scope(&mut self) -> Instructions {
        let scope = self.scopes.pop().unwrap_or_default();
        let enclosed = std::mem::take(&mut self.symbols);
        self.symbols = enclosed.into_outer().unwrap_or_default();
        scope.instructions
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::make;
    use crate::{lexer, parser};
    use num_bigint::BigInt;

    fn parse_program(source: &str) -> Program {
        parser::parse(lexer::lex(source).unwrap()).unwrap()
    }

    fn compile_str(source: &str) -> Bytecode {
        compile(&parse_program(source)).unwrap()
    }

    fn compile_err(source: &str) -> CompileError {
        compile(&parse_program(source)).unwrap_err()
    }

    fn concat(parts: Vec<Vec<u8>>) -> Vec<u8> {
        parts.into_iter().flatten().collect()
    }

    fn int(n: i64) -> Value {
        Value::Integer(BigInt::from(n))
    }

    #[test]
    fn compile_infix_arithmetic() {
        let bc = compile_str("1 + 2");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
        assert_eq!(bc.constants, vec![int(1), int(2)]);
    }

    #[test]
    fn compile_each_statement_pops() {
        let bc = compile_str("1 2");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Pop, &[]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn compile_operators_map_to_opcodes() {
        for (src, op) in [
            ("1 - 2", Opcode::Sub),
            ("1 * 2", Opcode::Mul),
            ("1 / 2", Opcode::Div),
            ("1 mod 2", Opcode::Modulo),
            ("1 = 2", Opcode::Equal),
            ("1 ~= 2", Opcode::NotEqual),
            ("1 > 2", Opcode::GreaterThan),
            ("1 < 2", Opcode::LessThan),
        ] {
            let bc = compile_str(src);
            assert_eq!(bc.instructions.as_bytes()[4], op as u8, "{src}");
        }
    }

    #[test]
    fn compile_prefix_and_literals() {
        let bc = compile_str("-5\nnot true\nnil\nfalse");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Negate, &[]),
                make(Opcode::Pop, &[]),
                make(Opcode::True, &[]),
                make(Opcode::Not, &[]),
                make(Opcode::Pop, &[]),
                make(Opcode::Nil, &[]),
                make(Opcode::Pop, &[]),
                make(Opcode::False, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn compile_if_else_has_no_dead_pop() {
        let bc = compile_str("if true then 1 else 2");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::True, &[]),                // 0000
                make(Opcode::JumpIfNotTrue, &[9]),      // 0001
                make(Opcode::Constant, &[0]),           // 0004
                make(Opcode::Jump, &[11]),              // 0006
                make(Opcode::Constant, &[1]),           // 0009
                make(Opcode::Pop, &[]),                 // 0011
            ])
        );
    }

    #[test]
    fn compile_if_without_else_pushes_nil() {
        let bc = compile_str("if false then 1");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::False, &[]),               // 0000
                make(Opcode::JumpIfNotTrue, &[9]),      // 0001
                make(Opcode::Constant, &[0]),           // 0004
                make(Opcode::Jump, &[10]),              // 0006
                make(Opcode::Nil, &[]),                 // 0009
                make(Opcode::Pop, &[]),                 // 0010
            ])
        );
    }

    #[test]
    fn compile_no_placeholder_survives() {
        let bc = compile_str("if 1 < 2 then if false then 3 else 4 else 5");
        let text = bc.instructions.to_string();
        assert!(!text.contains("65535"), "unpatched jump in:\n{text}");
    }

    #[test]
    fn compile_define_and_reference_globals() {
        let bc = compile_str("define one as 1 define two as 2 one");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::SetGlobal, &[1]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn compile_redefinition_uses_a_fresh_slot() {
        let bc = compile_str("define x as 1 define x as x + 1 x");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Add, &[]),
                make(Opcode::SetGlobal, &[1]),
                make(Opcode::GetGlobal, &[1]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn compile_unresolved_identifier_fails() {
        let err = compile_err("define a as 1\nb + 1");
        assert!(matches!(err, CompileError::UnresolvedIdentifier { ref name, .. } if name == "b"));
        assert_eq!(err.span(), Span { start: 14, end: 15 });
        assert_eq!(err.code(), "MAL-C001");
    }

    #[test]
    fn compile_same_literal_twice_gives_two_constants() {
        let bc = compile_str("7 + 7 + 7");
        assert_eq!(bc.constants, vec![int(7), int(7), int(7)]);
    }

    #[test]
    fn compile_lambda_into_constant() {
        let bc = compile_str("lambda x . x + 1");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![make(Opcode::Constant, &[1]), make(Opcode::Pop, &[])])
        );
        assert_eq!(bc.constants[0], int(1));
        let Value::Function(func) = &bc.constants[1] else {
            panic!("expected function constant");
        };
        assert_eq!(
            func.instructions.as_bytes(),
            concat(vec![
                make(Opcode::GetLocal, &[0]),
                make(Opcode::Constant, &[0]),
                make(Opcode::Add, &[]),
                make(Opcode::Return, &[]),
            ])
        );
    }

    #[test]
    fn compile_application_pushes_argument_then_callee() {
        let bc = compile_str("define id as lambda x . x\nid | 7");
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::SetGlobal, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[]),
                make(Opcode::Pop, &[]),
            ])
        );
    }

    #[test]
    fn compile_recursive_lambda_sees_its_own_name() {
        let bc = compile_str("define loop as lambda n . loop | n");
        let Value::Function(func) = &bc.constants[0] else {
            panic!("expected function constant");
        };
        assert_eq!(
            func.instructions.as_bytes(),
            concat(vec![
                make(Opcode::GetLocal, &[0]),
                make(Opcode::GetGlobal, &[0]),
                make(Opcode::Call, &[]),
                make(Opcode::Return, &[]),
            ])
        );
    }

    #[test]
    fn compile_self_reference_needs_a_direct_lambda() {
        // only a bare lambda value is bound before its body compiles
        let err = compile_err("define g as if true then lambda n . g | n else nil");
        assert!(matches!(err, CompileError::UnresolvedIdentifier { ref name, .. } if name == "g"));
        let err = compile_err("define h as (lambda f . f) | lambda n . h | n");
        assert!(matches!(err, CompileError::UnresolvedIdentifier { ref name, .. } if name == "h"));
    }

    #[test]
    fn compile_nested_lambda_cannot_capture() {
        let err = compile_err("lambda x . lambda y . x + y");
        assert!(matches!(err, CompileError::CapturedVariable { ref name, .. } if name == "x"));
    }

    #[test]
    fn compile_scopes_restore_after_lambda() {
        // the parameter must not leak into the global table
        let err = compile_err("lambda p . p\np");
        assert!(matches!(err, CompileError::UnresolvedIdentifier { ref name, .. } if name == "p"));
    }

    #[test]
    fn compile_string_literal_unsupported() {
        let err = compile_err("puts \"hi\"");
        assert!(matches!(err, CompileError::UnsupportedExpression { kind: "string literal", .. }));
    }

    #[test]
    fn compile_logical_operators_unsupported() {
        let err = compile_err("true and false");
        assert!(matches!(err, CompileError::UnsupportedOperator { op: BinOp::And, .. }));
    }

    #[test]
    fn compile_constant_pool_limit() {
        let source = vec!["1"; MAX_SLOTS + 1].join(" + ");
        let err = compile_err(&source);
        assert!(matches!(err, CompileError::TooManyConstants { .. }));
        let source = vec!["1"; MAX_SLOTS].join(" + ");
        assert_eq!(compile_str(&source).constants.len(), MAX_SLOTS);
    }

    #[test]
    fn compile_global_slot_limit() {
        let source: String = (0..=MAX_SLOTS).map(|i| format!("define g{i} as true\n")).collect();
        let err = compile_err(&source);
        assert!(matches!(err, CompileError::TooManyGlobals { ref name, .. } if name == "g256"));
    }

    #[test]
    fn compile_expression_leaves_value() {
        let program = parse_program("2 * 3");
        let StmtKind::Expression { value } = &program.statements[0].node else {
            panic!("expected expression");
        };
        let bc = compile_expression(value).unwrap();
        assert_eq!(
            bc.instructions.as_bytes(),
            concat(vec![
                make(Opcode::Constant, &[0]),
                make(Opcode::Constant, &[1]),
                make(Opcode::Mul, &[]),
            ])
        );
    }

    #[test]
    fn bytecode_display_lists_function_bodies() {
        let bc = compile_str("define id as lambda x . x");
        let text = bc.to_string();
        assert!(text.contains("== main =="));
        assert!(text.contains("0: <compiled function: 3 bytes>"));
        assert!(text.contains("    0000 GET_LOCAL 0"));
    }
}
