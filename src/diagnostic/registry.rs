/// An entry in the error code registry.
pub struct ErrorEntry {
    pub code: &'static str,
    pub short: &'static str,
    pub long: &'static str, // full explanation for --explain
}

/// All stable error codes emitted by mallow.
pub static REGISTRY: &[ErrorEntry] = &[
    // ── Preprocessor ────────────────────────────────────────────────────────
    ErrorEntry {
        code: "MAL-I001",
        short: "included file not found",
        long: r#"## MAL-I001: included file not found

An `include "name"` directive named a file that could not be read from
the library directory.

**Example:**

    include "lists"

The file is looked up as `<std-dir>/lists`. The library directory defaults
to `std` and can be changed with `--std-dir` or `MALLOW_STD_DIR`.
"#,
    },
    ErrorEntry {
        code: "MAL-I002",
        short: "include cycle",
        long: r#"## MAL-I002: include cycle

A file includes itself, directly or through other files. The message
lists the chain of includes that closes the loop.

**Fix:** remove one of the `include` directives in the chain.
"#,
    },
    // ── Lexer ───────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "MAL-L001",
        short: "unexpected character",
        long: r#"## MAL-L001: unexpected character

The source contains text that is not part of the mallow language, such
as a stray symbol, an unterminated string or an unterminated comment.

**Example:**

    1 != 2

mallow writes inequality as `~=` and negation as `not`:

    1 ~= 2
"#,
    },
    // ── Parser ──────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "MAL-P001",
        short: "unexpected token",
        long: r#"## MAL-P001: unexpected token

A token appeared where it cannot start or continue an expression.

**Example:**

    define x as * 2

`*` is an infix operator and needs a left operand.
"#,
    },
    ErrorEntry {
        code: "MAL-P002",
        short: "expected a different token",
        long: r#"## MAL-P002: expected a different token

The parser needed a specific keyword or symbol and found something else.

**Example:**

    if x > 1 1 else 2

`if` needs `then` between the condition and the consequence:

    if x > 1 then 1 else 2
"#,
    },
    ErrorEntry {
        code: "MAL-P003",
        short: "unexpected end of input",
        long: r#"## MAL-P003: unexpected end of input

The source ended in the middle of a statement.

**Example:**

    define double as lambda n .

The lambda body is missing.
"#,
    },
    ErrorEntry {
        code: "MAL-P004",
        short: "expected identifier",
        long: r#"## MAL-P004: expected identifier

A name was required after `define` or `lambda`.

**Example:**

    define 5 as 6

Identifiers start with a letter and may contain letters, digits and `?`.
"#,
    },
    // ── Compiler ────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "MAL-C001",
        short: "unresolved identifier",
        long: r#"## MAL-C001: unresolved identifier

An identifier was used before any `define` gave it a value.

**Example:**

    puts total + 1

Define the name first:

    define total as 41
    puts total + 1
"#,
    },
    ErrorEntry {
        code: "MAL-C002",
        short: "operator not supported by the bytecode engine",
        long: r#"## MAL-C002: operator not supported by the bytecode engine

`and` and `or` are evaluated by the tree-walking evaluator only.

**Fix:** run with `--engine eval`, or rewrite with `if`:

    if a then b else false
"#,
    },
    ErrorEntry {
        code: "MAL-C003",
        short: "expression not supported by the bytecode engine",
        long: r#"## MAL-C003: expression not supported by the bytecode engine

String literals have no bytecode representation.

**Fix:** run with `--engine eval`.
"#,
    },
    ErrorEntry {
        code: "MAL-C004",
        short: "function captures a variable",
        long: r#"## MAL-C004: function captures a variable

Compiled functions can read their own parameter and globals, but not
the parameter of an enclosing lambda.

**Example:**

    define adder as lambda a . lambda b . a + b

**Fix:** run with `--engine eval`, which supports closures.
"#,
    },
    ErrorEntry {
        code: "MAL-C005",
        short: "too many constants",
        long: r#"## MAL-C005: too many constants

A program may hold at most 256 constants (integer literals and function
bodies), since constant indexes are encoded in one byte.
"#,
    },
    ErrorEntry {
        code: "MAL-C006",
        short: "too many global definitions",
        long: r#"## MAL-C006: too many global definitions

A program may make at most 256 `define`s. Every `define`, including a
redefinition of an existing name, takes a new global slot.
"#,
    },
    ErrorEntry {
        code: "MAL-C007",
        short: "block too large to jump over",
        long: r#"## MAL-C007: block too large to jump over

Jump targets are 16-bit offsets, so a single instruction block cannot
exceed 65535 bytes. Split the program into smaller functions.
"#,
    },
    // ── Runtime ─────────────────────────────────────────────────────────────
    ErrorEntry {
        code: "MAL-R001",
        short: "stack underflow",
        long: r#"## MAL-R001: stack underflow

An instruction needed more operands than the stack held. This only
happens with hand-assembled or corrupted bytecode.
"#,
    },
    ErrorEntry {
        code: "MAL-R002",
        short: "type mismatch",
        long: r#"## MAL-R002: type mismatch

Arithmetic, ordering and negation work on integers only.

**Example:**

    1 + true

Use `=` and `~=` to compare values of any type.
"#,
    },
    ErrorEntry {
        code: "MAL-R003",
        short: "division by zero",
        long: r#"## MAL-R003: division by zero

The right operand of `/` or `mod` evaluated to zero.
"#,
    },
    ErrorEntry {
        code: "MAL-R004",
        short: "value is not callable",
        long: r#"## MAL-R004: value is not callable

The left side of `|` must be a function.

**Example:**

    3 | 4
"#,
    },
    ErrorEntry {
        code: "MAL-R005",
        short: "global read before it was set",
        long: r#"## MAL-R005: global read before it was set

A global slot was read before any value was stored in it. The compiler
rules this out for source programs; it indicates malformed bytecode.
"#,
    },
    ErrorEntry {
        code: "MAL-R006",
        short: "malformed bytecode",
        long: r#"## MAL-R006: malformed bytecode

The virtual machine met an unknown opcode, a truncated operand, a jump
or constant index out of range, or a function body without RETURN.
Bytecode produced by the compiler never does this; if you see it,
please file a bug report.
"#,
    },
    ErrorEntry {
        code: "MAL-R007",
        short: "undefined identifier",
        long: r#"## MAL-R007: undefined identifier

The evaluator looked up a name that no `define` or enclosing lambda
parameter provides.

**Example:**

    puts nope
"#,
    },
];

/// Look up an error entry by code (e.g. `"MAL-C004"`).
pub fn lookup(code: &str) -> Option<&'static ErrorEntry> {
    REGISTRY.iter().find(|e| e.code == code)
}
