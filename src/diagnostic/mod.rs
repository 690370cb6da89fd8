pub mod ansi;
pub mod json;
pub mod registry;

use crate::ast::Span;

#[derive(Debug, Clone)]
pub struct Label {
    pub span: Span,
    pub message: String,
    pub is_primary: bool,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub code: Option<&'static str>,
    pub message: String,
    pub labels: Vec<Label>,
    pub notes: Vec<String>,
    pub suggestion: Option<String>,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Diagnostic {
            code: None,
            message: message.into(),
            labels: Vec::new(),
            notes: Vec::new(),
            suggestion: None,
            source: None,
        }
    }

    pub fn with_code(mut self, code: &'static str) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: true });
        self
    }

    pub fn with_secondary_span(mut self, span: Span, label: impl Into<String>) -> Self {
        self.labels.push(Label { span, message: label.into(), is_primary: false });
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

// ---- From impls for pipeline error types ----

impl From<&crate::preprocess::PreprocessError> for Diagnostic {
    fn from(e: &crate::preprocess::PreprocessError) -> Self {
        use crate::preprocess::PreprocessError;
        let d = Diagnostic::error(e.to_string()).with_code(e.code());
        match e {
            PreprocessError::MissingInclude { .. } => {
                d.with_suggestion("check the name, or point --std-dir / MALLOW_STD_DIR at the library directory")
            }
            PreprocessError::IncludeCycle { .. } => d,
        }
    }
}

impl From<&crate::lexer::LexError> for Diagnostic {
    fn from(e: &crate::lexer::LexError) -> Self {
        let span = Span {
            start: e.position,
            end: e.position + e.snippet.len().max(1),
        };
        let mut d = Diagnostic::error(format!("unexpected input '{}'", e.snippet))
            .with_code(e.code())
            .with_span(span, "here");
        if !e.suggestion.is_empty() {
            d = d.with_suggestion(e.suggestion.clone());
        }
        d
    }
}

impl From<&crate::parser::ParseError> for Diagnostic {
    fn from(e: &crate::parser::ParseError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::compiler::CompileError> for Diagnostic {
    fn from(e: &crate::compiler::CompileError) -> Self {
        use crate::compiler::CompileError;
        let d = Diagnostic::error(e.to_string()).with_code(e.code()).with_span(e.span(), "here");
        match e {
            CompileError::UnsupportedOperator { .. } | CompileError::UnsupportedExpression { .. } => {
                d.with_suggestion("run with --engine eval")
            }
            CompileError::CapturedVariable { .. } => {
                d.with_note("compiled functions only see their own parameter and globals")
                    .with_suggestion("run with --engine eval")
            }
            _ => d,
        }
    }
}

impl From<&crate::vm::VmError> for Diagnostic {
    fn from(e: &crate::vm::VmError) -> Self {
        Diagnostic::error(e.to_string()).with_code(e.code())
    }
}

impl From<&crate::interpreter::RuntimeError> for Diagnostic {
    fn from(e: &crate::interpreter::RuntimeError) -> Self {
        Diagnostic::error(&e.message).with_code(e.code).with_span(e.span, "here")
    }
}

impl From<&crate::Error> for Diagnostic {
    fn from(e: &crate::Error) -> Self {
        match e {
            crate::Error::Preprocess(e) => Diagnostic::from(e),
            crate::Error::Lex(e) => Diagnostic::from(e),
            crate::Error::Parse(errors) => match errors.first() {
                Some(first) => {
                    let mut d = Diagnostic::from(first);
                    for later in &errors[1..] {
                        d = d.with_secondary_span(later.span, format!("also: {}", later.message));
                    }
                    if errors.len() > 1 {
                        d = d.with_note(format!("{} more parse error(s) follow", errors.len() - 1));
                    }
                    d
                }
                None => Diagnostic::error("parse failed"),
            },
            crate::Error::Compile(e) => Diagnostic::from(e),
            crate::Error::Vm(e) => Diagnostic::from(e),
            crate::Error::Runtime(e) => Diagnostic::from(e),
        }
    }
}
