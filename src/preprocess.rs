//! Source-level expansion run before lexing: block comments are stripped and
//! `include "name"` directives are replaced by the contents of `<std_dir>/name`.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::{Captures, Regex};

static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));
static INCLUDE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\binclude\s+"([^"]+)""#).expect("valid regex"));

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("cannot include \"{name}\": {path} could not be read: {source}")]
    MissingInclude {
        name: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("include cycle: {}", chain.join(" -> "))]
    IncludeCycle { chain: Vec<String> },
}

impl PreprocessError {
    pub fn code(&self) -> &'static str {
        match self {
            PreprocessError::MissingInclude { .. } => "MAL-I001",
            PreprocessError::IncludeCycle { .. } => "MAL-I002",
        }
    }
}

pub struct Preprocessor {
    std_dir: PathBuf,
}

impl Preprocessor {
    pub fn new(std_dir: impl Into<PathBuf>) -> Self {
        Preprocessor { std_dir: std_dir.into() }
    }

    #[tracing::instrument(skip_all, fields(std_dir = %self.std_dir.display()))]
    pub fn expand(&self, source: &str) -> Result<String, PreprocessError> {
        self.expand_nested(source, &mut Vec::new())
    }

    fn expand_nested(&self, source: &str, chain: &mut Vec<String>) -> Result<String, PreprocessError> {
        let source = strip_comments(source);
        let mut out = String::with_capacity(source.len());
        let mut last = 0;
        for caps in INCLUDE.captures_iter(&source) {
            let (whole, name) = match (caps.get(0), caps.get(1)) {
                (Some(w), Some(n)) => (w, n.as_str()),
                _ => continue,
            };
            out.push_str(&source[last..whole.start()]);
            out.push_str(&self.include(name, chain)?);
            last = whole.end();
        }
        out.push_str(&source[last..]);
        Ok(out)
    }

    fn include(&self, name: &str, chain: &mut Vec<String>) -> Result<String, PreprocessError> {
        if chain.iter().any(|n| n == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(PreprocessError::IncludeCycle { chain: cycle });
        }
        let path = self.std_dir.join(name);
        tracing::debug!(path = %path.display(), "including");
        let text = std::fs::read_to_string(&path).map_err(|source| PreprocessError::MissingInclude {
            name: name.to_string(),
            path: path.clone(),
            source,
        })?;
        chain.push(name.to_string());
        let expanded = self.expand_nested(&text, chain);
        chain.pop();
        expanded
    }
}

/// Replace each block comment with its newlines so line numbers survive.
fn strip_comments(source: &str) -> String {
    BLOCK_COMMENT
        .replace_all(source, |caps: &Captures| {
            caps[0].chars().filter(|&c| c == '\n').collect::<String>()
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn strips_block_comments_keeping_lines() {
        let pre = Preprocessor::new("unused");
        let out = pre.expand("puts 1 /* one\ntwo */ puts 2").unwrap();
        assert_eq!(out, "puts 1 \n puts 2");
    }

    #[test]
    fn include_inside_comment_is_ignored() {
        let pre = Preprocessor::new("does-not-exist");
        let out = pre.expand("/* include \"math\" */puts 1").unwrap();
        assert_eq!(out, "puts 1");
    }

    #[test]
    fn expands_include_from_std_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("math"), "define square as lambda x . x * x end").unwrap();
        let pre = Preprocessor::new(dir.path());
        let out = pre.expand("include\n\"math\"\nputs square | 4").unwrap();
        assert_eq!(out, "define square as lambda x . x * x end\nputs square | 4");
    }

    #[test]
    fn expands_nested_includes() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "include \"b\"\ndefine a as b + 1").unwrap();
        fs::write(dir.path().join("b"), "define b as 1").unwrap();
        let pre = Preprocessor::new(dir.path());
        let out = pre.expand("include \"a\"").unwrap();
        assert_eq!(out, "define b as 1\ndefine a as b + 1");
    }

    #[test]
    fn missing_include_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let pre = Preprocessor::new(dir.path());
        let err = pre.expand("include \"nope\"").unwrap_err();
        assert!(matches!(err, PreprocessError::MissingInclude { ref name, .. } if name == "nope"));
        assert_eq!(err.code(), "MAL-I001");
    }

    #[test]
    fn include_cycle_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a"), "include \"b\"").unwrap();
        fs::write(dir.path().join("b"), "include \"a\"").unwrap();
        let pre = Preprocessor::new(dir.path());
        let err = pre.expand("include \"a\"").unwrap_err();
        match err {
            PreprocessError::IncludeCycle { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected cycle, got {other:?}"),
        }
    }
}
