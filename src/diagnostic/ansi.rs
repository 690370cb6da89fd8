use crate::ast::{SourceMap, Span};
use super::{Diagnostic, Label};

#[derive(Debug, Clone, Copy)]
enum Style {
    Strong,
    Error,
    Gutter,
    Faint,
}

impl Style {
    fn sgr(self) -> &'static str {
        match self {
            Style::Strong => "1",
            Style::Error => "1;31",
            Style::Gutter => "36",
            Style::Faint => "2",
        }
    }
}

/// Terminal renderer: header, an annotated source line, then `=` trailers.
pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, style: Style, s: &str) -> String {
        if self.use_color { format!("\x1b[{}m{s}\x1b[0m", style.sgr()) } else { s.to_string() }
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = self.header(d);
        let map = d.source.as_deref().map(SourceMap::new);

        if let (Some(map), Some(label)) = (&map, d.labels.iter().find(|l| l.is_primary)) {
            out.push_str(&self.snippet(map, label));
        }
        for label in d.labels.iter().filter(|l| !l.is_primary && !l.message.is_empty()) {
            let at = map.as_ref().map(|m| format!("{}: ", m.lookup(label.span.start)));
            out.push_str(&self.trailer(None, &format!("{}{}", at.unwrap_or_default(), label.message)));
        }
        for note in &d.notes {
            out.push_str(&self.trailer(Some("note"), note));
        }
        if let Some(suggestion) = &d.suggestion {
            out.push_str(&self.trailer(Some("suggestion"), suggestion));
        }
        out
    }

    /// `error[MAL-C001]: message`, or `error: message` for uncoded diagnostics.
    fn header(&self, d: &Diagnostic) -> String {
        let tag = match d.code {
            Some(code) => format!("{}[{}]", self.paint(Style::Error, "error"), self.paint(Style::Strong, code)),
            None => self.paint(Style::Error, "error"),
        };
        format!("{}: {}\n", tag, self.paint(Style::Strong, &d.message))
    }

    fn snippet(&self, map: &SourceMap<'_>, label: &Label) -> String {
        let loc = map.lookup(label.span.start);
        let text = map.line_text(loc.line);
        let number = loc.line.to_string();
        let blank = " ".repeat(number.len());
        let bar = self.paint(Style::Gutter, "|");

        let (indent, width) = underline(label.span, loc.col, text.len());
        let mut marker = format!("{}{}", " ".repeat(indent), self.paint(Style::Error, &"^".repeat(width)));
        if !label.message.is_empty() {
            marker.push(' ');
            marker.push_str(&self.paint(Style::Error, &label.message));
        }

        [
            format!("  {} {}", self.paint(Style::Gutter, "-->"), loc),
            format!("{blank} {bar}"),
            format!("{} {bar} {text}", self.paint(Style::Gutter, &number)),
            format!("{blank} {bar} {marker}"),
            format!("{blank} {bar}"),
        ]
        .join("\n")
            + "\n"
    }

    fn trailer(&self, kind: Option<&str>, text: &str) -> String {
        match kind {
            Some(kind) => format!("  {} {kind}: {text}\n", self.paint(Style::Faint, "=")),
            None => format!("  {} {text}\n", self.paint(Style::Faint, "=")),
        }
    }
}

/// Caret offset and width within a line; at least one caret, never past the line end.
fn underline(span: Span, col: usize, line_len: usize) -> (usize, usize) {
    let indent = col.saturating_sub(1);
    let room = line_len.saturating_sub(indent).max(1);
    (indent, span.end.saturating_sub(span.start).clamp(1, room))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Span;

    const SOURCE: &str = "define x as 1 + true";

    fn make_diag(start: usize, end: usize) -> Diagnostic {
        Diagnostic::error("type mismatch")
            .with_code("MAL-R002")
            .with_span(Span { start, end }, "here")
            .with_source(SOURCE)
            .with_note("'+' expects integer operands")
            .with_suggestion("compare with '=' instead")
    }

    fn plain() -> AnsiRenderer {
        AnsiRenderer { use_color: false }
    }

    #[test]
    fn render_header_with_code() {
        let out = plain().render(&make_diag(12, 20));
        assert!(out.starts_with("error[MAL-R002]: type mismatch\n"), "bad header in:\n{out}");
    }

    #[test]
    fn render_header_without_code() {
        let out = plain().render(&Diagnostic::error("something bad"));
        assert!(out.contains("error: something bad"));
        assert!(!out.contains("-->"));
    }

    #[test]
    fn render_location_and_source_line() {
        let out = plain().render(&make_diag(12, 20));
        assert!(out.contains("--> 1:13"), "missing location in:\n{out}");
        assert!(out.contains(SOURCE), "missing source line in:\n{out}");
    }

    #[test]
    fn caret_length_matches_span() {
        let out = plain().render(&make_diag(16, 20));
        assert!(out.contains("^^^^ here"), "expected 4 carets in:\n{out}");
        assert!(!out.contains("^^^^^"));
    }

    #[test]
    fn carets_clamped_to_line() {
        let out = plain().render(&make_diag(16, 400));
        assert!(out.contains("^^^^ here"), "expected clamped carets in:\n{out}");
        assert!(!out.contains("^^^^^"));
    }

    #[test]
    fn render_note_and_suggestion() {
        let out = plain().render(&make_diag(12, 20));
        assert!(out.contains("note: '+' expects integer operands"), "missing note in:\n{out}");
        assert!(out.contains("suggestion: compare with '=' instead"), "missing suggestion in:\n{out}");
    }

    #[test]
    fn render_multiline_source_correct_line() {
        let source = "define f as lambda n . n\nputs g | 1";
        let d = Diagnostic::error("unresolved identifier: g")
            .with_span(Span { start: 30, end: 31 }, "here")
            .with_source(source);
        let out = plain().render(&d);
        assert!(out.contains("--> 2:6"), "expected line 2 in:\n{out}");
        assert!(out.contains("2 | puts g | 1"), "expected second line in:\n{out}");
    }

    #[test]
    fn secondary_labels_list_their_location() {
        let d = Diagnostic::error("expected identifier, got 5")
            .with_span(Span { start: 7, end: 8 }, "here")
            .with_secondary_span(Span { start: 16, end: 17 }, "also: unexpected as")
            .with_source("define 5 as 6\nx as");
        let out = plain().render(&d);
        assert!(out.contains("  = 2:3: also: unexpected as\n"), "missing secondary label in:\n{out}");
    }

    #[test]
    fn underline_never_leaves_the_line() {
        assert_eq!(underline(Span { start: 4, end: 4 }, 5, 10), (4, 1));
        assert_eq!(underline(Span { start: 4, end: 7 }, 5, 10), (4, 3));
        assert_eq!(underline(Span { start: 4, end: 90 }, 5, 10), (4, 6));
        assert_eq!(underline(Span { start: 0, end: 3 }, 1, 0), (0, 1));
    }

    #[test]
    fn color_toggles_ansi_codes() {
        let d = make_diag(12, 20);
        assert!(AnsiRenderer { use_color: true }.render(&d).contains("\x1b["));
        assert!(!plain().render(&d).contains("\x1b["));
    }
}
