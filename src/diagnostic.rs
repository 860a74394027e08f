//! Diagnostics and their textual rendering.
//!
//! Every diagnostic renders as `<line>:<column> <severity>: <message>`, where the location prefix is
//! omitted for diagnostics without a source location. Notes immediately follow the error or warning
//! they elaborate on.

use std::fmt::Write as _;

/// A byte range in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub const fn new(start: u32, end: u32) -> Span {
        Span { start, end }
    }

    pub fn join(self, other: Span) -> Span {
        Span { start: self.start.min(other.start), end: self.end.max(other.end) }
    }

    pub fn byte_range(self) -> std::ops::Range<usize> {
        self.start as usize..self.end as usize
    }
}

/// A 1-based line and column in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Maps byte offsets to line/column locations.
#[derive(Debug, Clone)]
pub struct LineIndex {
    line_starts: Vec<u32>,
    source: std::sync::Arc<str>,
}

impl LineIndex {
    pub fn new(source: &str) -> LineIndex {
        let mut line_starts = vec![0];
        line_starts.extend(
            source.bytes().enumerate().filter(|(_, byte)| *byte == b'\n').map(|(i, _)| i as u32 + 1),
        );
        LineIndex { line_starts, source: source.into() }
    }

    pub fn location(&self, offset: u32) -> Location {
        let line = self.line_starts.partition_point(|start| *start <= offset) - 1;
        let line_start = self.line_starts[line] as usize;
        let end = (offset as usize).min(self.source.len());
        let column = self.source.get(line_start..end).map(|text| text.chars().count()).unwrap_or(0);
        Location { line: line as u32 + 1, column: column as u32 + 1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub location: Option<Location>,
    pub message: String,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(location) = self.location {
            write!(f, "{location} ")?;
        }
        write!(f, "{}: {}", self.severity.as_str(), self.message)
    }
}

/// An ordered list of diagnostics, in the order they were discovered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    list: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Diagnostics {
        Diagnostics::default()
    }

    pub fn push(&mut self, severity: Severity, location: Option<Location>, message: String) {
        self.list.push(Diagnostic { severity, location, message })
    }

    pub fn error(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.push(Severity::Error, location, message.into())
    }

    pub fn warning(&mut self, location: Option<Location>, message: impl Into<String>) {
        self.push(Severity::Warning, location, message.into())
    }

    pub fn note(&mut self, location: Option<Location>, message: impl Into<String>) {
        assert!(
            !self.list.is_empty(),
            "a note must follow the diagnostic it is attached to"
        );
        self.push(Severity::Note, location, message.into())
    }

    pub fn contains_errors(&self) -> bool {
        self.list.iter().any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn error_count(&self) -> usize {
        self.list.iter().filter(|diagnostic| diagnostic.severity == Severity::Error).count()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.list.iter()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.list.extend(other.list)
    }

    /// Removes warnings together with the notes attached to them.
    pub fn without_warnings(&self) -> Diagnostics {
        let mut list = Vec::with_capacity(self.list.len());
        let mut keep = true;
        for diagnostic in self.list.iter() {
            keep = match diagnostic.severity {
                Severity::Error => true,
                Severity::Warning => false,
                Severity::Note => keep,
            };
            if keep {
                list.push(diagnostic.clone());
            }
        }
        Diagnostics { list }
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, diagnostic) in self.list.iter().enumerate() {
            if i != 0 {
                f.write_char('\n')?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.list.iter()
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;

    #[test]
    fn line_index() {
        let index = LineIndex::new("ab\ncd\n\nä x");
        assert_eq!(index.location(0), Location { line: 1, column: 1 });
        assert_eq!(index.location(2), Location { line: 1, column: 3 });
        assert_eq!(index.location(3), Location { line: 2, column: 1 });
        assert_eq!(index.location(6), Location { line: 3, column: 1 });
        // `ä` occupies two bytes but a single column
        assert_eq!(index.location(10), Location { line: 4, column: 3 });
    }

    #[test]
    fn rendering() {
        let mut diagnostics = Diagnostics::new();
        diagnostics.error(Some(Location { line: 3, column: 7 }), "something is wrong");
        diagnostics.note(Some(Location { line: 1, column: 1 }), "declared here");
        diagnostics.warning(Some(Location { line: 4, column: 5 }), "code is unreachable");
        diagnostics.error(None, "no location");

        expect![[r#"
            3:7 error: something is wrong
            1:1 note: declared here
            4:5 warning: code is unreachable
            error: no location"#]]
        .assert_eq(&diagnostics.to_string());

        assert_eq!(diagnostics.error_count(), 2);
        expect![[r#"
            3:7 error: something is wrong
            1:1 note: declared here
            error: no location"#]]
        .assert_eq(&diagnostics.without_warnings().to_string());
    }
}
