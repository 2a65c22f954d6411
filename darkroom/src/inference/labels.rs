use crate::error::InferenceError;

/// Class names indexed by 1-based class index; index 0 never resolves.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Labels(Vec<String>);

impl Labels {
    pub fn new(labels: Vec<String>) -> Self {
        Labels(labels)
    }

    /// Parse a newline-delimited label file.
    ///
    /// A leading BOM, `\r` line endings, one leading `#` header line and
    /// trailing blank lines are dropped. Interior blank lines are kept so the
    /// indices of later labels do not shift.
    pub fn parse(text: &str) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut lines: Vec<String> = text
            .lines()
            .map(|line| line.trim_end_matches('\r').trim().to_string())
            .collect();

        if lines.first().is_some_and(|l| l.starts_with('#')) {
            lines.remove(0);
        }
        while lines.last().is_some_and(String::is_empty) {
            lines.pop();
        }

        Labels(lines)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Label for a 1-based class index.
    pub fn resolve(&self, class_index: u32) -> Result<&str, InferenceError> {
        let out_of_range = || InferenceError::LabelIndexOutOfRange {
            index: class_index,
            len: self.0.len(),
        };
        let slot = (class_index as usize).checked_sub(1).ok_or_else(out_of_range)?;
        self.0.get(slot).map(String::as_str).ok_or_else(out_of_range)
    }
}
