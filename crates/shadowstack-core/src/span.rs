//! Source location information attached to IR nodes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Originating file and line of an IR node
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceInfo {
    /// File name as reported by the front end (may include directories)
    pub file: String,
    /// 1-based start line; 0 for synthetic nodes
    pub line: u32,
}

impl SourceInfo {
    pub fn new(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line,
        }
    }

    /// Location for nodes that have no originating source
    pub fn synthetic() -> Self {
        Self {
            file: String::new(),
            line: 0,
        }
    }

    pub fn is_synthetic(&self) -> bool {
        self.line == 0 && self.file.is_empty()
    }

    /// File name with every leading directory stripped
    ///
    /// Both `/` and the platform separator are treated as directory separators.
    pub fn base_name(&self) -> &str {
        let cut = self
            .file
            .rfind(|c| c == '/' || c == std::path::MAIN_SEPARATOR)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.file[cut..]
    }
}

impl fmt::Display for SourceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_name_strips_directories() {
        assert_eq!(SourceInfo::new("com/example/Foo.java", 3).base_name(), "Foo.java");
        assert_eq!(SourceInfo::new("Foo.java", 3).base_name(), "Foo.java");
        assert_eq!(SourceInfo::new("dir/", 3).base_name(), "");
    }

    #[test]
    fn test_synthetic() {
        assert!(SourceInfo::synthetic().is_synthetic());
        assert!(!SourceInfo::new("a.js", 1).is_synthetic());
    }

    #[test]
    fn test_display() {
        assert_eq!(SourceInfo::new("a.js", 12).to_string(), "a.js:12");
    }
}
