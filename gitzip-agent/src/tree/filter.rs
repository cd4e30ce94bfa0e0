//! File selection rules applied while collecting a tree.

use regex::Regex;

use crate::model::TransferOptions;
use crate::utils::errors::{GitzipError, Result};

/// Why a file was left out of the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge,
    Hidden,
    Excluded,
}

/// One compiled exclude pattern.
#[derive(Debug)]
struct ExcludePattern {
    literal: String,
    regex: Regex,
}

impl ExcludePattern {
    /// Translate a glob-like pattern: `*` matches any run of characters, `?` one character.
    fn compile(pattern: &str) -> Result<Self> {
        let mut source = String::with_capacity(pattern.len() * 2);
        for c in pattern.chars() {
            match c {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
            }
        }
        let regex = Regex::new(&source).map_err(|e| {
            GitzipError::Validation(format!("invalid exclude pattern {pattern:?}: {e}"))
        })?;
        Ok(Self {
            literal: pattern.to_string(),
            regex,
        })
    }

    /// Unanchored: the pattern may match anywhere in the path.
    fn matches(&self, path: &str) -> bool {
        self.regex.is_match(path) || path.contains(&self.literal)
    }
}

#[derive(Debug)]
pub struct FileFilter {
    max_file_size: u64,
    include_hidden: bool,
    excludes: Vec<ExcludePattern>,
}

impl FileFilter {
    pub fn new(options: &TransferOptions) -> Result<Self> {
        let excludes = options
            .exclude_patterns
            .iter()
            .map(|p| ExcludePattern::compile(p))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            max_file_size: options.max_file_size,
            include_hidden: options.include_hidden,
            excludes,
        })
    }

    /// `None` when the file belongs in the manifest.
    pub fn check_file(&self, name: &str, path: &str, size: u64) -> Option<SkipReason> {
        if size > self.max_file_size {
            Some(SkipReason::TooLarge)
        } else if !self.include_hidden && is_hidden(name) {
            Some(SkipReason::Hidden)
        } else if self.is_excluded(path) {
            Some(SkipReason::Excluded)
        } else {
            None
        }
    }

    /// A directory whose path matches an exclude pattern cannot contain an eligible file.
    pub fn is_excluded(&self, path: &str) -> bool {
        self.excludes.iter().any(|p| p.matches(path))
    }
}

pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(patterns: &[&str]) -> FileFilter {
        FileFilter::new(&TransferOptions {
            exclude_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_glob_star_matches_anywhere() {
        let f = filter(&["*.log"]);
        assert!(f.is_excluded("docs/build/output.log"));
        assert!(!f.is_excluded("docs/readme.md"));
    }

    #[test]
    fn test_question_mark_matches_one_character() {
        let f = filter(&["v?.txt"]);
        assert!(f.is_excluded("notes/v1.txt"));
        assert!(!f.is_excluded("notes/v10.txt"));
    }

    #[test]
    fn test_literal_substring_match() {
        let f = filter(&["node_modules"]);
        assert!(f.is_excluded("web/node_modules/react/index.js"));
    }

    #[test]
    fn test_dots_are_literal() {
        let f = filter(&[".git"]);
        assert!(f.is_excluded("repo/.git/config"));
        assert!(!f.is_excluded("repo/agit/config"));
    }

    #[test]
    fn test_check_file_order() {
        let f = FileFilter::new(&TransferOptions {
            max_file_size: 10,
            ..Default::default()
        })
        .unwrap();
        assert_eq!(f.check_file("big.bin", "big.bin", 11), Some(SkipReason::TooLarge));
        assert_eq!(f.check_file(".env", "app/.env", 1), Some(SkipReason::Hidden));
        assert_eq!(f.check_file("HEAD", ".git/HEAD", 1), Some(SkipReason::Excluded));
        assert_eq!(f.check_file("a.md", "docs/a.md", 10), None);
    }

    #[test]
    fn test_hidden_files_allowed_when_requested() {
        let f = FileFilter::new(&TransferOptions {
            include_hidden: true,
            exclude_patterns: vec![],
            ..Default::default()
        })
        .unwrap();
        assert_eq!(f.check_file(".env", "app/.env", 1), None);
    }

    #[test]
    fn test_hidden_rule_looks_at_name_only() {
        assert!(is_hidden(".hidden"));
        assert!(!is_hidden("visible"));
        let f = filter(&[]);
        assert_eq!(f.check_file("b.md", ".config/b.md", 1), None);
    }
}
