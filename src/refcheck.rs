//! Repository-wide textual reference checking
//!
//! Backs three sanity gates:
//!
//! 1. Static-analysis claims of unused-ness must survive a textual search
//!    before they reach HIGH confidence.
//! 2. The dependency collector probes whether a declared dependency is ever
//!    imported or invoked.
//! 3. Consolidation refuses to rewrite inbound references it cannot resolve
//!    unambiguously.
//!
//! Respects `.gitignore` and skips binary files.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use grep_matcher::Matcher;
use grep_regex::RegexMatcher;
use grep_searcher::sinks::UTF8;
use grep_searcher::{BinaryDetection, SearcherBuilder};
use ignore::WalkBuilder;

use crate::error::{AuditError, Result};

/// A file referencing a searched token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Repo-relative path of the referencing file
    pub file: String,

    /// Line number of the first match in that file (1-indexed)
    pub line: u64,

    /// Column number of the first match (1-indexed, byte offset)
    pub column: u64,

    /// Number of matches within the file
    pub count: usize,
}

/// Textual reference checker over a working tree
#[derive(Debug, Clone)]
pub struct ReferenceChecker {
    root: PathBuf,
}

impl ReferenceChecker {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    /// Count references to `token` as a whole word across the tree,
    /// excluding `exclude_path` (usually the defining file itself).
    pub fn count_references(&self, token: &str, exclude_path: Option<&str>) -> Result<usize> {
        Ok(self
            .find_references(token, exclude_path)?
            .iter()
            .map(|r| r.count)
            .sum())
    }

    /// Files referencing `token` as a whole word, sorted by path.
    pub fn find_references(
        &self,
        token: &str,
        exclude_path: Option<&str>,
    ) -> Result<Vec<Reference>> {
        let pattern = format!(r"\b{}\b", regex::escape(token));
        let matcher = RegexMatcher::new(&pattern).map_err(|e| AuditError::ToolError {
            tool: "refcheck".to_string(),
            message: format!("invalid pattern: {}", e),
        })?;

        let references = Arc::new(Mutex::new(Vec::new()));

        let mut builder = WalkBuilder::new(&self.root);
        builder.git_ignore(true);
        builder.git_global(true);
        builder.git_exclude(true);
        builder.follow_links(false);
        builder.hidden(false);

        for result in builder.build() {
            let entry = match result {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(true) {
                continue;
            }

            let path = entry.path();
            let relative = self.relative(path);
            // Engine state is not part of the tree being audited
            if relative == crate::report::STATE_DIR
                || relative.starts_with(&format!("{}/", crate::report::STATE_DIR))
            {
                continue;
            }
            if exclude_path.map(|p| p == relative).unwrap_or(false) {
                continue;
            }

            // Binary or unreadable files are silently skipped
            let _ = self.search_file(path, &relative, &matcher, &references);
        }

        let mut collected = Arc::try_unwrap(references)
            .map(|m| m.into_inner().unwrap())
            .unwrap_or_else(|arc| arc.lock().unwrap().clone());
        collected.sort_by(|a: &Reference, b: &Reference| a.file.cmp(&b.file));
        Ok(collected)
    }

    fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/")
    }

    fn search_file(
        &self,
        path: &Path,
        relative: &str,
        matcher: &RegexMatcher,
        references: &Arc<Mutex<Vec<Reference>>>,
    ) -> Result<()> {
        let mut searcher = SearcherBuilder::new()
            .binary_detection(BinaryDetection::quit(b'\x00'))
            .line_number(true)
            .build();

        let mut first_match: Option<(u64, u64)> = None;
        let mut count = 0usize;

        searcher
            .search_path(
                matcher,
                path,
                UTF8(|line_num, line| {
                    if first_match.is_none() {
                        // Column (byte offset of the first match in the line)
                        let column = matcher
                            .find(line.as_bytes())
                            .ok()
                            .flatten()
                            .map(|m| m.start() as u64 + 1)
                            .unwrap_or(1);
                        first_match = Some((line_num, column));
                    }
                    count += 1;
                    Ok(true)
                }),
            )
            .map_err(|e| {
                AuditError::Io(std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
            })?;

        if let Some((line, column)) = first_match {
            references.lock().unwrap().push(Reference {
                file: relative.to_string(),
                line,
                column,
                count,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seed(dir: &Path, path: &str, contents: &str) {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, contents).unwrap();
    }

    #[test]
    fn test_counts_whole_word_references() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "src/lib.py", "def helper():\n    pass\n");
        seed(dir.path(), "src/app.py", "from lib import helper\nhelper()\n");
        seed(dir.path(), "src/other.py", "helpers = 1\n");

        let checker = ReferenceChecker::new(dir.path());
        let count = checker
            .count_references("helper", Some("src/lib.py"))
            .unwrap();
        // Two matches in app.py; "helpers" does not match as a whole word
        assert_eq!(count, 2);
    }

    #[test]
    fn test_excludes_defining_file() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "src/only.py", "def orphan():\n    orphan()\n");

        let checker = ReferenceChecker::new(dir.path());
        let count = checker
            .count_references("orphan", Some("src/only.py"))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_find_references_sorted() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "b.txt", "token\n");
        seed(dir.path(), "a.txt", "token token\n");

        let checker = ReferenceChecker::new(dir.path());
        let refs = checker.find_references("token", None).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].file, "a.txt");
        assert_eq!(refs[0].count, 2);
        assert_eq!(refs[1].file, "b.txt");
    }

    #[test]
    fn test_first_match_line_and_column() {
        let dir = tempfile::tempdir().unwrap();
        seed(dir.path(), "notes.txt", "nothing here\nsee token twice: token\n");

        let checker = ReferenceChecker::new(dir.path());
        let refs = checker.find_references("token", None).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].line, 2);
        // 1-indexed byte offset of the first match within its line
        assert_eq!(refs[0].column, 5);
        assert_eq!(refs[0].count, 2);
    }
}
