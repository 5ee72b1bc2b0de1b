//! Artifact collection and stable content hashing
//!
//! Walks the working tree into `Artifact` records for the collectors. The
//! walk respects `.gitignore`, applies the configured exclusion globs and the
//! focus restriction, and produces a path-sorted stream so downstream stages
//! are deterministic regardless of filesystem iteration order.

use std::fs;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use ignore::WalkBuilder;

use crate::config::AuditConfig;
use crate::error::Result;
use crate::schema::{fnv1a_hash, Artifact, ArtifactKind, FocusArea};

/// Documentation file extensions
const DOC_EXTENSIONS: &[&str] = &["md", "rst", "adoc", "txt"];

/// Sentinel phrases in the first lines marking a generated file
const GENERATED_SENTINELS: &[&str] = &["DO NOT EDIT", "@generated", "autogenerated", "auto-generated"];

/// Collect artifacts for a scan, sorted by path.
pub fn collect_artifacts(config: &AuditConfig) -> Result<Vec<Artifact>> {
    let exclusions = config.exclusion_globs()?;
    let mut artifacts = Vec::new();

    let mut builder = WalkBuilder::new(&config.root);
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
        let relative = relative_path(path, &config.root);
        if exclusions.is_match(&relative) {
            continue;
        }

        let kind = classify_kind(&relative);
        match kind {
            ArtifactKind::Doc if !config.has_focus(FocusArea::Docs) => continue,
            ArtifactKind::File if !config.has_focus(FocusArea::Code) => continue,
            _ => {}
        }

        // Unreadable and binary files are not artifacts
        let source = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(_) => continue,
        };

        let metadata = fs::metadata(path)?;
        artifacts.push(Artifact {
            kind,
            byte_size: metadata.len(),
            line_count: source.lines().count(),
            content_hash: stable_content_hash(&source, &relative),
            last_modified: modified_timestamp(&metadata),
            inbound_refs: None,
            path: relative,
        });
    }

    artifacts.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(artifacts)
}

/// Repo-relative `/`-normalized path
pub fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn classify_kind(relative: &str) -> ArtifactKind {
    let extension = relative.rsplit('.').next().unwrap_or("").to_lowercase();
    if DOC_EXTENSIONS.contains(&extension.as_str()) {
        ArtifactKind::Doc
    } else {
        ArtifactKind::File
    }
}

fn modified_timestamp(metadata: &fs::Metadata) -> Option<String> {
    let modified = metadata.modified().ok()?;
    let datetime: DateTime<Utc> = modified.into();
    Some(datetime.to_rfc3339_opts(SecondsFormat::Secs, true))
}

// ============================================================================
// Stable content hashing
// ============================================================================

/// Hash file content so whitespace-only and comment-only edits do not change
/// the result: line comments are stripped (lexically, not parsed), trailing
/// whitespace removed, internal whitespace runs collapsed, blank lines
/// dropped.
pub fn stable_content_hash(source: &str, path: &str) -> String {
    let comment_prefix = line_comment_prefix(path);
    let mut normalized = String::with_capacity(source.len());

    for line in source.lines() {
        let without_comment = match comment_prefix {
            Some(prefix) => strip_line_comment(line, prefix),
            None => line,
        };
        let collapsed = collapse_whitespace(without_comment.trim());
        if collapsed.is_empty() {
            continue;
        }
        normalized.push_str(&collapsed);
        normalized.push('\n');
    }

    format!("{:016x}", fnv1a_hash(&normalized))
}

/// Line comment marker by extension; `None` for formats where stripping would
/// corrupt content (markdown text, plain text).
fn line_comment_prefix(path: &str) -> Option<&'static str> {
    let extension = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match extension.as_str() {
        "rs" | "c" | "h" | "cpp" | "hpp" | "cc" | "go" | "java" | "js" | "jsx" | "ts" | "tsx"
        | "cs" | "kt" | "swift" | "scala" => Some("//"),
        "py" | "rb" | "sh" | "bash" | "pl" | "yaml" | "yml" | "toml" | "tf" | "r" => Some("#"),
        "sql" | "lua" => Some("--"),
        _ => None,
    }
}

fn strip_line_comment<'a>(line: &'a str, prefix: &str) -> &'a str {
    match line.find(prefix) {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn collapse_whitespace(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_space = false;
    for ch in input.chars() {
        if ch.is_whitespace() {
            if !in_space && !out.is_empty() {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out.trim_end().to_string()
}

/// Whether a file head carries a generated-code sentinel. Generated files are
/// excluded from similarity analysis.
pub fn is_generated(source: &str) -> bool {
    source
        .lines()
        .take(5)
        .any(|line| GENERATED_SENTINELS.iter().any(|s| line.contains(s)))
}
