//! Byte-level regex search over a [`MappedCorpus`] snapshot.
//!
//! Deterministic, bounded, and format-compatible with the reference `grep_formatted` output:
//! one `path:line:content` line per match, plus a summary line. Mirrors the teacher's
//! `api_grep` idiom of compiling a `regex` and running it across files with `rayon`, but scans
//! memory-mapped bytes directly instead of files read off disk per request.

use std::path::Path;

use rayon::prelude::*;
use regex::bytes::RegexBuilder;

use crate::corpus::MappedCorpus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub path: std::path::PathBuf,
    pub line_number: usize,
    pub line: String,
}

pub struct SearchResult {
    pub matches: Vec<Match>,
    pub truncated: bool,
}

/// Compiles `pattern` and scans every file in `corpus`'s current snapshot, in path-ascending
/// then line-ascending order, stopping as soon as `max_results` matches have been found.
pub fn search(
    corpus: &MappedCorpus,
    pattern: &str,
    case_sensitive: bool,
    max_results: usize,
) -> Result<SearchResult, String> {
    let regex = RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .build()
        .map_err(|e| format!("invalid pattern: {e}"))?;

    let snapshot = corpus.snapshot();
    let root = corpus.root();

    // Per-file match vectors computed in parallel, then concatenated in the snapshot's
    // (path-ascending) iteration order — this keeps the scan embarrassingly parallel while
    // preserving the deterministic ordering contract.
    let per_file: Vec<Vec<Match>> = snapshot
        .par_iter()
        .map(|(path, mapped)| matches_in_file(path, mapped.bytes(), &regex))
        .collect();

    let mut matches = Vec::new();
    let mut truncated = false;
    'outer: for file_matches in per_file {
        for m in file_matches {
            if matches.len() >= max_results {
                truncated = true;
                break 'outer;
            }
            matches.push(m);
        }
    }
    let _ = root;
    Ok(SearchResult { matches, truncated })
}

fn matches_in_file(path: &Path, bytes: &[u8], regex: &regex::bytes::Regex) -> Vec<Match> {
    let mut out = Vec::new();
    for (idx, line) in bytes.split(|b| *b == b'\n').enumerate() {
        if regex.is_match(line) {
            let text = String::from_utf8_lossy(line);
            let text = text.trim_end_matches(['\r']).to_string();
            out.push(Match { path: path.to_path_buf(), line_number: idx + 1, line: text });
        }
    }
    out
}

/// Renders a [`SearchResult`] exactly as the reference implementation's `grep_formatted` does:
/// `relative/path:line:content` lines, then a summary concatenated directly onto the joined
/// match text (not newline-joined separately) — which is why real output shows a blank line
/// between the last match and the `--- Found N matches ---` line.
pub fn format_matches(root: &Path, pattern: &str, result: &SearchResult, max_results: usize) -> String {
    if result.matches.is_empty() {
        return format!("No matches found for pattern: {pattern}");
    }

    let lines: Vec<String> = result
        .matches
        .iter()
        .map(|m| {
            let rel = m.path.strip_prefix(root).unwrap_or(&m.path);
            format!("{}:{}:{}", rel.display(), m.line_number, m.line)
        })
        .collect();

    let mut summary = format!("\n--- Found {} matches", result.matches.len());
    if result.truncated {
        summary.push_str(&format!(" (limited to first {max_results})"));
    }
    summary.push_str(" ---");

    lines.join("\n") + &summary
}
