//! Search tools - glob and grep over a denylist-filtered walk

use std::path::{Path, PathBuf};

use grep_regex::RegexMatcherBuilder;
use grep_searcher::sinks::UTF8;
use grep_searcher::{BinaryDetection, SearcherBuilder};
use tracing::debug;
use walkdir::WalkDir;

use super::context::SandboxContext;
use super::params::{GlobParams, GrepParams};
use super::ToolError;

/// Most file paths a glob returns
const MAX_GLOB_RESULTS: usize = 1000;

/// Most matching lines a grep returns
const MAX_GREP_MATCHES: usize = 200;

/// Longest reported match line in bytes before truncation
const MAX_MATCH_LINE_BYTES: usize = 500;

/// Walk the tree under `base`, skipping denylisted and hidden entries
///
/// Both search tools share this walk so they agree on what is visible.
fn walk_tree(ctx: &SandboxContext, base: &Path) -> Vec<PathBuf> {
    WalkDir::new(base)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            if e.depth() == 0 {
                return true;
            }
            let name = e.file_name().to_string_lossy();
            !name.starts_with('.') && !ctx.is_denied(&name)
        })
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect()
}

/// Find files matching a glob pattern
pub async fn glob(ctx: &SandboxContext, params: GlobParams) -> Result<String, ToolError> {
    debug!(pattern = %params.pattern, "search::glob: called");

    let pattern = glob::Pattern::new(&params.pattern)?;

    let mut matches = Vec::new();
    let mut truncated = false;
    for path in walk_tree(ctx, &ctx.root) {
        let Ok(rel) = path.strip_prefix(&ctx.root) else {
            continue;
        };
        if pattern.matches_path(rel) {
            if matches.len() >= MAX_GLOB_RESULTS {
                truncated = true;
                break;
            }
            matches.push(rel.to_string_lossy().to_string());
        }
    }

    debug!(matches_count = %matches.len(), %truncated, "search::glob: matches collected");

    if matches.is_empty() {
        return Ok("No matches found".to_string());
    }

    let mut output = matches.join("\n");
    if truncated {
        output.push_str(&format!("\n... (truncated at {} matches)", MAX_GLOB_RESULTS));
    }
    Ok(output)
}

/// Search file contents with a regex
///
/// Files whose leading bytes contain a null byte are treated as binary and
/// excluded entirely. Match lines longer than the cap are cut short.
pub async fn grep(ctx: &SandboxContext, params: GrepParams) -> Result<String, ToolError> {
    debug!(pattern = %params.pattern, path = ?params.path, "search::grep: called");

    let base = match &params.path {
        Some(p) => ctx.validate_path(Path::new(p))?,
        None => ctx.root.clone(),
    };

    let matcher = RegexMatcherBuilder::new()
        .case_insensitive(params.case_insensitive)
        .build(&params.pattern)?;

    let mut searcher_builder = SearcherBuilder::new();
    searcher_builder.binary_detection(BinaryDetection::quit(b'\x00'));

    let files = if base.is_file() {
        vec![base.clone()]
    } else {
        walk_tree(ctx, &base)
    };
    debug!(file_count = %files.len(), "search::grep: files to search");

    let mut lines: Vec<String> = Vec::new();
    let mut truncated = false;

    for file_path in files {
        if lines.len() >= MAX_GREP_MATCHES {
            truncated = true;
            break;
        }

        let display_path = file_path
            .strip_prefix(&ctx.root)
            .unwrap_or(&file_path)
            .to_string_lossy()
            .to_string();

        let mut searcher = searcher_builder.build();
        let collected = &mut lines;
        let search_result = searcher.search_path(
            &matcher,
            &file_path,
            UTF8(|line_num, line| {
                if collected.len() >= MAX_GREP_MATCHES {
                    return Ok(false);
                }
                let line = truncate_line(line.trim_end());
                collected.push(format!("{}:{}:{}", display_path, line_num, line));
                Ok(true)
            }),
        );

        if let Err(e) = search_result {
            // Unreadable files are skipped, not fatal
            debug!(?file_path, %e, "search::grep: skipping file");
        }
    }

    debug!(match_count = %lines.len(), %truncated, "search::grep: search complete");

    if lines.is_empty() {
        return Ok("No matches found.".to_string());
    }

    let mut output = lines.join("\n");
    if truncated {
        output.push_str(&format!("\n... (truncated at {} matches)", MAX_GREP_MATCHES));
    }
    Ok(output)
}

/// Cut a match line at the length cap, on a char boundary
fn truncate_line(line: &str) -> String {
    if line.len() <= MAX_MATCH_LINE_BYTES {
        return line.to_string();
    }
    let mut end = MAX_MATCH_LINE_BYTES;
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &line[..end])
}
