//! Smart excerpting and UTF-8 helpers.
//!
//! Prevents oversized tool output (a big grep or diff) from blowing up a
//! participant's context budget once it re-enters the conversation as a
//! `tool` message.

/// Below this many bytes, tool output is left untouched.
pub const INLINE_MAX_BYTES: usize = 2048;

/// Above this many bytes, an excerpting hint is appended.
pub const ARTIFACT_THRESHOLD_BYTES: usize = 4096;

const MAX_GREP_MATCHES: usize = 20;
const MAX_DIFF_FILES: usize = 10;
const EXCERPT_HEAD_CHARS: usize = 1200;
const EXCERPT_TAIL_CHARS: usize = 800;

/// UTF-8 safe byte slicing — finds valid char boundaries.
pub fn safe_utf8_slice(text: &str, start: usize, limit: usize) -> (String, usize, usize) {
    let len = text.len();
    if start >= len {
        return (String::new(), len, len);
    }

    let mut actual_start = start.min(len);
    while actual_start < len && !text.is_char_boundary(actual_start) {
        actual_start += 1;
    }

    let mut actual_end = (actual_start + limit).min(len);
    while actual_end > actual_start && !text.is_char_boundary(actual_end) {
        actual_end -= 1;
    }

    (text[actual_start..actual_end].to_string(), actual_start, actual_end)
}

/// Create a head+tail excerpt with UTF-8 safe slicing.
pub fn create_excerpt(content: &str, head_chars: usize, tail_chars: usize) -> String {
    let chars: Vec<char> = content.chars().collect();
    let total = chars.len();

    if total <= head_chars + tail_chars + 50 {
        return content.to_string();
    }

    let head: String = chars[..head_chars].iter().collect();
    let tail: String = chars[total - tail_chars..].iter().collect();

    format!(
        "{}\n\n…[truncated {} chars]…\n\n{}",
        head,
        total - head_chars - tail_chars,
        tail
    )
}

/// Create a smart excerpt for grep-shaped output: top N matches.
pub fn create_grep_excerpt(content: &str, max_matches: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();

    if total_lines <= max_matches * 2 {
        return content.to_string();
    }

    let preview_lines: Vec<&str> = lines.iter().take(max_matches).copied().collect();
    let remaining = total_lines - max_matches;

    format!(
        "{}\n\n…[{} more matches]…",
        preview_lines.join("\n"),
        remaining
    )
}

/// Create a smart excerpt for a unified git diff: file headers + first
/// hunk per file. Returns content as-is if it doesn't look like a diff.
pub fn create_diff_excerpt(content: &str, max_files: usize) -> String {
    let total_files = content.lines().filter(|l| l.starts_with("diff --git")).count();
    if total_files == 0 {
        return content.to_string();
    }

    let mut result = String::new();
    let mut files_shown = 0;
    let mut in_hunk = false;
    let mut hunk_lines = 0;
    let mut current_file_has_hunk = false;

    for line in content.lines() {
        if line.starts_with("diff --git") {
            if files_shown >= max_files {
                break;
            }
            files_shown += 1;
            in_hunk = false;
            hunk_lines = 0;
            current_file_has_hunk = false;
            if !result.is_empty() {
                result.push('\n');
            }
            result.push_str(line);
            result.push('\n');
            continue;
        }

        if line.starts_with("index ") || line.starts_with("--- ") || line.starts_with("+++ ") {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        if line.starts_with("@@") {
            if current_file_has_hunk {
                continue;
            }
            in_hunk = true;
            current_file_has_hunk = true;
            hunk_lines = 0;
            result.push_str(line);
            result.push('\n');
            continue;
        }

        if in_hunk && hunk_lines < 15 {
            result.push_str(line);
            result.push('\n');
            hunk_lines += 1;
            if hunk_lines == 15 {
                result.push_str("  …[hunk truncated]…\n");
            }
        }
    }

    if total_files > max_files {
        result.push_str(&format!(
            "\n…[{} more files changed]…",
            total_files - max_files
        ));
    }

    result
}

/// Route to a type-specific excerpter based on the tool that produced the
/// output, falling back to a generic head+tail excerpt.
pub fn create_smart_excerpt(tool_name: &str, content: &str) -> String {
    match tool_name {
        "grep" | "search" => create_grep_excerpt(content, MAX_GREP_MATCHES),
        "git_diff" => create_diff_excerpt(content, MAX_DIFF_FILES),
        _ => create_excerpt(content, EXCERPT_HEAD_CHARS, EXCERPT_TAIL_CHARS),
    }
}
