//! Deterministic output formatting
//!
//! Two renders of identical input must produce byte-identical output;
//! the idempotence and incremental-diff properties depend on it. These
//! rules are applied to every rendered file before it is staged.

/// Normalize rendered text: `\n` line endings, no trailing whitespace,
/// at most two consecutive blank lines, exactly one trailing newline.
pub fn format_output(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 1);
    let mut blank_run = 0usize;

    for line in text.replace("\r\n", "\n").split('\n') {
        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            blank_run += 1;
            if blank_run > 2 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(trimmed);
        out.push('\n');
    }

    // Collapse the trailing blank run to a single final newline
    while out.ends_with("\n\n") {
        out.pop();
    }
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}
