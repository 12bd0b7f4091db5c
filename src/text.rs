//! Article text preparation and `source_lines` parsing for provenance lookups.

use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use crate::MAX_LINE_SPAN;

pub const PREPROCESS_LINE_WIDTH: usize = 80;

static LINE_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)(?:-(\d+))?").expect("line reference pattern"));

/// Greedy word wrap on single spaces. Words longer than `width` get a line
/// of their own.
pub fn word_wrap(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut current = String::new();

    for word in text.split(' ') {
        let candidate = current.chars().count() + 1 + word.chars().count();
        if candidate > width && !current.is_empty() {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else if current.is_empty() {
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }

    lines.join("\n")
}

/// Collapses whitespace, wraps at 80 columns and prefixes every line with
/// its 1-based number (`"12: ..."`), the form extraction prompts cite from.
pub fn preprocess_text(raw: &str) -> String {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    word_wrap(&collapsed, PREPROCESS_LINE_WIDTH)
        .split('\n')
        .enumerate()
        .map(|(idx, line)| format!("{}: {line}", idx + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Expands a reference such as `"Linhas: 10-12, 15"` into `[10, 11, 12, 15]`.
///
/// Numbers keep first-seen order and are de-duplicated. Reversed ranges and
/// ranges spanning more than [`MAX_LINE_SPAN`] lines contribute nothing.
pub fn parse_line_numbers(spec: Option<&str>) -> Vec<u32> {
    let Some(spec) = spec else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    let mut lines = Vec::new();

    for captures in LINE_REFERENCE.captures_iter(spec) {
        let Some(start) = captures.get(1).and_then(|m| m.as_str().parse::<u32>().ok()) else {
            continue;
        };
        let end = match captures.get(2) {
            Some(end) => match end.as_str().parse::<u32>() {
                Ok(end) => end,
                Err(_) => continue,
            },
            None => start,
        };
        if end.saturating_sub(start) > MAX_LINE_SPAN {
            continue;
        }

        for line in start..=end {
            if seen.insert(line) {
                lines.push(line);
            }
        }
    }

    lines
}
