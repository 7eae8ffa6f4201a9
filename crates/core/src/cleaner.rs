//! Canonicalization of extracted text.
//!
//! Scans arrive with running headers, page numbers and department banners
//! mixed into the body. Without layout metadata we approximate the furniture
//! from line shape and repetition, and never reorder what is left.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct CleanOptions {
    /// Short lines seen at least this many times are headers or footers.
    pub repeated_line_threshold: usize,
    /// Longest line (in characters) still considered page furniture.
    pub header_footer_max_len: usize,
}

impl Default for CleanOptions {
    fn default() -> Self {
        Self {
            repeated_line_threshold: 3,
            header_footer_max_len: 90,
        }
    }
}

const BOILERPLATE_MARKERS: [&str; 4] =
    ["government of india", "भारत सरकार", "ministry of", "विभाग"];

pub fn clean(text: &str) -> String {
    clean_with(text, &CleanOptions::default())
}

pub fn clean_with(text: &str, options: &CleanOptions) -> String {
    let lines = text
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split('\n')
        .map(normalize_line)
        .collect::<Vec<_>>();

    let mut frequency = HashMap::<&str, usize>::new();
    for line in &lines {
        if !line.is_empty() && is_short(line, options) {
            *frequency.entry(line.as_str()).or_insert(0) += 1;
        }
    }

    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    for line in &lines {
        if line.is_empty() {
            if kept.last().is_some_and(|previous| !previous.is_empty()) {
                kept.push("");
            }
            continue;
        }

        if looks_like_page_furniture(line, options) {
            continue;
        }

        let repeats = frequency.get(line.as_str()).copied().unwrap_or(0);
        if is_short(line, options) && repeats >= options.repeated_line_threshold {
            continue;
        }

        kept.push(line);
    }

    while kept.last().is_some_and(|line| line.is_empty()) {
        kept.pop();
    }

    kept.join("\n")
}

fn normalize_line(line: &str) -> String {
    line.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace(
            |c: char| matches!(c, '\u{2010}' | '\u{2011}' | '\u{2013}' | '\u{2014}'),
            "-",
        )
}

fn is_short(line: &str, options: &CleanOptions) -> bool {
    line.chars().count() <= options.header_footer_max_len
}

/// `12`, `3 / 9`, `Page 4`, `page 4 of 10`.
fn is_page_number(line: &str) -> bool {
    let is_digits = |value: &str| !value.is_empty() && value.chars().all(|c| c.is_ascii_digit());

    if is_digits(line) {
        return line.len() <= 3;
    }

    if let Some((left, right)) = line.split_once('/') {
        return is_digits(left.trim()) && is_digits(right.trim());
    }

    let lowered = line.to_ascii_lowercase();
    let Some(rest) = lowered.strip_prefix("page") else {
        return false;
    };
    match rest.trim().split_once("of") {
        Some((current, total)) => is_digits(current.trim()) && is_digits(total.trim()),
        None => is_digits(rest.trim()),
    }
}

fn looks_like_page_furniture(line: &str, options: &CleanOptions) -> bool {
    if is_page_number(line) {
        return true;
    }

    if !is_short(line, options) {
        return false;
    }

    let lowered = line.to_lowercase();
    BOILERPLATE_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}
