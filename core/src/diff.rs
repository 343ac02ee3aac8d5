//! Line-diff computation for tool-call file changes.
//!
//! Produces render-ready, bounded previews rather than patch text: every
//! line is tagged context/add/del in original order, and an over-budget
//! diff is trimmed down to its change regions (padded with a little
//! context) before the hard preview cap is enforced.

use std::ops::Range;

use similar::Algorithm;
use similar::DiffOp;
use similar::capture_diff_slices;
use tether_protocol::diff::DiffLine;
use tether_protocol::diff::DiffLineKind;
use tether_protocol::diff::DiffPreview;

use crate::config::Limits;

/// Diffs `old` against `new` and returns a preview no longer than
/// `limits.diff_max_preview_lines`.
///
/// Inputs larger than `limits.full_alignment_max_bytes` combined skip the
/// Myers alignment and fall back to a common prefix/suffix split, which is
/// coarse but costs a single pass.
pub fn compute_diff(old: &str, new: &str, limits: &Limits) -> DiffPreview {
    let old_lines = split_lines(old);
    let new_lines = split_lines(new);
    let (lines, additions, deletions) = if old.len() + new.len() > limits.full_alignment_max_bytes {
        coarse_diff(&old_lines, &new_lines)
    } else {
        aligned_diff(&old_lines, &new_lines)
    };
    trim_preview(lines, additions, deletions, limits)
}

/// Splits into lines, tolerating CRLF endings and ignoring a trailing
/// newline so `"a\n"` and `"a"` compare equal.
fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    let mut lines: Vec<&str> = text
        .split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

fn aligned_diff(old: &[&str], new: &[&str]) -> (Vec<DiffLine>, usize, usize) {
    let mut lines = Vec::new();
    let mut additions = 0;
    let mut deletions = 0;
    for op in capture_diff_slices(Algorithm::Myers, old, new) {
        match op {
            DiffOp::Equal { old_index, len, .. } => {
                for line in &old[old_index..old_index + len] {
                    lines.push(DiffLine::context(*line));
                }
            }
            DiffOp::Delete {
                old_index, old_len, ..
            } => {
                deletions += old_len;
                for line in &old[old_index..old_index + old_len] {
                    lines.push(DiffLine::del(*line));
                }
            }
            DiffOp::Insert {
                new_index, new_len, ..
            } => {
                additions += new_len;
                for line in &new[new_index..new_index + new_len] {
                    lines.push(DiffLine::add(*line));
                }
            }
            DiffOp::Replace {
                old_index,
                old_len,
                new_index,
                new_len,
            } => {
                deletions += old_len;
                additions += new_len;
                for line in &old[old_index..old_index + old_len] {
                    lines.push(DiffLine::del(*line));
                }
                for line in &new[new_index..new_index + new_len] {
                    lines.push(DiffLine::add(*line));
                }
            }
        }
    }
    (lines, additions, deletions)
}

/// Prefix/suffix fallback for inputs too large to align: everything between
/// the longest common line prefix and the longest (non-overlapping) common
/// line suffix is treated as one replaced block.
fn coarse_diff(old: &[&str], new: &[&str]) -> (Vec<DiffLine>, usize, usize) {
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && old[prefix] == new[prefix] {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && old[old.len() - 1 - suffix] == new[new.len() - 1 - suffix]
    {
        suffix += 1;
    }

    let deletions = old.len() - prefix - suffix;
    let additions = new.len() - prefix - suffix;
    let mut lines = Vec::with_capacity(prefix + deletions + additions + suffix);
    for line in &old[..prefix] {
        lines.push(DiffLine::context(*line));
    }
    for line in &old[prefix..old.len() - suffix] {
        lines.push(DiffLine::del(*line));
    }
    for line in &new[prefix..new.len() - suffix] {
        lines.push(DiffLine::add(*line));
    }
    for line in &old[old.len() - suffix..] {
        lines.push(DiffLine::context(*line));
    }
    (lines, additions, deletions)
}

/// Bounds a full tagged diff to the preview cap.
///
/// Under the cap the diff passes through untouched. Over it, change regions
/// are padded with `diff_context_lines` of context and merged where they
/// meet; if the merged regions still do not fit, only the head of the first
/// and the tail of the last survive around a single elision line.
fn trim_preview(
    lines: Vec<DiffLine>,
    additions: usize,
    deletions: usize,
    limits: &Limits,
) -> DiffPreview {
    let max = limits.diff_max_preview_lines;
    if lines.len() <= max {
        return DiffPreview {
            lines,
            additions,
            deletions,
            truncated: false,
        };
    }

    let regions = change_regions(&lines, limits.diff_context_lines);
    if regions.is_empty() {
        // Nothing but context, and too much of it to show.
        return DiffPreview {
            lines: Vec::new(),
            additions,
            deletions,
            truncated: true,
        };
    }

    let body: usize = regions.iter().map(ExactSizeIterator::len).sum();
    let separators = regions.len() - 1;
    let mut kept = Vec::new();
    if body + separators <= max {
        for (i, region) in regions.iter().enumerate() {
            if i > 0 {
                kept.push(DiffLine::elision());
            }
            kept.extend_from_slice(&lines[region.clone()]);
        }
    } else {
        // Keep the opening of the first region and the close of the last,
        // each bounded so head + elision + tail stays within the cap.
        let half = max.saturating_sub(1) / 2;
        let first = &regions[0];
        let last = &regions[regions.len() - 1];
        let head_len = half.min(first.len());
        kept.extend_from_slice(&lines[first.start..first.start + head_len]);
        kept.push(DiffLine::elision());
        let tail_len = if regions.len() == 1 {
            // A single oversized region contributes both its head and tail.
            half
        } else {
            half.min(last.len())
        };
        kept.extend_from_slice(&lines[last.end - tail_len..last.end]);
    }

    DiffPreview {
        lines: kept,
        additions,
        deletions,
        truncated: true,
    }
}

/// Maximal runs of non-context lines, padded with `pad` lines of context on
/// both sides; overlapping or adjacent padded runs are merged.
fn change_regions(lines: &[DiffLine], pad: usize) -> Vec<Range<usize>> {
    let mut regions: Vec<Range<usize>> = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        if lines[i].kind == DiffLineKind::Context {
            i += 1;
            continue;
        }
        let start = i;
        while i < lines.len() && lines[i].kind != DiffLineKind::Context {
            i += 1;
        }
        let padded = start.saturating_sub(pad)..(i + pad).min(lines.len());
        match regions.last_mut() {
            Some(prev) if padded.start <= prev.end => prev.end = padded.end,
            _ => regions.push(padded),
        }
    }
    regions
}
