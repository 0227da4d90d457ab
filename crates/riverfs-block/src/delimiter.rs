//! Stream delimiters: how an incoming byte stream is cut into blocks.
//!
//! Whatever the delimiter, concatenating the produced blocks in order
//! yields exactly the input bytes. The delimiter only controls where the
//! cuts fall, so that line- or record-oriented consumers never see a
//! record split across two blocks.

use serde::{Deserialize, Serialize};

/// Where block boundaries may fall when ingesting a stream.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Delimiter {
    /// Cut anywhere; blocks are fixed-size byte ranges.
    None,
    /// Cut only after a newline.
    Line,
    /// Cut only after a complete top-level JSON value.
    Json,
}

/// Splits `data` into block-sized ranges honoring the delimiter.
///
/// Ranges are contiguous, non-overlapping, and cover all of `data`. Each
/// block is at most `target` bytes unless a single record exceeds the
/// target, in which case the record becomes its own oversized block.
pub fn split_ranges(delimiter: Delimiter, data: &[u8], target: usize) -> Vec<(usize, usize)> {
    if data.is_empty() {
        return Vec::new();
    }
    let target = target.max(1);
    match delimiter {
        Delimiter::None => {
            let mut ranges = Vec::new();
            let mut start = 0;
            while start < data.len() {
                let end = (start + target).min(data.len());
                ranges.push((start, end));
                start = end;
            }
            ranges
        }
        Delimiter::Line => group_records(line_boundaries(data), target),
        Delimiter::Json => group_records(json_boundaries(data), target),
    }
}

/// End offsets of each newline-terminated record, plus any trailing bytes.
fn line_boundaries(data: &[u8]) -> Vec<usize> {
    let mut ends = Vec::new();
    for (i, b) in data.iter().enumerate() {
        if *b == b'\n' {
            ends.push(i + 1);
        }
    }
    if ends.last() != Some(&data.len()) {
        ends.push(data.len());
    }
    ends
}

/// End offsets of each complete top-level JSON value, plus trailing bytes.
///
/// Tracks brace/bracket depth outside strings; escape sequences inside
/// strings are honored. Bytes that never close (truncated input) end up in
/// a final record so nothing is dropped.
fn json_boundaries(data: &[u8]) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut depth: u64 = 0;
    let mut in_string = false;
    let mut escaped = false;
    let mut seen_value = false;
    for (i, b) in data.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *b == b'\\' {
                escaped = true;
            } else if *b == b'"' {
                in_string = false;
            }
            continue;
        }
        match *b {
            b'"' => in_string = true,
            b'{' | b'[' => {
                depth += 1;
                seen_value = true;
            }
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 && seen_value {
                    ends.push(i + 1);
                    seen_value = false;
                }
            }
            _ => {}
        }
    }
    if ends.last() != Some(&data.len()) {
        ends.push(data.len());
    }
    ends
}

/// Groups record end-offsets into ranges of at most `target` bytes.
fn group_records(ends: Vec<usize>, target: usize) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    let mut current = start;
    for end in ends {
        if end - start > target && current > start {
            ranges.push((start, current));
            start = current;
        }
        current = end;
    }
    if current > start {
        ranges.push((start, current));
    }
    ranges
}
