//! Zero-allocation GFF3 column parsing utilities.
//!
//! These functions split and decode GFF3 lines without heap allocation
//! in the common path. Allocation only happens when an attribute value
//! carries percent-escapes.

use memchr::memchr;
use std::borrow::Cow;

/// Number of columns in a GFF3 feature line.
pub const GFF_COLUMNS: usize = 9;

/// Fast u64 parsing - no allocation, no error formatting.
///
/// Returns None if the input is empty or contains non-digit characters.
#[inline(always)]
pub fn parse_u64_fast(bytes: &[u8]) -> Option<u64> {
    if bytes.is_empty() || bytes.len() > 20 {
        return None;
    }
    let mut n: u64 = 0;
    for &b in bytes {
        let d = b.wrapping_sub(b'0');
        if d > 9 {
            return None;
        }
        n = n.checked_mul(10)?.checked_add(d as u64)?;
    }
    Some(n)
}

/// Split a GFF3 line into its nine columns using memchr.
///
/// The ninth column keeps everything after the eighth tab, so stray tabs
/// inside the attribute column are preserved. Returns None when the line
/// has fewer than nine columns.
#[inline]
pub fn split_columns(line: &str) -> Option<[&str; GFF_COLUMNS]> {
    let bytes = line.as_bytes();
    let mut cols = [""; GFF_COLUMNS];
    let mut pos = 0;

    for col in cols.iter_mut().take(GFF_COLUMNS - 1) {
        let tab = memchr(b'\t', &bytes[pos..])?;
        *col = &line[pos..pos + tab];
        pos += tab + 1;
    }
    cols[GFF_COLUMNS - 1] = line[pos..].trim_end_matches(['\r', '\n']);

    Some(cols)
}

/// Count the tab-separated columns of a line.
#[inline]
pub fn column_count(line: &str) -> usize {
    memchr::memchr_iter(b'\t', line.as_bytes()).count() + 1
}

/// Check if a line should be skipped (empty or comment).
///
/// `##FASTA` and other pragmas are comments here; callers that care about
/// them check before calling this.
#[inline(always)]
pub fn should_skip_line(line: &[u8]) -> bool {
    line.is_empty() || line[0] == b'#'
}

/// Decode `%XX` escapes in an attribute key or value.
///
/// Malformed escapes are kept verbatim.
pub fn percent_decode(s: &str) -> Cow<'_, str> {
    if memchr(b'%', s.as_bytes()).is_none() {
        return Cow::Borrowed(s);
    }

    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    Cow::Owned(String::from_utf8_lossy(&out).into_owned())
}

#[inline]
fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
