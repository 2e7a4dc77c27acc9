//! Deterministic pretty-printed JSON emission.
//!
//! The report shape is fixed down to the byte: paths in registry id order,
//! days in chronological order, zero cells and zero paths omitted, `/`
//! escaped as `\/` in key strings, four-space indentation, and no trailing
//! newline after the closing brace. A report with no visits at all is
//! exactly `{}\n`.
//!
//! Emission is two-tier to keep the per-cell work tiny: every day id gets a
//! pre-rendered `        "20YY-MM-DD": ` prefix in one flat table (fixed
//! stride, built once), and each path's body is assembled in a reused local
//! buffer and written in a single call.

use std::io::{self, Write};

use crate::dates::{DateIndex, DATE_LABEL_LEN};
use crate::registry::PathRegistry;

/// `{indent}"{label}": ` is 8 spaces, quoted 10-byte label, colon, space.
const DAY_PREFIX_LEN: usize = 8 + 1 + DATE_LABEL_LEN + 1 + 2;

/// Path key opener: newline, 4-space indent, quote, escaped `/blog/`.
const PATH_KEY_OPEN: &[u8] = b"\n    \"\\/blog\\/";
/// Path key closer: quote, colon, space, object brace, newline.
const PATH_KEY_CLOSE: &[u8] = b"\": {\n";
/// Path object closer, aligned with the 4-space key indent.
const PATH_OBJECT_CLOSE: &[u8] = b"\n    }";

/// Flat table of pre-rendered day-entry prefixes, indexed by day id.
struct DayPrefixes {
    flat: Vec<u8>,
}

impl DayPrefixes {
    fn build(dates: &DateIndex) -> Self {
        let count = dates.count() as usize;
        let mut flat = Vec::with_capacity(count * DAY_PREFIX_LEN);
        for id in 0..dates.count() {
            flat.extend_from_slice(b"        \"");
            flat.extend_from_slice(dates.label(id));
            flat.extend_from_slice(b"\": ");
        }
        debug_assert_eq!(flat.len(), count * DAY_PREFIX_LEN);
        Self { flat }
    }

    #[inline]
    fn get(&self, id: usize) -> &[u8] {
        &self.flat[id * DAY_PREFIX_LEN..(id + 1) * DAY_PREFIX_LEN]
    }
}

/// Writes the visit report for `matrix` to `out`.
///
/// `matrix` must have the `P · D` shape produced for `registry` and
/// `dates`. Output depends only on registry order and date order, so two
/// runs over equal accumulators produce identical bytes.
pub fn write_report<W: Write>(
    out: &mut W,
    matrix: &[u32],
    registry: &PathRegistry,
    dates: &DateIndex,
) -> io::Result<()> {
    let day_count = dates.count() as usize;
    debug_assert_eq!(matrix.len(), registry.len() * day_count);

    if matrix.iter().all(|&cell| cell == 0) {
        return out.write_all(b"{}\n");
    }

    let prefixes = DayPrefixes::build(dates);
    let mut header = Vec::with_capacity(128);
    let mut body = Vec::with_capacity(4096);

    out.write_all(b"{")?;
    let mut first_path = true;
    for path_id in 0..registry.len() {
        let row = &matrix[path_id * day_count..(path_id + 1) * day_count];

        body.clear();
        let mut first_day = true;
        for (day_id, &count) in row.iter().enumerate() {
            if count == 0 {
                continue;
            }
            if !first_day {
                body.extend_from_slice(b",\n");
            }
            first_day = false;
            body.extend_from_slice(prefixes.get(day_id));
            push_u32(&mut body, count);
        }
        if first_day {
            // Paths with zero total visits are omitted entirely.
            continue;
        }

        if !first_path {
            out.write_all(b",")?;
        }
        first_path = false;

        header.clear();
        header.extend_from_slice(PATH_KEY_OPEN);
        push_escaped_slug(&mut header, registry.slug(path_id));
        header.extend_from_slice(PATH_KEY_CLOSE);
        out.write_all(&header)?;
        out.write_all(&body)?;
        out.write_all(PATH_OBJECT_CLOSE)?;
    }

    out.write_all(b"\n}")
}

/// Appends a slug with JSON string escaping. Besides the mandated `\/`,
/// the two bytes that would break the string literal are escaped; slugs
/// are otherwise opaque.
fn push_escaped_slug(buf: &mut Vec<u8>, slug: &[u8]) {
    for &byte in slug {
        match byte {
            b'/' => buf.extend_from_slice(b"\\/"),
            b'"' => buf.extend_from_slice(b"\\\""),
            b'\\' => buf.extend_from_slice(b"\\\\"),
            _ => buf.push(byte),
        }
    }
}

/// Appends the decimal rendering of `value`.
fn push_u32(buf: &mut Vec<u8>, mut value: u32) {
    let mut digits = [0u8; 10];
    let mut at = digits.len();
    loop {
        at -= 1;
        digits[at] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    buf.extend_from_slice(&digits[at..]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dates::DateIndex;
    use crate::registry::PathRegistry;

    fn setup(slugs: &[&str]) -> (PathRegistry, DateIndex) {
        let dates = DateIndex::build();
        let mut registry = PathRegistry::with_day_stride(dates.count());
        for slug in slugs {
            registry.insert(slug.as_bytes());
        }
        (registry, dates)
    }

    fn render(matrix: &[u32], registry: &PathRegistry, dates: &DateIndex) -> Vec<u8> {
        let mut out = Vec::new();
        write_report(&mut out, matrix, registry, dates).unwrap();
        out
    }

    #[test]
    fn all_zero_matrix_renders_empty_object() {
        let (registry, dates) = setup(&["a", "b"]);
        let matrix = vec![0u32; registry.cell_count()];
        assert_eq!(render(&matrix, &registry, &dates), b"{}\n");
    }

    #[test]
    fn single_entry_shape() {
        let (registry, dates) = setup(&["hello"]);
        let mut matrix = vec![0u32; registry.cell_count()];
        let day = dates.lookup(b"24-01-15").unwrap() as usize;
        matrix[day] = 1;
        assert_eq!(
            render(&matrix, &registry, &dates),
            b"{\n    \"\\/blog\\/hello\": {\n        \"2024-01-15\": 1\n    }\n}"
        );
    }

    #[test]
    fn paths_in_registry_order_days_chronological() {
        let (registry, dates) = setup(&["b-second", "a-first"]);
        let d = dates.count() as usize;
        let mut matrix = vec![0u32; registry.cell_count()];
        let jan15 = dates.lookup(b"24-01-15").unwrap() as usize;
        let jan16 = dates.lookup(b"24-01-16").unwrap() as usize;
        matrix[jan16] = 3; // b-second gets the later day first
        matrix[jan15] = 2;
        matrix[d + jan15] = 1; // a-first
        let expected = concat!(
            "{\n",
            "    \"\\/blog\\/b-second\": {\n",
            "        \"2024-01-15\": 2,\n",
            "        \"2024-01-16\": 3\n",
            "    },\n",
            "    \"\\/blog\\/a-first\": {\n",
            "        \"2024-01-15\": 1\n",
            "    }\n",
            "}"
        );
        assert_eq!(render(&matrix, &registry, &dates), expected.as_bytes());
    }

    #[test]
    fn zero_total_path_is_omitted() {
        let (registry, dates) = setup(&["quiet", "busy"]);
        let d = dates.count() as usize;
        let mut matrix = vec![0u32; registry.cell_count()];
        matrix[d + dates.lookup(b"25-06-01").unwrap() as usize] = 9;
        let rendered = render(&matrix, &registry, &dates);
        let text = std::str::from_utf8(&rendered).unwrap();
        assert!(!text.contains("quiet"));
        assert!(text.contains("busy"));
    }

    #[test]
    fn slashes_in_slugs_are_escaped() {
        let (registry, dates) = setup(&["sub/post"]);
        let mut matrix = vec![0u32; registry.cell_count()];
        matrix[dates.lookup(b"24-02-29").unwrap() as usize] = 1;
        let rendered = render(&matrix, &registry, &dates);
        let text = std::str::from_utf8(&rendered).unwrap();
        assert!(text.contains("\"\\/blog\\/sub\\/post\""));
    }

    #[test]
    fn decimal_rendering() {
        let mut buf = Vec::new();
        for (value, expected) in [
            (0u32, "0"),
            (7, "7"),
            (10, "10"),
            (305, "305"),
            (u32::MAX, "4294967295"),
        ] {
            buf.clear();
            push_u32(&mut buf, value);
            assert_eq!(buf, expected.as_bytes());
        }
    }
}
