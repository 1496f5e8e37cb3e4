//! Column widths and horizontal packing for the visible slice of a page.
//!
//! Everything here is derived from a [`ViewportState`] snapshot and never
//! writes back to it.

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::backend::NULL_MARKER;
use crate::viewport::ViewportState;

pub const MIN_COLUMN_WIDTH: usize = 6;
pub const MAX_COLUMN_WIDTH: usize = 60;
/// Space reserved between two packed columns.
pub const COLUMN_SEPARATOR_WIDTH: usize = 3;
pub const ELLIPSIS: char = '…';

const WIDTH_SAMPLE_ROWS: usize = 100;
const LONG_TEXT_THRESHOLD: usize = 50;
const WORD_BREAK_MIN_WIDTH: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnClass {
    Empty,
    Boolean,
    Numeric,
    DateLike,
    ShortString,
    LongText,
}

impl ColumnClass {
    #[must_use]
    pub fn width_cap(self) -> usize {
        match self {
            Self::Empty => MIN_COLUMN_WIDTH,
            Self::Boolean => 10,
            Self::Numeric => 15,
            Self::DateLike => 20,
            Self::ShortString => 35,
            Self::LongText => 45,
        }
    }
}

/// Classifies column `index` from a sample of `rows`.
///
/// Returns the class and the widest sampled cell.
#[must_use]
pub fn classify_column(rows: &[Vec<String>], index: usize) -> (ColumnClass, usize) {
    let mut widest = 0;
    let mut all_boolean = true;
    let mut all_numeric = true;
    let mut all_dates = true;
    let mut seen_value = false;

    let samples = rows
        .iter()
        .take(WIDTH_SAMPLE_ROWS)
        .filter_map(|row| row.get(index))
        .map(|cell| cell.trim())
        .filter(|cell| !cell.is_empty() && *cell != NULL_MARKER);

    for cell in samples {
        seen_value = true;
        widest = widest.max(display_width(cell));
        all_boolean &= is_boolean(cell);
        all_numeric &= cell.parse::<f64>().is_ok();
        all_dates &= looks_like_date(cell);
    }

    let class = if !seen_value {
        ColumnClass::Empty
    } else if all_boolean {
        ColumnClass::Boolean
    } else if all_numeric {
        ColumnClass::Numeric
    } else if all_dates {
        ColumnClass::DateLike
    } else if widest > LONG_TEXT_THRESHOLD {
        ColumnClass::LongText
    } else {
        ColumnClass::ShortString
    };
    (class, widest)
}

/// Target display width for every column, titles included.
#[must_use]
pub fn column_widths(titles: &[String], rows: &[Vec<String>]) -> Vec<usize> {
    titles
        .iter()
        .enumerate()
        .map(|(index, title)| {
            let (class, widest) = classify_column(rows, index);
            let content = widest.min(class.width_cap());
            content
                .max(display_width(title))
                .clamp(MIN_COLUMN_WIDTH, MAX_COLUMN_WIDTH)
        })
        .collect()
}

/// How many consecutive columns starting at `offset` fit in `available`.
///
/// At least one column is packed while `offset` is in range, even if it alone
/// overflows.
#[must_use]
pub fn pack_columns(widths: &[usize], offset: usize, available: usize) -> usize {
    let Some(candidates) = widths.get(offset..) else {
        return 0;
    };

    let mut used = 0;
    let mut count = 0;
    for width in candidates {
        let needed = width + COLUMN_SEPARATOR_WIDTH;
        if count > 0 && used + needed > available {
            break;
        }
        used += needed;
        count += 1;
    }
    count
}

/// Fits `text` into `width` display cells, marking cuts with an ellipsis.
#[must_use]
pub fn truncate_cell(text: &str, width: usize) -> String {
    if display_width(text) <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let budget = width - 1;
    let mut kept = String::new();
    let mut used = 0;
    let mut ends_on_word_boundary = false;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > budget {
            ends_on_word_boundary = ch.is_whitespace();
            break;
        }
        kept.push(ch);
        used += ch_width;
    }

    if width > WORD_BREAK_MIN_WIDTH && !ends_on_word_boundary {
        if let Some(cut) = kept.rfind(char::is_whitespace) {
            if display_width(&kept[..cut]) > width / 2 {
                kept.truncate(cut);
                kept.truncate(kept.trim_end().len());
            }
        }
    }

    kept.push(ELLIPSIS);
    kept
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnHeader {
    pub title: String,
    pub width: usize,
}

/// Render-ready slice of the viewport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ViewportLayout {
    pub first_column: usize,
    pub headers: Vec<ColumnHeader>,
    pub cells: Vec<Vec<String>>,
}

impl ViewportLayout {
    #[must_use]
    pub fn last_column(&self) -> usize {
        self.first_column + self.headers.len()
    }
}

/// Column titles with the sort glyph attached to the active sort column.
#[must_use]
pub fn column_titles(viewport: &ViewportState) -> Vec<String> {
    viewport
        .columns()
        .iter()
        .map(|column| match viewport.direction_for(column).glyph() {
            Some(glyph) => format!("{column} {glyph}"),
            None => column.clone(),
        })
        .collect()
}

/// Visible column count for `viewport` at its current scroll offset.
#[must_use]
pub fn visible_column_count(viewport: &ViewportState, available_width: usize) -> usize {
    let widths = column_widths(&column_titles(viewport), viewport.rows());
    pack_columns(&widths, viewport.scroll_offset(), available_width)
}

#[must_use]
pub fn layout_viewport(viewport: &ViewportState, available_width: usize) -> ViewportLayout {
    let titles = column_titles(viewport);
    let widths = column_widths(&titles, viewport.rows());
    let first_column = viewport.scroll_offset();
    let count = pack_columns(&widths, first_column, available_width);
    let visible = first_column..first_column + count;

    let headers = titles[visible.clone()]
        .iter()
        .zip(&widths[visible.clone()])
        .map(|(title, width)| ColumnHeader {
            title: truncate_cell(title, *width),
            width: *width,
        })
        .collect::<Vec<_>>();

    let cells = viewport
        .rows()
        .iter()
        .map(|row| {
            row[visible.clone()]
                .iter()
                .zip(&widths[visible.clone()])
                .map(|(cell, width)| truncate_cell(&flatten_whitespace(cell), *width))
                .collect()
        })
        .collect();

    ViewportLayout {
        first_column,
        headers,
        cells,
    }
}

fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

fn flatten_whitespace(cell: &str) -> String {
    cell.chars()
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect()
}

fn is_boolean(cell: &str) -> bool {
    matches!(
        cell.to_ascii_lowercase().as_str(),
        "true" | "false" | "t" | "f" | "yes" | "no"
    )
}

fn looks_like_date(cell: &str) -> bool {
    let bytes = cell.as_bytes();
    let digits = |range: std::ops::Range<usize>| {
        bytes
            .get(range)
            .is_some_and(|part| part.iter().all(u8::is_ascii_digit))
    };

    let is_date = digits(0..4)
        && bytes.get(4) == Some(&b'-')
        && digits(5..7)
        && bytes.get(7) == Some(&b'-')
        && digits(8..10);
    let is_time = digits(0..2)
        && bytes.get(2) == Some(&b':')
        && digits(3..5)
        && bytes.get(5) == Some(&b':');
    is_date || is_time
}

#[cfg(test)]
mod tests {
    use super::{
        classify_column, column_widths, layout_viewport, pack_columns, truncate_cell,
        ColumnClass, COLUMN_SEPARATOR_WIDTH, ELLIPSIS, MAX_COLUMN_WIDTH, MIN_COLUMN_WIDTH,
    };
    use crate::dialect::SortDirection;
    use crate::fetch::PageData;
    use crate::viewport::ViewportState;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_string()).collect()
    }

    fn single_column(values: &[&str]) -> Vec<Vec<String>> {
        values.iter().map(|value| vec![(*value).to_string()]).collect()
    }

    #[test]
    fn classifies_columns_by_sampled_content() {
        let cases = [
            (vec!["NULL", ""], ColumnClass::Empty),
            (vec!["true", "f", "NULL"], ColumnClass::Boolean),
            (vec!["1", "-2.5", "1e3"], ColumnClass::Numeric),
            (vec!["2024-01-05", "2024-02-01 10:00:00"], ColumnClass::DateLike),
            (vec!["12:30:00"], ColumnClass::DateLike),
            (vec!["alice", "bob"], ColumnClass::ShortString),
        ];
        for (values, expected) in cases {
            let (class, _) = classify_column(&single_column(&values), 0);
            assert_eq!(class, expected, "values: {values:?}");
        }

        let long = "word ".repeat(20);
        let (class, widest) = classify_column(&single_column(&[long.as_str()]), 0);
        assert_eq!(class, ColumnClass::LongText);
        assert_eq!(widest, long.trim().len());
    }

    #[test]
    fn widths_respect_class_caps_and_global_bounds() {
        let titles = strings(&["flag", "amount", "note", "body", "x"]);
        let rows = vec![strings(&[
            "true",
            "123456789012345678901",
            &"n".repeat(40),
            &"long text ".repeat(10),
            "",
        ])];

        let widths = column_widths(&titles, &rows);
        assert_eq!(widths, vec![MIN_COLUMN_WIDTH, 15, 35, 45, MIN_COLUMN_WIDTH]);
    }

    #[test]
    fn header_length_is_always_reserved() {
        let titles = vec!["is_active_subscription".to_string(), "h".repeat(80)];
        let rows = vec![strings(&["true", "x"])];

        let widths = column_widths(&titles, &rows);
        assert_eq!(widths[0], "is_active_subscription".len());
        assert_eq!(widths[1], MAX_COLUMN_WIDTH);
    }

    #[test]
    fn widths_are_stable_for_unchanged_rows() {
        let titles = strings(&["id", "name", "created"]);
        let rows = vec![
            strings(&["1", "Ann", "2024-01-01"]),
            strings(&["2", "Bob", "2024-01-02"]),
        ];
        assert_eq!(column_widths(&titles, &rows), column_widths(&titles, &rows));
    }

    #[test]
    fn packs_at_least_one_column_while_offset_is_in_range() {
        let widths = vec![10, 20, 30];
        for available in [0, 5, 12, 200] {
            for offset in 0..widths.len() {
                assert!(pack_columns(&widths, offset, available) >= 1);
            }
            assert_eq!(pack_columns(&widths, widths.len(), available), 0);
        }
    }

    #[test]
    fn packing_stops_before_budget_overflows() {
        let widths = vec![10, 10, 10];
        let per_column = 10 + COLUMN_SEPARATOR_WIDTH;
        assert_eq!(pack_columns(&widths, 0, per_column * 2), 2);
        assert_eq!(pack_columns(&widths, 0, per_column * 2 - 1), 1);
        assert_eq!(pack_columns(&widths, 1, per_column * 3), 2);
    }

    #[test]
    fn short_strings_are_untouched_and_long_ones_fit_budget() {
        assert_eq!(truncate_cell("hello", 5), "hello");
        assert_eq!(truncate_cell("", 0), "");

        for width in 0..30 {
            let out = truncate_cell("the quick brown fox jumps over the lazy dog", width);
            assert!(out.chars().count() <= width, "width {width}: {out}");
        }
        assert_eq!(truncate_cell("abcdefgh", 5), format!("abcd{ELLIPSIS}"));
    }

    #[test]
    fn wide_cells_break_at_whitespace_past_midpoint() {
        let out = truncate_cell("the quick brown fox jumps over", 20);
        assert_eq!(out, format!("the quick brown fox{ELLIPSIS}"));

        let out = truncate_cell("abcdefghijklmnopqrstuvwxyz", 20);
        assert_eq!(out, format!("abcdefghijklmnopqrs{ELLIPSIS}"));

        let out = truncate_cell("ab cdefghijklmnopqrstuvwxyz", 20);
        assert_eq!(out, format!("ab cdefghijklmnopqr{ELLIPSIS}"));
    }

    #[test]
    fn layout_marks_sorted_column_and_slices_from_scroll_offset() {
        let mut viewport = ViewportState::new(10);
        viewport.apply_page(PageData {
            columns: strings(&["id", "name", "email"]),
            rows: vec![strings(&["1", "Ann", "ann@example.com"])],
            total_rows: 1,
        });
        viewport.set_sort(Some("name".to_string()), SortDirection::Descending);

        let layout = layout_viewport(&viewport, 200);
        let titles = layout
            .headers
            .iter()
            .map(|header| header.title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["id", "name ▼", "email"]);
        assert_eq!(layout.cells[0][2], "ann@example.com");

        viewport.set_visible_column_count(1);
        viewport.scroll_right();
        let layout = layout_viewport(&viewport, 10);
        assert_eq!(layout.first_column, 1);
        assert_eq!(layout.headers.len(), 1);
        assert_eq!(layout.cells[0], vec!["Ann".to_string()]);
    }

    #[test]
    fn layout_flattens_control_characters() {
        let mut viewport = ViewportState::new(10);
        viewport.apply_page(PageData {
            columns: strings(&["note"]),
            rows: vec![strings(&["line one\nline two"])],
            total_rows: 1,
        });

        let layout = layout_viewport(&viewport, 80);
        assert_eq!(layout.cells[0][0], "line one line two");
    }
}
