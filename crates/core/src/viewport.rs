use crate::dialect::{normalize_page_size, PageQuery, SortDirection};
use crate::fetch::PageData;

/// Number of pages needed for `total_rows`; zero when `items_per_page <= 0`.
#[must_use]
pub fn total_pages(total_rows: u64, items_per_page: i64) -> u64 {
    let Ok(per_page) = u64::try_from(items_per_page) else {
        return 0;
    };
    if per_page == 0 {
        return 0;
    }
    total_rows.div_ceil(per_page)
}

/// Page index, ordering and filter of a viewport, without the loaded rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSettings {
    current_page: usize,
    sort_column: Option<String>,
    sort_direction: SortDirection,
    filter: Option<String>,
}

/// The currently materialized page of a result set plus its window settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewportState {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
    total_rows: u64,
    current_page: usize,
    items_per_page: usize,
    scroll_offset: usize,
    visible_column_count: usize,
    sort_column: Option<String>,
    sort_direction: SortDirection,
    filter: Option<String>,
}

impl ViewportState {
    #[must_use]
    pub fn new(items_per_page: i64) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            total_rows: 0,
            current_page: 0,
            items_per_page: normalize_page_size(items_per_page),
            scroll_offset: 0,
            visible_column_count: 0,
            sort_column: None,
            sort_direction: SortDirection::Off,
            filter: None,
        }
    }

    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn rows(&self) -> &[Vec<String>] {
        &self.rows
    }

    #[must_use]
    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    #[must_use]
    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn items_per_page(&self) -> usize {
        self.items_per_page
    }

    #[must_use]
    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    #[must_use]
    pub fn visible_column_count(&self) -> usize {
        self.visible_column_count
    }

    #[must_use]
    pub fn sort_column(&self) -> Option<&str> {
        self.sort_column.as_deref()
    }

    #[must_use]
    pub fn sort_direction(&self) -> SortDirection {
        self.sort_direction
    }

    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    #[must_use]
    pub fn total_pages(&self) -> u64 {
        total_pages(
            self.total_rows,
            i64::try_from(self.items_per_page).unwrap_or(i64::MAX),
        )
    }

    /// Row offset of the first row on the current page.
    #[must_use]
    pub fn page_offset(&self) -> usize {
        self.current_page.saturating_mul(self.items_per_page)
    }

    /// Index in the unpaged result set of the row at `cursor` on this page.
    #[must_use]
    pub fn absolute_row_index(&self, cursor: usize) -> usize {
        self.page_offset().saturating_add(cursor)
    }

    #[must_use]
    pub fn can_next_page(&self) -> bool {
        (self.current_page as u64).saturating_add(1) < self.total_pages()
    }

    #[must_use]
    pub fn can_previous_page(&self) -> bool {
        self.current_page > 0
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_next_page() {
            return false;
        }
        self.current_page += 1;
        true
    }

    pub fn previous_page(&mut self) -> bool {
        if !self.can_previous_page() {
            return false;
        }
        self.current_page -= 1;
        true
    }

    pub fn first_page(&mut self) -> bool {
        let moved = self.current_page != 0;
        self.current_page = 0;
        moved
    }

    pub fn last_page(&mut self) -> bool {
        let last = usize::try_from(self.total_pages().saturating_sub(1)).unwrap_or(usize::MAX);
        let moved = self.current_page != last;
        self.current_page = last;
        moved
    }

    /// Moves to the last reachable page when the current one fell off the end.
    pub fn clamp_page(&mut self) -> bool {
        let pages = self.total_pages();
        if pages == 0 || (self.current_page as u64) < pages {
            return false;
        }
        self.last_page()
    }

    pub fn set_filter(&mut self, filter: Option<String>) {
        self.filter = filter.filter(|text| !text.trim().is_empty());
        self.current_page = 0;
    }

    pub fn set_sort(&mut self, column: Option<String>, direction: SortDirection) {
        if direction == SortDirection::Off {
            self.sort_column = None;
            self.sort_direction = SortDirection::Off;
        } else {
            self.sort_column = column;
            self.sort_direction = if self.sort_column.is_some() {
                direction
            } else {
                SortDirection::Off
            };
        }
        self.current_page = 0;
    }

    /// Direction currently applied to `column`, `Off` for every other column.
    #[must_use]
    pub fn direction_for(&self, column: &str) -> SortDirection {
        match self.sort_column.as_deref() {
            Some(active) if active == column => self.sort_direction,
            _ => SortDirection::Off,
        }
    }

    /// Replaces the loaded page.
    ///
    /// Rows are padded or cut to the column count. A changed column set resets
    /// the horizontal window.
    pub fn apply_page(&mut self, page: PageData) {
        let PageData {
            columns,
            rows,
            total_rows,
        } = page;
        let width = columns.len();
        if columns != self.columns {
            self.scroll_offset = 0;
            self.visible_column_count = 0;
        }

        self.rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        self.columns = columns;
        self.total_rows = total_rows;
    }

    pub fn set_visible_column_count(&mut self, count: usize) {
        let remaining = self.columns.len().saturating_sub(self.scroll_offset);
        self.visible_column_count = count.min(remaining);
    }

    #[must_use]
    pub fn can_scroll_right(&self) -> bool {
        self.scroll_offset + self.visible_column_count.max(1) < self.columns.len()
    }

    pub fn scroll_right(&mut self) -> bool {
        if !self.can_scroll_right() {
            return false;
        }
        self.scroll_offset += 1;
        true
    }

    pub fn scroll_left(&mut self) -> bool {
        if self.scroll_offset == 0 {
            return false;
        }
        self.scroll_offset -= 1;
        true
    }

    /// Overwrites one loaded cell; out-of-range positions are ignored.
    pub fn patch_cell(&mut self, row: usize, column: usize, value: String) -> bool {
        match self.rows.get_mut(row).and_then(|cells| cells.get_mut(column)) {
            Some(cell) => {
                *cell = value;
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn window(&self) -> WindowSettings {
        WindowSettings {
            current_page: self.current_page,
            sort_column: self.sort_column.clone(),
            sort_direction: self.sort_direction,
            filter: self.filter.clone(),
        }
    }

    /// Puts back page, ordering and filter captured by [`Self::window`].
    pub fn restore_window(&mut self, window: WindowSettings) {
        self.current_page = window.current_page;
        self.sort_column = window.sort_column;
        self.sort_direction = window.sort_direction;
        self.filter = window.filter;
    }

    /// Parameters for fetching the current page.
    #[must_use]
    pub fn page_query(&self) -> PageQuery {
        PageQuery {
            columns: self.columns.clone(),
            page_size: i64::try_from(self.items_per_page).unwrap_or(i64::MAX),
            page_offset: i64::try_from(self.page_offset()).unwrap_or(i64::MAX),
            sort_column: self.sort_column.clone(),
            sort_direction: self.sort_direction,
            filter: self.filter.clone(),
        }
    }
}
