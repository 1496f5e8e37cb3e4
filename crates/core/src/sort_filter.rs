use crate::viewport::ViewportState;

/// Overlay capturing navigation keys while a sort or filter is being chosen.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OverlayMode {
    #[default]
    Normal,
    Filtering {
        input: String,
    },
    Sorting {
        cursor: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayOutcome {
    /// The overlay consumed the input; nothing else changes.
    Unchanged,
    /// Returned to normal mode without touching the viewport.
    Closed,
    /// Returned to normal mode with new viewport settings; page 0 must be re-fetched.
    Refetch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortFilterController {
    mode: OverlayMode,
}

impl SortFilterController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn mode(&self) -> &OverlayMode {
        &self.mode
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        !matches!(self.mode, OverlayMode::Normal)
    }

    /// Opens the filter field pre-filled with the active filter.
    ///
    /// A filter needs the column list to build its predicate, so nothing opens
    /// before the first page has loaded.
    pub fn begin_filter(&mut self, viewport: &ViewportState) -> bool {
        if viewport.columns().is_empty() {
            return false;
        }
        self.mode = OverlayMode::Filtering {
            input: viewport.filter().unwrap_or_default().to_string(),
        };
        true
    }

    /// Opens the column menu with the cursor on the active sort column.
    pub fn begin_sort(&mut self, viewport: &ViewportState) -> bool {
        if viewport.columns().is_empty() {
            return false;
        }
        let cursor = viewport
            .sort_column()
            .and_then(|active| viewport.columns().iter().position(|c| c == active))
            .unwrap_or(0);
        self.mode = OverlayMode::Sorting { cursor };
        true
    }

    pub fn push_char(&mut self, ch: char) -> OverlayOutcome {
        if let OverlayMode::Filtering { input } = &mut self.mode {
            input.push(ch);
        }
        OverlayOutcome::Unchanged
    }

    pub fn pop_char(&mut self) -> OverlayOutcome {
        if let OverlayMode::Filtering { input } = &mut self.mode {
            input.pop();
        }
        OverlayOutcome::Unchanged
    }

    /// Moves the sort candidate cursor, clamped to `[0, column_count)`.
    pub fn move_cursor(&mut self, delta: isize, column_count: usize) -> OverlayOutcome {
        if let OverlayMode::Sorting { cursor } = &mut self.mode {
            let last = column_count.saturating_sub(1);
            *cursor = cursor.saturating_add_signed(delta).min(last);
        }
        OverlayOutcome::Unchanged
    }

    pub fn confirm(&mut self, viewport: &mut ViewportState) -> OverlayOutcome {
        match std::mem::take(&mut self.mode) {
            OverlayMode::Normal => OverlayOutcome::Unchanged,
            OverlayMode::Filtering { input } => {
                viewport.set_filter(Some(input));
                OverlayOutcome::Refetch
            }
            OverlayMode::Sorting { cursor } => {
                let Some(column) = viewport.columns().get(cursor).cloned() else {
                    return OverlayOutcome::Closed;
                };
                let direction = viewport.direction_for(&column).cycle();
                viewport.set_sort(Some(column), direction);
                OverlayOutcome::Refetch
            }
        }
    }

    pub fn cancel(&mut self) -> OverlayOutcome {
        if !self.is_active() {
            return OverlayOutcome::Unchanged;
        }
        self.mode = OverlayMode::Normal;
        OverlayOutcome::Closed
    }
}
