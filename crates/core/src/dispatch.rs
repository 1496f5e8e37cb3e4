/// How results for superseded fetches are treated on arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StalePolicy {
    /// Only the result of the most recently issued fetch is applied.
    #[default]
    DropStale,
    /// Every result is applied in arrival order; the last to arrive wins.
    ApplyAll,
}

/// Issues fetch generations and decides which arriving results to keep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GenerationGuard {
    latest: u64,
    policy: StalePolicy,
}

impl GenerationGuard {
    #[must_use]
    pub fn new(policy: StalePolicy) -> Self {
        Self { latest: 0, policy }
    }

    #[must_use]
    pub fn policy(&self) -> StalePolicy {
        self.policy
    }

    #[must_use]
    pub fn latest(&self) -> u64 {
        self.latest
    }

    /// Reserves the generation for a new fetch.
    pub fn issue(&mut self) -> u64 {
        self.latest = self.latest.saturating_add(1);
        self.latest
    }

    #[must_use]
    pub fn accepts(&self, generation: u64) -> bool {
        match self.policy {
            StalePolicy::DropStale => generation == self.latest,
            StalePolicy::ApplyAll => true,
        }
    }
}
