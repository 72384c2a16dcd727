//! Optimistic concurrency tokens for mutable rows.

/// Version a balance row must still be at for a write to apply.
///
/// Row versions start at 1 on insert and grow by one per committed mutation,
/// so version 0 means "the row must not exist yet".
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ExpectedVersion(u64);

impl ExpectedVersion {
    /// Expectation for a row that has not been persisted yet.
    pub const ABSENT: ExpectedVersion = ExpectedVersion(0);

    pub const fn exact(version: u64) -> Self {
        Self(version)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    pub fn is_absent(self) -> bool {
        self.0 == 0
    }

    pub fn matches(self, actual: u64) -> bool {
        self.0 == actual
    }
}

impl core::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "version {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_version_must_match() {
        assert!(ExpectedVersion::exact(3).matches(3));
        assert!(!ExpectedVersion::exact(3).matches(4));
        assert!(ExpectedVersion::ABSENT.matches(0));
        assert!(ExpectedVersion::ABSENT.is_absent());
        assert!(!ExpectedVersion::exact(1).is_absent());
    }
}
