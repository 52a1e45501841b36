//! Option types that replace boolean flag parameters in the Rust API.

/// What happens to the matched source triples once their split values are written.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum SourceTriples {
    /// Leave the original multi-valued literals in place.
    #[default]
    Keep,
    /// Delete the original literals after every split triple has been written.
    Delete,
}

impl SourceTriples {
    pub fn is_delete(self) -> bool {
        matches!(self, SourceTriples::Delete)
    }
}

impl From<bool> for SourceTriples {
    fn from(value: bool) -> Self {
        if value {
            SourceTriples::Delete
        } else {
            SourceTriples::Keep
        }
    }
}

impl From<SourceTriples> for bool {
    fn from(value: SourceTriples) -> Self {
        value.is_delete()
    }
}

/// Whether writes reach the store or are only reported.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub enum WriteMode {
    #[default]
    Commit,
    DryRun,
}

impl WriteMode {
    pub fn is_dry_run(self) -> bool {
        matches!(self, WriteMode::DryRun)
    }
}

impl From<bool> for WriteMode {
    fn from(dry_run: bool) -> Self {
        if dry_run {
            WriteMode::DryRun
        } else {
            WriteMode::Commit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bool_conversions() {
        assert_eq!(SourceTriples::from(true), SourceTriples::Delete);
        assert!(!bool::from(SourceTriples::default()));
        assert!(WriteMode::from(true).is_dry_run());
        assert_eq!(WriteMode::default(), WriteMode::Commit);
    }
}
