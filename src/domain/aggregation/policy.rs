//! Aggregation policies: turn child status counts into one parent status

use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::domain::error::AggregationError;

/// Number of children currently reporting each status value
pub type StatusCounts<T> = BTreeMap<T, usize>;

/// Computes a parent status from its children's status counts.
///
/// Implemented for plain closures so callers can pass a function.
pub trait AggregationPolicy<T>: Send + Sync {
    fn aggregate(&self, counts: &StatusCounts<T>) -> Result<T, AggregationError>;
}

impl<T, F> AggregationPolicy<T> for F
where
    F: Fn(&StatusCounts<T>) -> Result<T, AggregationError> + Send + Sync,
{
    fn aggregate(&self, counts: &StatusCounts<T>) -> Result<T, AggregationError> {
        self(counts)
    }
}

/// How the majority policy picks among values with equal counts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TieBreak<T> {
    /// Smallest value in the type's own ordering wins
    Ordinal,
    /// First value in the list wins; unlisted values rank after listed
    /// ones, then by ordinal
    Precedence(Vec<T>),
}

impl<T> Default for TieBreak<T> {
    fn default() -> Self {
        Self::Ordinal
    }
}

impl<T: Ord> TieBreak<T> {
    fn rank(&self, value: &T) -> usize {
        match self {
            Self::Ordinal => 0,
            Self::Precedence(order) => order
                .iter()
                .position(|v| v == value)
                .unwrap_or(order.len()),
        }
    }

    fn pick<'a>(&self, candidates: impl Iterator<Item = &'a T>) -> Option<&'a T>
    where
        T: 'a,
    {
        candidates.min_by(|a, b| self.rank(a).cmp(&self.rank(b)).then_with(|| a.cmp(b)))
    }
}

/// Plurality vote over child statuses with a deterministic tie-break
#[derive(Debug, Clone, Default)]
pub struct MajorityPolicy<T> {
    tie_break: TieBreak<T>,
}

impl<T> MajorityPolicy<T> {
    pub fn new(tie_break: TieBreak<T>) -> Self {
        Self { tie_break }
    }

    pub fn tie_break(&self) -> &TieBreak<T> {
        &self.tie_break
    }
}

impl<T> AggregationPolicy<T> for MajorityPolicy<T>
where
    T: Ord + Clone + Debug + Send + Sync,
{
    fn aggregate(&self, counts: &StatusCounts<T>) -> Result<T, AggregationError> {
        let max = counts
            .values()
            .copied()
            .max()
            .filter(|max| *max > 0)
            .ok_or(AggregationError::NoChildren)?;

        let leaders = counts
            .iter()
            .filter(|(_, count)| **count == max)
            .map(|(value, _)| value);

        self.tie_break
            .pick(leaders)
            .cloned()
            .ok_or(AggregationError::NoChildren)
    }
}
