pub mod collection;
pub mod database;
pub mod enzyme;
pub mod hit;
pub mod ion_series;
pub mod mass;
pub mod modification;
pub mod peptide;
pub mod psm;
pub mod retention;
pub mod scoring;
pub mod spectrum;

use psm::ScoreType;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("score `{0}` has not been computed")]
    ScoreNotComputed(ScoreType),
    #[error("rank for `{0}` has not been computed")]
    RankNotComputed(ScoreType),
    #[error("collection is not sorted by `{requested}`")]
    NotSorted { requested: ScoreType },
    #[error("invalid range [{start}, {end}) for {len} elements")]
    InvalidRange {
        start: usize,
        end: usize,
        len: usize,
    },
    #[error("capacity of {capacity} exceeded")]
    CapacityExceeded { capacity: usize },
    #[error("expected {expected} values, found {found}")]
    LengthMismatch { expected: usize, found: usize },
    #[error("expected {expected} decoy collections, found {found}")]
    DecoyCountMismatch { expected: usize, found: usize },
    #[error("at least one decoy collection is required")]
    MissingDecoys,
    #[error("decoy q-values are not defined for `{0}`")]
    UnsupportedScore(ScoreType),
    #[error("invalid peptide sequence: {0}")]
    InvalidSequence(String),
}
