//! The slice of the storage layer the mixing engine depends on.

use crate::error::MixResult;
use crate::filter::{CountFilter, Predicate};

use super::{Database, NewGeneratedPost, Post};

/// Outcome of a single sampling call. `NotFound` is an expected answer, not
/// an error: the matching algorithm branches on it.
#[derive(Debug, Clone, PartialEq)]
pub enum Sampled<T> {
    Found(T),
    NotFound,
}

/// Storage collaborator consumed by the mixer.
pub trait CorpusBackend {
    /// Draw one post uniformly from those matching `predicate` and every
    /// count filter.
    fn sample_post(
        &self,
        predicate: Option<&Predicate>,
        counts: &[CountFilter],
    ) -> MixResult<Sampled<Post>>;

    /// Persist a composite's provenance atomically; returns its id.
    fn record_generated(&self, artifact: &NewGeneratedPost) -> MixResult<i64>;

    fn find_generated_by_signature(&self, signature: &str) -> MixResult<Option<i64>>;
}

impl CorpusBackend for Database {
    fn sample_post(
        &self,
        predicate: Option<&Predicate>,
        counts: &[CountFilter],
    ) -> MixResult<Sampled<Post>> {
        Database::sample_post(self, predicate, counts)
    }

    fn record_generated(&self, artifact: &NewGeneratedPost) -> MixResult<i64> {
        Database::record_generated(self, artifact)
    }

    fn find_generated_by_signature(&self, signature: &str) -> MixResult<Option<i64>> {
        Database::find_generated_by_signature(self, signature)
    }
}
