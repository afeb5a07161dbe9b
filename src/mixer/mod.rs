//! Base/donor matching and the end-to-end mixing pipeline.
//!
//! A mix starts from one base post sampled under the full filter set. Every
//! crop slot of the base then gets its own donor post: any other post that
//! matches the caller's predicate and owns a picture with exactly as many
//! crops as the base picture being filled. Donors are sampled with the
//! caller's count filters first; if none qualifies the picture-count filters
//! are dropped and the draw is repeated once.

pub mod compositor;
pub mod picking;
pub mod provenance;

use tracing::{debug, info, warn};

use crate::db::{CorpusBackend, Post, Sampled};
use crate::error::{MixError, MixResult};
use crate::filter::{
    compile, stack, CompareOp, CompiledFilter, CountFilter, Field, FilterOptions, Predicate, Value,
};
use crate::imaging;

pub use picking::PickStrategy;

/// A base post with one donor per crop slot: `donors[i][j]` fills crop `j`
/// of base picture `i`.
#[derive(Debug, Clone)]
pub struct Mix {
    pub base: Post,
    pub donors: Vec<Vec<Post>>,
}

impl Mix {
    pub fn slot_count(&self) -> usize {
        self.donors.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub jpeg_quality: u8,
    /// Do not record a composite whose signature is already stored.
    pub skip_duplicates: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            jpeg_quality: imaging::DEFAULT_JPEG_QUALITY,
            skip_duplicates: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recorded {
    New(i64),
    /// An identical composite was recorded earlier under this id.
    Duplicate(i64),
}

impl Recorded {
    pub fn id(&self) -> i64 {
        match self {
            Recorded::New(id) | Recorded::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MixOutcome {
    pub base_post_id: i64,
    pub donor_post_ids: Vec<Vec<i64>>,
    pub crop_ids: Vec<Vec<i64>>,
    /// JPEG bytes, one per base picture.
    pub images: Vec<Vec<u8>>,
    pub recorded: Recorded,
}

pub struct Mixer<'a, B: CorpusBackend + ?Sized> {
    backend: &'a B,
}

impl<'a, B: CorpusBackend + ?Sized> Mixer<'a, B> {
    pub fn new(backend: &'a B) -> Self {
        Self { backend }
    }

    pub fn get_random_mix(&self, options: &FilterOptions) -> MixResult<Mix> {
        let compiled = compile(options)?;
        self.mix_with(&compiled)
    }

    pub fn mix_with(&self, compiled: &CompiledFilter) -> MixResult<Mix> {
        // A base needs at least one cropped picture to have anything to fill.
        let mut counts = compiled.all_counts();
        counts.push(CountFilter::crops(CompareOp::Ge, 1));
        let base = match self.backend.sample_post(compiled.predicate.as_ref(), &counts)? {
            Sampled::Found(post) => post,
            Sampled::NotFound => {
                return Err(MixError::no_eligible("no post matches the filters"));
            }
        };
        debug!("Base post {} with {} pictures", base.id, base.picture_count());

        let mut donors = Vec::with_capacity(base.pictures.len());
        for picture in &base.pictures {
            let crop_count = picture.crop_count();
            let mut row = Vec::with_capacity(crop_count);
            for _ in 0..crop_count {
                row.push(self.sample_donor(compiled, base.id, crop_count)?);
            }
            donors.push(row);
        }

        Ok(Mix { base, donors })
    }

    fn sample_donor(
        &self,
        compiled: &CompiledFilter,
        base_id: i64,
        crop_count: usize,
    ) -> MixResult<Post> {
        let predicate = stack(
            compiled.predicate.clone(),
            Predicate::compare(Field::PostId, CompareOp::Ne, Value::Int(base_id)),
        );
        let same_shape = CountFilter::crops(CompareOp::Eq, crop_count as u32);

        let mut strict = compiled.all_counts();
        strict.push(same_shape);
        if let Sampled::Found(post) = self.backend.sample_post(predicate.as_ref(), &strict)? {
            return Ok(post);
        }

        let mut relaxed = compiled.crop_counts.clone();
        relaxed.push(same_shape);
        warn!(
            "No donor for base post {} under the full filters, retrying with crop counts only",
            base_id
        );
        match self.backend.sample_post(predicate.as_ref(), &relaxed)? {
            Sampled::Found(post) => Ok(post),
            Sampled::NotFound => Err(MixError::no_eligible(format!(
                "no donor with {crop_count} crops for base post {base_id}"
            ))),
        }
    }

    /// Compile, match, pick, compose and record one composite.
    pub fn run(
        &self,
        options: &FilterOptions,
        how: PickStrategy,
        settings: &RunSettings,
    ) -> MixResult<MixOutcome> {
        let mix = self.get_random_mix(options)?;
        let crops = picking::pick_crops(&mix, how)?;
        let images = compositor::compose(&mix.base, &crops)?;
        let artifact =
            provenance::build_artifact(&mix.base, &crops, &images, how, settings.jpeg_quality)?;

        let existing = if settings.skip_duplicates {
            self.backend.find_generated_by_signature(&artifact.signature)?
        } else {
            None
        };
        let recorded = match existing {
            Some(id) => {
                info!("Mix of post {} duplicates generated post {}", mix.base.id, id);
                Recorded::Duplicate(id)
            }
            None => {
                let id = self.backend.record_generated(&artifact)?;
                info!(
                    "Mixed post {} with {} crops into generated post {} ({})",
                    mix.base.id,
                    mix.slot_count(),
                    id,
                    how
                );
                Recorded::New(id)
            }
        };

        Ok(MixOutcome {
            base_post_id: mix.base.id,
            donor_post_ids: mix
                .donors
                .iter()
                .map(|row| row.iter().map(|p| p.id).collect())
                .collect(),
            crop_ids: crops
                .iter()
                .map(|row| row.iter().map(|c| c.id).collect())
                .collect(),
            images: artifact.pictures.into_iter().map(|p| p.image).collect(),
            recorded,
        })
    }
}
