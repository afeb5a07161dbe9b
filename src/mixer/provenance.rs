//! Turning a finished composite into a recordable artifact.

use image::RgbImage;
use sha2::{Digest, Sha256};

use super::picking::PickStrategy;
use crate::db::{Crop, NewGeneratedPicture, NewGeneratedPost, Post};
use crate::error::{MixError, MixResult};
use crate::imaging;

/// Identity of a composite: its base post and the ordered crops pasted on it.
/// Two mixes with the same signature produce the same picture content.
pub fn signature(base: &Post, crops: &[Vec<Crop>]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(base.id.to_le_bytes());
    for (i, row) in crops.iter().enumerate() {
        hasher.update((i as u64).to_le_bytes());
        for crop in row {
            hasher.update(crop.id.to_le_bytes());
        }
        hasher.update(b";");
    }
    format!("{:x}", hasher.finalize())
}

pub fn build_artifact(
    base: &Post,
    crops: &[Vec<Crop>],
    images: &[RgbImage],
    strategy: PickStrategy,
    jpeg_quality: u8,
) -> MixResult<NewGeneratedPost> {
    if images.len() != base.pictures.len() || crops.len() != base.pictures.len() {
        return Err(MixError::invalid_argument(format!(
            "{} images and {} crop rows for {} base pictures",
            images.len(),
            crops.len(),
            base.pictures.len()
        )));
    }

    let numbered = base.pictures.len() > 1;
    let mut pictures = Vec::with_capacity(images.len());
    for (i, ((picture, row), image)) in base.pictures.iter().zip(crops).zip(images).enumerate() {
        pictures.push(NewGeneratedPicture {
            base_picture_id: picture.id,
            index: numbered.then_some(i as u32),
            image: imaging::encode_jpeg(image, jpeg_quality)?,
            crop_ids: row.iter().map(|c| c.id).collect(),
        });
    }

    Ok(NewGeneratedPost {
        base_post_id: base.id,
        signature: signature(base, crops),
        strategy: strategy.to_string(),
        pictures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Corpus;

    #[test]
    fn test_signature_depends_on_crop_order() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[2])).unwrap();
        let donor = corpus.db.get_post(corpus.post("dogs", &[2])).unwrap();
        let forward = vec![donor.pictures[0].crops.clone()];
        let mut reversed = forward.clone();
        reversed[0].reverse();

        assert_eq!(signature(&base, &forward), signature(&base, &forward));
        assert_ne!(signature(&base, &forward), signature(&base, &reversed));
        assert_eq!(signature(&base, &forward).len(), 64);
    }

    #[test]
    fn test_artifact_numbers_only_multi_picture_posts() {
        let corpus = Corpus::new();
        let single = corpus.db.get_post(corpus.post("cats", &[0])).unwrap();
        let double = corpus.db.get_post(corpus.post("cats", &[0, 0])).unwrap();
        let image = |post: &Post| imaging::decode(&post.pictures[0].image).unwrap();

        let artifact = build_artifact(
            &single,
            &[Vec::new()],
            &[image(&single)],
            PickStrategy::FirstOnly,
            80,
        )
        .unwrap();
        assert_eq!(artifact.pictures[0].index, None);
        assert_eq!(artifact.strategy, "firstonly");

        let artifact = build_artifact(
            &double,
            &[Vec::new(), Vec::new()],
            &[image(&double), image(&double)],
            PickStrategy::Aligned,
            80,
        )
        .unwrap();
        let indices: Vec<_> = artifact.pictures.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_artifact_rejects_missing_images() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[0])).unwrap();
        assert!(matches!(
            build_artifact(&base, &[Vec::new()], &[], PickStrategy::FirstOnly, 80),
            Err(MixError::InvalidArgument(_))
        ));
    }
}
