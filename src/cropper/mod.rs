//! Turning uncropped pictures into crops.
//!
//! Text recognition itself sits behind [`RegionDetector`]; this module
//! decides which detected regions become crops and which posts are not worth
//! keeping at all. A post is deleted when its picture cannot be read, when
//! the detector fails on it, or when no usable text region survives the
//! filters.

use anyhow::{Context, Result};
use image::DynamicImage;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::CropperConfig;
use crate::db::{BoundingBox, Database, NewCrop, UncroppedPicture};
use crate::imaging;

/// A detected block of text, in picture pixel coordinates. Detectors may
/// report boxes that reach outside the picture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRegion {
    pub left: i64,
    pub top: i64,
    pub right: i64,
    pub bottom: i64,
    pub text: String,
}

pub trait RegionDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictureOutcome {
    Cropped(usize),
    /// The picture's post was removed from the corpus.
    Deleted,
}

#[derive(Debug, Clone, Default)]
pub struct CropReport {
    pub pictures: usize,
    pub cropped: usize,
    pub crops: usize,
    pub deleted_posts: Vec<i64>,
}

pub struct Cropper<'a, D: RegionDetector + ?Sized> {
    db: &'a Database,
    detector: &'a D,
    config: CropperConfig,
}

impl<'a, D: RegionDetector + ?Sized> Cropper<'a, D> {
    pub fn new(db: &'a Database, detector: &'a D, config: CropperConfig) -> Self {
        Self {
            db,
            detector,
            config,
        }
    }

    /// Crop every picture that has no crops yet.
    pub fn crop_all(&self) -> Result<CropReport> {
        let pictures = self.db.uncropped_pictures()?;
        let total = pictures.len();
        let mut report = CropReport::default();
        let mut deleted = HashSet::new();

        for (i, picture) in pictures.iter().enumerate() {
            if deleted.contains(&picture.post_id) {
                continue;
            }
            debug!(
                "[{}/{}] public {}, post {}",
                i + 1,
                total,
                picture.public_id,
                picture.post_id
            );
            report.pictures += 1;
            match self.crop_picture(picture)? {
                PictureOutcome::Cropped(n) => {
                    report.cropped += 1;
                    report.crops += n;
                }
                PictureOutcome::Deleted => {
                    deleted.insert(picture.post_id);
                    report.deleted_posts.push(picture.post_id);
                }
            }
        }

        info!(
            "Cropped {} of {} pictures into {} crops, deleted {} posts",
            report.cropped,
            report.pictures,
            report.crops,
            report.deleted_posts.len()
        );
        Ok(report)
    }

    pub fn crop_picture(&self, picture: &UncroppedPicture) -> Result<PictureOutcome> {
        let image = match image::load_from_memory(&picture.image) {
            Ok(image) => image,
            Err(e) => return self.drop_post(picture, &format!("undecodable picture: {e}")),
        };
        let regions = match self.detector.detect(&image) {
            Ok(regions) => regions,
            Err(e) => return self.drop_post(picture, &format!("detection failed: {e:#}")),
        };

        let regions = filter_regions(regions, &self.config);
        if regions.is_empty() || regions.len() > self.config.max_regions {
            return self.drop_post(picture, &format!("{} text regions", regions.len()));
        }

        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut crops = Vec::with_capacity(regions.len());
        for region in &regions {
            let bbox = clamp_region(region, width, height);
            let cut = imaging::cut(&rgb, bbox.x1, bbox.y1, bbox.x2, bbox.y2);
            if !size_ok(cut.dimensions(), (width, height), &self.config) {
                continue;
            }
            crops.push(NewCrop {
                image: imaging::encode_jpeg(&cut, imaging::DEFAULT_JPEG_QUALITY)?,
                text: Some(region.text.clone()),
                bbox,
            });
        }
        if crops.is_empty() {
            return self.drop_post(picture, "no crop of usable size");
        }

        self.db
            .attach_crops(picture.id, &crops)
            .with_context(|| format!("Failed to store crops of picture {}", picture.id))?;
        Ok(PictureOutcome::Cropped(crops.len()))
    }

    fn drop_post(&self, picture: &UncroppedPicture, reason: &str) -> Result<PictureOutcome> {
        warn!("Deleting post {}: {}", picture.post_id, reason);
        self.db
            .delete_post(picture.post_id)
            .with_context(|| format!("Failed to delete post {}", picture.post_id))?;
        Ok(PictureOutcome::Deleted)
    }
}

/// Drop watermarks and stray characters.
pub fn filter_regions(regions: Vec<TextRegion>, config: &CropperConfig) -> Vec<TextRegion> {
    regions
        .into_iter()
        .filter(|r| !config.banned_fragments.iter().any(|f| r.text.contains(f.as_str())))
        .filter(|r| r.text.chars().count() >= config.min_text_len)
        .filter(|r| r.text != "@")
        .collect()
}

pub fn clamp_region(region: &TextRegion, width: u32, height: u32) -> BoundingBox {
    let clamp = |v: i64, max: u32| v.clamp(0, i64::from(max)) as u32;
    let (x1, x2) = (clamp(region.left, width), clamp(region.right, width));
    let (y1, y2) = (clamp(region.top, height), clamp(region.bottom, height));
    BoundingBox::new(x1.min(x2), y1.min(y2), x1.max(x2), y1.max(y2))
}

fn size_ok(crop: (u32, u32), picture: (u32, u32), config: &CropperConfig) -> bool {
    let area = f64::from(crop.0) * f64::from(crop.1);
    let picture_area = f64::from(picture.0) * f64::from(picture.1);
    if picture_area == 0.0 {
        return false;
    }
    let ratio = area / picture_area;
    ratio >= config.min_relative_area
        && ratio <= config.max_relative_area
        && crop.0 >= config.min_side
        && crop.1 >= config.min_side
}
