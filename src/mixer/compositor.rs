//! Pasting donor crops into the base pictures.
//!
//! A crop is resized towards its target box, but extreme distortions are
//! capped: a box much wider and flatter than the crop may only stretch it
//! to twice its width and squash it to half its height, and a crop is never
//! shrunk below half its native size. The capped result is pasted at the
//! box's top-left corner and may spill past the box; only the base image
//! bounds clip it.

use image::RgbImage;

use crate::db::{Crop, Post};
use crate::error::{MixError, MixResult};
use crate::imaging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeMode {
    Exact,
    StretchLimited,
    ShrinkLimited,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizePlan {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
}

/// Output size for a crop of native size `crop` targeting a box of size `target`.
pub fn plan_resize(crop: (u32, u32), target: (u32, u32)) -> ResizePlan {
    let (cw, ch) = crop;
    let (w, h) = target;
    if cw == 0 || ch == 0 {
        return ResizePlan {
            width: w,
            height: h,
            mode: ResizeMode::Exact,
        };
    }

    let w_ratio = f64::from(w) / f64::from(cw);
    let h_ratio = f64::from(h) / f64::from(ch);

    if w_ratio > 2.0 && h_ratio < 1.0 {
        ResizePlan {
            width: w.min(cw.saturating_mul(2)),
            height: h.max(ch / 2),
            mode: ResizeMode::StretchLimited,
        }
    } else if w_ratio < 0.5 || h_ratio < 0.5 {
        ResizePlan {
            width: w.max(cw / 2),
            height: h.max(ch / 2),
            mode: ResizeMode::ShrinkLimited,
        }
    } else {
        ResizePlan {
            width: w,
            height: h,
            mode: ResizeMode::Exact,
        }
    }
}

pub fn fit_crop(crop: &RgbImage, target: (u32, u32)) -> RgbImage {
    let plan = plan_resize(crop.dimensions(), target);
    imaging::resize(crop, plan.width, plan.height)
}

/// Compose one image per base picture. `crops[i][j]` fills slot `j` of base
/// picture `i`. The base images are decoded copies; stored bytes are untouched.
pub fn compose(base: &Post, crops: &[Vec<Crop>]) -> MixResult<Vec<RgbImage>> {
    if crops.len() != base.pictures.len() {
        return Err(MixError::invalid_argument(format!(
            "{} crop rows for {} base pictures",
            crops.len(),
            base.pictures.len()
        )));
    }

    let mut outputs = Vec::with_capacity(crops.len());
    for (picture, picture_crops) in base.pictures.iter().zip(crops) {
        let mut out = imaging::decode(&picture.image)?;
        for (slot, crop) in picture_crops.iter().enumerate() {
            let Some(bbox) = picture.slot_box(slot) else {
                tracing::warn!("Picture {} has no box for slot {}", picture.id, slot);
                continue;
            };
            if bbox.is_empty() {
                tracing::warn!("Skipping empty box {:?} on picture {}", bbox, picture.id);
                continue;
            }
            let overlay = imaging::decode(&crop.image)?;
            let fitted = fit_crop(&overlay, (bbox.width(), bbox.height()));
            imaging::paste(&mut out, &fitted, bbox.x1, bbox.y1);
        }
        outputs.push(out);
    }
    Ok(outputs)
}
