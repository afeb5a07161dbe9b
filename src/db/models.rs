//! Corpus and provenance entities.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Storage format for post timestamps; lexicographic order matches time order.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn format_date(date: &NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT).ok()
}

/// A content source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Public {
    pub id: String,
    pub domain: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Engagement {
    pub comments: Option<i64>,
    pub likes: Option<i64>,
    pub reposts: Option<i64>,
    pub views: Option<i64>,
}

/// Region of a picture in pixel coordinates, `x2`/`y2` exclusive.
///
/// Serialized as `{"x": [x1, x2], "y": [y1, y2]}` inside a picture's
/// position list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PositionJson", into = "PositionJson")]
pub struct BoundingBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
}

#[derive(Serialize, Deserialize)]
struct PositionJson {
    x: [u32; 2],
    y: [u32; 2],
}

impl From<PositionJson> for BoundingBox {
    fn from(p: PositionJson) -> Self {
        Self {
            x1: p.x[0],
            y1: p.y[0],
            x2: p.x[1],
            y2: p.y[1],
        }
    }
}

impl From<BoundingBox> for PositionJson {
    fn from(b: BoundingBox) -> Self {
        Self {
            x: [b.x1, b.x2],
            y: [b.y1, b.y2],
        }
    }
}

impl BoundingBox {
    pub fn new(x1: u32, y1: u32, x2: u32, y2: u32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn from_origin(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.x1 <= self.x2 && self.y1 <= self.y2 && self.x2 <= width && self.y2 <= height
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Post {
    pub id: i64,
    pub public_id: String,
    pub remote_id: String,
    pub date: NaiveDateTime,
    pub text: Option<String>,
    pub engagement: Engagement,
    /// Ordered by picture index.
    pub pictures: Vec<Picture>,
}

impl Post {
    pub fn picture_count(&self) -> usize {
        self.pictures.len()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub id: i64,
    pub post_id: i64,
    /// Set only when the post has more than one picture.
    pub index: Option<u32>,
    pub image: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub crop_positions: Vec<BoundingBox>,
    /// Ordered by crop index.
    pub crops: Vec<Crop>,
}

impl Picture {
    pub fn crop_count(&self) -> usize {
        self.crops.len()
    }

    /// Target region of slot `slot`: the crop's own geometry when recorded,
    /// otherwise the picture's position list.
    pub fn slot_box(&self, slot: usize) -> Option<BoundingBox> {
        self.crops
            .get(slot)
            .and_then(|c| c.bbox)
            .or_else(|| self.crop_positions.get(slot).copied())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crop {
    pub id: i64,
    pub picture_id: i64,
    pub index: u32,
    pub image: Vec<u8>,
    pub text: Option<String>,
    pub bbox: Option<BoundingBox>,
}

/// A post as delivered by the ingestion collaborator.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub public_id: String,
    pub remote_id: String,
    pub date: NaiveDateTime,
    pub text: Option<String>,
    pub engagement: Engagement,
    pub pictures: Vec<NewPicture>,
}

#[derive(Debug, Clone)]
pub struct NewPicture {
    pub image: Vec<u8>,
    /// Pre-computed crops; empty until the cropper has run.
    pub crops: Vec<NewCrop>,
}

#[derive(Debug, Clone)]
pub struct NewCrop {
    pub image: Vec<u8>,
    pub text: Option<String>,
    pub bbox: BoundingBox,
}

/// Picture awaiting region detection.
#[derive(Debug, Clone)]
pub struct UncroppedPicture {
    pub id: i64,
    pub post_id: i64,
    pub public_id: String,
    pub image: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPost {
    pub id: i64,
    pub base_post_id: i64,
    pub signature: String,
    pub strategy: String,
    pub posted: bool,
    pub created_at: String,
    pub pictures: Vec<GeneratedPicture>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedPicture {
    pub id: i64,
    pub generated_post_id: i64,
    pub base_picture_id: i64,
    pub index: Option<u32>,
    pub image: Vec<u8>,
    pub crops: Vec<GeneratedCrop>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratedCrop {
    pub id: i64,
    pub generated_picture_id: i64,
    pub crop_id: i64,
    pub index: u32,
}

/// Provenance of one composite, ready to be recorded.
#[derive(Debug, Clone)]
pub struct NewGeneratedPost {
    pub base_post_id: i64,
    pub signature: String,
    pub strategy: String,
    pub pictures: Vec<NewGeneratedPicture>,
}

#[derive(Debug, Clone)]
pub struct NewGeneratedPicture {
    pub base_picture_id: i64,
    pub index: Option<u32>,
    pub image: Vec<u8>,
    /// Crop ids in slot order.
    pub crop_ids: Vec<i64>,
}

/// One generated crop with its lineage, flattened for export.
#[derive(Debug, Clone, Serialize)]
pub struct LineageRow {
    pub generated_post_id: i64,
    pub base_post_id: i64,
    pub picture_index: Option<u32>,
    pub slot: u32,
    pub crop_id: i64,
    pub donor_post_id: i64,
    pub donor_public: String,
    pub crop_text: Option<String>,
    pub created_at: String,
    pub posted: bool,
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CorpusStats {
    pub publics: i64,
    pub posts: i64,
    pub pictures: i64,
    pub uncropped_pictures: i64,
    pub crops: i64,
    pub generated_posts: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_json_shape() {
        let b = BoundingBox::new(10, 20, 110, 60);
        let json = serde_json::to_string(&vec![b]).unwrap();
        assert_eq!(json, r#"[{"x":[10,110],"y":[20,60]}]"#);
        let back: Vec<BoundingBox> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vec![b]);
        assert_eq!(b.width(), 100);
        assert_eq!(b.height(), 40);
    }

    #[test]
    fn test_fits_within() {
        assert!(BoundingBox::new(0, 0, 100, 50).fits_within(100, 50));
        assert!(!BoundingBox::new(0, 0, 101, 50).fits_within(100, 50));
        assert!(!BoundingBox::new(30, 0, 20, 50).fits_within(100, 50));
    }

    #[test]
    fn test_date_format_orders_lexicographically() {
        let a = parse_date("2021-01-02 03:04:05").unwrap();
        let b = parse_date("2021-11-02 03:04:05").unwrap();
        assert!(format_date(&a) < format_date(&b));
        assert_eq!(format_date(&a), "2021-01-02 03:04:05");
    }
}
