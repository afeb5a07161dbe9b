//! Fixtures shared by the unit tests.

use chrono::NaiveDateTime;
use std::cell::Cell;
use image::{Rgb, RgbImage};

use crate::db::{BoundingBox, Database, Engagement, NewCrop, NewPicture, NewPost};
use crate::imaging::{encode_jpeg, DEFAULT_JPEG_QUALITY};

pub const PICTURE_SIZE: u32 = 200;

pub fn jpeg(width: u32, height: u32, color: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, Rgb(color));
    encode_jpeg(&image, DEFAULT_JPEG_QUALITY).unwrap()
}

/// Box of crop `j` on a fixture picture: 80x20, stacked vertically.
pub fn slot_box(j: usize) -> BoundingBox {
    let y = 10 + 30 * j as u32;
    BoundingBox::new(10, y, 90, y + 20)
}

/// In-memory corpus seeded with the publics `cats`, `dogs` and `birds`
/// (ids `id-<domain>`).
pub struct Corpus {
    pub db: Database,
    next_remote: Cell<u32>,
}

impl Corpus {
    pub fn new() -> Self {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        for domain in ["cats", "dogs", "birds"] {
            db.add_public(&format!("id-{domain}"), domain).unwrap();
        }
        Self {
            db,
            next_remote: Cell::new(0),
        }
    }

    /// A post whose pictures carry `layout[i]` crops each.
    pub fn new_post(&self, public_id: &str, layout: &[usize]) -> NewPost {
        let remote = self.next_remote.get();
        self.next_remote.set(remote + 1);
        NewPost {
            public_id: public_id.to_string(),
            remote_id: format!("r{remote}"),
            date: NaiveDateTime::parse_from_str("2021-01-01 12:00:00", "%Y-%m-%d %H:%M:%S")
                .unwrap(),
            text: None,
            engagement: Engagement::default(),
            pictures: layout
                .iter()
                .enumerate()
                .map(|(i, &crops)| NewPicture {
                    image: jpeg(PICTURE_SIZE, PICTURE_SIZE, [20 * i as u8, 0, 0]),
                    crops: (0..crops)
                        .map(|j| NewCrop {
                            image: jpeg(80, 20, [255, 255, 255]),
                            text: Some(format!("crop {i}/{j}")),
                            bbox: slot_box(j),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn post(&self, domain: &str, layout: &[usize]) -> i64 {
        let post = self.new_post(&format!("id-{domain}"), layout);
        self.insert(post)
    }

    /// Single-picture post with one crop per text.
    pub fn post_with_text(&self, domain: &str, date: &str, texts: &[&str]) -> i64 {
        let mut post = self.new_post(&format!("id-{domain}"), &[texts.len()]);
        post.date = NaiveDateTime::parse_from_str(date, "%Y-%m-%d %H:%M:%S").unwrap();
        for (crop, text) in post.pictures[0].crops.iter_mut().zip(texts) {
            crop.text = Some(text.to_string());
        }
        self.insert(post)
    }

    fn insert(&self, post: NewPost) -> i64 {
        self.db.bulk_insert(&[post]).unwrap()[0]
    }
}
