//! Corpus reads and writes: publics, posts, pictures and crops.
//!
//! Posts are written by the ingestion side in batches and crops by the
//! cropper; the mixing engine only reads. Deletion cascades explicitly
//! through every dependent row, generated records included.

use rusqlite::{params, OptionalExtension, Row};

use super::models::{format_date, parse_date};
use super::{
    BoundingBox, CorpusStats, Crop, Database, Engagement, NewCrop, NewPost, Picture, Post, Public,
    UncroppedPicture,
};
use crate::error::{MixError, MixResult};
use crate::imaging;

fn date_from_row(row: &Row<'_>, idx: usize) -> rusqlite::Result<chrono::NaiveDateTime> {
    let raw: String = row.get(idx)?;
    parse_date(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            format!("invalid post date {raw:?}").into(),
        )
    })
}

fn check_boxes(picture: &str, boxes: &[&BoundingBox], width: u32, height: u32) -> MixResult<()> {
    for bbox in boxes {
        if !bbox.fits_within(width, height) {
            return Err(MixError::invalid_argument(format!(
                "crop box {:?} exceeds {} bounds {}x{}",
                bbox, picture, width, height
            )));
        }
    }
    Ok(())
}

impl Database {
    // ========================================================================
    // Publics
    // ========================================================================

    pub fn add_public(&self, id: &str, domain: &str) -> MixResult<Public> {
        self.conn.execute(
            "INSERT INTO publics (id, domain) VALUES (?, ?)",
            params![id, domain],
        )?;
        Ok(Public {
            id: id.to_string(),
            domain: domain.to_string(),
        })
    }

    /// Look up a public by id or by domain.
    pub fn get_public(&self, key: &str) -> MixResult<Public> {
        self.conn
            .query_row(
                "SELECT id, domain FROM publics WHERE id = ?1 OR domain = ?1",
                [key],
                |row| {
                    Ok(Public {
                        id: row.get(0)?,
                        domain: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or_else(|| MixError::not_found(format!("public {key}")))
    }

    pub fn public_domains(&self) -> MixResult<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT domain FROM publics ORDER BY domain")?;
        let domains = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(domains)
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Insert a batch of posts in one transaction. Either every post of the
    /// batch lands or none does.
    pub fn bulk_insert(&self, posts: &[NewPost]) -> MixResult<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;
        let mut ids = Vec::with_capacity(posts.len());

        for post in posts {
            let public_exists: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM publics WHERE id = ?)",
                [&post.public_id],
                |row| row.get(0),
            )?;
            if !public_exists {
                return Err(MixError::not_found(format!("public {}", post.public_id)));
            }

            tx.execute(
                r#"
                INSERT INTO posts (public_id, remote_id, date, text, comments, likes, reposts, views)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                params![
                    post.public_id,
                    post.remote_id,
                    format_date(&post.date),
                    post.text,
                    post.engagement.comments,
                    post.engagement.likes,
                    post.engagement.reposts,
                    post.engagement.views,
                ],
            )?;
            let post_id = tx.last_insert_rowid();

            let multi = post.pictures.len() > 1;
            for (i, picture) in post.pictures.iter().enumerate() {
                let (width, height) = imaging::dimensions(&picture.image)?;
                let boxes: Vec<&BoundingBox> = picture.crops.iter().map(|c| &c.bbox).collect();
                check_boxes(&format!("post {} picture {}", post.remote_id, i), &boxes, width, height)?;

                let positions = if picture.crops.is_empty() {
                    None
                } else {
                    Some(serde_json::to_string(&boxes)?)
                };
                tx.execute(
                    r#"
                    INSERT INTO pictures (post_id, idx, picture, width, height, crop_positions)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                    params![
                        post_id,
                        multi.then_some(i as i64),
                        picture.image,
                        width,
                        height,
                        positions,
                    ],
                )?;
                let picture_id = tx.last_insert_rowid();
                insert_crops(&tx, picture_id, &picture.crops)?;
            }
            ids.push(post_id);
        }

        tx.commit()?;
        tracing::debug!("Inserted batch of {} posts", ids.len());
        Ok(ids)
    }

    pub fn get_post(&self, id: i64) -> MixResult<Post> {
        let post = self
            .conn
            .query_row(
                r#"
                SELECT id, public_id, remote_id, date, text, comments, likes, reposts, views
                FROM posts WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(Post {
                        id: row.get(0)?,
                        public_id: row.get(1)?,
                        remote_id: row.get(2)?,
                        date: date_from_row(row, 3)?,
                        text: row.get(4)?,
                        engagement: Engagement {
                            comments: row.get(5)?,
                            likes: row.get(6)?,
                            reposts: row.get(7)?,
                            views: row.get(8)?,
                        },
                        pictures: Vec::new(),
                    })
                },
            )
            .optional()?;
        let mut post = post.ok_or_else(|| MixError::not_found(format!("post {id}")))?;
        post.pictures = self.load_pictures(id)?;
        Ok(post)
    }

    fn load_pictures(&self, post_id: i64) -> MixResult<Vec<Picture>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, post_id, idx, picture, width, height, crop_positions
            FROM pictures WHERE post_id = ?
            ORDER BY idx, id
            "#,
        )?;
        let rows = stmt
            .query_map([post_id], |row| {
                Ok((
                    Picture {
                        id: row.get(0)?,
                        post_id: row.get(1)?,
                        index: row.get(2)?,
                        image: row.get(3)?,
                        width: row.get(4)?,
                        height: row.get(5)?,
                        crop_positions: Vec::new(),
                        crops: Vec::new(),
                    },
                    row.get::<_, Option<String>>(6)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut pictures = Vec::with_capacity(rows.len());
        for (mut picture, positions) in rows {
            if let Some(positions) = positions {
                picture.crop_positions = serde_json::from_str(&positions)?;
            }
            picture.crops = self.load_crops(picture.id)?;
            pictures.push(picture);
        }
        Ok(pictures)
    }

    fn load_crops(&self, picture_id: i64) -> MixResult<Vec<Crop>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, picture_id, idx, picture, text, x, y, width, height
            FROM crops WHERE picture_id = ?
            ORDER BY idx
            "#,
        )?;
        let crops = stmt
            .query_map([picture_id], |row| {
                let geometry: (Option<u32>, Option<u32>, Option<u32>, Option<u32>) =
                    (row.get(5)?, row.get(6)?, row.get(7)?, row.get(8)?);
                let bbox = match geometry {
                    (Some(x), Some(y), Some(w), Some(h)) => Some(BoundingBox::from_origin(x, y, w, h)),
                    _ => None,
                };
                Ok(Crop {
                    id: row.get(0)?,
                    picture_id: row.get(1)?,
                    index: row.get(2)?,
                    image: row.get(3)?,
                    text: row.get(4)?,
                    bbox,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(crops)
    }

    /// Delete a post together with its pictures, crops, the generated
    /// records based on it and the generated crops that used its crops.
    pub fn delete_post(&self, id: i64) -> MixResult<()> {
        let tx = self.conn.unchecked_transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM posts WHERE id = ?)",
            [id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(MixError::not_found(format!("post {id}")));
        }

        tx.execute(
            r#"
            DELETE FROM generated_crops
            WHERE crop_id IN (
                SELECT c.id FROM crops c JOIN pictures m ON c.picture_id = m.id WHERE m.post_id = ?1
            )
            OR generated_picture_id IN (
                SELECT gp.id FROM generated_pictures gp
                LEFT JOIN generated_posts g ON gp.generated_post_id = g.id
                LEFT JOIN pictures m ON gp.base_picture_id = m.id
                WHERE g.base_post_id = ?1 OR m.post_id = ?1
            )
            "#,
            [id],
        )?;
        tx.execute(
            r#"
            DELETE FROM generated_pictures
            WHERE generated_post_id IN (SELECT id FROM generated_posts WHERE base_post_id = ?1)
            OR base_picture_id IN (SELECT id FROM pictures WHERE post_id = ?1)
            "#,
            [id],
        )?;
        tx.execute("DELETE FROM generated_posts WHERE base_post_id = ?", [id])?;
        tx.execute(
            "DELETE FROM crops WHERE picture_id IN (SELECT id FROM pictures WHERE post_id = ?)",
            [id],
        )?;
        tx.execute("DELETE FROM pictures WHERE post_id = ?", [id])?;
        tx.execute("DELETE FROM posts WHERE id = ?", [id])?;

        tx.commit()?;
        tracing::info!("Deleted post {}", id);
        Ok(())
    }

    // ========================================================================
    // Cropping
    // ========================================================================

    pub fn uncropped_pictures(&self) -> MixResult<Vec<UncroppedPicture>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT m.id, m.post_id, p.public_id, m.picture
            FROM pictures m
            JOIN posts p ON m.post_id = p.id
            WHERE NOT EXISTS (SELECT 1 FROM crops c WHERE c.picture_id = m.id)
            ORDER BY m.id
            "#,
        )?;
        let pictures = stmt
            .query_map([], |row| {
                Ok(UncroppedPicture {
                    id: row.get(0)?,
                    post_id: row.get(1)?,
                    public_id: row.get(2)?,
                    image: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(pictures)
    }

    /// Store the crops of a picture along with its position list. A picture's
    /// crops are fixed once written, so this refuses pictures that have some.
    pub fn attach_crops(&self, picture_id: i64, crops: &[NewCrop]) -> MixResult<Vec<i64>> {
        let tx = self.conn.unchecked_transaction()?;

        let (width, height, existing): (u32, u32, i64) = tx
            .query_row(
                r#"
                SELECT width, height, (SELECT COUNT(*) FROM crops WHERE picture_id = m.id)
                FROM pictures m WHERE id = ?
                "#,
                [picture_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| MixError::not_found(format!("picture {picture_id}")))?;
        if existing > 0 {
            return Err(MixError::invalid_argument(format!(
                "picture {picture_id} already has {existing} crops"
            )));
        }

        let boxes: Vec<&BoundingBox> = crops.iter().map(|c| &c.bbox).collect();
        check_boxes(&format!("picture {picture_id}"), &boxes, width, height)?;
        tx.execute(
            "UPDATE pictures SET crop_positions = ? WHERE id = ?",
            params![serde_json::to_string(&boxes)?, picture_id],
        )?;
        let ids = insert_crops(&tx, picture_id, crops)?;

        tx.commit()?;
        Ok(ids)
    }

    pub fn stats(&self) -> MixResult<CorpusStats> {
        let stats = self.conn.query_row(
            r#"
            SELECT
                (SELECT COUNT(*) FROM publics),
                (SELECT COUNT(*) FROM posts),
                (SELECT COUNT(*) FROM pictures),
                (SELECT COUNT(*) FROM pictures m
                    WHERE NOT EXISTS (SELECT 1 FROM crops c WHERE c.picture_id = m.id)),
                (SELECT COUNT(*) FROM crops),
                (SELECT COUNT(*) FROM generated_posts)
            "#,
            [],
            |row| {
                Ok(CorpusStats {
                    publics: row.get(0)?,
                    posts: row.get(1)?,
                    pictures: row.get(2)?,
                    uncropped_pictures: row.get(3)?,
                    crops: row.get(4)?,
                    generated_posts: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }
}

fn insert_crops(
    conn: &rusqlite::Connection,
    picture_id: i64,
    crops: &[NewCrop],
) -> MixResult<Vec<i64>> {
    let mut stmt = conn.prepare(
        r#"
        INSERT INTO crops (picture_id, idx, picture, text, x, y, width, height)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )?;
    let mut ids = Vec::with_capacity(crops.len());
    for (i, crop) in crops.iter().enumerate() {
        stmt.execute(params![
            picture_id,
            i as i64,
            crop.image,
            crop.text,
            crop.bbox.x1,
            crop.bbox.y1,
            crop.bbox.width(),
            crop.bbox.height(),
        ])?;
        ids.push(conn.last_insert_rowid());
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewPicture;
    use crate::testutil::{jpeg, Corpus};

    #[test]
    fn test_public_lookup_by_id_or_domain() {
        let corpus = Corpus::new();
        let by_domain = corpus.db.get_public("cats").unwrap();
        let by_id = corpus.db.get_public(&by_domain.id).unwrap();
        assert_eq!(by_domain, by_id);
        assert!(matches!(
            corpus.db.get_public("nope"),
            Err(MixError::NotFound(_))
        ));
        assert_eq!(corpus.db.public_domains().unwrap(), vec!["birds", "cats", "dogs"]);
    }

    #[test]
    fn test_post_roundtrip_keeps_order_and_geometry() {
        let corpus = Corpus::new();
        let id = corpus.post("cats", &[2, 3]);
        let post = corpus.db.get_post(id).unwrap();
        assert_eq!(post.picture_count(), 2);
        assert_eq!(post.pictures[0].index, Some(0));
        assert_eq!(post.pictures[1].index, Some(1));
        assert_eq!(post.pictures[0].crop_count(), 2);
        assert_eq!(post.pictures[1].crop_count(), 3);
        let picture = &post.pictures[1];
        for (j, crop) in picture.crops.iter().enumerate() {
            assert_eq!(crop.index as usize, j);
            assert_eq!(crop.bbox, Some(picture.crop_positions[j]));
        }
    }

    #[test]
    fn test_single_picture_has_no_index() {
        let corpus = Corpus::new();
        let id = corpus.post("cats", &[1]);
        assert_eq!(corpus.db.get_post(id).unwrap().pictures[0].index, None);
    }

    #[test]
    fn test_bulk_insert_is_atomic() {
        let corpus = Corpus::new();
        let good = corpus.new_post("id-cats", &[1]);
        let mut bad = corpus.new_post("id-cats", &[1]);
        bad.pictures[0].crops[0].bbox = BoundingBox::new(0, 0, 10_000, 10);

        let err = corpus.db.bulk_insert(&[good, bad]).unwrap_err();
        assert!(matches!(err, MixError::InvalidArgument(_)));
        assert_eq!(corpus.db.stats().unwrap().posts, 0);

        let orphan = corpus.new_post("missing", &[1]);
        assert!(matches!(
            corpus.db.bulk_insert(&[orphan]),
            Err(MixError::NotFound(_))
        ));
    }

    #[test]
    fn test_get_missing_post() {
        let corpus = Corpus::new();
        assert!(matches!(corpus.db.get_post(42), Err(MixError::NotFound(_))));
    }

    #[test]
    fn test_attach_crops_once() {
        let corpus = Corpus::new();
        let post = NewPost {
            pictures: vec![NewPicture {
                image: jpeg(200, 200, [0, 0, 0]),
                crops: Vec::new(),
            }],
            ..corpus.new_post("id-cats", &[])
        };
        let id = corpus.db.bulk_insert(&[post]).unwrap()[0];
        let uncropped = corpus.db.uncropped_pictures().unwrap();
        assert_eq!(uncropped.len(), 1);
        assert_eq!(uncropped[0].post_id, id);

        let crops = vec![NewCrop {
            image: jpeg(50, 20, [255, 255, 255]),
            text: Some("hello".into()),
            bbox: BoundingBox::new(10, 10, 60, 30),
        }];
        corpus.db.attach_crops(uncropped[0].id, &crops).unwrap();
        assert!(corpus.db.uncropped_pictures().unwrap().is_empty());

        let post = corpus.db.get_post(id).unwrap();
        assert_eq!(post.pictures[0].crop_positions, vec![crops[0].bbox]);
        assert_eq!(post.pictures[0].crops[0].text.as_deref(), Some("hello"));

        assert!(matches!(
            corpus.db.attach_crops(uncropped[0].id, &crops),
            Err(MixError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_delete_post_cascades() {
        let corpus = Corpus::new();
        let id = corpus.post("cats", &[2]);
        corpus.post("dogs", &[1]);
        corpus.db.delete_post(id).unwrap();

        let stats = corpus.db.stats().unwrap();
        assert_eq!(stats.posts, 1);
        assert_eq!(stats.pictures, 1);
        assert_eq!(stats.crops, 1);
        assert!(matches!(corpus.db.delete_post(id), Err(MixError::NotFound(_))));
    }
}
