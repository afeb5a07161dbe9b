//! Provenance of produced composites.

use rusqlite::{params, OptionalExtension};

use super::{Database, GeneratedCrop, GeneratedPicture, GeneratedPost, LineageRow, NewGeneratedPost};
use crate::error::{MixError, MixResult};

impl Database {
    /// Record a composite with its pictures and crop lineage as one unit.
    pub fn record_generated(&self, artifact: &NewGeneratedPost) -> MixResult<i64> {
        let tx = self.conn.unchecked_transaction()?;

        for picture in &artifact.pictures {
            let belongs: bool = tx.query_row(
                "SELECT EXISTS (SELECT 1 FROM pictures WHERE id = ? AND post_id = ?)",
                params![picture.base_picture_id, artifact.base_post_id],
                |row| row.get(0),
            )?;
            if !belongs {
                return Err(MixError::not_found(format!(
                    "picture {} of post {}",
                    picture.base_picture_id, artifact.base_post_id
                )));
            }
            for crop_id in &picture.crop_ids {
                let exists: bool = tx.query_row(
                    "SELECT EXISTS (SELECT 1 FROM crops WHERE id = ?)",
                    [crop_id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Err(MixError::not_found(format!("crop {crop_id}")));
                }
            }
        }

        tx.execute(
            "INSERT INTO generated_posts (base_post_id, signature, strategy) VALUES (?, ?, ?)",
            params![artifact.base_post_id, artifact.signature, artifact.strategy],
        )?;
        let generated_post_id = tx.last_insert_rowid();

        for picture in &artifact.pictures {
            tx.execute(
                r#"
                INSERT INTO generated_pictures (generated_post_id, base_picture_id, idx, picture)
                VALUES (?, ?, ?, ?)
                "#,
                params![
                    generated_post_id,
                    picture.base_picture_id,
                    picture.index,
                    picture.image
                ],
            )?;
            let generated_picture_id = tx.last_insert_rowid();
            for (slot, crop_id) in picture.crop_ids.iter().enumerate() {
                tx.execute(
                    "INSERT INTO generated_crops (generated_picture_id, crop_id, idx) VALUES (?, ?, ?)",
                    params![generated_picture_id, crop_id, slot as i64],
                )?;
            }
        }

        tx.commit()?;
        Ok(generated_post_id)
    }

    pub fn get_generated_post(&self, id: i64) -> MixResult<GeneratedPost> {
        let post = self
            .conn
            .query_row(
                r#"
                SELECT id, base_post_id, signature, strategy, posted, created_at
                FROM generated_posts WHERE id = ?
                "#,
                [id],
                |row| {
                    Ok(GeneratedPost {
                        id: row.get(0)?,
                        base_post_id: row.get(1)?,
                        signature: row.get(2)?,
                        strategy: row.get(3)?,
                        posted: row.get(4)?,
                        created_at: row.get(5)?,
                        pictures: Vec::new(),
                    })
                },
            )
            .optional()?;
        let mut post = post.ok_or_else(|| MixError::not_found(format!("generated post {id}")))?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, generated_post_id, base_picture_id, idx, picture
            FROM generated_pictures WHERE generated_post_id = ?
            ORDER BY idx, id
            "#,
        )?;
        let mut pictures = stmt
            .query_map([id], |row| {
                Ok(GeneratedPicture {
                    id: row.get(0)?,
                    generated_post_id: row.get(1)?,
                    base_picture_id: row.get(2)?,
                    index: row.get(3)?,
                    image: row.get(4)?,
                    crops: Vec::new(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, generated_picture_id, crop_id, idx
            FROM generated_crops WHERE generated_picture_id = ?
            ORDER BY idx
            "#,
        )?;
        for picture in &mut pictures {
            picture.crops = stmt
                .query_map([picture.id], |row| {
                    Ok(GeneratedCrop {
                        id: row.get(0)?,
                        generated_picture_id: row.get(1)?,
                        crop_id: row.get(2)?,
                        index: row.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
        }
        post.pictures = pictures;
        Ok(post)
    }

    pub fn find_generated_by_signature(&self, signature: &str) -> MixResult<Option<i64>> {
        let id = self
            .conn
            .query_row(
                "SELECT id FROM generated_posts WHERE signature = ? ORDER BY id LIMIT 1",
                [signature],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn mark_posted(&self, id: i64) -> MixResult<()> {
        let updated = self
            .conn
            .execute("UPDATE generated_posts SET posted = 1 WHERE id = ?", [id])?;
        if updated == 0 {
            return Err(MixError::not_found(format!("generated post {id}")));
        }
        Ok(())
    }

    pub fn unposted_generated(&self) -> MixResult<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM generated_posts WHERE posted = 0 ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    /// One row per generated crop, with the donor it came from.
    pub fn lineage(&self) -> MixResult<Vec<LineageRow>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT g.id, g.base_post_id, gp.idx, gc.idx, c.id, p.id, pb.domain, c.text,
                   g.created_at, g.posted
            FROM generated_crops gc
            JOIN generated_pictures gp ON gc.generated_picture_id = gp.id
            JOIN generated_posts g ON gp.generated_post_id = g.id
            JOIN crops c ON gc.crop_id = c.id
            JOIN pictures m ON c.picture_id = m.id
            JOIN posts p ON m.post_id = p.id
            JOIN publics pb ON p.public_id = pb.id
            ORDER BY g.id, gp.idx, gp.id, gc.idx
            "#,
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LineageRow {
                    generated_post_id: row.get(0)?,
                    base_post_id: row.get(1)?,
                    picture_index: row.get(2)?,
                    slot: row.get(3)?,
                    crop_id: row.get(4)?,
                    donor_post_id: row.get(5)?,
                    donor_public: row.get(6)?,
                    crop_text: row.get(7)?,
                    created_at: row.get(8)?,
                    posted: row.get(9)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NewGeneratedPicture;
    use crate::testutil::Corpus;

    fn artifact(corpus: &Corpus, base: i64, donor: i64) -> NewGeneratedPost {
        let base_post = corpus.db.get_post(base).unwrap();
        let donor_post = corpus.db.get_post(donor).unwrap();
        NewGeneratedPost {
            base_post_id: base,
            signature: "sig".into(),
            strategy: "firstonly".into(),
            pictures: vec![NewGeneratedPicture {
                base_picture_id: base_post.pictures[0].id,
                index: None,
                image: vec![1, 2, 3],
                crop_ids: donor_post.pictures[0].crops.iter().map(|c| c.id).collect(),
            }],
        }
    }

    #[test]
    fn test_record_and_read_back() {
        let corpus = Corpus::new();
        let base = corpus.post("cats", &[2]);
        let donor = corpus.post("dogs", &[2]);
        let id = corpus.db.record_generated(&artifact(&corpus, base, donor)).unwrap();

        let generated = corpus.db.get_generated_post(id).unwrap();
        assert_eq!(generated.base_post_id, base);
        assert!(!generated.posted);
        assert_eq!(generated.pictures.len(), 1);
        let slots: Vec<u32> = generated.pictures[0].crops.iter().map(|c| c.index).collect();
        assert_eq!(slots, vec![0, 1]);

        assert_eq!(corpus.db.find_generated_by_signature("sig").unwrap(), Some(id));
        assert_eq!(corpus.db.find_generated_by_signature("other").unwrap(), None);

        let lineage = corpus.db.lineage().unwrap();
        assert_eq!(lineage.len(), 2);
        assert!(lineage.iter().all(|r| r.donor_post_id == donor && r.donor_public == "dogs"));
    }

    #[test]
    fn test_record_is_all_or_nothing() {
        let corpus = Corpus::new();
        let base = corpus.post("cats", &[2]);
        let donor = corpus.post("dogs", &[2]);
        let mut bad = artifact(&corpus, base, donor);
        bad.pictures[0].crop_ids.push(9_999);

        assert!(matches!(
            corpus.db.record_generated(&bad),
            Err(MixError::NotFound(_))
        ));
        assert_eq!(corpus.db.stats().unwrap().generated_posts, 0);
        assert!(corpus.db.lineage().unwrap().is_empty());
    }

    #[test]
    fn test_posted_flag() {
        let corpus = Corpus::new();
        let base = corpus.post("cats", &[1]);
        let donor = corpus.post("dogs", &[1]);
        let id = corpus.db.record_generated(&artifact(&corpus, base, donor)).unwrap();
        assert_eq!(corpus.db.unposted_generated().unwrap(), vec![id]);
        corpus.db.mark_posted(id).unwrap();
        assert!(corpus.db.unposted_generated().unwrap().is_empty());
        assert!(matches!(corpus.db.mark_posted(id + 1), Err(MixError::NotFound(_))));
    }

    #[test]
    fn test_generated_records_never_outlive_referents() {
        let corpus = Corpus::new();
        let base = corpus.post("cats", &[1]);
        let donor = corpus.post("dogs", &[1]);
        let id = corpus.db.record_generated(&artifact(&corpus, base, donor)).unwrap();

        corpus.db.delete_post(donor).unwrap();
        let generated = corpus.db.get_generated_post(id).unwrap();
        assert!(generated.pictures[0].crops.is_empty());

        corpus.db.delete_post(base).unwrap();
        assert!(matches!(
            corpus.db.get_generated_post(id),
            Err(MixError::NotFound(_))
        ));
    }
}
