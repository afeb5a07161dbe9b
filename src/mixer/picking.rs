//! Resolution of donor posts into the concrete crops pasted on each slot.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::Mix;
use crate::db::{Crop, Post};
use crate::error::{MixError, MixResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PickStrategy {
    /// Slot `(i, j)` takes crop `j` from its own donor.
    Aligned,
    /// Every slot of picture `i` is filled from the slot `(i, 0)` donor.
    #[default]
    FirstOnly,
}

impl PickStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PickStrategy::Aligned => "aligned",
            PickStrategy::FirstOnly => "firstonly",
        }
    }
}

impl fmt::Display for PickStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PickStrategy {
    type Err = MixError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aligned" => Ok(PickStrategy::Aligned),
            "firstonly" => Ok(PickStrategy::FirstOnly),
            other => Err(MixError::invalid_argument(format!(
                "unknown crop picking strategy {other:?}"
            ))),
        }
    }
}

/// Donor picture used for base picture `base_index`: `min(i, n) - 1`, where
/// `-1` wraps to the last picture. Base picture 0 therefore reads from the
/// donor's last picture, and picture `i > 0` from donor picture `i - 1`.
pub fn donor_picture_index(base_index: usize, donor_pictures: usize) -> Option<usize> {
    if donor_pictures == 0 {
        return None;
    }
    match base_index.min(donor_pictures) {
        0 => Some(donor_pictures - 1),
        clamped => Some(clamped - 1),
    }
}

fn donor_crops(donor: &Post, base_index: usize) -> MixResult<&[Crop]> {
    let idx = donor_picture_index(base_index, donor.picture_count())
        .ok_or_else(|| MixError::no_eligible(format!("donor post {} has no pictures", donor.id)))?;
    Ok(&donor.pictures[idx].crops)
}

/// Crops for every slot of the base post, indexed like `mix.donors`.
pub fn pick_crops(mix: &Mix, how: PickStrategy) -> MixResult<Vec<Vec<Crop>>> {
    let mut picked = Vec::with_capacity(mix.donors.len());

    for (i, row) in mix.donors.iter().enumerate() {
        match how {
            PickStrategy::Aligned => {
                let mut crops = Vec::with_capacity(row.len());
                for (j, donor) in row.iter().enumerate() {
                    let crop = donor_crops(donor, i)?.get(j).cloned().ok_or_else(|| {
                        MixError::no_eligible(format!(
                            "donor post {} has no crop {} for picture {}",
                            donor.id, j, i
                        ))
                    })?;
                    crops.push(crop);
                }
                picked.push(crops);
            }
            PickStrategy::FirstOnly => {
                let Some(donor) = row.first() else {
                    picked.push(Vec::new());
                    continue;
                };
                let crops = donor_crops(donor, i)?;
                if crops.len() != row.len() {
                    return Err(MixError::no_eligible(format!(
                        "donor post {} offers {} crops for picture {}, {} needed",
                        donor.id,
                        crops.len(),
                        i,
                        row.len()
                    )));
                }
                picked.push(crops.to_vec());
            }
        }
    }
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::Corpus;

    #[test]
    fn test_strategy_names() {
        assert_eq!("aligned".parse::<PickStrategy>().unwrap(), PickStrategy::Aligned);
        assert_eq!("firstonly".parse::<PickStrategy>().unwrap(), PickStrategy::FirstOnly);
        assert!(matches!(
            "abstract".parse::<PickStrategy>(),
            Err(MixError::InvalidArgument(_))
        ));
        assert_eq!(PickStrategy::FirstOnly.to_string(), "firstonly");
    }

    #[test]
    fn test_donor_picture_index_wraps_at_zero() {
        assert_eq!(donor_picture_index(0, 3), Some(2));
        assert_eq!(donor_picture_index(0, 1), Some(0));
        assert_eq!(donor_picture_index(1, 3), Some(0));
        assert_eq!(donor_picture_index(2, 3), Some(1));
        assert_eq!(donor_picture_index(5, 3), Some(2));
        assert_eq!(donor_picture_index(0, 0), None);
    }

    #[test]
    fn test_firstonly_takes_all_crops_from_one_donor_picture() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[3])).unwrap();
        let first = corpus.db.get_post(corpus.post("dogs", &[3])).unwrap();
        let other = corpus.db.get_post(corpus.post("birds", &[3])).unwrap();
        let mix = Mix {
            base,
            donors: vec![vec![first.clone(), other.clone(), other]],
        };

        let crops = pick_crops(&mix, PickStrategy::FirstOnly).unwrap();
        assert_eq!(crops.len(), 1);
        assert_eq!(crops[0].len(), 3);
        let source = first.pictures[0].id;
        assert!(crops[0].iter().all(|c| c.picture_id == source));
    }

    #[test]
    fn test_aligned_takes_crop_j_from_donor_j() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[2])).unwrap();
        let a = corpus.db.get_post(corpus.post("dogs", &[2])).unwrap();
        let b = corpus.db.get_post(corpus.post("birds", &[2])).unwrap();
        let mix = Mix {
            base,
            donors: vec![vec![a.clone(), b.clone()]],
        };

        let crops = pick_crops(&mix, PickStrategy::Aligned).unwrap();
        assert_eq!(crops[0][0].id, a.pictures[0].crops[0].id);
        assert_eq!(crops[0][1].id, b.pictures[0].crops[1].id);
    }

    #[test]
    fn test_aligned_first_picture_reads_donor_last_picture() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[1])).unwrap();
        let donor = corpus.db.get_post(corpus.post("dogs", &[1, 1])).unwrap();
        let mix = Mix {
            base,
            donors: vec![vec![donor.clone()]],
        };

        let crops = pick_crops(&mix, PickStrategy::Aligned).unwrap();
        assert_eq!(crops[0][0].picture_id, donor.pictures[1].id);
    }

    #[test]
    fn test_crop_count_mismatch_is_reported() {
        let corpus = Corpus::new();
        let base = corpus.db.get_post(corpus.post("cats", &[2])).unwrap();
        let donor = corpus.db.get_post(corpus.post("dogs", &[2, 1])).unwrap();
        let mix = Mix {
            base,
            donors: vec![vec![donor.clone(), donor]],
        };
        assert!(matches!(
            pick_crops(&mix, PickStrategy::FirstOnly),
            Err(MixError::NoEligibleContent(_))
        ));
    }
}
