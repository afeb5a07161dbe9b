use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use crate::db::{Database, LineageRow};

/// Export format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }

    /// Format implied by a file extension, if any.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()?.to_str()?.parse().ok()
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => bail!("Unknown export format: {}", other),
        }
    }
}

/// Export the lineage of every generated composite; returns the row count.
pub fn export_lineage(db: &Database, output_path: &Path, format: ExportFormat) -> Result<usize> {
    let rows = db.lineage().context("Failed to read lineage")?;
    let count = rows.len();

    match format {
        ExportFormat::Json => export_json(&rows, output_path)?,
        ExportFormat::Csv => export_csv(&rows, output_path)?,
    }

    tracing::info!("Exported {} lineage rows to {}", count, output_path.display());
    Ok(count)
}

fn export_json(rows: &[LineageRow], output_path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(rows)?;
    let mut file = File::create(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;
    file.write_all(json.as_bytes())?;
    Ok(())
}

fn export_csv(rows: &[LineageRow], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)
        .with_context(|| format!("Failed to create {}", output_path.display()))?;

    wtr.write_record([
        "generated_post_id",
        "base_post_id",
        "picture_index",
        "slot",
        "crop_id",
        "donor_post_id",
        "donor_public",
        "crop_text",
        "created_at",
        "posted",
    ])?;

    for row in rows {
        wtr.write_record([
            &row.generated_post_id.to_string(),
            &row.base_post_id.to_string(),
            &row.picture_index.map(|v| v.to_string()).unwrap_or_default(),
            &row.slot.to_string(),
            &row.crop_id.to_string(),
            &row.donor_post_id.to_string(),
            &row.donor_public,
            row.crop_text.as_deref().unwrap_or(""),
            &row.created_at,
            &row.posted.to_string(),
        ])?;
    }

    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOptions;
    use crate::mixer::{Mixer, PickStrategy, RunSettings};
    use crate::testutil::Corpus;

    fn mixed_corpus() -> Corpus {
        let corpus = Corpus::new();
        corpus.post_with_text("cats", "2021-01-01 10:00:00", &["a, \"quoted\" caption"]);
        corpus.post_with_text("dogs", "2021-01-02 10:00:00", &["woof"]);
        Mixer::new(&corpus.db)
            .run(
                &FilterOptions::default(),
                PickStrategy::FirstOnly,
                &RunSettings::default(),
            )
            .unwrap();
        corpus
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("html".parse::<ExportFormat>().is_err());
        assert_eq!(
            ExportFormat::from_path(Path::new("out/lineage.csv")),
            Some(ExportFormat::Csv)
        );
        assert_eq!(ExportFormat::from_path(Path::new("lineage")), None);
    }

    #[test]
    fn test_export_json() {
        let corpus = mixed_corpus();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.json");

        assert_eq!(export_lineage(&corpus.db, &path, ExportFormat::Json).unwrap(), 1);
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let rows = value.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["slot"], 0);
        assert!(rows[0]["picture_index"].is_null());
        assert_eq!(rows[0]["posted"], false);
    }

    #[test]
    fn test_export_csv() {
        let corpus = mixed_corpus();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.csv");

        assert_eq!(export_lineage(&corpus.db, &path, ExportFormat::Csv).unwrap(), 1);
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[6], "donor_public");
        let records: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 1);
        assert!(&records[0][6] == "cats" || &records[0][6] == "dogs");
        assert!(&records[0][7] == "woof" || &records[0][7] == "a, \"quoted\" caption");
    }

    #[test]
    fn test_export_empty_corpus() {
        let corpus = Corpus::new();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.csv");
        assert_eq!(export_lineage(&corpus.db, &path, ExportFormat::Csv).unwrap(), 0);
        assert!(path.exists());
    }
}
