//! Label table reader
//!
//! The table maps image file names (`new_names`) to integer class labels
//! (`labels`). Incomplete rows are dropped before anything else sees them.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};

const FILE_COLUMN: &str = "new_names";
const LABEL_COLUMN: &str = "labels";

/// Cell values the pandas CSV reader turns into NaN by default
const MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// One usable row of the label table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabeledImage {
    pub file_name: String,
    pub label: usize,
}

/// Read the label table, dropping every row with a missing value in any column
pub fn read_labels(csv_path: &Path) -> Result<Vec<LabeledImage>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("Failed to open label table {}", csv_path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read header of {}", csv_path.display()))?
        .clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("Column '{}' not found in {}", name, csv_path.display()))
    };
    let file_idx = column(FILE_COLUMN)?;
    let label_idx = column(LABEL_COLUMN)?;

    let mut entries = Vec::new();
    let mut dropped = 0usize;

    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| {
            format!("Malformed row {} in {}", line + 2, csv_path.display())
        })?;

        if record.len() < headers.len() || record.iter().any(is_missing) {
            dropped += 1;
            continue;
        }

        let label = &record[label_idx];
        let label = parse_label(label).with_context(|| {
            format!("Invalid label '{}' on row {} of {}", label, line + 2, csv_path.display())
        })?;

        entries.push(LabeledImage {
            file_name: record[file_idx].to_string(),
            label,
        });
    }

    if dropped > 0 {
        warn!("Dropped {} incomplete rows from {}", dropped, csv_path.display());
    }
    info!("Read {} labeled images from {}", entries.len(), csv_path.display());

    Ok(entries)
}

fn is_missing(field: &str) -> bool {
    MISSING_MARKERS.contains(&field)
}

/// Integer labels, also accepting the float form some exports write (`1.0`)
fn parse_label(raw: &str) -> Result<usize> {
    if let Ok(label) = raw.parse::<usize>() {
        return Ok(label);
    }
    let value: f64 = raw.parse()?;
    if value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        anyhow::bail!("not a non-negative integer")
    }
}

/// Number of images per label, sorted by label
pub fn class_distribution(entries: &[LabeledImage]) -> BTreeMap<usize, usize> {
    let mut counts = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.label).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_csv(content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.csv");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_read_labels_drops_incomplete_rows() {
        let (_dir, path) = write_csv(
            "Patient_ID,new_names,labels\n\
             UID_1,1.bmp,1\n\
             UID_2,,0\n\
             UID_3,3.bmp,\n\
             UID_4,4.bmp,0\n",
        );

        let entries = read_labels(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                LabeledImage { file_name: "1.bmp".to_string(), label: 1 },
                LabeledImage { file_name: "4.bmp".to_string(), label: 0 },
            ]
        );
    }

    #[test]
    fn test_read_labels_drops_rows_missing_any_column() {
        let (_dir, path) = write_csv(
            "Patient_ID,new_names,labels\n\
             ,1.bmp,1\n\
             UID_2,2.bmp,0\n\
             NaN,3.bmp,1\n\
             UID_4,4.bmp\n",
        );

        let entries = read_labels(&path).unwrap();
        assert_eq!(entries, vec![LabeledImage { file_name: "2.bmp".to_string(), label: 0 }]);
    }

    #[test]
    fn test_read_labels_missing_column() {
        let (_dir, path) = write_csv("Patient_ID,file,labels\nUID_1,1.bmp,1\n");
        let err = read_labels(&path).unwrap_err();
        assert!(err.to_string().contains("new_names"));
    }

    #[test]
    fn test_read_labels_float_labels() {
        let (_dir, path) = write_csv("new_names,labels\na.bmp,1.0\nb.bmp,0.0\n");
        let entries = read_labels(&path).unwrap();
        assert_eq!(entries[0].label, 1);
        assert_eq!(entries[1].label, 0);
    }

    #[test]
    fn test_read_labels_rejects_bad_label() {
        let (_dir, path) = write_csv("new_names,labels\na.bmp,cancer\n");
        assert!(read_labels(&path).is_err());
    }

    #[test]
    fn test_missing_table() {
        let err = read_labels(Path::new("nope/labels.csv")).unwrap_err();
        assert!(err.to_string().contains("nope/labels.csv"));
    }

    #[test]
    fn test_class_distribution() {
        let entries = vec![
            LabeledImage { file_name: "a".into(), label: 1 },
            LabeledImage { file_name: "b".into(), label: 0 },
            LabeledImage { file_name: "c".into(), label: 1 },
        ];
        let dist = class_distribution(&entries);
        assert_eq!(dist[&0], 1);
        assert_eq!(dist[&1], 2);
    }
}
