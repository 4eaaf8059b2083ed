use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use tracing::info;

use crate::error::{PipelineError, Result};

/// Class index to crop label, in the order the classifier was trained with.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelIndex {
    labels: Vec<String>,
}

impl LabelIndex {
    pub fn new(labels: Vec<String>) -> Self {
        Self { labels }
    }

    /// `.json` holds the labels in index order; anything else is read as the training CSV.
    pub fn load(path: &Path, column: &str) -> Result<Self> {
        let index = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let labels: Vec<String> = serde_json::from_reader(File::open(path)?)?;
                Self::new(labels)
            }
            _ => Self::from_training_csv(File::open(path)?, column)?,
        };

        info!("Loaded {} crop labels from {}", index.len(), path.display());
        Ok(index)
    }

    /// Sorted distinct values of `column`, trimmed. This is how a label encoder fitted on
    /// the training table numbers its classes.
    pub fn from_training_csv<R: Read>(reader: R, column: &str) -> Result<Self> {
        let mut csv_reader = csv::Reader::from_reader(reader);
        let position = csv_reader
            .headers()?
            .iter()
            .position(|h| h.trim() == column)
            .ok_or_else(|| {
                PipelineError::ReferenceDataError(format!("column '{}' not found", column))
            })?;

        let mut distinct = BTreeSet::new();
        for record in csv_reader.records() {
            let record = record?;
            if let Some(value) = record.get(position) {
                let value = value.trim();
                if !value.is_empty() {
                    distinct.insert(value.to_string());
                }
            }
        }

        Ok(Self::new(distinct.into_iter().collect()))
    }

    pub fn decode(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Reads `{"0": "Clay_Trained", "1": "Loamy_Trained", ...}` into an index-ordered list.
pub fn load_class_labels(path: &Path) -> Result<Vec<String>> {
    let raw: BTreeMap<String, String> = serde_json::from_reader(File::open(path)?)?;
    class_labels_from_map(raw)
}

fn class_labels_from_map(raw: BTreeMap<String, String>) -> Result<Vec<String>> {
    let mut indexed = BTreeMap::new();
    for (key, name) in raw {
        let idx: usize = key.trim().parse().map_err(|_| {
            PipelineError::ConfigError(format!("class label key '{}' is not an index", key))
        })?;
        indexed.insert(idx, name);
    }

    let labels: Vec<String> = indexed.values().cloned().collect();
    if indexed.keys().enumerate().any(|(pos, idx)| pos != *idx) {
        return Err(PipelineError::ConfigError(
            "class label indices must be contiguous from 0".to_string(),
        ));
    }

    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_csv_is_sorted_and_distinct() {
        let csv = "N,P,K,ph,label\n90,42,43,6.5,rice\n20,30,10,7.0, maize\n85,58,41,7.0,rice\n40,60,80,6.0,banana\n";
        let index = LabelIndex::from_training_csv(csv.as_bytes(), "label").unwrap();

        assert_eq!(index.len(), 3);
        assert_eq!(index.decode(0), Some("banana"));
        assert_eq!(index.decode(1), Some("maize"));
        assert_eq!(index.decode(2), Some("rice"));
        assert_eq!(index.decode(3), None);
    }

    #[test]
    fn test_missing_label_column() {
        let csv = "N,P,K,ph,crop\n1,2,3,4,rice\n";
        assert!(matches!(
            LabelIndex::from_training_csv(csv.as_bytes(), "label"),
            Err(PipelineError::ReferenceDataError(_))
        ));
    }

    #[test]
    fn test_json_label_files() {
        let dir = tempfile::tempdir().unwrap();

        let crops = dir.path().join("crop_labels.json");
        std::fs::write(&crops, r#"["apple", "coffee", "no_crop"]"#).unwrap();
        let index = LabelIndex::load(&crops, "label").unwrap();
        assert_eq!(index.decode(2), Some("no_crop"));

        let classes = dir.path().join("class_labels.json");
        std::fs::write(&classes, r#"{"1": "Loamy_Trained", "0": "Clay_Trained", "10": "Silt_Trained", "2": "x", "3": "x", "4": "x", "5": "x", "6": "x", "7": "x", "8": "x", "9": "x"}"#).unwrap();
        let labels = load_class_labels(&classes).unwrap();
        assert_eq!(labels[0], "Clay_Trained");
        assert_eq!(labels[1], "Loamy_Trained");
        assert_eq!(labels[10], "Silt_Trained");
    }

    #[test]
    fn test_class_labels_must_be_contiguous() {
        let mut raw = BTreeMap::new();
        raw.insert("0".to_string(), "Clay".to_string());
        raw.insert("2".to_string(), "Silt".to_string());
        assert!(class_labels_from_map(raw).is_err());
    }
}
