use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use soilsense_common::utils::canonical_label;
use tracing::info;

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, Default, PartialEq)]
struct Relationships {
    companions: Vec<String>,
    avoids: Vec<String>,
}

/// Companion and antagonist crops keyed by lowercase crop name. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct RelationshipTable {
    entries: HashMap<String, Relationships>,
}

impl RelationshipTable {
    pub fn load(path: &Path) -> Result<Self> {
        let table = Self::from_reader(File::open(path)?)?;
        info!("Loaded companion/avoid data for {} crops from {}", table.len(), path.display());
        Ok(table)
    }

    /// Expects `Crops`, `Helps` and `Avoid` columns; list cells are comma separated.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = csv_reader.headers()?.iter().map(|h| h.trim().to_string()).collect();

        let column = |name: &str| -> Result<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                PipelineError::ReferenceDataError(format!("relationship table has no '{}' column", name))
            })
        };
        let crops_col = column("Crops")?;
        let helps_col = column("Helps").ok();
        let avoid_col = column("Avoid").ok();

        let mut entries = HashMap::new();
        for record in csv_reader.records() {
            let record = record?;
            let crop = canonical_label(record.get(crops_col).unwrap_or_default());
            if crop.is_empty() {
                continue;
            }

            let list = |col: Option<usize>| col.and_then(|c| record.get(c)).map(split_crop_list).unwrap_or_default();
            entries.insert(
                crop,
                Relationships {
                    companions: list(helps_col),
                    avoids: list(avoid_col),
                },
            );
        }

        Ok(Self { entries })
    }

    /// Case-insensitive. Unknown crops have no companions and nothing to avoid.
    pub fn lookup(&self, crop_label: &str) -> (Vec<String>, Vec<String>) {
        match self.entries.get(&canonical_label(crop_label)) {
            Some(rel) => (rel.companions.clone(), rel.avoids.clone()),
            None => (Vec::new(), Vec::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn split_crop_list(cell: &str) -> Vec<String> {
    cell.split(',')
        .map(canonical_label)
        .filter(|name| !name.is_empty())
        .collect()
}
