//! Collection of nucleus descriptors across all fields of view.

use std::collections::HashMap;
use std::path::Path;

use csv::WriterBuilder;

use crate::error::Result;
use crate::nucleus::{NuclearFeature, NuclearSummary, Nucleus};

/// Identity of a nucleus: field of view and label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize)]
pub struct NucleusKey {
    pub fov: u32,
    pub label: u32,
}

/// Nuclei in insertion order, addressable by [`NucleusKey`].
///
/// Filled by the driver after the parallel barrier; workers never touch it.
#[derive(Debug, Default)]
pub struct NucleusRegistry {
    nuclei: Vec<Nucleus>,
    index: HashMap<NucleusKey, usize>,
}

impl NucleusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the nuclei of one field of view.
    pub fn extend(&mut self, nuclei: impl IntoIterator<Item = Nucleus>) {
        for n in nuclei {
            let key = NucleusKey {
                fov: n.fov,
                label: n.label,
            };
            if self.index.insert(key, self.nuclei.len()).is_some() {
                tracing::warn!("Nucleus {}.{} registered twice", key.fov, key.label);
            }
            self.nuclei.push(n);
        }
    }

    pub fn len(&self) -> usize {
        self.nuclei.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nuclei.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nucleus> {
        self.nuclei.iter()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: NucleusKey) -> Option<&Nucleus> {
        self.index.get(&key).map(|&i| &self.nuclei[i])
    }

    /// One feature across all nuclei, in registry order.
    pub fn feature_values(&self, feature: NuclearFeature) -> Vec<f64> {
        self.nuclei.iter().map(|n| n.summary.feature(feature)).collect()
    }

    pub fn summaries(&self) -> impl Iterator<Item = &NuclearSummary> {
        self.nuclei.iter().map(|n| &n.summary)
    }

    /// Write the nuclear summary table, tab-delimited.
    pub fn write_summary_tsv(&self, path: &Path) -> Result<()> {
        let mut w = WriterBuilder::new().delimiter(b'\t').from_path(path)?;
        for s in self.summaries() {
            w.serialize(s)?;
        }
        w.flush()?;
        tracing::info!("Wrote {} nuclear summaries to {}", self.len(), path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::nucleus_with_summary;

    #[test]
    fn lookup_by_field_and_label() {
        let mut reg = NucleusRegistry::new();
        reg.extend(vec![
            nucleus_with_summary(2, 1, 10.0, 100.0),
            nucleus_with_summary(2, 2, 12.0, 90.0),
        ]);
        reg.extend(vec![nucleus_with_summary(1, 1, 11.0, 80.0)]);
        assert_eq!(reg.len(), 3);
        let n = reg.get(NucleusKey { fov: 2, label: 2 }).unwrap();
        assert_eq!(n.summary.flat_size, 12.0);
        assert!(reg.get(NucleusKey { fov: 3, label: 1 }).is_none());
        assert_eq!(reg.feature_values(NuclearFeature::SumI), vec![100.0, 90.0, 80.0]);
    }

    #[test]
    fn summary_table_has_header_and_one_row_per_nucleus() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nuclei.tsv");
        let mut reg = NucleusRegistry::new();
        reg.extend(vec![
            nucleus_with_summary(1, 1, 10.0, 100.0),
            nucleus_with_summary(1, 2, 12.0, 90.0),
        ]);
        reg.write_summary_tsv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("s\tn\tflat_size\tsize\tvolume\tsum_i"));
        assert!(lines[2].starts_with("1\t2\t12"));
    }
}
