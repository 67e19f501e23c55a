//! Detection-count reduction.
//!
//! Reduces a detection list to a per-class count table over the full
//! catalog: unseen classes count as zero, and a label outside the catalog
//! is a data-integrity error rather than being dropped.

use crate::catalog::ClassCatalog;
use crate::detect::Detection;
use crate::error::UnknownClassError;

/// Per-class counts in catalog order. Every catalog label is present; the
/// sum of all counts equals the number of detections that produced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCountTable {
    labels: Vec<String>,
    counts: Vec<u64>,
}

impl ClassCountTable {
    fn zeroed(catalog: &ClassCatalog) -> Self {
        Self {
            labels: catalog.labels().to_vec(),
            counts: vec![0; catalog.len()],
        }
    }

    pub fn get(&self, label: &str) -> Option<u64> {
        let idx = self.labels.iter().position(|l| l == label)?;
        Some(self.counts[idx])
    }

    /// `(label, count)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.counts.iter().copied())
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Labels with a non-zero count, for compact log lines.
    pub fn non_zero(&self) -> impl Iterator<Item = (&str, u64)> {
        self.iter().filter(|(_, count)| *count > 0)
    }
}

/// Reduces `detections` to a [`ClassCountTable`] over `catalog`.
/// Deterministic in the multiset of labels; no side effects.
pub fn count_classes(
    detections: &[Detection],
    catalog: &ClassCatalog,
) -> Result<ClassCountTable, UnknownClassError> {
    let mut table = ClassCountTable::zeroed(catalog);
    for detection in detections {
        let idx = catalog
            .index_of(&detection.label)
            .ok_or_else(|| UnknownClassError(detection.label.clone()))?;
        table.counts[idx] += 1;
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(label: &str) -> Detection {
        Detection::new(label, 0.8, BoundingBox::new(0.0, 0.0, 10.0, 10.0))
    }

    fn catalog() -> ClassCatalog {
        ClassCatalog::new(vec![
            "botol_plastik".to_string(),
            "kaleng".to_string(),
            "kardus".to_string(),
        ])
        .unwrap()
    }

    #[test]
    fn counts_sum_to_detection_count() {
        let detections = vec![
            det("kaleng"),
            det("botol_plastik"),
            det("kaleng"),
            det("kaleng"),
        ];
        let table = count_classes(&detections, &catalog()).unwrap();
        assert_eq!(table.total(), detections.len() as u64);
        assert_eq!(table.get("kaleng"), Some(3));
        assert_eq!(table.get("botol_plastik"), Some(1));
    }

    #[test]
    fn every_catalog_label_is_present_with_zero_default() {
        let table = count_classes(&[], &catalog()).unwrap();
        assert_eq!(table.total(), 0);
        let pairs: Vec<_> = table.iter().collect();
        assert_eq!(
            pairs,
            vec![("botol_plastik", 0), ("kaleng", 0), ("kardus", 0)]
        );
        assert_eq!(table.non_zero().count(), 0);
    }

    #[test]
    fn table_keys_follow_catalog_order() {
        let detections = vec![det("kardus"), det("botol_plastik")];
        let table = count_classes(&detections, &catalog()).unwrap();
        let labels: Vec<_> = table.iter().map(|(label, _)| label).collect();
        assert_eq!(labels, vec!["botol_plastik", "kaleng", "kardus"]);
    }

    #[test]
    fn unknown_label_is_an_error_not_a_drop() {
        let detections = vec![det("kaleng"), det("piring")];
        let err = count_classes(&detections, &catalog()).unwrap_err();
        assert_eq!(err, UnknownClassError("piring".to_string()));
    }

    #[test]
    fn unlisted_label_lookup_is_none() {
        let table = count_classes(&[], &catalog()).unwrap();
        assert_eq!(table.get("piring"), None);
    }
}
