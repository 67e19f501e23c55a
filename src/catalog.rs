//! The fixed, closed catalog of recognized object classes.
//!
//! The counting and annotation logic only works against a known, ordered
//! label set. The catalog is deployment configuration, not a hard-coded
//! constant; the reference deployment ships 28 waste classes.

use anyhow::{anyhow, Result};
use std::collections::HashSet;

/// Labels of the reference deployment's detection model, in model output
/// order.
pub const REFERENCE_LABELS: [&str; 28] = [
    "botol_plastik",
    "botol_kaca",
    "kaleng",
    "kantong_plastik",
    "gelas_plastik",
    "sedotan",
    "tutup_botol",
    "plastik_kemasan",
    "kemasan_makanan",
    "bungkus_rokok",
    "styrofoam",
    "kardus",
    "kertas",
    "koran",
    "daun",
    "ranting",
    "sisa_makanan",
    "kulit_buah",
    "popok",
    "masker",
    "kain",
    "sepatu",
    "karet",
    "ban",
    "baterai",
    "lampu",
    "elektronik",
    "logam",
];

/// Ordered, closed set of class labels. Order is the model's output order
/// and is preserved by [`crate::count::ClassCountTable`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassCatalog {
    labels: Vec<String>,
}

impl ClassCatalog {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("class catalog must not be empty"));
        }
        let mut seen = HashSet::new();
        for label in &labels {
            if label.trim().is_empty() {
                return Err(anyhow!("class catalog contains a blank label"));
            }
            if !seen.insert(label.as_str()) {
                return Err(anyhow!("class catalog contains duplicate label '{label}'"));
            }
        }
        Ok(Self { labels })
    }

    /// The 28-class catalog of the reference deployment.
    pub fn reference() -> Self {
        Self {
            labels: REFERENCE_LABELS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_catalog_has_28_classes() {
        let catalog = ClassCatalog::reference();
        assert_eq!(catalog.len(), 28);
        assert!(catalog.contains("botol_plastik"));
        assert!(catalog.contains("kaleng"));
        assert!(!catalog.contains("piring"));
    }

    #[test]
    fn catalog_preserves_configured_order() {
        let catalog =
            ClassCatalog::new(vec!["b".to_string(), "a".to_string(), "c".to_string()]).unwrap();
        assert_eq!(catalog.index_of("b"), Some(0));
        assert_eq!(catalog.index_of("a"), Some(1));
        assert_eq!(catalog.index_of("c"), Some(2));
    }

    #[test]
    fn catalog_rejects_duplicates_and_blanks() {
        assert!(ClassCatalog::new(vec![]).is_err());
        assert!(ClassCatalog::new(vec!["a".to_string(), "a".to_string()]).is_err());
        assert!(ClassCatalog::new(vec!["a".to_string(), " ".to_string()]).is_err());
    }
}
