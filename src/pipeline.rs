//! The ingestion pipeline.
//!
//! One call per upload: decode, persist the original, insert the record,
//! run detection, reduce and grade, annotate, persist the labeled raster,
//! then apply the single follow-up record update. The sequence is not
//! transactional: the original file is written before the first database
//! write, and a failure between the insert and the update leaves a record
//! with empty detection fields. Both partial states are observable on
//! purpose (see the error taxonomy in [`crate::error`]).

use serde::{Deserialize, Serialize};

use crate::annotate::Annotator;
use crate::catalog::ClassCatalog;
use crate::count::count_classes;
use crate::detect::DetectionModel;
use crate::error::IngestError;
use crate::media::MediaStore;
use crate::severity::SeverityLevel;
use crate::storage::{DetectionUpdate, NewImageRecord, RecordStore};
use crate::{new_object_id, now_ms};

/// Uploads keep the reference system's fixed extension regardless of the
/// actual encoding; the bytes are stored untouched.
const ORIGINAL_EXT: &str = "jpg";

/// Outcome of a completed ingestion.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IngestionResult {
    pub record_id: i64,
    pub filename: String,
    pub filepath: String,
    pub labeled_filename: String,
    pub labeled_filepath: String,
    pub total_count: i64,
    pub severity: SeverityLevel,
}

pub struct IngestionPipeline {
    media: MediaStore,
    store: Box<dyn RecordStore>,
    model: Box<dyn DetectionModel>,
    catalog: ClassCatalog,
    annotator: Annotator,
}

impl IngestionPipeline {
    pub fn new(
        media: MediaStore,
        store: Box<dyn RecordStore>,
        model: Box<dyn DetectionModel>,
        catalog: ClassCatalog,
    ) -> Self {
        Self {
            media,
            store,
            model,
            catalog,
            annotator: Annotator::default(),
        }
    }

    /// Runs the full sequence for one upload. Concurrent calls for the
    /// same device are independent; the random filename and generated
    /// record id are the only cross-request coordination needed.
    pub fn ingest(&mut self, raw: &[u8], device_id: &str) -> Result<IngestionResult, IngestError> {
        // 1. Decode first: nothing is persisted for undecodable bytes.
        let decoded = image::load_from_memory(raw)
            .map_err(IngestError::Decode)?
            .to_rgb8();

        // 2. Original file, before any database write. No database row may
        //    reference a file that was never written.
        let filename = format!("{}.{ORIGINAL_EXT}", new_object_id());
        let filepath = self
            .media
            .save_original(&filename, raw)
            .map_err(|e| IngestError::Storage(e.into()))?;
        let filepath = filepath.to_string_lossy().into_owned();

        // 3. Initial record. From here on a failure leaves observable
        //    partial state (orphan file / record without detection fields).
        let uploaded_at_ms = now_ms().map_err(|_| IngestError::Clock)?;
        let record_id = self
            .store
            .insert_record(&NewImageRecord {
                filename: &filename,
                filepath: &filepath,
                device_id,
                uploaded_at_ms,
            })
            .map_err(IngestError::Persistence)?;

        // 4-5. Detect, reduce, grade.
        let detections = self.model.detect(&decoded).map_err(IngestError::Model)?;
        let counts = count_classes(&detections, &self.catalog)?;
        let total_count = counts.total() as i64;
        let severity = SeverityLevel::for_total(counts.total());

        // 6. Annotate and persist under a name derived from the record id,
        //    so reprocessing the same record would overwrite, not duplicate.
        let annotated = self.annotator.annotate(&decoded, &detections);
        let labeled_filename = format!("labeled_{record_id}.{ORIGINAL_EXT}");
        let labeled_filepath = self
            .media
            .save_labeled(&labeled_filename, &annotated)
            .map_err(IngestError::Storage)?;
        let labeled_filepath = labeled_filepath.to_string_lossy().into_owned();

        // 7. The single follow-up mutation.
        self.store
            .apply_detection_update(
                record_id,
                &DetectionUpdate {
                    labeled_filename: &labeled_filename,
                    labeled_filepath: &labeled_filepath,
                    total_count,
                    severity,
                },
            )
            .map_err(IngestError::Persistence)?;

        let summary: Vec<String> = counts
            .non_zero()
            .map(|(label, count)| format!("{label}={count}"))
            .collect();
        log::info!(
            "ingested record {record_id} device={device_id} model={} total={total_count} severity={severity} [{}]",
            self.model.name(),
            summary.join(" ")
        );

        Ok(IngestionResult {
            record_id,
            filename,
            filepath,
            labeled_filename,
            labeled_filepath,
            total_count,
            severity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, StubModel};
    use crate::storage::InMemoryStore;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn png_bytes() -> Vec<u8> {
        let image = RgbImage::from_pixel(64, 48, Rgb([90, 120, 60]));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn pipeline_with(
        dir: &tempfile::TempDir,
        store: InMemoryStore,
        script: Vec<Detection>,
    ) -> IngestionPipeline {
        let media =
            MediaStore::open(dir.path().join("images"), dir.path().join("labeled")).unwrap();
        IngestionPipeline::new(
            media,
            Box::new(store),
            Box::new(StubModel::with_detections(script)),
            ClassCatalog::reference(),
        )
    }

    #[test]
    fn labeled_filename_derives_from_record_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let script = vec![Detection::new(
            "kaleng",
            0.7,
            BoundingBox::new(1.0, 1.0, 20.0, 20.0),
        )];
        let mut pipeline = pipeline_with(&dir, store, script);
        let result = pipeline.ingest(&png_bytes(), "dev-9").unwrap();
        assert_eq!(
            result.labeled_filename,
            format!("labeled_{}.jpg", result.record_id)
        );
        assert!(result.filename.ends_with(".jpg"));
    }

    #[test]
    fn decode_failure_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let mut pipeline = pipeline_with(&dir, store.clone(), vec![]);
        let err = pipeline.ingest(b"definitely not an image", "dev-1");
        assert!(matches!(err, Err(IngestError::Decode(_))));
        assert!(store.list_records().unwrap().is_empty());
        let stored: Vec<_> = std::fs::read_dir(dir.path().join("images"))
            .unwrap()
            .collect();
        assert!(stored.is_empty());
    }

    #[test]
    fn unknown_class_leaves_partial_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let script = vec![Detection::new(
            "piring",
            0.9,
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
        )];
        let mut pipeline = pipeline_with(&dir, store.clone(), script);
        let err = pipeline.ingest(&png_bytes(), "dev-1");
        assert!(matches!(err, Err(IngestError::UnknownClass(_))));

        // step 3 committed, step 7 never ran: partial state is observable
        let records = store.list_records().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].total_count, None);
        assert_eq!(records[0].labeled_filename, None);
    }

    #[test]
    fn two_ingests_get_distinct_ids_and_filenames() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryStore::new();
        let mut pipeline = pipeline_with(&dir, store, vec![]);
        let a = pipeline.ingest(&png_bytes(), "dev-1").unwrap();
        let b = pipeline.ingest(&png_bytes(), "dev-1").unwrap();
        assert_ne!(a.record_id, b.record_id);
        assert_ne!(a.filename, b.filename);
        assert_ne!(a.labeled_filename, b.labeled_filename);
    }
}
