use anyhow::Result;
use image::RgbImage;

use crate::detect::model::DetectionModel;
use crate::detect::result::Detection;

/// Scripted stub model. Returns the same configured detection list for
/// every image; the default script is empty. Used in tests and in
/// deployments that have not wired a real inference backend yet.
#[derive(Clone, Debug, Default)]
pub struct StubModel {
    script: Vec<Detection>,
}

impl StubModel {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_detections(script: Vec<Detection>) -> Self {
        Self { script }
    }
}

impl DetectionModel for StubModel {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>> {
        Ok(self.script.clone())
    }
}
