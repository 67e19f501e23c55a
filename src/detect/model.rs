use anyhow::Result;
use image::RgbImage;

use crate::detect::result::Detection;

/// Object-detection model boundary.
///
/// The model is an external collaborator: given a decoded raster it returns
/// a detection list and nothing else. Implementations must behave as pure
/// functions over the pipeline's data (no record-store or media writes);
/// internal state such as a warmed inference session is fine.
pub trait DetectionModel: Send {
    /// Backend identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Run detection on a decoded image.
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
