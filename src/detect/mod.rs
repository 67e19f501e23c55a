mod model;
mod result;
mod stub;

pub use model::DetectionModel;
pub use result::{BoundingBox, Detection};
pub use stub::StubModel;
