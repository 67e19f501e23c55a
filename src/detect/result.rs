use serde::{Deserialize, Serialize};

/// One detection emitted by the model for a single image. No identity
/// beyond its position in the detection list.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Detection {
    /// Class label; must come from the configured catalog.
    pub label: String,
    /// Confidence in `0..=1`.
    pub confidence: f32,
    /// Box in pixel space of the source image.
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: impl Into<String>, confidence: f32, bbox: BoundingBox) -> Self {
        Self {
            label: label.into(),
            confidence,
            bbox,
        }
    }
}

/// Axis-aligned box in source-image pixel coordinates.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Clamps to an image of the given dimensions, returning integer pixel
    /// corners, or `None` when nothing of the box lies inside the image.
    pub fn clamped(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if width == 0 || height == 0 {
            return None;
        }
        let max_x = (width - 1) as f32;
        let max_y = (height - 1) as f32;
        let x0 = self.x_min.floor().clamp(0.0, max_x) as u32;
        let y0 = self.y_min.floor().clamp(0.0, max_y) as u32;
        let x1 = self.x_max.ceil().clamp(0.0, max_x) as u32;
        let y1 = self.y_max.ceil().clamp(0.0, max_y) as u32;
        if x0 >= x1 || y0 >= y1 {
            return None;
        }
        Some((x0, y0, x1, y1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamping_keeps_boxes_inside_the_image() {
        let bbox = BoundingBox::new(-10.0, 5.0, 700.0, 60.5);
        assert_eq!(bbox.clamped(640, 480), Some((0, 5, 639, 61)));
    }

    #[test]
    fn degenerate_boxes_clamp_to_none() {
        assert_eq!(BoundingBox::new(10.0, 10.0, 10.0, 10.0).clamped(64, 64), None);
        assert_eq!(BoundingBox::new(100.0, 100.0, 120.0, 120.0).clamped(64, 64), None);
        assert_eq!(BoundingBox::new(0.0, 0.0, 5.0, 5.0).clamped(0, 0), None);
    }
}
