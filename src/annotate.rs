//! Detection overlay drawing.
//!
//! Pure transformation: draws each detection's box and a `<class> <conf>`
//! label onto a copy of the source raster. File writing stays with the
//! pipeline. With no detections the copy is pixel-identical to the input.

use ab_glyph::{FontRef, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detect::Detection;

const BORDER_THICKNESS: u32 = 2;
const LABEL_FONT_SIZE: f32 = 14.0;
const LABEL_TAG_HEIGHT: u32 = 16;
// rough per-character width estimate for sizing the tag background
const LABEL_CHAR_WIDTH: f32 = 7.5;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 1;

static FONT_BYTES: &[u8] = include_bytes!("../assets/font.ttf");

#[derive(Clone)]
pub struct Annotator {
    box_color: Rgb<u8>,
    text_color: Rgb<u8>,
    font: FontRef<'static>,
    scale: PxScale,
}

impl Default for Annotator {
    fn default() -> Self {
        let font = FontRef::try_from_slice(FONT_BYTES).expect("embedded font parses");
        Self {
            box_color: Rgb([0, 0, 255]),
            text_color: Rgb([255, 255, 255]),
            font,
            scale: PxScale::from(LABEL_FONT_SIZE),
        }
    }
}

impl Annotator {
    /// Returns a copy of `image` with every detection drawn on it. Boxes
    /// fully outside the raster are skipped rather than clamped into view.
    pub fn annotate(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut out = image.clone();
        for detection in detections {
            self.draw_detection(&mut out, detection);
        }
        out
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let Some((x0, y0, x1, y1)) = detection.bbox.clamped(image.width(), image.height()) else {
            return;
        };

        for inset in 0..BORDER_THICKNESS {
            let left = x0 + inset;
            let top = y0 + inset;
            let right = x1.saturating_sub(inset);
            let bottom = y1.saturating_sub(inset);
            if left >= right || top >= bottom {
                break;
            }
            draw_hollow_rect_mut(
                image,
                Rect::at(left as i32, top as i32).of_size(right - left + 1, bottom - top + 1),
                self.box_color,
            );
        }

        let label = format!("{} {:.2}", detection.label, detection.confidence);
        self.draw_label(image, &label, x0, y0);
    }

    /// Filled tag above the box's top-left corner (or folded inside when
    /// the box touches the top edge), text on top.
    fn draw_label(&self, image: &mut RgbImage, text: &str, x0: u32, y0: u32) {
        let tag_width = (text.chars().count() as f32 * LABEL_CHAR_WIDTH) as u32;
        if tag_width == 0 {
            return;
        }
        let tag_x = x0.min(image.width().saturating_sub(1));
        let tag_y = y0.saturating_sub(LABEL_TAG_HEIGHT);

        let visible_width = tag_width.min(image.width() - tag_x);
        let visible_height = LABEL_TAG_HEIGHT.min(image.height().saturating_sub(tag_y));
        if visible_width == 0 || visible_height == 0 {
            return;
        }
        draw_filled_rect_mut(
            image,
            Rect::at(tag_x as i32, tag_y as i32).of_size(visible_width, visible_height),
            self.box_color,
        );
        draw_text_mut(
            image,
            self.text_color,
            tag_x as i32,
            tag_y as i32 + LABEL_TEXT_VERTICAL_PADDING,
            self.scale,
            &self.font,
            text,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn sample_image() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| Rgb([x as u8, y as u8, 128]))
    }

    #[test]
    fn empty_detections_return_pixel_identical_copy() {
        let image = sample_image();
        let annotated = Annotator::default().annotate(&image, &[]);
        assert_eq!(annotated, image);
    }

    #[test]
    fn input_image_is_never_mutated() {
        let image = sample_image();
        let before = image.clone();
        let detections = vec![Detection::new(
            "kaleng",
            0.91,
            BoundingBox::new(8.0, 20.0, 40.0, 44.0),
        )];
        let annotated = Annotator::default().annotate(&image, &detections);
        assert_eq!(image, before);
        assert_ne!(annotated, image);
    }

    #[test]
    fn box_border_pixels_take_the_box_color() {
        let image = sample_image();
        let detections = vec![Detection::new(
            "kaleng",
            0.91,
            BoundingBox::new(8.0, 20.0, 40.0, 44.0),
        )];
        let annotated = Annotator::default().annotate(&image, &detections);
        assert_eq!(*annotated.get_pixel(8, 20), Rgb([0, 0, 255]));
        assert_eq!(*annotated.get_pixel(40, 44), Rgb([0, 0, 255]));
        // interior stays untouched
        assert_eq!(*annotated.get_pixel(24, 32), *image.get_pixel(24, 32));
    }

    #[test]
    fn label_text_renders_for_any_characters() {
        // two labels of equal width that differ only in glyphs outside
        // the catalog's `[a-z0-9_]` shape must produce different tags
        let image = sample_image();
        let bbox = BoundingBox::new(8.0, 20.0, 40.0, 44.0);
        let a = Annotator::default().annotate(&image, &[Detection::new("(((", 0.5, bbox)]);
        let b = Annotator::default().annotate(&image, &[Detection::new(")))", 0.5, bbox)]);
        assert_ne!(a, b);
        assert_ne!(a, image);
    }

    #[test]
    fn out_of_frame_boxes_are_skipped() {
        let image = sample_image();
        let detections = vec![Detection::new(
            "kaleng",
            0.5,
            BoundingBox::new(100.0, 100.0, 120.0, 130.0),
        )];
        let annotated = Annotator::default().annotate(&image, &detections);
        assert_eq!(annotated, image);
    }

    #[test]
    fn label_at_top_edge_does_not_panic() {
        let image = sample_image();
        let detections = vec![Detection::new(
            "botol_plastik",
            1.0,
            BoundingBox::new(0.0, 0.0, 30.0, 10.0),
        )];
        let annotated = Annotator::default().annotate(&image, &detections);
        assert_ne!(annotated, image);
    }
}
