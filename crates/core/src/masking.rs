//! Face masking and cropping over decoded images.
//!
//! The masking policy is a flat fill of each face's bounding box — no
//! inpainting. Both operations clamp boxes to the image bounds first, so
//! detector output that extends past the edges is safe.

use image::{Rgb, RgbImage};

use crate::error::CoreError;
use crate::face::BoundingBox;

/// Fill color used to blank out face regions.
const MASK_FILL: Rgb<u8> = Rgb([0, 0, 0]);

/// Blank every given face region in place with a flat fill.
///
/// Boxes outside the image are clamped; empty boxes are skipped.
pub fn mask_faces(img: &mut RgbImage, boxes: &[BoundingBox]) {
    let (width, height) = img.dimensions();
    for bbox in boxes {
        let clamped = bbox.clamped(width, height);
        if clamped.is_empty() {
            continue;
        }
        for y in clamped.y1 as u32..clamped.y2 as u32 {
            for x in clamped.x1 as u32..clamped.x2 as u32 {
                img.put_pixel(x, y, MASK_FILL);
            }
        }
    }
}

/// Extract the face region described by `bbox` as a new image.
///
/// Fails when the clamped region is empty (the face lies entirely outside
/// the image), which indicates corrupt detection data.
pub fn crop_face(img: &RgbImage, bbox: &BoundingBox) -> Result<RgbImage, CoreError> {
    let (width, height) = img.dimensions();
    let clamped = bbox.clamped(width, height);
    if clamped.is_empty() {
        return Err(CoreError::Validation(format!(
            "face region [{}, {}, {}, {}] lies outside a {width}x{height} image",
            bbox.x1, bbox.y1, bbox.x2, bbox.y2,
        )));
    }
    let crop = image::imageops::crop_imm(
        img,
        clamped.x1 as u32,
        clamped.y1 as u32,
        clamped.width(),
        clamped.height(),
    );
    Ok(crop.to_image())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, color: Rgb<u8>) -> RgbImage {
        RgbImage::from_pixel(width, height, color)
    }

    #[test]
    fn mask_blanks_exactly_the_box() {
        let mut img = solid(10, 10, Rgb([200, 200, 200]));
        mask_faces(&mut img, &[BoundingBox::new(2, 2, 5, 5)]);

        assert_eq!(*img.get_pixel(2, 2), MASK_FILL);
        assert_eq!(*img.get_pixel(4, 4), MASK_FILL);
        // Exclusive bottom-right corner: (5,5) is untouched.
        assert_eq!(*img.get_pixel(5, 5), Rgb([200, 200, 200]));
        assert_eq!(*img.get_pixel(0, 0), Rgb([200, 200, 200]));
    }

    #[test]
    fn mask_clamps_overflowing_box() {
        let mut img = solid(4, 4, Rgb([10, 10, 10]));
        mask_faces(&mut img, &[BoundingBox::new(-3, -3, 99, 99)]);
        for p in img.pixels() {
            assert_eq!(*p, MASK_FILL);
        }
    }

    #[test]
    fn mask_skips_box_fully_outside() {
        let mut img = solid(4, 4, Rgb([10, 10, 10]));
        mask_faces(&mut img, &[BoundingBox::new(50, 50, 60, 60)]);
        for p in img.pixels() {
            assert_eq!(*p, Rgb([10, 10, 10]));
        }
    }

    #[test]
    fn mask_handles_multiple_faces() {
        let mut img = solid(10, 10, Rgb([10, 10, 10]));
        mask_faces(
            &mut img,
            &[BoundingBox::new(0, 0, 2, 2), BoundingBox::new(8, 8, 10, 10)],
        );
        assert_eq!(*img.get_pixel(1, 1), MASK_FILL);
        assert_eq!(*img.get_pixel(9, 9), MASK_FILL);
        assert_eq!(*img.get_pixel(5, 5), Rgb([10, 10, 10]));
    }

    #[test]
    fn crop_returns_region_of_requested_size() {
        let img = solid(20, 20, Rgb([1, 2, 3]));
        let crop = crop_face(&img, &BoundingBox::new(5, 5, 15, 12)).unwrap();
        assert_eq!(crop.dimensions(), (10, 7));
    }

    #[test]
    fn crop_outside_image_is_an_error() {
        let img = solid(10, 10, Rgb([1, 2, 3]));
        assert!(crop_face(&img, &BoundingBox::new(30, 30, 40, 40)).is_err());
    }
}
