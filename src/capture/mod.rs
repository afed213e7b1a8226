//! Screenshot capture of the interactive surface, cropped to the region the
//! vision model should look at.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::DynamicImage;
use uuid::Uuid;

use crate::browser::Surface;
use crate::common::{CropRect, Point};
use crate::error::BrowserError;
use crate::landmarks::Landmark;

/// A screenshot plus the crop rectangle it was taken from, relative to the
/// full interactive surface.
///
/// Landmark pixel coordinates are interpreted against this capture's own
/// width and height; [`ViewportCapture::to_surface`] adds the crop offset
/// back in to produce an actionable surface position.
#[derive(Clone)]
pub struct ViewportCapture {
    image: Arc<DynamicImage>,
    crop: CropRect,
    captured_at: DateTime<Utc>,
    id: Uuid,
}

impl ViewportCapture {
    pub fn new(image: DynamicImage, crop: CropRect) -> Self {
        Self {
            image: Arc::new(image),
            crop,
            captured_at: Utc::now(),
            id: Uuid::new_v4(),
        }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn width(&self) -> u32 {
        self.crop.width
    }

    pub fn height(&self) -> u32 {
        self.crop.height
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Translates a landmark detected on this capture into full-surface
    /// coordinates. Skipping this offset would misplace every marker by the
    /// crop origin.
    pub fn to_surface(&self, landmark: Landmark) -> Point {
        self.crop.to_surface(landmark.x, landmark.y)
    }

    #[cfg(test)]
    pub(crate) fn for_testing(width: u32, height: u32, crop: CropRect) -> Self {
        let image = DynamicImage::ImageRgb8(image::ImageBuffer::from_pixel(
            width.max(1),
            height.max(1),
            image::Rgb([127, 127, 127]),
        ));
        Self {
            image: Arc::new(image),
            crop,
            captured_at: Utc::now(),
            id: Uuid::new_v4(),
        }
    }
}

/// Captures the surface and crops it to a named region.
pub struct CaptureService;

impl CaptureService {
    /// Takes a full-surface screenshot and crops it to the bounding box of
    /// `selector`, clamping the box to the screenshot's bounds.
    pub async fn capture_region(
        surface: &mut dyn Surface,
        selector: &str,
    ) -> Result<ViewportCapture, BrowserError> {
        let region = surface.region_of(selector).await?;
        let full = surface.screenshot().await?;
        Ok(Self::crop_to(full, region))
    }

    pub async fn capture_full(surface: &mut dyn Surface) -> Result<ViewportCapture, BrowserError> {
        let full = surface.screenshot().await?;
        let crop = CropRect::new(0, 0, full.width(), full.height());
        Ok(ViewportCapture::new(full, crop))
    }

    fn crop_to(full: DynamicImage, region: CropRect) -> ViewportCapture {
        let x = region.x.min(full.width().saturating_sub(1));
        let y = region.y.min(full.height().saturating_sub(1));
        let width = region.width.min(full.width() - x).max(1);
        let height = region.height.min(full.height() - y).max(1);
        let crop = CropRect::new(x, y, width, height);
        let cropped = full.crop_imm(x, y, width, height);
        ViewportCapture::new(cropped, crop)
    }
}

#[cfg(test)]
mod tests {
    use image::{GenericImageView, ImageBuffer, Rgb};

    use super::*;

    fn gradient_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        }))
    }

    #[test]
    fn crop_keeps_offset_and_trims_pixels() {
        let capture = CaptureService::crop_to(gradient_image(400, 300), CropRect::new(100, 40, 200, 150));
        assert_eq!(capture.crop(), CropRect::new(100, 40, 200, 150));
        assert_eq!(capture.image().dimensions(), (200, 150));
        // Top-left pixel of the crop is the (100, 40) pixel of the source.
        let px = capture.image().get_pixel(0, 0);
        assert_eq!(px.0[0], 100);
        assert_eq!(px.0[1], 40);
    }

    #[test]
    fn crop_is_clamped_to_the_screenshot() {
        let capture = CaptureService::crop_to(gradient_image(400, 300), CropRect::new(350, 280, 200, 150));
        assert_eq!(capture.crop(), CropRect::new(350, 280, 50, 20));
        assert_eq!(capture.image().dimensions(), (50, 20));
    }

    #[test]
    fn landmark_translation_adds_the_crop_offset() {
        let capture = ViewportCapture::for_testing(800, 600, CropRect::new(100, 40, 800, 600));
        let p = capture.to_surface(Landmark::new(50, 30));
        assert_eq!(p, Point::new(150.0, 70.0));
    }
}
