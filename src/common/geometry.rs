use serde::{Deserialize, Serialize};

/// A position on the full interactive surface, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn lerp(self, other: Point, t: f64) -> Point {
        Point {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
        }
    }
}

/// Crop rectangle of a capture, relative to the full interactive surface.
///
/// Pixel coordinates inside the capture are relative to this rectangle's
/// origin; `to_surface` performs the mandatory offset translation back to
/// surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn to_surface(&self, x: u32, y: u32) -> Point {
        Point {
            x: (self.x + x) as f64,
            y: (self.y + y) as f64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_surface_is_a_pure_translation() {
        let crop = CropRect::new(100, 40, 800, 600);
        let p = crop.to_surface(50, 30);
        assert_eq!(p, Point::new(150.0, 70.0));
    }

    #[test]
    fn lerp_interpolates_between_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 20.0);
        assert_eq!(a.lerp(b, 0.5), Point::new(5.0, 10.0));
        assert_eq!(a.lerp(b, 1.0), b);
    }
}
