//! Conversion from relative marking space to native page space.
//!
//! A marked region is stored relative to the rendered page (origin top-left,
//! Y down, independent of zoom). Text fragments live in native space (origin
//! bottom-left, Y up, scale 1.0). The conversion goes through rendered pixel
//! space so the scale used for the current render is honored.

use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::models::rules::MarkedRegion;
use crate::pdf::PageText;

/// Native and rendered dimensions of the same page.
///
/// Recomputed for every render and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    pub native_width: f32,
    pub native_height: f32,
    pub rendered_width: f32,
    pub rendered_height: f32,
}

impl RenderContext {
    pub fn new(native_width: f32, native_height: f32, rendered_width: f32, rendered_height: f32) -> Self {
        Self {
            native_width,
            native_height,
            rendered_width,
            rendered_height,
        }
    }

    /// Context for a page rendered at `scale`.
    pub fn for_page(page: &PageText, scale: f32) -> Self {
        let viewport = page.viewport(scale);
        Self::new(page.width, page.height, viewport.width, viewport.height)
    }

    /// Context for a page rendered into a canvas of the given size.
    pub fn for_canvas(page: &PageText, rendered_width: f32, rendered_height: f32) -> Self {
        Self::new(page.width, page.height, rendered_width, rendered_height)
    }

    /// Rendered-to-native scale, assumed uniform on both axes.
    pub fn scale_factor(&self) -> f32 {
        self.rendered_width / self.native_width
    }

    /// Check that the dimensions can be converted between.
    ///
    /// `aspect_tolerance` is the allowed relative difference between the
    /// native and rendered aspect ratios.
    pub fn validate(&self, aspect_tolerance: f32) -> Result<(), GeometryError> {
        for (which, value) in [
            ("native width", self.native_width),
            ("native height", self.native_height),
            ("rendered width", self.rendered_width),
            ("rendered height", self.rendered_height),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GeometryError::InvalidDimension { which, value });
            }
        }

        let native = self.native_width / self.native_height;
        let rendered = self.rendered_width / self.rendered_height;
        if ((native - rendered) / native).abs() > aspect_tolerance {
            return Err(GeometryError::AspectMismatch { native, rendered });
        }

        Ok(())
    }
}

/// Axis-aligned rectangle in native page space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NativeRect {
    pub x_min: f32,
    pub x_max: f32,
    pub y_bottom: f32,
    pub y_top: f32,
}

impl NativeRect {
    /// Build from two corners in any order.
    pub fn from_corners(a: (f32, f32), b: (f32, f32)) -> Self {
        Self {
            x_min: a.0.min(b.0),
            x_max: a.0.max(b.0),
            y_bottom: a.1.min(b.1),
            y_top: a.1.max(b.1),
        }
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_top - self.y_bottom
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_bottom + self.y_top) / 2.0,
        )
    }

    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_bottom && y <= self.y_top
    }

    /// Whether a `(x_min, y_min, x_max, y_max)` box intersects this one.
    pub fn intersects(&self, bounds: (f32, f32, f32, f32)) -> bool {
        let (x0, y0, x1, y1) = bounds;
        x0 <= self.x_max && x1 >= self.x_min && y0 <= self.y_top && y1 >= self.y_bottom
    }

    /// Grow by `margin` on every side.
    pub fn expand(&self, margin: f32) -> Self {
        Self {
            x_min: self.x_min - margin,
            x_max: self.x_max + margin,
            y_bottom: self.y_bottom - margin,
            y_top: self.y_top + margin,
        }
    }
}

/// Convert a marked region into native page space.
pub fn region_to_native(
    region: &MarkedRegion,
    ctx: &RenderContext,
    aspect_tolerance: f32,
) -> Result<NativeRect, GeometryError> {
    if !region.has_area() {
        return Err(GeometryError::DegenerateRegion {
            field: region.field_name.clone(),
        });
    }
    ctx.validate(aspect_tolerance)?;

    let scale = ctx.scale_factor();

    // Relative -> rendered pixels
    let px_x = region.x * ctx.rendered_width;
    let px_y = region.y * ctx.rendered_height;
    let px_w = region.width * ctx.rendered_width;
    let px_h = region.height * ctx.rendered_height;

    // Rendered pixels -> native, flipping Y about the page height
    let left = px_x / scale;
    let right = (px_x + px_w) / scale;
    let top = ctx.native_height - px_y / scale;
    let bottom = ctx.native_height - (px_y + px_h) / scale;

    Ok(NativeRect::from_corners((left, top), (right, bottom)))
}
