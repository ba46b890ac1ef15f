//! Raster surface and vector geometry helpers.

use std::path::Path;

use image::{ImageFormat, RgbaImage};
use tiny_skia::{
    Color, FillRule, LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke,
    Transform as Matrix,
};

use super::value::BezierPath;
use crate::domain::{ConversionError, ConversionResult};

/// Circle approximation constant for cubic Bézier arcs.
const KAPPA: f32 = 0.552_284_8;

/// Owned RGBA drawing surface, one per conversion.
pub struct RenderContext {
    surface: Pixmap,
}

impl RenderContext {
    /// Allocates a transparent `width` x `height` surface.
    ///
    /// # Errors
    /// Returns `RenderFailure` if either dimension is zero.
    pub fn new(width: u32, height: u32) -> ConversionResult<Self> {
        let surface = Pixmap::new(width, height).ok_or_else(|| {
            ConversionError::render(format!("cannot allocate {width}x{height} surface"))
        })?;
        Ok(Self { surface })
    }

    /// Surface width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.surface.width()
    }

    /// Surface height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.surface.height()
    }

    /// Resets every pixel to transparent.
    pub fn clear(&mut self) {
        self.surface.fill(Color::TRANSPARENT);
    }

    /// Fills `path` with `rgba`, skipping fully transparent paints.
    pub fn fill(&mut self, path: &tiny_skia::Path, rgba: [f32; 4], rule: FillRule, matrix: Matrix) {
        if let Some(paint) = paint(rgba) {
            self.surface.fill_path(path, &paint, rule, matrix, None);
        }
    }

    /// Strokes `path` with `rgba`.
    pub fn stroke(&mut self, path: &tiny_skia::Path, rgba: [f32; 4], stroke: &Stroke, matrix: Matrix) {
        if let Some(paint) = paint(rgba) {
            self.surface.stroke_path(path, &paint, stroke, matrix, None);
        }
    }

    /// Straight-alpha RGBA pixel at (`x`, `y`).
    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        let color = self.surface.pixel(x, y)?.demultiply();
        Some([color.red(), color.green(), color.blue(), color.alpha()])
    }

    /// Copies the surface into a straight-alpha image.
    ///
    /// # Errors
    /// Returns `RenderFailure` if the buffer does not match the dimensions.
    pub fn to_image(&self) -> ConversionResult<RgbaImage> {
        let mut data = Vec::with_capacity(self.surface.data().len());
        for pixel in self.surface.pixels() {
            let color = pixel.demultiply();
            data.extend_from_slice(&[color.red(), color.green(), color.blue(), color.alpha()]);
        }
        RgbaImage::from_raw(self.width(), self.height(), data)
            .ok_or_else(|| ConversionError::render("surface size mismatch"))
    }

    /// Writes the surface as a PNG file.
    ///
    /// # Errors
    /// Returns `RenderFailure` on encoding or I/O errors.
    pub fn write_png(&self, path: &Path) -> ConversionResult<()> {
        self.to_image()?
            .save_with_format(path, ImageFormat::Png)
            .map_err(|e| ConversionError::render(format!("{}: {e}", path.display())))
    }
}

fn paint(rgba: [f32; 4]) -> Option<Paint<'static>> {
    let [r, g, b, a] = rgba;
    if a <= 0.0 {
        return None;
    }
    let color = Color::from_rgba(
        r.clamp(0.0, 1.0),
        g.clamp(0.0, 1.0),
        b.clamp(0.0, 1.0),
        a.clamp(0.0, 1.0),
    )?;
    let mut paint = Paint::default();
    paint.set_color(color);
    paint.anti_alias = true;
    Some(paint)
}

/// Maps a Lottie fill rule code.
#[must_use]
pub fn fill_rule(code: Option<u8>) -> FillRule {
    match code {
        Some(2) => FillRule::EvenOdd,
        _ => FillRule::Winding,
    }
}

/// Builds stroke parameters from Lottie codes.
#[must_use]
pub fn stroke_style(width: f32, cap: Option<u8>, join: Option<u8>, miter: Option<f32>) -> Stroke {
    let mut stroke = Stroke {
        width,
        ..Stroke::default()
    };
    stroke.line_cap = match cap {
        Some(2) => LineCap::Round,
        Some(3) => LineCap::Square,
        _ => LineCap::Butt,
    };
    stroke.line_join = match join {
        Some(2) => LineJoin::Round,
        Some(3) => LineJoin::Bevel,
        _ => LineJoin::Miter,
    };
    if let Some(limit) = miter.filter(|m| *m >= 1.0) {
        stroke.miter_limit = limit;
    }
    stroke
}

/// Rectangle centered on `center`, with corners rounded by `radius`.
///
/// `None` when either side is not positive.
#[must_use]
pub fn rectangle(center: [f32; 2], size: [f32; 2], radius: f32) -> Option<tiny_skia::Path> {
    let [w, h] = size;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let x = center[0] - w / 2.0;
    let y = center[1] - h / 2.0;
    let rect = Rect::from_xywh(x, y, w, h)?;

    let r = radius.min(w / 2.0).min(h / 2.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(rect));
    }

    let k = r * (1.0 - KAPPA);
    let mut pb = PathBuilder::new();
    pb.move_to(x + r, y);
    pb.line_to(x + w - r, y);
    pb.cubic_to(x + w - k, y, x + w, y + k, x + w, y + r);
    pb.line_to(x + w, y + h - r);
    pb.cubic_to(x + w, y + h - k, x + w - k, y + h, x + w - r, y + h);
    pb.line_to(x + r, y + h);
    pb.cubic_to(x + k, y + h, x, y + h - k, x, y + h - r);
    pb.line_to(x, y + r);
    pb.cubic_to(x, y + k, x + k, y, x + r, y);
    pb.close();
    pb.finish()
}

/// Ellipse inscribed in the box centered on `center`.
#[must_use]
pub fn ellipse(center: [f32; 2], size: [f32; 2]) -> Option<tiny_skia::Path> {
    let [w, h] = size;
    if w <= 0.0 || h <= 0.0 {
        return None;
    }
    let rect = Rect::from_xywh(center[0] - w / 2.0, center[1] - h / 2.0, w, h)?;
    PathBuilder::from_oval(rect)
}

/// Converts a Bézier outline to a path.
#[must_use]
pub fn outline(shape: &BezierPath) -> Option<tiny_skia::Path> {
    let vertices = &shape.vertices;
    let first = *vertices.first()?;
    let control = |from: usize, to: usize, pb: &mut PathBuilder| {
        let (a, b) = (vertices[from], vertices[to]);
        let (out, inn) = (shape.out_tangents[from], shape.in_tangents[to]);
        pb.cubic_to(
            a[0] + out[0],
            a[1] + out[1],
            b[0] + inn[0],
            b[1] + inn[1],
            b[0],
            b[1],
        );
    };

    let mut pb = PathBuilder::new();
    pb.move_to(first[0], first[1]);
    for index in 1..vertices.len() {
        control(index - 1, index, &mut pb);
    }
    if shape.closed && vertices.len() > 1 {
        control(vertices.len() - 1, 0, &mut pb);
        pb.close();
    }
    pb.finish()
}

/// Applies `matrix` to `path` and appends it to `builder`.
pub fn append(builder: &mut PathBuilder, path: tiny_skia::Path, matrix: Matrix) {
    let path = if matrix.is_identity() {
        Some(path)
    } else {
        path.transform(matrix)
    };
    if let Some(path) = path {
        builder.push_path(&path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_surface_is_render_failure() {
        assert!(matches!(
            RenderContext::new(0, 256),
            Err(ConversionError::RenderFailure { .. })
        ));
    }

    #[test]
    fn test_fill_and_clear() {
        let mut ctx = RenderContext::new(16, 16).unwrap();
        let path = rectangle([8.0, 8.0], [16.0, 16.0], 0.0).unwrap();

        ctx.fill(&path, [0.0, 0.0, 1.0, 1.0], FillRule::Winding, Matrix::identity());
        assert_eq!(ctx.pixel(8, 8), Some([0, 0, 255, 255]));

        ctx.clear();
        assert_eq!(ctx.pixel(8, 8), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_transparent_paint_is_skipped() {
        let mut ctx = RenderContext::new(4, 4).unwrap();
        let path = rectangle([2.0, 2.0], [4.0, 4.0], 0.0).unwrap();

        ctx.fill(&path, [1.0, 0.0, 0.0, 0.0], FillRule::Winding, Matrix::identity());
        assert_eq!(ctx.pixel(2, 2), Some([0, 0, 0, 0]));
    }

    #[test]
    fn test_degenerate_geometry() {
        assert!(rectangle([0.0, 0.0], [0.0, 10.0], 0.0).is_none());
        assert!(rectangle([0.0, 0.0], [10.0, -4.0], 2.0).is_none());
        assert!(rectangle([0.0, 0.0], [f32::NAN, 10.0], 0.0).is_none());
        assert!(ellipse([0.0, 0.0], [10.0, 0.0]).is_none());
        assert!(ellipse([0.0, 0.0], [0.0, 0.0]).is_none());
        assert!(outline(&BezierPath::default()).is_none());
    }

    #[test]
    fn test_rounded_rectangle_clears_corners() {
        let mut ctx = RenderContext::new(20, 20).unwrap();
        let path = rectangle([10.0, 10.0], [20.0, 20.0], 10.0).unwrap();
        ctx.fill(&path, [1.0, 1.0, 1.0, 1.0], FillRule::Winding, Matrix::identity());

        assert_eq!(ctx.pixel(0, 0).map(|p| p[3]), Some(0));
        assert_eq!(ctx.pixel(10, 10), Some([255, 255, 255, 255]));
    }

    #[test]
    fn test_closed_outline_fills_triangle() {
        let shape = BezierPath {
            closed: true,
            vertices: vec![[0.0, 0.0], [20.0, 0.0], [0.0, 20.0]],
            in_tangents: vec![[0.0, 0.0]; 3],
            out_tangents: vec![[0.0, 0.0]; 3],
        };
        let mut ctx = RenderContext::new(20, 20).unwrap();
        ctx.fill(
            &outline(&shape).unwrap(),
            [0.0, 1.0, 0.0, 1.0],
            FillRule::Winding,
            Matrix::identity(),
        );

        assert_eq!(ctx.pixel(3, 3), Some([0, 255, 0, 255]));
        assert_eq!(ctx.pixel(18, 18).map(|p| p[3]), Some(0));
    }

    #[test]
    fn test_write_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let ctx = RenderContext::new(8, 8).unwrap();

        ctx.write_png(&path).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 8));
    }

    #[test]
    fn test_stroke_style_codes() {
        let stroke = stroke_style(3.0, Some(2), Some(3), Some(0.5));
        assert_eq!(stroke.width, 3.0);
        assert_eq!(stroke.line_cap, LineCap::Round);
        assert_eq!(stroke.line_join, LineJoin::Bevel);
        assert_eq!(stroke.miter_limit, Stroke::default().miter_limit);
        assert_eq!(fill_rule(Some(2)), FillRule::EvenOdd);
        assert_eq!(fill_rule(None), FillRule::Winding);
    }
}
