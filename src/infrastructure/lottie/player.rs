//! Headless playback: steps an [`AnimationDocument`] and rasterizes frames.

use std::path::Path;

use tiny_skia::{PathBuilder, Transform as Matrix};
use tracing::debug;

use super::document::{
    AnimationDocument, Layer, LayerKind, Shape, color_components, group_transform,
    parse_hex_color,
};
use super::render::{RenderContext, append, ellipse, fill_rule, outline, rectangle, stroke_style};
use crate::domain::{ConversionError, ConversionResult, EncodeSettings};

/// Bound on precomp recursion and parent chains.
const MAX_NESTING: usize = 16;

/// Number of native frames to advance per output frame.
///
/// Always at least 1, so sources slower than the target keep every frame.
#[must_use]
pub fn frame_stride(native_fps: f32, target_fps: u32) -> u32 {
    if !native_fps.is_finite() || native_fps <= 0.0 || target_fps == 0 {
        return 1;
    }
    let ratio = (native_fps / target_fps as f32).round();
    (ratio as u32).max(1)
}

/// Plays a document into an owned [`RenderContext`].
pub struct AnimationPlayer<'a> {
    document: &'a AnimationDocument,
    context: RenderContext,
    viewport: Matrix,
    frame: Option<f32>,
}

impl<'a> AnimationPlayer<'a> {
    /// Binds `document` to `context`, scaling the canvas to the surface.
    #[must_use]
    pub fn new(document: &'a AnimationDocument, context: RenderContext) -> Self {
        let viewport = Matrix::from_scale(
            context.width() as f32 / document.width,
            context.height() as f32 / document.height,
        );
        Self {
            document,
            context,
            viewport,
            frame: None,
        }
    }

    /// Renders composition frame `frame` onto a cleared surface.
    pub fn go_to_frame(&mut self, frame: f32) {
        self.context.clear();
        draw_layers(
            &mut self.context,
            self.document,
            &self.document.layers,
            frame,
            self.viewport,
            1.0,
            0,
        );
        self.frame = Some(frame);
    }

    /// Last rendered frame.
    #[must_use]
    pub const fn current_frame(&self) -> Option<f32> {
        self.frame
    }

    /// The surface holding the last rendered frame.
    #[must_use]
    pub const fn context(&self) -> &RenderContext {
        &self.context
    }

    /// Tears the player down, handing the surface back.
    #[must_use]
    pub fn destroy(self) -> RenderContext {
        self.context
    }
}

/// Rasterizes `document` into `frames_dir` as `frame_NNNNN.png`.
///
/// Samples every `frame_stride` native frames so the sequence plays at
/// `settings.fps`. Returns the number of frames written.
///
/// # Errors
/// Returns `RenderFailure` if the surface cannot be created, a frame cannot
/// be written, or no frame was produced.
pub fn rasterize_frames(
    document: &AnimationDocument,
    frames_dir: &Path,
    settings: &EncodeSettings,
) -> ConversionResult<usize> {
    let context = RenderContext::new(settings.width, settings.width)?;
    let stride = frame_stride(document.frame_rate, settings.fps);
    let total = document.total_frames();

    debug!(
        native_fps = document.frame_rate,
        total_frames = total,
        stride,
        "Rasterizing animation"
    );

    let mut player = AnimationPlayer::new(document, context);
    let mut written = 0usize;
    for index in (0..total).step_by(stride as usize) {
        player.go_to_frame(document.in_point + index as f32);
        let path = frames_dir.join(format!("frame_{written:05}.png"));
        player.context().write_png(&path)?;
        written += 1;
    }
    drop(player.destroy());

    if written == 0 {
        return Err(ConversionError::render("animation produced no frames"));
    }
    Ok(written)
}

fn draw_layers(
    ctx: &mut RenderContext,
    document: &AnimationDocument,
    layers: &[Layer],
    frame: f32,
    base: Matrix,
    alpha: f32,
    depth: usize,
) {
    if depth > MAX_NESTING {
        return;
    }

    for layer in layers.iter().rev() {
        if !layer.is_visible_at(frame) {
            continue;
        }
        let time = layer.local_time(frame);
        let opacity = alpha * layer.transform.opacity_at(time);
        if opacity <= 0.0 {
            continue;
        }
        let matrix = world_matrix(layers, layer, frame).post_concat(base);

        match layer.kind() {
            LayerKind::Shape => draw_items(ctx, &layer.shapes, time, matrix, opacity),
            LayerKind::Solid => draw_solid(ctx, layer, matrix, opacity),
            LayerKind::Precomp => {
                if let Some(children) = layer
                    .reference
                    .as_deref()
                    .and_then(|id| document.asset_layers(id))
                {
                    draw_layers(ctx, document, children, time, matrix, opacity, depth + 1);
                }
            }
            LayerKind::Null | LayerKind::Other(_) => {}
        }
    }
}

fn same_index(index: Option<f64>, wanted: f64) -> bool {
    index.is_some_and(|index| (index - wanted).abs() < f64::EPSILON)
}

fn world_matrix(layers: &[Layer], layer: &Layer, frame: f32) -> Matrix {
    let mut matrix = layer.transform.matrix_at(layer.local_time(frame));
    let mut current = layer;
    for _ in 0..MAX_NESTING {
        let Some(wanted) = current.parent else {
            break;
        };
        let Some(parent) = layers.iter().find(|l| same_index(l.index, wanted)) else {
            break;
        };
        matrix = matrix.post_concat(parent.transform.matrix_at(parent.local_time(frame)));
        current = parent;
    }
    matrix
}

fn draw_solid(ctx: &mut RenderContext, layer: &Layer, matrix: Matrix, alpha: f32) {
    let Some(mut rgba) = layer.solid_color.as_deref().and_then(parse_hex_color) else {
        return;
    };
    let (w, h) = (layer.solid_width, layer.solid_height);
    if let Some(path) = rectangle([w / 2.0, h / 2.0], [w, h], 0.0) {
        rgba[3] *= alpha;
        ctx.fill(&path, rgba, fill_rule(None), matrix);
    }
}

fn draw_items(ctx: &mut RenderContext, items: &[Shape], time: f32, matrix: Matrix, alpha: f32) {
    let (matrix, alpha) = match group_transform(items) {
        Some(transform) => (
            transform.matrix_at(time).post_concat(matrix),
            alpha * transform.opacity_at(time),
        ),
        None => (matrix, alpha),
    };
    if alpha <= 0.0 {
        return;
    }

    // Earlier items sit on top, so paint back to front.
    for (index, item) in items.iter().enumerate().rev() {
        match item {
            Shape::Group(group) if !group.hidden => {
                draw_items(ctx, &group.items, time, matrix, alpha);
            }
            Shape::Fill(fill) if !fill.hidden => {
                let Some(path) = geometry(&items[..index], time) else {
                    continue;
                };
                let mut rgba = color_components(&fill.color.at(time));
                rgba[3] *= alpha * percent(fill.opacity.scalar_at(time, 100.0));
                ctx.fill(&path, rgba, fill_rule(fill.rule), matrix);
            }
            Shape::Stroke(stroke) if !stroke.hidden => {
                let width = stroke.width.scalar_at(time, 1.0);
                if width <= 0.0 {
                    continue;
                }
                let Some(path) = geometry(&items[..index], time) else {
                    continue;
                };
                let mut rgba = color_components(&stroke.color.at(time));
                rgba[3] *= alpha * percent(stroke.opacity.scalar_at(time, 100.0));
                let style =
                    stroke_style(width, stroke.line_cap, stroke.line_join, stroke.miter_limit);
                ctx.stroke(&path, rgba, &style, matrix);
            }
            _ => {}
        }
    }
}

fn percent(value: f32) -> f32 {
    (value / 100.0).clamp(0.0, 1.0)
}

fn geometry(items: &[Shape], time: f32) -> Option<tiny_skia::Path> {
    let mut builder = PathBuilder::new();
    collect_geometry(&mut builder, items, time, Matrix::identity());
    builder.finish()
}

fn collect_geometry(builder: &mut PathBuilder, items: &[Shape], time: f32, matrix: Matrix) {
    for item in items {
        let path = match item {
            Shape::Rectangle(rect) if !rect.hidden => rectangle(
                rect.position.pair_at(time, [0.0, 0.0]),
                rect.size.pair_at(time, [0.0, 0.0]),
                rect.roundness.scalar_at(time, 0.0),
            ),
            Shape::Ellipse(el) if !el.hidden => ellipse(
                el.position.pair_at(time, [0.0, 0.0]),
                el.size.pair_at(time, [0.0, 0.0]),
            ),
            Shape::Path(shape) if !shape.hidden => outline(&shape.outline.at(time)),
            Shape::Group(group) if !group.hidden => {
                let local = group
                    .transform()
                    .map_or(Matrix::identity(), |t| t.matrix_at(time));
                collect_geometry(builder, &group.items, time, local.post_concat(matrix));
                None
            }
            _ => None,
        };
        if let Some(path) = path {
            append(builder, path, matrix);
        }
    }
}
