//! Lottie document model and TGS decoding.
//!
//! Only the subset of the format that animated stickers use is modelled;
//! unknown shape items deserialize to [`Shape::Unsupported`] and are skipped
//! at render time.

use std::io::Read;

use flate2::read::GzDecoder;
use serde::Deserialize;
use tiny_skia::Transform as Matrix;

use super::value::{Animated, BezierPath};
use crate::domain::{ConversionError, ConversionResult};

/// Upper bound on the decompressed JSON size.
pub const MAX_DOCUMENT_BYTES: u64 = 16 * 1024 * 1024;

/// Longest accepted animation, in native frames.
pub const MAX_TOTAL_FRAMES: u32 = 10_000;

/// Parsed animation.
#[derive(Debug, Deserialize)]
pub struct AnimationDocument {
    /// Native frame rate.
    #[serde(rename = "fr")]
    pub frame_rate: f32,
    /// First frame.
    #[serde(rename = "ip")]
    pub in_point: f32,
    /// Frame after the last one.
    #[serde(rename = "op")]
    pub out_point: f32,
    /// Canvas width.
    #[serde(rename = "w")]
    pub width: f32,
    /// Canvas height.
    #[serde(rename = "h")]
    pub height: f32,
    /// Top-level layers, topmost first.
    #[serde(default)]
    pub layers: Vec<Layer>,
    /// Precomposition sources.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

impl AnimationDocument {
    /// Decodes a TGS payload (gzip-compressed Lottie JSON).
    ///
    /// # Errors
    /// Returns `DecodeFailure` if the payload is not gzip, exceeds
    /// [`MAX_DOCUMENT_BYTES`] once inflated, or is not a valid animation.
    pub fn from_tgs(bytes: &[u8]) -> ConversionResult<Self> {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .take(MAX_DOCUMENT_BYTES + 1)
            .read_to_end(&mut json)
            .map_err(|e| ConversionError::decode(format!("gzip: {e}")))?;

        if json.len() as u64 > MAX_DOCUMENT_BYTES {
            return Err(ConversionError::decode(format!(
                "animation exceeds {MAX_DOCUMENT_BYTES} bytes"
            )));
        }

        Self::from_json(&json)
    }

    /// Parses uncompressed Lottie JSON.
    ///
    /// # Errors
    /// Returns `DecodeFailure` on malformed JSON or an unusable header.
    pub fn from_json(json: &[u8]) -> ConversionResult<Self> {
        let document: Self = serde_json::from_slice(json)
            .map_err(|e| ConversionError::decode(format!("lottie: {e}")))?;
        document.validate()?;
        Ok(document)
    }

    fn validate(&self) -> ConversionResult<()> {
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(ConversionError::decode(format!(
                "invalid frame rate {}",
                self.frame_rate
            )));
        }
        if self.width < 1.0 || self.height < 1.0 {
            return Err(ConversionError::decode(format!(
                "invalid canvas {}x{}",
                self.width, self.height
            )));
        }
        if !self.in_point.is_finite() || !self.out_point.is_finite() {
            return Err(ConversionError::decode("non-finite frame range"));
        }
        if self.out_point <= self.in_point {
            return Err(ConversionError::decode(format!(
                "empty frame range {}..{}",
                self.in_point, self.out_point
            )));
        }
        if self.out_point - self.in_point > MAX_TOTAL_FRAMES as f32 {
            return Err(ConversionError::decode(format!(
                "animation spans {} frames, limit is {MAX_TOTAL_FRAMES}",
                self.out_point - self.in_point
            )));
        }
        Ok(())
    }

    /// Number of native frames between the in and out points.
    #[must_use]
    pub fn total_frames(&self) -> u32 {
        (self.out_point - self.in_point).round().max(0.0) as u32
    }

    /// Length of the animation in seconds.
    #[must_use]
    pub fn duration_secs(&self) -> f32 {
        (self.out_point - self.in_point) / self.frame_rate
    }

    /// Looks up the layers of a precomposition asset.
    #[must_use]
    pub fn asset_layers(&self, id: &str) -> Option<&[Layer]> {
        self.assets
            .iter()
            .find(|asset| asset.id == id)
            .and_then(|asset| asset.layers.as_deref())
    }
}

/// Reusable asset; only precompositions (with layers) are used.
#[derive(Debug, Deserialize)]
pub struct Asset {
    /// Identifier referenced by `refId`.
    pub id: String,
    /// Layers of a precomposition; absent for images.
    #[serde(default)]
    pub layers: Option<Vec<Layer>>,
}

/// Layer kinds that are rendered or used for parenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerKind {
    /// Instance of a precomposition asset.
    Precomp,
    /// Filled rectangle.
    Solid,
    /// Invisible parent.
    Null,
    /// Vector shapes.
    Shape,
    /// Anything else; never drawn.
    Other(u8),
}

impl From<u8> for LayerKind {
    fn from(ty: u8) -> Self {
        match ty {
            0 => Self::Precomp,
            1 => Self::Solid,
            3 => Self::Null,
            4 => Self::Shape,
            other => Self::Other(other),
        }
    }
}

/// One layer of a composition.
#[derive(Debug, Deserialize)]
pub struct Layer {
    #[serde(rename = "ty")]
    ty: u8,
    /// Index referenced by children's `parent`.
    #[serde(rename = "ind", default)]
    pub index: Option<f64>,
    /// Index of the parent layer.
    #[serde(default)]
    pub parent: Option<f64>,
    /// First composition frame at which the layer is shown.
    #[serde(rename = "ip", default)]
    pub in_point: f32,
    /// Composition frame at which the layer disappears.
    #[serde(rename = "op", default = "far_future")]
    pub out_point: f32,
    /// Offset of the layer's timeline.
    #[serde(rename = "st", default)]
    pub start_time: f32,
    /// Time stretch factor.
    #[serde(rename = "sr", default = "unit")]
    pub stretch: f32,
    /// Layer transform.
    #[serde(rename = "ks", default)]
    pub transform: Transform,
    /// Shape items of a shape layer.
    #[serde(default)]
    pub shapes: Vec<Shape>,
    /// Asset id of a precomp layer.
    #[serde(rename = "refId", default)]
    pub reference: Option<String>,
    /// `#rrggbb` color of a solid layer.
    #[serde(rename = "sc", default)]
    pub solid_color: Option<String>,
    /// Solid layer width.
    #[serde(rename = "sw", default)]
    pub solid_width: f32,
    /// Solid layer height.
    #[serde(rename = "sh", default)]
    pub solid_height: f32,
    /// Hidden in the editor; never drawn.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
    /// Non-zero when the layer only serves as a track matte.
    #[serde(rename = "td", default)]
    pub matte_source: u8,
}

const fn far_future() -> f32 {
    f32::MAX
}

const fn unit() -> f32 {
    1.0
}

impl Layer {
    /// Layer kind decoded from `ty`.
    #[must_use]
    pub fn kind(&self) -> LayerKind {
        LayerKind::from(self.ty)
    }

    /// Returns true if the layer paints anything at composition `frame`.
    #[must_use]
    pub fn is_visible_at(&self, frame: f32) -> bool {
        !self.hidden
            && self.matte_source == 0
            && frame >= self.in_point
            && frame < self.out_point
            && matches!(
                self.kind(),
                LayerKind::Precomp | LayerKind::Solid | LayerKind::Shape
            )
    }

    /// Maps composition time to the layer's own timeline.
    #[must_use]
    pub fn local_time(&self, frame: f32) -> f32 {
        let stretch = if self.stretch.abs() > f32::EPSILON {
            self.stretch
        } else {
            1.0
        };
        (frame - self.start_time) / stretch
    }
}

/// Position given either as one vector or as separate x/y channels.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum Position {
    /// Independently animated x and y.
    Split {
        /// Horizontal channel.
        x: Animated<Vec<f32>>,
        /// Vertical channel.
        y: Animated<Vec<f32>>,
    },
    /// Single vector.
    Combined(Animated<Vec<f32>>),
}

impl Default for Position {
    fn default() -> Self {
        Self::Combined(Animated::Static(vec![0.0, 0.0]))
    }
}

impl Position {
    /// Evaluates the position at `frame`.
    #[must_use]
    pub fn at(&self, frame: f32) -> [f32; 2] {
        match self {
            Self::Split { x, y } => [x.scalar_at(frame, 0.0), y.scalar_at(frame, 0.0)],
            Self::Combined(value) => value.pair_at(frame, [0.0, 0.0]),
        }
    }
}

fn zero() -> Animated<Vec<f32>> {
    Animated::Static(vec![0.0])
}

fn zero_pair() -> Animated<Vec<f32>> {
    Animated::Static(vec![0.0, 0.0])
}

fn hundred() -> Animated<Vec<f32>> {
    Animated::Static(vec![100.0])
}

fn hundred_pair() -> Animated<Vec<f32>> {
    Animated::Static(vec![100.0, 100.0])
}

fn one() -> Animated<Vec<f32>> {
    Animated::Static(vec![1.0])
}

/// Layer or group transform.
#[derive(Debug, Deserialize)]
pub struct Transform {
    /// Pivot point.
    #[serde(rename = "a", default = "zero_pair")]
    pub anchor: Animated<Vec<f32>>,
    /// Translation.
    #[serde(rename = "p", default)]
    pub position: Position,
    /// Percent.
    #[serde(rename = "s", default = "hundred_pair")]
    pub scale: Animated<Vec<f32>>,
    /// Degrees.
    #[serde(rename = "r", default = "zero")]
    pub rotation: Animated<Vec<f32>>,
    /// Percent.
    #[serde(rename = "o", default = "hundred")]
    pub opacity: Animated<Vec<f32>>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            anchor: zero_pair(),
            position: Position::default(),
            scale: hundred_pair(),
            rotation: zero(),
            opacity: hundred(),
        }
    }
}

impl Transform {
    /// Local-to-parent matrix at `frame`.
    #[must_use]
    pub fn matrix_at(&self, frame: f32) -> Matrix {
        let [ax, ay] = self.anchor.pair_at(frame, [0.0, 0.0]);
        let [px, py] = self.position.at(frame);
        let [sx, sy] = self.scale.pair_at(frame, [100.0, 100.0]);
        let rotation = self.rotation.scalar_at(frame, 0.0);

        Matrix::from_translate(-ax, -ay)
            .post_scale(sx / 100.0, sy / 100.0)
            .post_rotate(rotation)
            .post_translate(px, py)
    }

    /// Opacity at `frame` in `[0, 1]`.
    #[must_use]
    pub fn opacity_at(&self, frame: f32) -> f32 {
        (self.opacity.scalar_at(frame, 100.0) / 100.0).clamp(0.0, 1.0)
    }
}

/// Shape item inside a shape layer or group.
#[derive(Debug, Deserialize)]
#[serde(tag = "ty")]
pub enum Shape {
    /// Nested item list with its own transform.
    #[serde(rename = "gr")]
    Group(Group),
    /// Rectangle geometry.
    #[serde(rename = "rc")]
    Rectangle(Rectangle),
    /// Ellipse geometry.
    #[serde(rename = "el")]
    Ellipse(Ellipse),
    /// Free-form Bézier geometry.
    #[serde(rename = "sh")]
    Path(PathShape),
    /// Solid fill of preceding geometry.
    #[serde(rename = "fl")]
    Fill(Fill),
    /// Outline of preceding geometry.
    #[serde(rename = "st")]
    Stroke(Stroke),
    /// Transform of the enclosing group.
    #[serde(rename = "tr")]
    Transform(Transform),
    /// Gradients, trims, repeaters and other items that are not drawn.
    #[serde(other)]
    Unsupported,
}

/// Shape group.
#[derive(Debug, Deserialize)]
pub struct Group {
    /// Items in paint order, topmost first.
    #[serde(rename = "it", default)]
    pub items: Vec<Shape>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

impl Group {
    /// The group's own `tr` item, if any.
    #[must_use]
    pub fn transform(&self) -> Option<&Transform> {
        group_transform(&self.items)
    }
}

/// Finds the transform item of a shape list.
#[must_use]
pub fn group_transform(items: &[Shape]) -> Option<&Transform> {
    items.iter().find_map(|item| match item {
        Shape::Transform(transform) => Some(transform),
        _ => None,
    })
}

/// Axis-aligned, optionally rounded rectangle.
#[derive(Debug, Deserialize)]
pub struct Rectangle {
    /// Center.
    #[serde(rename = "p", default = "zero_pair")]
    pub position: Animated<Vec<f32>>,
    /// Width and height.
    #[serde(rename = "s", default = "zero_pair")]
    pub size: Animated<Vec<f32>>,
    /// Corner radius.
    #[serde(rename = "r", default = "zero")]
    pub roundness: Animated<Vec<f32>>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

/// Axis-aligned ellipse.
#[derive(Debug, Deserialize)]
pub struct Ellipse {
    /// Center.
    #[serde(rename = "p", default = "zero_pair")]
    pub position: Animated<Vec<f32>>,
    /// Width and height.
    #[serde(rename = "s", default = "zero_pair")]
    pub size: Animated<Vec<f32>>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

/// Free-form path.
#[derive(Debug, Deserialize)]
pub struct PathShape {
    /// Outline, possibly animated.
    #[serde(rename = "ks")]
    pub outline: Animated<BezierPath>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

/// Solid color fill.
#[derive(Debug, Deserialize)]
pub struct Fill {
    /// RGBA color.
    #[serde(rename = "c")]
    pub color: Animated<Vec<f32>>,
    /// Percent.
    #[serde(rename = "o", default = "hundred")]
    pub opacity: Animated<Vec<f32>>,
    /// 1 = non-zero winding, 2 = even-odd.
    #[serde(rename = "r", default)]
    pub rule: Option<u8>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

/// Solid color stroke.
#[derive(Debug, Deserialize)]
pub struct Stroke {
    /// RGBA color.
    #[serde(rename = "c")]
    pub color: Animated<Vec<f32>>,
    /// Percent.
    #[serde(rename = "o", default = "hundred")]
    pub opacity: Animated<Vec<f32>>,
    /// Line width.
    #[serde(rename = "w", default = "one")]
    pub width: Animated<Vec<f32>>,
    /// 1 = butt, 2 = round, 3 = square.
    #[serde(rename = "lc", default)]
    pub line_cap: Option<u8>,
    /// 1 = miter, 2 = round, 3 = bevel.
    #[serde(rename = "lj", default)]
    pub line_join: Option<u8>,
    /// Miter limit.
    #[serde(rename = "ml", default)]
    pub miter_limit: Option<f32>,
    /// Never drawn when set.
    #[serde(rename = "hd", default)]
    pub hidden: bool,
}

/// Converts Lottie color components to RGBA bytes.
///
/// Components are normally in `0..=1`; some exporters write `0..=255`,
/// detected by any component exceeding 1.
#[must_use]
pub fn color_components(components: &[f32]) -> [f32; 4] {
    let scale = if components.iter().take(4).any(|c| *c > 1.0) {
        255.0
    } else {
        1.0
    };
    let channel = |i: usize, fallback: f32| {
        (components.get(i).copied().unwrap_or(fallback) / scale).clamp(0.0, 1.0)
    };
    [
        channel(0, 0.0),
        channel(1, 0.0),
        channel(2, 0.0),
        channel(3, scale),
    ]
}

/// Parses a `#rrggbb` solid-layer color.
#[must_use]
pub fn parse_hex_color(value: &str) -> Option<[f32; 4]> {
    let bytes = hex::decode(value.trim().trim_start_matches('#')).ok()?;
    let [r, g, b] = bytes.as_slice() else {
        return None;
    };
    Some([
        f32::from(*r) / 255.0,
        f32::from(*g) / 255.0,
        f32::from(*b) / 255.0,
        1.0,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use serde_json::json;
    use std::io::Write;
    use test_case::test_case;

    fn minimal() -> serde_json::Value {
        json!({
            "v": "5.5.2", "fr": 60, "ip": 0, "op": 180, "w": 512, "h": 512,
            "layers": [{
                "ty": 4, "ind": 1, "ip": 0, "op": 180, "st": 0,
                "ks": {"p": {"a": 0, "k": [256, 256, 0]}},
                "shapes": [
                    {"ty": "el", "p": {"a": 0, "k": [0, 0]}, "s": {"a": 0, "k": [100, 100]}},
                    {"ty": "gf", "nm": "gradient"},
                    {"ty": "fl", "c": {"a": 0, "k": [1, 0, 0, 1]}, "o": {"a": 0, "k": 100}}
                ]
            }]
        })
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_parse_minimal_document() {
        let doc = AnimationDocument::from_json(minimal().to_string().as_bytes()).unwrap();

        assert_eq!(doc.frame_rate, 60.0);
        assert_eq!(doc.total_frames(), 180);
        assert!((doc.duration_secs() - 3.0).abs() < f32::EPSILON);
        assert_eq!(doc.layers.len(), 1);

        let layer = &doc.layers[0];
        assert_eq!(layer.kind(), LayerKind::Shape);
        assert_eq!(layer.shapes.len(), 3);
        assert!(matches!(layer.shapes[1], Shape::Unsupported));
        assert_eq!(layer.transform.position.at(0.0), [256.0, 256.0]);
    }

    #[test]
    fn test_from_tgs_inflates_gzip() {
        let payload = gzip(minimal().to_string().as_bytes());
        let doc = AnimationDocument::from_tgs(&payload).unwrap();
        assert_eq!(doc.total_frames(), 180);
    }

    #[test]
    fn test_from_tgs_rejects_plain_json() {
        let err = AnimationDocument::from_tgs(minimal().to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
    }

    #[test]
    fn test_from_tgs_rejects_gzipped_garbage() {
        let err = AnimationDocument::from_tgs(&gzip(b"not json at all")).unwrap_err();
        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
    }

    #[test_case(json!({"fr": 0, "ip": 0, "op": 10, "w": 512, "h": 512}) ; "zero frame rate")]
    #[test_case(json!({"fr": 60, "ip": 10, "op": 10, "w": 512, "h": 512}) ; "empty range")]
    #[test_case(json!({"fr": 60, "ip": 0, "op": 10, "w": 0, "h": 512}) ; "zero width")]
    #[test_case(json!({"fr": 60, "ip": 0, "op": 10}) ; "missing canvas")]
    #[test_case(json!({"fr": 60, "ip": 0, "op": 1_000_000_000, "w": 512, "h": 512}) ; "endless animation")]
    #[test_case(json!({"fr": 60, "ip": 0, "op": 1e39, "w": 512, "h": 512}) ; "infinite out point")]
    fn test_rejects_bad_header(doc: serde_json::Value) {
        let err = AnimationDocument::from_json(doc.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
    }

    #[test]
    fn test_frame_limit_is_inclusive() {
        let at_limit = json!({"fr": 60, "ip": 5, "op": 5 + MAX_TOTAL_FRAMES, "w": 512, "h": 512});
        let doc = AnimationDocument::from_json(at_limit.to_string().as_bytes()).unwrap();
        assert_eq!(doc.total_frames(), MAX_TOTAL_FRAMES);

        let over = json!({"fr": 60, "ip": 5, "op": 6 + MAX_TOTAL_FRAMES, "w": 512, "h": 512});
        let err = AnimationDocument::from_json(over.to_string().as_bytes()).unwrap_err();
        assert!(matches!(err, ConversionError::DecodeFailure { .. }));
    }

    #[test]
    fn test_split_position() {
        let transform: Transform = serde_json::from_value(json!({
            "p": {"s": true, "x": {"a": 0, "k": 10}, "y": {"a": 1, "k": [
                {"t": 0, "s": [0]}, {"t": 10, "s": [20]}
            ]}}
        }))
        .unwrap();

        assert_eq!(transform.position.at(5.0), [10.0, 10.0]);
    }

    #[test]
    fn test_transform_matrix_applies_anchor_scale_position() {
        let transform: Transform = serde_json::from_value(json!({
            "a": {"a": 0, "k": [10, 10]},
            "p": {"a": 0, "k": [100, 50]},
            "s": {"a": 0, "k": [200, 200]},
            "o": {"a": 0, "k": 50}
        }))
        .unwrap();

        let matrix = transform.matrix_at(0.0);
        let mut point = [tiny_skia::Point::from_xy(10.0, 10.0)];
        matrix.map_points(&mut point);
        assert_eq!((point[0].x, point[0].y), (100.0, 50.0));
        assert!((transform.opacity_at(0.0) - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn test_layer_local_time() {
        let layer: Layer =
            serde_json::from_value(json!({"ty": 4, "st": 10, "sr": 2, "ip": 10, "op": 50})).unwrap();

        assert_eq!(layer.local_time(30.0), 10.0);
        assert!(layer.is_visible_at(10.0));
        assert!(!layer.is_visible_at(50.0));
    }

    #[test]
    fn test_matte_and_null_layers_are_not_visible() {
        let matte: Layer = serde_json::from_value(json!({"ty": 4, "td": 1})).unwrap();
        let null: Layer = serde_json::from_value(json!({"ty": 3})).unwrap();

        assert!(!matte.is_visible_at(0.0));
        assert!(!null.is_visible_at(0.0));
        assert_eq!(null.kind(), LayerKind::Null);
    }

    #[test_case(&[1.0, 0.5, 0.0, 1.0], [1.0, 0.5, 0.0, 1.0] ; "unit range")]
    #[test_case(&[255.0, 0.0, 51.0], [1.0, 0.0, 0.2, 1.0] ; "byte range")]
    #[test_case(&[0.0, 0.0, 1.0], [0.0, 0.0, 1.0, 1.0] ; "missing alpha")]
    fn test_color_components(input: &[f32], expected: [f32; 4]) {
        let actual = color_components(input);
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{actual:?} != {expected:?}");
        }
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff0000"), Some([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(parse_hex_color("#ff00"), None);
        assert_eq!(parse_hex_color("zzzzzz"), None);
    }

    #[test]
    fn test_asset_lookup() {
        let doc = AnimationDocument::from_json(
            json!({
                "fr": 30, "ip": 0, "op": 30, "w": 100, "h": 100,
                "assets": [{"id": "comp_0", "layers": [{"ty": 4}]}, {"id": "image_0", "p": "x.png"}],
                "layers": []
            })
            .to_string()
            .as_bytes(),
        )
        .unwrap();

        assert_eq!(doc.asset_layers("comp_0").map(<[Layer]>::len), Some(1));
        assert!(doc.asset_layers("image_0").is_none());
        assert!(doc.asset_layers("missing").is_none());
    }
}
