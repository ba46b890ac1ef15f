//! Animatable Lottie property values and keyframe interpolation.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// A value that can be blended between two keyframes.
pub trait Interpolate: Clone {
    /// Blends `self` toward `to` by `t` in `[0, 1]`.
    #[must_use]
    fn interpolate(&self, to: &Self, t: f32) -> Self;
}

/// Conversion from a raw JSON keyframe payload.
pub trait FromLottieValue: Sized {
    /// Parses the value, returning `None` when the payload has the wrong shape.
    fn from_lottie(value: &Value) -> Option<Self>;
}

impl Interpolate for Vec<f32> {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        if self.len() != to.len() {
            return if t < 1.0 { self.clone() } else { to.clone() };
        }
        self.iter().zip(to).map(|(a, b)| a + (b - a) * t).collect()
    }
}

impl FromLottieValue for Vec<f32> {
    fn from_lottie(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(vec![n.as_f64()? as f32]),
            Value::Array(items) => items
                .iter()
                .map(|item| item.as_f64().map(|n| n as f32))
                .collect(),
            _ => None,
        }
    }
}

/// Cubic Bézier outline: vertices plus tangents relative to each vertex.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BezierPath {
    /// Whether the last vertex connects back to the first.
    pub closed: bool,
    /// Anchor points.
    pub vertices: Vec<[f32; 2]>,
    /// Incoming tangents, relative to their vertex.
    pub in_tangents: Vec<[f32; 2]>,
    /// Outgoing tangents, relative to their vertex.
    pub out_tangents: Vec<[f32; 2]>,
}

impl Interpolate for BezierPath {
    fn interpolate(&self, to: &Self, t: f32) -> Self {
        if self.vertices.len() != to.vertices.len() {
            return if t < 1.0 { self.clone() } else { to.clone() };
        }
        let lerp = |a: &[[f32; 2]], b: &[[f32; 2]]| -> Vec<[f32; 2]> {
            a.iter()
                .zip(b)
                .map(|(p, q)| [p[0] + (q[0] - p[0]) * t, p[1] + (q[1] - p[1]) * t])
                .collect()
        };
        Self {
            closed: self.closed,
            vertices: lerp(&self.vertices, &to.vertices),
            in_tangents: lerp(&self.in_tangents, &to.in_tangents),
            out_tangents: lerp(&self.out_tangents, &to.out_tangents),
        }
    }
}

impl FromLottieValue for BezierPath {
    fn from_lottie(value: &Value) -> Option<Self> {
        // Keyframed shapes wrap the outline in a one-element array.
        let object = match value {
            Value::Array(items) => items.first()?,
            other => other,
        };
        let vertices = points(object.get("v")?)?;
        let count = vertices.len();
        let tangents = |key: &str| -> Vec<[f32; 2]> {
            object
                .get(key)
                .and_then(points)
                .filter(|p| p.len() == count)
                .unwrap_or_else(|| vec![[0.0, 0.0]; count])
        };

        Some(Self {
            closed: object.get("c").and_then(Value::as_bool).unwrap_or(false),
            in_tangents: tangents("i"),
            out_tangents: tangents("o"),
            vertices,
        })
    }
}

fn points(value: &Value) -> Option<Vec<[f32; 2]>> {
    value
        .as_array()?
        .iter()
        .map(|point| {
            let coords = point.as_array()?;
            Some([
                coords.first()?.as_f64()? as f32,
                coords.get(1)?.as_f64()? as f32,
            ])
        })
        .collect()
}

/// Timing curve of one keyframe segment (CSS-style cubic Bézier).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Easing {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Easing {
    /// Creates a curve from its two control points.
    #[must_use]
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Maps linear progress `t` to eased progress.
    #[must_use]
    pub fn apply(&self, t: f32) -> f32 {
        if t <= 0.0 {
            return 0.0;
        }
        if t >= 1.0 {
            return 1.0;
        }
        let x1 = self.x1.clamp(0.0, 1.0);
        let x2 = self.x2.clamp(0.0, 1.0);

        let mut u = t;
        for _ in 0..8 {
            let error = cubic(u, x1, x2) - t;
            if error.abs() < 1e-5 {
                return cubic(u, self.y1, self.y2);
            }
            let slope = cubic_slope(u, x1, x2);
            if slope.abs() < 1e-6 {
                break;
            }
            u = (u - error / slope).clamp(0.0, 1.0);
        }

        let (mut lo, mut hi) = (0.0_f32, 1.0_f32);
        u = t;
        for _ in 0..32 {
            let x = cubic(u, x1, x2);
            if (x - t).abs() < 1e-5 {
                break;
            }
            if x < t {
                lo = u;
            } else {
                hi = u;
            }
            u = (lo + hi) / 2.0;
        }
        cubic(u, self.y1, self.y2)
    }
}

fn cubic(u: f32, p1: f32, p2: f32) -> f32 {
    let v = 1.0 - u;
    3.0 * v * v * u * p1 + 3.0 * v * u * u * p2 + u * u * u
}

fn cubic_slope(u: f32, p1: f32, p2: f32) -> f32 {
    let v = 1.0 - u;
    3.0 * v * v * p1 + 6.0 * v * u * (p2 - p1) + 3.0 * u * u * (1.0 - p2)
}

/// One keyframe; the segment it starts runs until the next keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe<T> {
    /// Frame at which the keyframe starts.
    pub time: f32,
    /// Value at `time`.
    pub start: T,
    /// Legacy explicit end value of the segment.
    pub end: Option<T>,
    /// Keep `start` until the next keyframe.
    pub hold: bool,
    /// Segment timing curve; linear when absent.
    pub easing: Option<Easing>,
}

/// A property that is either constant or keyframed.
#[derive(Debug, Clone, PartialEq)]
pub enum Animated<T> {
    /// Constant value.
    Static(T),
    /// Non-empty, time-ordered keyframes.
    Keyframed(Vec<Keyframe<T>>),
}

impl<T: Interpolate> Animated<T> {
    /// Evaluates the property at `frame`.
    #[must_use]
    pub fn at(&self, frame: f32) -> T {
        match self {
            Self::Static(value) => value.clone(),
            Self::Keyframed(keyframes) => sample(keyframes, frame),
        }
    }

    /// Returns true if the property changes over time.
    #[must_use]
    pub const fn is_animated(&self) -> bool {
        matches!(self, Self::Keyframed(_))
    }
}

impl Animated<Vec<f32>> {
    /// Evaluates the first component, or `fallback` when there is none.
    #[must_use]
    pub fn scalar_at(&self, frame: f32, fallback: f32) -> f32 {
        self.at(frame).first().copied().unwrap_or(fallback)
    }

    /// Evaluates the first two components.
    #[must_use]
    pub fn pair_at(&self, frame: f32, fallback: [f32; 2]) -> [f32; 2] {
        let value = self.at(frame);
        [
            value.first().copied().unwrap_or(fallback[0]),
            value.get(1).copied().unwrap_or(fallback[1]),
        ]
    }
}

fn sample<T: Interpolate>(keyframes: &[Keyframe<T>], frame: f32) -> T {
    let first = &keyframes[0];
    if frame <= first.time {
        return first.start.clone();
    }

    for pair in keyframes.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        if frame >= to.time {
            continue;
        }
        if from.hold {
            return from.start.clone();
        }
        let target = from.end.as_ref().unwrap_or(&to.start);
        let span = to.time - from.time;
        if span <= f32::EPSILON {
            return target.clone();
        }
        let linear = (frame - from.time) / span;
        let t = from.easing.map_or(linear, |easing| easing.apply(linear));
        return from.start.interpolate(target, t);
    }

    let last = &keyframes[keyframes.len() - 1];
    last.start.clone()
}

#[derive(Deserialize)]
struct RawProperty {
    k: Value,
}

#[derive(Deserialize)]
struct RawKeyframe {
    t: f32,
    s: Option<Value>,
    e: Option<Value>,
    h: Option<Value>,
    o: Option<RawTangent>,
    i: Option<RawTangent>,
}

#[derive(Deserialize)]
struct RawTangent {
    x: Value,
    y: Value,
}

fn first_number(value: &Value) -> Option<f32> {
    match value {
        Value::Number(n) => n.as_f64().map(|n| n as f32),
        Value::Array(items) => items.first()?.as_f64().map(|n| n as f32),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

fn is_keyframe_list(value: &Value) -> bool {
    value
        .as_array()
        .and_then(|items| items.first())
        .is_some_and(|first| first.get("t").is_some())
}

impl<T: FromLottieValue + Clone> Animated<T> {
    fn from_raw(raw: RawProperty) -> Result<Self, String> {
        if !is_keyframe_list(&raw.k) {
            return T::from_lottie(&raw.k)
                .map(Self::Static)
                .ok_or_else(|| format!("unsupported property value: {}", raw.k));
        }

        let raws: Vec<RawKeyframe> = serde_json::from_value(raw.k).map_err(|e| e.to_string())?;
        let mut keyframes = Vec::with_capacity(raws.len());
        let mut carried: Option<T> = None;

        for raw in raws {
            let start = raw
                .s
                .as_ref()
                .and_then(T::from_lottie)
                .or_else(|| carried.clone())
                .ok_or_else(|| format!("keyframe at {} has no value", raw.t))?;
            let end = raw.e.as_ref().and_then(T::from_lottie);
            carried = Some(end.clone().unwrap_or_else(|| start.clone()));

            let easing = match (&raw.o, &raw.i) {
                (Some(out), Some(inn)) => Some(Easing::new(
                    first_number(&out.x).unwrap_or(0.0),
                    first_number(&out.y).unwrap_or(0.0),
                    first_number(&inn.x).unwrap_or(1.0),
                    first_number(&inn.y).unwrap_or(1.0),
                )),
                _ => None,
            };

            keyframes.push(Keyframe {
                time: raw.t,
                start,
                end,
                hold: raw.h.as_ref().is_some_and(truthy),
                easing,
            });
        }

        if keyframes.is_empty() {
            return Err("empty keyframe list".to_string());
        }
        Ok(Self::Keyframed(keyframes))
    }
}

impl<'de, T: FromLottieValue + Clone> Deserialize<'de> for Animated<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawProperty::deserialize(deserializer)?;
        Self::from_raw(raw).map_err(D::Error::custom)
    }
}
