//! In-process Lottie playback for TGS stickers.
//!
//! This module provides:
//! - TGS decoding (gzip + JSON) into an [`AnimationDocument`]
//! - Keyframe evaluation with easing
//! - Headless rasterization onto a per-call [`RenderContext`]

pub mod document;
pub mod player;
pub mod render;
pub mod value;

pub use document::{AnimationDocument, MAX_DOCUMENT_BYTES, MAX_TOTAL_FRAMES};
pub use player::{AnimationPlayer, frame_stride, rasterize_frames};
pub use render::RenderContext;
pub use value::{Animated, BezierPath, Easing};
