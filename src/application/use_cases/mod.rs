//! Use case implementations.

mod convert_static;
mod convert_sticker;
mod convert_tgs;
mod convert_webm;

pub use convert_static::{StaticConverter, download_extension};
pub use convert_sticker::StickerConverter;
pub use convert_tgs::TgsConverter;
pub use convert_webm::WebmConverter;
