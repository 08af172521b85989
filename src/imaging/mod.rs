//! Image classification and thumbnail rendering

pub mod format;
pub mod thumbnail;

pub use format::SourceFormat;
pub use thumbnail::{fit_dimensions, ScaleMode, Thumbnailer};
