//! Image processing, pure Rust.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `ImageReader::into_dimensions`, AVIF container metadata |
//! | **Decode** | `image` decoders, `rav1d` for AVIF |
//! | **Resize** | Lanczos3 `resize_exact` |
//! | **Encode** | JPEG / PNG / AVIF via `image`, WebP via `webp` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for resize-candidate math (unit testable)
//! - **Parameters**: [`Quality`] and [`EncodeParams`] for one trial encode
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

mod avif;
pub mod backend;
pub mod calculations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use params::{EncodeParams, Quality};
pub use rust_backend::RustBackend;
