//! Common types shared across the crate.
//!
//! This module contains the primitives every tree is built from:
//! - Configuration constants and [`TreeConfig`]
//! - Error types
//! - [`Degree`] and [`Layout`]

pub mod config;
pub mod error;
mod degree;
mod layout;

pub use config::TreeConfig;
pub use degree::Degree;
pub use error::{Error, Result};
pub use layout::Layout;
