//! FilterFE - the image-processing core of a raster editor plus a headless
//! batch shell.
//!
//! Buffers live in [`canvas`]; every operation is a pure function under
//! [`ops`] and is also reachable through [`ops::Operation`]. A
//! [`project::Document`] owns a current canvas with its undo history.

pub mod canvas;
pub mod cli;
pub mod error;
pub mod history;
pub mod io;
pub mod logger;
pub mod ops;
pub mod project;

pub use canvas::{BinaryMask, Canvas};
pub use error::{OpError, OpResult};
pub use ops::Operation;
