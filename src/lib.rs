//! Hand-tracked hologram placement over OpenXR.
//!
//! The session state machine, swapchain bookkeeping, input polling and the
//! frame protocol are written against the [`runtime::XrRuntime`] and
//! [`device::GraphicsDevice`] traits. [`openxr_runtime`] and, on Windows,
//! [`d3d11`] provide the real implementations.

pub mod app;
pub mod config;
#[cfg(windows)]
pub mod d3d11;
pub mod device;
pub mod error;
pub mod input;
pub mod math;
pub mod openxr_runtime;
pub mod renderer;
pub mod runtime;
pub mod scene;
pub mod session;
pub mod swapchain;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
