//! Error taxonomy for setup and per-frame failures.
//!
//! Setup failures are fatal and abort before the window is shown. Per-frame
//! failures are recoverable: a draw that references a resource the admission
//! queue has not delivered yet is skipped for one frame and retried.

use thiserror::Error;

/// Fatal errors during visualizer startup.
///
/// Any of these means the render pipeline cannot be brought up at all, so
/// they are reported synchronously to the caller of
/// [`Visualizer::start`](crate::visualizer::Visualizer::start).
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("surface creation failed: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),

    #[error("no compatible GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),

    #[error("device request failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),

    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
}

/// Recoverable per-frame render errors.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A referenced geometry or volume has not been materialized yet. The
    /// affected op or draw is skipped and logged; the frame goes on.
    #[error("resource '{0}' not ready")]
    ResourceNotReady(String),

    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
}
