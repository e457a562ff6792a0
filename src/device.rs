//! Graphics-device capabilities the frame loop relies on.

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Viewport {
    /// Covers a whole image of the given resolution.
    pub fn full(resolution: (u32, u32)) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: resolution.0 as f32,
            height: resolution.1 as f32,
        }
    }
}

/// Device context bound to the runtime session.
///
/// Matrices handed to the device are already in [`crate::math::shader_layout`].
pub trait GraphicsDevice {
    /// Swapchain image as handed out by the runtime.
    type Image;
    type RenderTargetView;
    type DepthStencilView;

    fn create_render_target_view(&mut self, image: &Self::Image) -> Result<Self::RenderTargetView>;
    /// Allocates a depth texture matching the color image and keeps only its view.
    fn create_depth_stencil_view(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<Self::DepthStencilView>;
    fn release_render_target_view(&mut self, view: Self::RenderTargetView);
    fn release_depth_stencil_view(&mut self, view: Self::DepthStencilView);

    /// Clears both targets and binds them with `viewport`.
    fn bind_targets(
        &mut self,
        render_target: &Self::RenderTargetView,
        depth_stencil: &Self::DepthStencilView,
        viewport: Viewport,
        clear_color: [f32; 4],
    );
    /// Binds the cube program, constant buffers and mesh.
    fn bind_cube_pipeline(&mut self);
    fn set_view_projection(&mut self, view_projection: &[f32; 16]) -> Result<()>;
    /// Uploads `model` and issues one indexed draw of the cube mesh.
    ///
    /// Failures here are [`crate::error::Error::Draw`].
    fn draw_cube(&mut self, model: &[f32; 16]) -> Result<()>;

    fn shutdown(self)
    where
        Self: Sized;
}
