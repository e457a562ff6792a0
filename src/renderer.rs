//! The per-frame protocol: wait, begin, track hands, render each eye, end.

use openxr as xr;
use tracing::{debug, warn};

use crate::config::{ClipPlanes, Config};
use crate::device::{GraphicsDevice, Viewport};
use crate::error::{Error, Result};
use crate::input::{Hand, InputPoller};
use crate::math::{self, Pose};
use crate::runtime::{LayerView, View, XrRuntime};
use crate::scene::Scene;
use crate::session::SessionLifecycle;
use crate::swapchain::SwapchainManager;

/// What a single frame ended up doing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameOutcome {
    pub display_time: xr::Time,
    /// Eyes rendered and submitted; zero when the frame was submitted empty.
    pub rendered_views: usize,
    pub drawn_cubes: usize,
}

#[derive(Debug, Clone)]
pub struct FrameRenderer {
    clip: ClipPlanes,
    cube_scale: f32,
    clear_color: [f32; 4],
}

impl FrameRenderer {
    pub fn new(config: &Config) -> Self {
        Self {
            clip: config.clip,
            cube_scale: config.cube_scale,
            clear_color: config.clear_color,
        }
    }

    /// Runs one full frame. Must only be called while the session is running.
    ///
    /// Frame begin and end are always issued, even when nothing is visible,
    /// so the runtime's frame timing keeps advancing.
    pub fn render_frame<R, D>(
        &self,
        runtime: &mut R,
        device: &mut D,
        swapchains: &mut SwapchainManager<R::Swapchain, D::RenderTargetView, D::DepthStencilView>,
        lifecycle: &SessionLifecycle,
        input: &mut InputPoller,
        scene: &mut Scene,
    ) -> Result<FrameOutcome>
    where
        R: XrRuntime,
        D: GraphicsDevice<Image = R::Image>,
    {
        let frame = runtime.wait_frame()?;
        runtime.begin_frame()?;
        let display_time = frame.predicted_display_time;

        if lifecycle.is_focused() {
            track_hands(runtime, display_time, input, scene);
        }

        let mut outcome = FrameOutcome {
            display_time,
            rendered_views: 0,
            drawn_cubes: 0,
        };
        let blend_mode = runtime.environment_blend_mode();

        if !(lifecycle.is_visible() && frame.should_render) {
            runtime.end_frame(display_time, blend_mode, None)?;
            return Ok(outcome);
        }

        let views = runtime.locate_views(display_time)?;
        if views.len() != swapchains.len() {
            return Err(Error::ViewCountMismatch {
                views: views.len(),
                swapchains: swapchains.len(),
            });
        }

        for (index, view) in views.iter().enumerate() {
            outcome.drawn_cubes += self.render_view(runtime, device, swapchains, index, view, scene)?;
            outcome.rendered_views += 1;
        }

        let layer = views
            .iter()
            .zip(swapchains.iter())
            .map(|(view, swapchain)| LayerView {
                swapchain: swapchain.handle(),
                pose: view.pose,
                fov: view.fov,
                resolution: swapchain.resolution(),
            })
            .collect::<Vec<_>>();
        runtime.end_frame(display_time, blend_mode, Some(layer.as_slice()))?;

        debug!(
            views = outcome.rendered_views,
            cubes = outcome.drawn_cubes,
            "frame submitted"
        );
        Ok(outcome)
    }

    fn render_view<R, D>(
        &self,
        runtime: &mut R,
        device: &mut D,
        swapchains: &mut SwapchainManager<R::Swapchain, D::RenderTargetView, D::DepthStencilView>,
        index: usize,
        view: &View,
        scene: &Scene,
    ) -> Result<usize>
    where
        R: XrRuntime,
        D: GraphicsDevice<Image = R::Image>,
    {
        let provisioned = swapchains.len();
        let swapchain = swapchains
            .get_mut(index)
            .ok_or(Error::ViewCountMismatch {
                views: index + 1,
                swapchains: provisioned,
            })?;
        let resolution = swapchain.resolution();
        let image_index = runtime.acquire_image(swapchain.handle_mut())?;
        runtime.wait_image(swapchain.handle_mut(), xr::Duration::INFINITE)?;

        let targets = swapchains.targets(index, image_index)?;
        device.bind_targets(
            &targets.render_target,
            &targets.depth_stencil,
            Viewport::full(resolution),
            self.clear_color,
        );
        device.bind_cube_pipeline();

        let projection = math::projection_matrix(&view.fov, self.clip.near, self.clip.far);
        let view_projection = projection * math::view_matrix(&view.pose);
        device.set_view_projection(&math::shader_layout(view_projection))?;

        for cube in scene.cubes() {
            let model = math::model_matrix(cube, self.cube_scale);
            device.draw_cube(&math::shader_layout(model))?;
        }

        if let Some(swapchain) = swapchains.get_mut(index) {
            runtime.release_image(swapchain.handle_mut())?;
        }
        Ok(scene.len())
    }
}

/// Re-poses the hand cubes at the predicted display time.
fn track_hands<R: XrRuntime>(
    runtime: &mut R,
    display_time: xr::Time,
    input: &mut InputPoller,
    scene: &mut Scene,
) {
    for hand in Hand::BOTH {
        let state = input.hand_mut(hand);
        if state.pose_active {
            match runtime.locate_hand(hand, display_time) {
                Ok(location) => {
                    if let Some(pose) = location.tracked_pose() {
                        state.pose = pose;
                    }
                }
                Err(err) => warn!(?hand, %err, "couldn't locate hand"),
            }
        }

        let pose = if state.pose_active {
            state.pose
        } else {
            Pose::IDENTITY
        };
        scene.set_hand_cube(hand, pose);
    }
}
