//! The narrow slice of the XR runtime that the session, input and frame loop
//! depend on. [`crate::openxr_runtime::OpenXrRuntime`] implements it over the
//! `openxr` crate.

use openxr as xr;

use crate::error::Result;
use crate::input::Hand;
use crate::math::{Fov, Pose};
use crate::session::SessionState;

/// Notifications drained from the runtime's event queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEvent {
    SessionStateChanged(SessionState),
    InstanceLossPending,
    EventsLost(u32),
}

/// Per-eye rendering recommendations, fixed for the lifetime of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    pub recommended_width: u32,
    pub recommended_height: u32,
    pub recommended_sample_count: u32,
}

/// An eye located at the predicted display time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    pub pose: Pose,
    pub fov: Fov,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceLocation {
    pub pose: Pose,
    pub position_valid: bool,
    pub orientation_valid: bool,
}

impl SpaceLocation {
    pub const UNTRACKED: Self = Self {
        pose: Pose::IDENTITY,
        position_valid: false,
        orientation_valid: false,
    };

    /// The pose, if both its position and its orientation are valid.
    pub fn tracked_pose(&self) -> Option<Pose> {
        (self.position_valid && self.orientation_valid).then_some(self.pose)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectState {
    pub current_state: bool,
    pub changed_since_last_sync: bool,
    pub last_change_time: xr::Time,
}

impl SelectState {
    pub fn released() -> Self {
        Self {
            current_state: false,
            changed_since_last_sync: false,
            last_change_time: xr::Time::from_nanos(0),
        }
    }

    /// Pressed since the previous action sync.
    pub fn just_pressed(&self) -> bool {
        self.current_state && self.changed_since_last_sync
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HandActionState {
    pub pose_active: bool,
    pub select: SelectState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    pub predicted_display_time: xr::Time,
    pub should_render: bool,
}

/// One eye of a projection layer.
#[derive(Debug)]
pub struct LayerView<'a, S> {
    pub swapchain: &'a S,
    pub pose: Pose,
    pub fov: Fov,
    pub resolution: (u32, u32),
}

/// Session begin/end requests issued by the lifecycle state machine.
pub trait SessionControl {
    fn begin_session(&mut self) -> Result<()>;
    fn end_session(&mut self) -> Result<()>;
}

pub trait XrRuntime: SessionControl {
    /// Runtime-owned image chain.
    type Swapchain;
    /// Graphics-API image handed out by a swapchain.
    type Image;

    /// Non-blocking; `None` once the queue is empty.
    fn poll_event(&mut self) -> Result<Option<RuntimeEvent>>;

    /// Asks the runtime to wind the session down. Returns `false` if the
    /// session was not running, in which case no exit sequence will follow.
    fn request_exit(&mut self) -> Result<bool>;

    fn view_configs(&self) -> &[ViewConfig];
    fn environment_blend_mode(&self) -> xr::EnvironmentBlendMode;

    fn create_swapchain(&mut self, config: &ViewConfig) -> Result<Self::Swapchain>;
    fn enumerate_images(&mut self, swapchain: &Self::Swapchain) -> Result<Vec<Self::Image>>;
    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain);

    /// Index of the image to render next; not necessarily sequential.
    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<u32>;
    fn wait_image(&mut self, swapchain: &mut Self::Swapchain, timeout: xr::Duration) -> Result<()>;
    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<()>;

    fn sync_actions(&mut self) -> Result<()>;
    fn hand_action_state(&mut self, hand: Hand) -> Result<HandActionState>;
    /// Locates the hand's grip space in the reference space at `time`.
    fn locate_hand(&mut self, hand: Hand, time: xr::Time) -> Result<SpaceLocation>;

    /// Blocks until the runtime schedules the next frame.
    fn wait_frame(&mut self) -> Result<FrameState>;
    fn begin_frame(&mut self) -> Result<()>;
    fn locate_views(&mut self, time: xr::Time) -> Result<Vec<View>>;
    /// Submits the frame; `layer` is `None` when nothing was rendered.
    fn end_frame(
        &mut self,
        display_time: xr::Time,
        blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, Self::Swapchain>]>,
    ) -> Result<()>;

    /// Releases hand spaces, actions, action set, reference space, session
    /// and instance, in that order.
    fn shutdown(self)
    where
        Self: Sized;
}
