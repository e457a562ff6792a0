//! Scripted runtime and recording device used to drive the frame loop
//! without a headset.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use glam::{Quat, Vec3};
use openxr as xr;
use openxr_placement::config::Config;
use openxr_placement::device::{GraphicsDevice, Viewport};
use openxr_placement::error::{Error, Result};
use openxr_placement::input::Hand;
use openxr_placement::math::{Fov, Pose};
use openxr_placement::runtime::{
    FrameState, HandActionState, LayerView, RuntimeEvent, SelectState, SessionControl,
    SpaceLocation, View, ViewConfig, XrRuntime,
};
use openxr_placement::session::SessionState;

pub const FIRST_DISPLAY_TIME: i64 = 1_000_000;
pub const FRAME_PERIOD: i64 = 11_111_111;

pub fn config() -> Config {
    Config {
        idle_backoff: Duration::ZERO,
        ..Config::default()
    }
}

pub fn changed(states: &[SessionState]) -> Vec<RuntimeEvent> {
    states
        .iter()
        .copied()
        .map(RuntimeEvent::SessionStateChanged)
        .collect()
}

pub fn time(nanos: i64) -> xr::Time {
    xr::Time::from_nanos(nanos)
}

pub fn tracked(position: Vec3) -> SpaceLocation {
    SpaceLocation {
        pose: Pose::new(position, Quat::from_rotation_y(0.5)),
        position_valid: true,
        orientation_valid: true,
    }
}

fn failure(call: &'static str) -> Error {
    Error::Runtime {
        call,
        result: xr::sys::Result::ERROR_RUNTIME_FAILURE,
    }
}

/// One submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub display_time: xr::Time,
    /// Swapchain id and rect size of every layer view, in view order.
    pub views: Vec<(usize, (u32, u32))>,
}

/// Everything the runtime and the device were asked to do, in call order.
#[derive(Debug, Default)]
pub struct Journal {
    pub calls: Vec<String>,
    pub submissions: Vec<Submission>,
    pub located_hands: Vec<(Hand, xr::Time)>,
    pub bound_targets: Vec<(usize, u32, Viewport, [f32; 4])>,
    pub view_projections: Vec<[f32; 16]>,
    pub models: Vec<[f32; 16]>,
    pub depth_views: Vec<(u32, u32, u32)>,
}

impl Journal {
    pub fn count(&self, call: &str) -> usize {
        self.calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn position(&self, call: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.as_str() == call)
    }

    pub fn last_position(&self, prefix: &str) -> Option<usize> {
        self.calls.iter().rposition(|c| c.starts_with(prefix))
    }

    pub fn first_position(&self, prefix: &str) -> Option<usize> {
        self.calls.iter().position(|c| c.starts_with(prefix))
    }
}

pub type SharedJournal = Rc<RefCell<Journal>>;

#[derive(Debug)]
pub struct FakeSwapchain {
    pub id: usize,
    pub images: u32,
    acquired: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeImage {
    pub swapchain: usize,
    pub index: u32,
}

/// Runtime that replays event batches: each batch is delivered in one event
/// pump, and an empty poll moves on to the next batch. Once the script is
/// exhausted, polling fails so a broken test cannot spin forever.
pub struct FakeRuntime {
    pub journal: SharedJournal,
    pending: VecDeque<RuntimeEvent>,
    batches: VecDeque<Vec<RuntimeEvent>>,
    view_configs: Vec<ViewConfig>,
    pub views: Vec<View>,
    pub images_per_swapchain: u32,
    pub acquire_script: VecDeque<u32>,
    next_swapchain: usize,
    pub should_render: bool,
    frame: i64,
    session_running: bool,
    pub pose_active: [bool; 2],
    pub locations: [SpaceLocation; 2],
    pub locate_fails: [bool; 2],
    presses: [Option<xr::Time>; 2],
    select: [SelectState; 2],
    pub interrupt_on_frame: Option<(usize, Arc<AtomicBool>)>,
}

impl FakeRuntime {
    pub fn new(journal: &SharedJournal) -> Self {
        let config = ViewConfig {
            recommended_width: 1000,
            recommended_height: 800,
            recommended_sample_count: 1,
        };
        let eye = |x: f32| View {
            pose: Pose::new(Vec3::new(x, 1.6, 0.0), Quat::IDENTITY),
            fov: Fov::symmetric(0.8),
        };

        Self {
            journal: journal.clone(),
            pending: VecDeque::new(),
            batches: VecDeque::new(),
            view_configs: vec![config; 2],
            views: vec![eye(-0.032), eye(0.032)],
            images_per_swapchain: 3,
            acquire_script: VecDeque::new(),
            next_swapchain: 0,
            should_render: true,
            frame: 0,
            session_running: false,
            pose_active: [false; 2],
            locations: [SpaceLocation::UNTRACKED; 2],
            locate_fails: [false; 2],
            presses: [None; 2],
            select: [SelectState::released(); 2],
            interrupt_on_frame: None,
        }
    }

    /// Events delivered by the very next pump.
    pub fn deliver_now(&mut self, events: Vec<RuntimeEvent>) -> &mut Self {
        self.pending.extend(events);
        self
    }

    /// Events delivered by later pumps, one batch per pump.
    pub fn script(&mut self, batches: Vec<Vec<RuntimeEvent>>) -> &mut Self {
        self.batches.extend(batches);
        self
    }

    pub fn with_view_configs(mut self, configs: Vec<ViewConfig>) -> Self {
        self.view_configs = configs;
        self
    }

    /// The select button of `hand` goes down at `at`; seen by the next sync.
    pub fn press(&mut self, hand: Hand, at: xr::Time) {
        self.presses[hand.index()] = Some(at);
    }

    fn log(&self, call: impl Into<String>) {
        self.journal.borrow_mut().calls.push(call.into());
    }
}

impl SessionControl for FakeRuntime {
    fn begin_session(&mut self) -> Result<()> {
        self.log("begin_session");
        self.session_running = true;
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.log("end_session");
        self.session_running = false;
        Ok(())
    }
}

impl XrRuntime for FakeRuntime {
    type Swapchain = FakeSwapchain;
    type Image = FakeImage;

    fn poll_event(&mut self) -> Result<Option<RuntimeEvent>> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(Some(event));
        }
        match self.batches.pop_front() {
            Some(batch) => {
                self.pending.extend(batch);
                Ok(None)
            }
            None => Err(failure("script exhausted")),
        }
    }

    fn request_exit(&mut self) -> Result<bool> {
        self.log("request_exit");
        Ok(self.session_running)
    }

    fn view_configs(&self) -> &[ViewConfig] {
        &self.view_configs
    }

    fn environment_blend_mode(&self) -> xr::EnvironmentBlendMode {
        xr::EnvironmentBlendMode::OPAQUE
    }

    fn create_swapchain(&mut self, config: &ViewConfig) -> Result<Self::Swapchain> {
        let id = self.next_swapchain;
        self.next_swapchain += 1;
        self.log(format!(
            "create_swapchain {id} {}x{}",
            config.recommended_width, config.recommended_height
        ));
        Ok(FakeSwapchain {
            id,
            images: self.images_per_swapchain,
            acquired: None,
        })
    }

    fn enumerate_images(&mut self, swapchain: &Self::Swapchain) -> Result<Vec<Self::Image>> {
        Ok((0..swapchain.images)
            .map(|index| FakeImage {
                swapchain: swapchain.id,
                index,
            })
            .collect())
    }

    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain) {
        self.log(format!("destroy_swapchain {}", swapchain.id));
    }

    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<u32> {
        let index = self.acquire_script.pop_front().unwrap_or(0);
        swapchain.acquired = Some(index);
        self.log(format!("acquire {} -> {index}", swapchain.id));
        Ok(index)
    }

    fn wait_image(&mut self, swapchain: &mut Self::Swapchain, timeout: xr::Duration) -> Result<()> {
        assert_eq!(timeout, xr::Duration::INFINITE);
        assert!(swapchain.acquired.is_some(), "wait before acquire");
        self.log(format!("wait {}", swapchain.id));
        Ok(())
    }

    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<()> {
        assert!(swapchain.acquired.take().is_some(), "release before acquire");
        self.log(format!("release {}", swapchain.id));
        Ok(())
    }

    fn sync_actions(&mut self) -> Result<()> {
        self.log("sync_actions");
        for hand in Hand::BOTH {
            let i = hand.index();
            self.select[i] = match self.presses[i].take() {
                Some(at) => SelectState {
                    current_state: true,
                    changed_since_last_sync: true,
                    last_change_time: at,
                },
                None => SelectState {
                    changed_since_last_sync: false,
                    ..self.select[i]
                },
            };
        }
        Ok(())
    }

    fn hand_action_state(&mut self, hand: Hand) -> Result<HandActionState> {
        Ok(HandActionState {
            pose_active: self.pose_active[hand.index()],
            select: self.select[hand.index()],
        })
    }

    fn locate_hand(&mut self, hand: Hand, time: xr::Time) -> Result<SpaceLocation> {
        self.journal.borrow_mut().located_hands.push((hand, time));
        if self.locate_fails[hand.index()] {
            return Err(failure("xrLocateSpace"));
        }
        Ok(self.locations[hand.index()])
    }

    fn wait_frame(&mut self) -> Result<FrameState> {
        self.log("wait_frame");
        if let Some((frame, flag)) = &self.interrupt_on_frame {
            if *frame == self.frame as usize {
                flag.store(true, Ordering::Relaxed);
            }
        }
        let display = FIRST_DISPLAY_TIME + self.frame * FRAME_PERIOD;
        self.frame += 1;
        Ok(FrameState {
            predicted_display_time: time(display),
            should_render: self.should_render,
        })
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.log("begin_frame");
        Ok(())
    }

    fn locate_views(&mut self, _time: xr::Time) -> Result<Vec<View>> {
        Ok(self.views.clone())
    }

    fn end_frame(
        &mut self,
        display_time: xr::Time,
        _blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, Self::Swapchain>]>,
    ) -> Result<()> {
        let views = layer
            .unwrap_or_default()
            .iter()
            .map(|view| (view.swapchain.id, view.resolution))
            .collect::<Vec<_>>();
        let mut journal = self.journal.borrow_mut();
        journal.calls.push(format!("end_frame {}", views.len()));
        journal.submissions.push(Submission {
            display_time,
            views,
        });
        Ok(())
    }

    fn shutdown(self) {
        self.log("runtime shutdown");
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeTarget {
    pub swapchain: usize,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FakeDepth {
    pub width: u32,
    pub height: u32,
}

/// Device that records every call and can be told to fail a view creation.
pub struct FakeDevice {
    pub journal: SharedJournal,
    /// Fail the n-th (0-based) render target view creation.
    pub fail_render_target_at: Option<usize>,
    /// Fail every cube draw.
    pub fail_draw: bool,
    render_targets_created: usize,
    bound: Option<FakeTarget>,
}

impl FakeDevice {
    pub fn new(journal: &SharedJournal) -> Self {
        Self {
            journal: journal.clone(),
            fail_render_target_at: None,
            fail_draw: false,
            render_targets_created: 0,
            bound: None,
        }
    }

    fn log(&self, call: impl Into<String>) {
        self.journal.borrow_mut().calls.push(call.into());
    }
}

impl GraphicsDevice for FakeDevice {
    type Image = FakeImage;
    type RenderTargetView = FakeTarget;
    type DepthStencilView = FakeDepth;

    fn create_render_target_view(&mut self, image: &Self::Image) -> Result<Self::RenderTargetView> {
        let attempt = self.render_targets_created;
        self.render_targets_created += 1;
        if self.fail_render_target_at == Some(attempt) {
            return Err(Error::device("CreateRenderTargetView: out of memory"));
        }
        self.log(format!("create rtv {}/{}", image.swapchain, image.index));
        Ok(FakeTarget {
            swapchain: image.swapchain,
            index: image.index,
        })
    }

    fn create_depth_stencil_view(
        &mut self,
        width: u32,
        height: u32,
        sample_count: u32,
    ) -> Result<Self::DepthStencilView> {
        self.log("create dsv");
        self.journal
            .borrow_mut()
            .depth_views
            .push((width, height, sample_count));
        Ok(FakeDepth { width, height })
    }

    fn release_render_target_view(&mut self, view: Self::RenderTargetView) {
        self.log(format!("release rtv {}/{}", view.swapchain, view.index));
    }

    fn release_depth_stencil_view(&mut self, _view: Self::DepthStencilView) {
        self.log("release dsv");
    }

    fn bind_targets(
        &mut self,
        render_target: &Self::RenderTargetView,
        _depth_stencil: &Self::DepthStencilView,
        viewport: Viewport,
        clear_color: [f32; 4],
    ) {
        self.bound = Some(*render_target);
        self.journal.borrow_mut().bound_targets.push((
            render_target.swapchain,
            render_target.index,
            viewport,
            clear_color,
        ));
    }

    fn bind_cube_pipeline(&mut self) {
        assert!(self.bound.is_some(), "pipeline bound without targets");
    }

    fn set_view_projection(&mut self, view_projection: &[f32; 16]) -> Result<()> {
        self.journal
            .borrow_mut()
            .view_projections
            .push(*view_projection);
        Ok(())
    }

    fn draw_cube(&mut self, model: &[f32; 16]) -> Result<()> {
        if self.fail_draw {
            return Err(Error::draw("Map constant buffer: device removed"));
        }
        self.journal.borrow_mut().models.push(*model);
        Ok(())
    }

    fn shutdown(self) {
        self.log("device shutdown");
    }
}

/// A fresh journal with a runtime and device writing into it.
pub fn fakes() -> (SharedJournal, FakeRuntime, FakeDevice) {
    let journal = SharedJournal::default();
    let runtime = FakeRuntime::new(&journal);
    let device = FakeDevice::new(&journal);
    (journal, runtime, device)
}
