//! Application context: owns every runtime and device resource for the
//! lifetime of the process and drives the outer loop.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info};

use crate::config::Config;
use crate::device::GraphicsDevice;
use crate::error::Result;
use crate::input::InputPoller;
use crate::renderer::{FrameOutcome, FrameRenderer};
use crate::runtime::XrRuntime;
use crate::scene::Scene;
use crate::session::{LoopControl, SessionLifecycle};
use crate::swapchain::SwapchainManager;

type Swapchains<R, D> = SwapchainManager<
    <R as XrRuntime>::Swapchain,
    <D as GraphicsDevice>::RenderTargetView,
    <D as GraphicsDevice>::DepthStencilView,
>;

pub struct App<R, D>
where
    R: XrRuntime,
    D: GraphicsDevice<Image = R::Image>,
{
    config: Config,
    runtime: R,
    device: D,
    swapchains: Swapchains<R, D>,
    lifecycle: SessionLifecycle,
    input: InputPoller,
    scene: Scene,
    renderer: FrameRenderer,
    exit_requested: bool,
}

impl<R, D> App<R, D>
where
    R: XrRuntime,
    D: GraphicsDevice<Image = R::Image>,
{
    /// Provisions one swapchain per view on top of an already created session.
    ///
    /// On failure the runtime and the device are torn down before returning.
    pub fn new(config: Config, mut runtime: R, mut device: D) -> Result<Self> {
        let view_configs = runtime.view_configs().to_vec();
        let swapchains =
            match SwapchainManager::create_for_views(&mut runtime, &mut device, &view_configs) {
                Ok(swapchains) => swapchains,
                Err(err) => {
                    runtime.shutdown();
                    device.shutdown();
                    return Err(err);
                }
            };

        let renderer = FrameRenderer::new(&config);
        Ok(Self {
            config,
            runtime,
            device,
            swapchains,
            lifecycle: SessionLifecycle::new(),
            input: InputPoller::new(),
            scene: Scene::new(),
            renderer,
            exit_requested: false,
        })
    }

    /// Runs until the session reaches a terminal state, or until `interrupt`
    /// is raised and the runtime has wound the session down.
    pub fn run(&mut self, interrupt: &AtomicBool) -> Result<()> {
        loop {
            if interrupt.load(Ordering::Relaxed) && !self.exit_requested {
                info!("requesting exit");
                self.exit_requested = true;
                if !self.runtime.request_exit()? {
                    break;
                }
            }

            if self.pump_events()? == LoopControl::Exit {
                break;
            }

            if !self.lifecycle.is_running() {
                std::thread::sleep(self.config.idle_backoff);
                continue;
            }

            self.tick()?;
        }

        info!(
            state = self.lifecycle.state().as_str(),
            placed = self.scene.placed().len(),
            "main loop finished"
        );
        Ok(())
    }

    /// Drains every queued runtime event through the lifecycle.
    pub fn pump_events(&mut self) -> Result<LoopControl> {
        while let Some(event) = self.runtime.poll_event()? {
            if self.lifecycle.handle_event(event, &mut self.runtime)? == LoopControl::Exit {
                return Ok(LoopControl::Exit);
            }
        }
        Ok(LoopControl::Continue)
    }

    /// One running iteration: input, then a frame.
    pub fn tick(&mut self) -> Result<FrameOutcome> {
        let placed = self
            .input
            .poll(&mut self.runtime, &self.lifecycle, &mut self.scene)?;
        if placed > 0 {
            debug!(placed, "select placed cubes this tick");
        }

        self.renderer.render_frame(
            &mut self.runtime,
            &mut self.device,
            &mut self.swapchains,
            &self.lifecycle,
            &mut self.input,
            &mut self.scene,
        )
    }

    pub fn lifecycle(&self) -> &SessionLifecycle {
        &self.lifecycle
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn input(&self) -> &InputPoller {
        &self.input
    }

    pub fn swapchains(&self) -> &Swapchains<R, D> {
        &self.swapchains
    }

    pub fn runtime(&self) -> &R {
        &self.runtime
    }

    pub fn runtime_mut(&mut self) -> &mut R {
        &mut self.runtime
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Releases everything in reverse creation order: per-image views and
    /// swapchains, then the runtime objects, then the device.
    pub fn shutdown(mut self) {
        self.swapchains
            .destroy_all(&mut self.runtime, &mut self.device);
        self.runtime.shutdown();
        self.device.shutdown();
        info!("shut down cleanly");
    }
}
