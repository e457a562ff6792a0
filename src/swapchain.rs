//! Per-eye swapchains and the views built over their images.

use tracing::{debug, info};

use crate::device::GraphicsDevice;
use crate::error::{Error, Result};
use crate::runtime::{ViewConfig, XrRuntime};

/// Color and depth targets for one swapchain image.
#[derive(Debug)]
pub struct ImageTargets<RTV, DSV> {
    pub render_target: RTV,
    pub depth_stencil: DSV,
}

/// A runtime image chain plus one [`ImageTargets`] per image, stored at the
/// image's runtime index.
#[derive(Debug)]
pub struct Swapchain<S, RTV, DSV> {
    handle: S,
    resolution: (u32, u32),
    targets: Vec<ImageTargets<RTV, DSV>>,
}

impl<S, RTV, DSV> Swapchain<S, RTV, DSV> {
    pub fn handle(&self) -> &S {
        &self.handle
    }

    pub fn handle_mut(&mut self) -> &mut S {
        &mut self.handle
    }

    pub fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    pub fn image_count(&self) -> usize {
        self.targets.len()
    }

    /// Targets for the image the runtime reported at acquire time.
    pub fn targets(&self, image_index: u32) -> Option<&ImageTargets<RTV, DSV>> {
        self.targets.get(image_index as usize)
    }

    fn create<R, D>(runtime: &mut R, device: &mut D, config: &ViewConfig) -> Result<Self>
    where
        R: XrRuntime<Swapchain = S>,
        D: GraphicsDevice<Image = R::Image, RenderTargetView = RTV, DepthStencilView = DSV>,
    {
        let handle = runtime.create_swapchain(config)?;
        let resolution = (config.recommended_width, config.recommended_height);

        let images = match runtime.enumerate_images(&handle) {
            Ok(images) if !images.is_empty() => images,
            Ok(_) => {
                runtime.destroy_swapchain(handle);
                return Err(Error::device("runtime allocated an empty swapchain"));
            }
            Err(err) => {
                runtime.destroy_swapchain(handle);
                return Err(err);
            }
        };

        let mut targets = Vec::with_capacity(images.len());
        for image in &images {
            match create_targets(device, image, resolution, config.recommended_sample_count) {
                Ok(image_targets) => targets.push(image_targets),
                Err(err) => {
                    release_targets(device, targets.drain(..));
                    runtime.destroy_swapchain(handle);
                    return Err(err);
                }
            }
        }

        Ok(Self {
            handle,
            resolution,
            targets,
        })
    }
}

fn create_targets<D: GraphicsDevice>(
    device: &mut D,
    image: &D::Image,
    resolution: (u32, u32),
    sample_count: u32,
) -> Result<ImageTargets<D::RenderTargetView, D::DepthStencilView>> {
    // INTERFACE POINT: runtime image -> device view.
    let render_target = device.create_render_target_view(image)?;
    match device.create_depth_stencil_view(resolution.0, resolution.1, sample_count) {
        Ok(depth_stencil) => Ok(ImageTargets {
            render_target,
            depth_stencil,
        }),
        Err(err) => {
            device.release_render_target_view(render_target);
            Err(err)
        }
    }
}

fn release_targets<D: GraphicsDevice>(
    device: &mut D,
    targets: impl Iterator<Item = ImageTargets<D::RenderTargetView, D::DepthStencilView>>,
) {
    for image_targets in targets {
        device.release_render_target_view(image_targets.render_target);
        device.release_depth_stencil_view(image_targets.depth_stencil);
    }
}

/// One swapchain per view, in view order.
#[derive(Debug)]
pub struct SwapchainManager<S, RTV, DSV> {
    swapchains: Vec<Swapchain<S, RTV, DSV>>,
}

impl<S, RTV, DSV> Default for SwapchainManager<S, RTV, DSV> {
    fn default() -> Self {
        Self {
            swapchains: Vec::new(),
        }
    }
}

impl<S, RTV, DSV> SwapchainManager<S, RTV, DSV> {
    /// Creates a swapchain and its per-image targets for every view.
    ///
    /// On failure everything created so far is released again.
    pub fn create_for_views<R, D>(
        runtime: &mut R,
        device: &mut D,
        configs: &[ViewConfig],
    ) -> Result<Self>
    where
        R: XrRuntime<Swapchain = S>,
        D: GraphicsDevice<Image = R::Image, RenderTargetView = RTV, DepthStencilView = DSV>,
    {
        let mut manager = Self {
            swapchains: Vec::with_capacity(configs.len()),
        };

        for (view, config) in configs.iter().enumerate() {
            match Swapchain::create(runtime, device, config) {
                Ok(swapchain) => {
                    info!(
                        view,
                        width = config.recommended_width,
                        height = config.recommended_height,
                        samples = config.recommended_sample_count,
                        images = swapchain.image_count(),
                        "created swapchain"
                    );
                    manager.swapchains.push(swapchain);
                }
                Err(err) => {
                    manager.destroy_all(runtime, device);
                    return Err(err);
                }
            }
        }

        Ok(manager)
    }

    /// Releases every image's views, then every runtime swapchain.
    /// Does nothing when the manager is already empty.
    pub fn destroy_all<R, D>(&mut self, runtime: &mut R, device: &mut D)
    where
        R: XrRuntime<Swapchain = S>,
        D: GraphicsDevice<Image = R::Image, RenderTargetView = RTV, DepthStencilView = DSV>,
    {
        if self.swapchains.is_empty() {
            return;
        }

        let mut handles = Vec::with_capacity(self.swapchains.len());
        for swapchain in self.swapchains.drain(..) {
            release_targets(device, swapchain.targets.into_iter());
            handles.push(swapchain.handle);
        }
        let count = handles.len();
        for handle in handles {
            runtime.destroy_swapchain(handle);
        }
        debug!(count, "destroyed swapchains");
    }

    pub fn len(&self) -> usize {
        self.swapchains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.swapchains.is_empty()
    }

    pub fn image_count(&self, view: usize) -> Option<usize> {
        self.swapchains.get(view).map(Swapchain::image_count)
    }

    pub fn extent(&self, view: usize) -> Option<(u32, u32)> {
        self.swapchains.get(view).map(Swapchain::resolution)
    }

    /// Targets of `view` for the image index the runtime handed out.
    pub fn targets(&self, view: usize, image_index: u32) -> Result<&ImageTargets<RTV, DSV>> {
        let swapchain = self.swapchains.get(view).ok_or(Error::ViewCountMismatch {
            views: view + 1,
            swapchains: self.swapchains.len(),
        })?;
        swapchain
            .targets(image_index)
            .ok_or(Error::ImageIndexOutOfRange {
                view,
                index: image_index,
                count: swapchain.image_count(),
            })
    }

    pub fn get(&self, view: usize) -> Option<&Swapchain<S, RTV, DSV>> {
        self.swapchains.get(view)
    }

    pub fn get_mut(&mut self, view: usize) -> Option<&mut Swapchain<S, RTV, DSV>> {
        self.swapchains.get_mut(view)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Swapchain<S, RTV, DSV>> {
        self.swapchains.iter()
    }
}
