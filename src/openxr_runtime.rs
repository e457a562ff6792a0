//! [`XrRuntime`] over the `openxr` crate.
//!
//! [`XrBootstrap`] covers everything that happens before a graphics device
//! exists: loader, instance, system, blend mode and the action set. Once the
//! device has been created against [`XrBootstrap::graphics_requirements`], the
//! bootstrap is turned into an [`OpenXrRuntime`] bound to that device.

use std::marker::PhantomData;

use openxr as xr;
use tracing::{debug, info};

use crate::config::{Config, ReferenceSpace};
use crate::error::{Error, Result, XrResultExt};
use crate::input::Hand;
use crate::math::Pose;
use crate::runtime::{
    FrameState, HandActionState, LayerView, RuntimeEvent, SelectState, SessionControl,
    SpaceLocation, View, ViewConfig, XrRuntime,
};
use crate::session::SessionState;

const VIEW_TYPE: xr::ViewConfigurationType = xr::ViewConfigurationType::PRIMARY_STEREO;
const INTERACTION_PROFILE: &str = "/interaction_profiles/khr/simple_controller";

/// Graphics binding the session is created with.
pub trait GraphicsApi: xr::Graphics {
    /// Name of the instance extension that enables this binding.
    const EXTENSION: &'static str;

    fn is_supported(extensions: &xr::ExtensionSet) -> bool;
    fn enable(extensions: &mut xr::ExtensionSet);
}

#[cfg(windows)]
impl GraphicsApi for xr::D3D11 {
    const EXTENSION: &'static str = "XR_KHR_D3D11_enable";

    fn is_supported(extensions: &xr::ExtensionSet) -> bool {
        extensions.khr_d3d11_enable
    }

    fn enable(extensions: &mut xr::ExtensionSet) {
        extensions.khr_d3d11_enable = true;
    }
}

/// The extension set to create the instance with, or
/// [`Error::MissingExtension`] if the runtime can't bind `G`.
pub fn required_extensions<G: GraphicsApi>(
    available: &xr::ExtensionSet,
) -> Result<xr::ExtensionSet> {
    if !G::is_supported(available) {
        return Err(Error::MissingExtension(G::EXTENSION));
    }
    let mut enabled = xr::ExtensionSet::default();
    G::enable(&mut enabled);
    Ok(enabled)
}

fn reference_space_type(space: ReferenceSpace) -> xr::ReferenceSpaceType {
    match space {
        ReferenceSpace::Local => xr::ReferenceSpaceType::LOCAL,
        ReferenceSpace::Stage => xr::ReferenceSpaceType::STAGE,
        ReferenceSpace::View => xr::ReferenceSpaceType::VIEW,
    }
}

fn session_state(state: xr::SessionState) -> SessionState {
    match state {
        xr::SessionState::IDLE => SessionState::Idle,
        xr::SessionState::READY => SessionState::Ready,
        xr::SessionState::SYNCHRONIZED => SessionState::Synchronized,
        xr::SessionState::VISIBLE => SessionState::Visible,
        xr::SessionState::FOCUSED => SessionState::Focused,
        xr::SessionState::STOPPING => SessionState::Stopping,
        xr::SessionState::EXITING => SessionState::Exiting,
        xr::SessionState::LOSS_PENDING => SessionState::LossPending,
        _ => SessionState::Unknown,
    }
}

fn space_location(location: &xr::SpaceLocation) -> SpaceLocation {
    let flags = location.location_flags;
    SpaceLocation {
        pose: Pose::from(location.pose),
        position_valid: flags.contains(xr::SpaceLocationFlags::POSITION_VALID),
        orientation_valid: flags.contains(xr::SpaceLocationFlags::ORIENTATION_VALID),
    }
}

/// The placement action set with its two actions, one subaction per hand.
struct HandActions {
    action_set: xr::ActionSet,
    hand_pose: xr::Action<xr::Posef>,
    place: xr::Action<bool>,
    hand_paths: [xr::Path; 2],
}

impl HandActions {
    fn new(instance: &xr::Instance) -> Result<Self> {
        let hand_paths = [
            instance
                .string_to_path(Hand::Left.user_path())
                .call("xrStringToPath")?,
            instance
                .string_to_path(Hand::Right.user_path())
                .call("xrStringToPath")?,
        ];

        let action_set = instance
            .create_action_set("place_hologram_action_set", "Placement", 0)
            .call("xrCreateActionSet")?;
        let hand_pose = action_set
            .create_action::<xr::Posef>("hand_pose", "Hand Pose", &hand_paths)
            .call("xrCreateAction")?;
        let place = action_set
            .create_action::<bool>("place_hologram", "Place Hologram", &hand_paths)
            .call("xrCreateAction")?;

        let binding_path = |suffix: &str| -> Result<[xr::Path; 2]> {
            let mut paths = [xr::Path::NULL; 2];
            for (path, hand) in paths.iter_mut().zip(Hand::BOTH) {
                *path = instance
                    .string_to_path(&format!("{}{suffix}", hand.user_path()))
                    .call("xrStringToPath")?;
            }
            Ok(paths)
        };
        let grips = binding_path("/input/grip/pose")?;
        let selects = binding_path("/input/select/click")?;

        instance
            .suggest_interaction_profile_bindings(
                instance
                    .string_to_path(INTERACTION_PROFILE)
                    .call("xrStringToPath")?,
                &[
                    xr::Binding::new(&hand_pose, grips[0]),
                    xr::Binding::new(&hand_pose, grips[1]),
                    xr::Binding::new(&place, selects[0]),
                    xr::Binding::new(&place, selects[1]),
                ],
            )
            .call("xrSuggestInteractionProfileBindings")?;

        Ok(Self {
            action_set,
            hand_pose,
            place,
            hand_paths,
        })
    }
}

/// Instance, system and actions, negotiated before any graphics device exists.
pub struct XrBootstrap<G: GraphicsApi> {
    instance: xr::Instance,
    system: xr::SystemId,
    blend_mode: xr::EnvironmentBlendMode,
    view_configs: Vec<ViewConfig>,
    actions: HandActions,
    _graphics: PhantomData<G>,
}

impl<G: GraphicsApi> XrBootstrap<G> {
    pub fn new(config: &Config) -> Result<Self> {
        #[cfg(feature = "static")]
        let entry = xr::Entry::linked();
        #[cfg(not(feature = "static"))]
        let entry = unsafe { xr::Entry::load() }.map_err(|err| {
            Error::LoaderUnavailable(format!(
                "{err:?}; try enabling the \"static\" feature"
            ))
        })?;

        let available = entry
            .enumerate_extensions()
            .call("xrEnumerateInstanceExtensionProperties")?;
        let enabled = required_extensions::<G>(&available)?;

        let instance = entry
            .create_instance(
                &xr::ApplicationInfo {
                    application_name: &config.application_name,
                    application_version: 0,
                    engine_name: &config.application_name,
                    engine_version: 0,
                    api_version: xr::Version::new(1, 0, 0),
                },
                &enabled,
                &[],
            )
            .call("xrCreateInstance")?;

        let properties = instance.properties().call("xrGetInstanceProperties")?;
        info!(
            runtime = %properties.runtime_name,
            version = %properties.runtime_version,
            "loaded OpenXR runtime"
        );

        let system = instance
            .system(xr::FormFactor::HEAD_MOUNTED_DISPLAY)
            .call("xrGetSystem")?;

        let blend_mode = instance
            .enumerate_environment_blend_modes(system, VIEW_TYPE)
            .call("xrEnumerateEnvironmentBlendModes")?
            .first()
            .copied()
            .unwrap_or(xr::EnvironmentBlendMode::OPAQUE);
        debug!(?blend_mode, "picked environment blend mode");

        let view_configs = instance
            .enumerate_view_configuration_views(system, VIEW_TYPE)
            .call("xrEnumerateViewConfigurationViews")?
            .iter()
            .map(|view| ViewConfig {
                recommended_width: view.recommended_image_rect_width,
                recommended_height: view.recommended_image_rect_height,
                recommended_sample_count: view.recommended_swapchain_sample_count,
            })
            .collect::<Vec<_>>();
        info!(views = view_configs.len(), "enumerated view configuration");

        let actions = HandActions::new(&instance)?;

        Ok(Self {
            instance,
            system,
            blend_mode,
            view_configs,
            actions,
            _graphics: PhantomData,
        })
    }

    /// Adapter and feature-level constraints the device must be created with.
    pub fn graphics_requirements(&self) -> Result<G::Requirements> {
        self.instance
            .graphics_requirements::<G>(self.system)
            .call("xrGetGraphicsRequirements")
    }
}

/// A running OpenXR session bound to a graphics device.
pub struct OpenXrRuntime<G: GraphicsApi> {
    instance: xr::Instance,
    session: xr::Session<G>,
    frame_waiter: xr::FrameWaiter,
    frame_stream: xr::FrameStream<G>,
    reference_space: xr::Space,
    actions: HandActions,
    hand_spaces: [xr::Space; 2],
    blend_mode: xr::EnvironmentBlendMode,
    view_configs: Vec<ViewConfig>,
    color_format: G::Format,
    event_storage: xr::EventDataBuffer,
}

impl<G: GraphicsApi> OpenXrRuntime<G> {
    /// Creates the session, attaches the action set and creates the spaces.
    ///
    /// # Safety
    ///
    /// `session_info` must reference a live graphics device that satisfies
    /// [`XrBootstrap::graphics_requirements`] and outlives the runtime.
    pub unsafe fn new(
        bootstrap: XrBootstrap<G>,
        session_info: &G::SessionCreateInfo,
        color_format: G::Format,
        reference_space: ReferenceSpace,
    ) -> Result<Self> {
        let XrBootstrap {
            instance,
            system,
            blend_mode,
            view_configs,
            actions,
            ..
        } = bootstrap;

        // INTERFACE POINT: the session takes the graphics device.
        let (session, frame_waiter, frame_stream) = unsafe {
            instance
                .create_session::<G>(system, session_info)
                .call("xrCreateSession")?
        };

        session
            .attach_action_sets(&[&actions.action_set])
            .call("xrAttachSessionActionSets")?;

        let reference_space = session
            .create_reference_space(reference_space_type(reference_space), xr::Posef::IDENTITY)
            .call("xrCreateReferenceSpace")?;

        let hand_spaces = [
            actions
                .hand_pose
                .create_space(session.clone(), actions.hand_paths[0], xr::Posef::IDENTITY)
                .call("xrCreateActionSpace")?,
            actions
                .hand_pose
                .create_space(session.clone(), actions.hand_paths[1], xr::Posef::IDENTITY)
                .call("xrCreateActionSpace")?,
        ];

        Ok(Self {
            instance,
            session,
            frame_waiter,
            frame_stream,
            reference_space,
            actions,
            hand_spaces,
            blend_mode,
            view_configs,
            color_format,
            event_storage: xr::EventDataBuffer::new(),
        })
    }
}

impl<G: GraphicsApi> SessionControl for OpenXrRuntime<G> {
    fn begin_session(&mut self) -> Result<()> {
        self.session.begin(VIEW_TYPE).call("xrBeginSession")?;
        Ok(())
    }

    fn end_session(&mut self) -> Result<()> {
        self.session.end().call("xrEndSession")?;
        Ok(())
    }
}

impl<G: GraphicsApi> XrRuntime for OpenXrRuntime<G> {
    type Swapchain = xr::Swapchain<G>;
    type Image = G::SwapchainImage;

    fn poll_event(&mut self) -> Result<Option<RuntimeEvent>> {
        use xr::Event::*;

        while let Some(event) = self
            .instance
            .poll_event(&mut self.event_storage)
            .call("xrPollEvent")?
        {
            let event = match event {
                SessionStateChanged(e) => {
                    RuntimeEvent::SessionStateChanged(session_state(e.state()))
                }
                InstanceLossPending(_) => RuntimeEvent::InstanceLossPending,
                EventsLost(e) => RuntimeEvent::EventsLost(e.lost_event_count()),
                _ => continue,
            };
            return Ok(Some(event));
        }
        Ok(None)
    }

    fn request_exit(&mut self) -> Result<bool> {
        match self.session.request_exit() {
            Ok(()) => Ok(true),
            Err(xr::sys::Result::ERROR_SESSION_NOT_RUNNING) => Ok(false),
            Err(result) => Err(Error::Runtime {
                call: "xrRequestExitSession",
                result,
            }),
        }
    }

    fn view_configs(&self) -> &[ViewConfig] {
        &self.view_configs
    }

    fn environment_blend_mode(&self) -> xr::EnvironmentBlendMode {
        self.blend_mode
    }

    /// One single-layer color swapchain sized for `config`, in the format the
    /// device renders to (INTERFACE POINT: OpenXR <-> Graphics).
    fn create_swapchain(&mut self, config: &ViewConfig) -> Result<Self::Swapchain> {
        self.session
            .create_swapchain(&xr::SwapchainCreateInfo {
                create_flags: xr::SwapchainCreateFlags::EMPTY,
                usage_flags: xr::SwapchainUsageFlags::COLOR_ATTACHMENT
                    | xr::SwapchainUsageFlags::SAMPLED,
                format: self.color_format,
                sample_count: config.recommended_sample_count,
                width: config.recommended_width,
                height: config.recommended_height,
                face_count: 1,
                array_size: 1,
                mip_count: 1,
            })
            .call("xrCreateSwapchain")
    }

    /// Raw textures behind `swapchain`, owned by the runtime
    /// (INTERFACE POINT: OpenXR -> Graphics).
    fn enumerate_images(&mut self, swapchain: &Self::Swapchain) -> Result<Vec<Self::Image>> {
        swapchain
            .enumerate_images()
            .call("xrEnumerateSwapchainImages")
    }

    fn destroy_swapchain(&mut self, swapchain: Self::Swapchain) {
        drop(swapchain);
    }

    fn acquire_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<u32> {
        swapchain.acquire_image().call("xrAcquireSwapchainImage")
    }

    fn wait_image(&mut self, swapchain: &mut Self::Swapchain, timeout: xr::Duration) -> Result<()> {
        swapchain.wait_image(timeout).call("xrWaitSwapchainImage")
    }

    fn release_image(&mut self, swapchain: &mut Self::Swapchain) -> Result<()> {
        swapchain.release_image().call("xrReleaseSwapchainImage")
    }

    fn sync_actions(&mut self) -> Result<()> {
        self.session
            .sync_actions(&[(&self.actions.action_set).into()])
            .call("xrSyncActions")
    }

    fn hand_action_state(&mut self, hand: Hand) -> Result<HandActionState> {
        let path = self.actions.hand_paths[hand.index()];
        let pose_active = self
            .actions
            .hand_pose
            .is_active(&self.session, path)
            .call("xrGetActionStatePose")?;
        let select = self
            .actions
            .place
            .state(&self.session, path)
            .call("xrGetActionStateBoolean")?;

        Ok(HandActionState {
            pose_active,
            select: SelectState {
                current_state: select.current_state,
                changed_since_last_sync: select.changed_since_last_sync,
                last_change_time: select.last_change_time,
            },
        })
    }

    fn locate_hand(&mut self, hand: Hand, time: xr::Time) -> Result<SpaceLocation> {
        let location = self.hand_spaces[hand.index()]
            .locate(&self.reference_space, time)
            .call("xrLocateSpace")?;
        Ok(space_location(&location))
    }

    /// Throttles the caller to the display's frame rate.
    fn wait_frame(&mut self) -> Result<FrameState> {
        let state = self.frame_waiter.wait().call("xrWaitFrame")?;
        Ok(FrameState {
            predicted_display_time: state.predicted_display_time,
            should_render: state.should_render,
        })
    }

    fn begin_frame(&mut self) -> Result<()> {
        self.frame_stream.begin().call("xrBeginFrame")
    }

    fn locate_views(&mut self, time: xr::Time) -> Result<Vec<View>> {
        let (_, views) = self
            .session
            .locate_views(VIEW_TYPE, time, &self.reference_space)
            .call("xrLocateViews")?;
        Ok(views
            .iter()
            .map(|view| View {
                pose: view.pose.into(),
                fov: view.fov.into(),
            })
            .collect())
    }

    fn end_frame(
        &mut self,
        display_time: xr::Time,
        blend_mode: xr::EnvironmentBlendMode,
        layer: Option<&[LayerView<'_, Self::Swapchain>]>,
    ) -> Result<()> {
        let Some(layer) = layer else {
            // Still required to keep frame timing going.
            return self
                .frame_stream
                .end(display_time, blend_mode, &[])
                .call("xrEndFrame");
        };

        let views = layer
            .iter()
            .map(|view| {
                xr::CompositionLayerProjectionView::new()
                    .pose(view.pose.to_xr())
                    .fov(view.fov.to_xr())
                    .sub_image(
                        xr::SwapchainSubImage::new()
                            .swapchain(view.swapchain)
                            .image_array_index(0)
                            .image_rect(xr::Rect2Di {
                                offset: xr::Offset2Di { x: 0, y: 0 },
                                extent: xr::Extent2Di {
                                    width: view.resolution.0 as _,
                                    height: view.resolution.1 as _,
                                },
                            }),
                    )
            })
            .collect::<Vec<_>>();
        // INTERFACE POINT: rendered swapchain images go back to the compositor.
        let projection = xr::CompositionLayerProjection::new()
            .space(&self.reference_space)
            .views(&views);
        let layers: [&xr::CompositionLayerBase<G>; 1] = [&projection];

        self.frame_stream
            .end(display_time, blend_mode, &layers)
            .call("xrEndFrame")
    }

    fn shutdown(self) {
        let Self {
            instance,
            session,
            frame_waiter,
            frame_stream,
            reference_space,
            actions,
            hand_spaces,
            ..
        } = self;
        let HandActions {
            action_set,
            hand_pose,
            place,
            ..
        } = actions;

        drop(hand_spaces);
        drop(hand_pose);
        drop(place);
        drop(action_set);
        drop(reference_space);
        drop(frame_stream);
        drop(frame_waiter);
        drop(session);
        drop(instance);
        debug!("released OpenXR session and instance");
    }
}
