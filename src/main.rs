//! Places cubes where the user's hands are when they press select.
//!
//! Renders one cube per tracked hand plus every placed cube to both eyes of
//! an OpenXR head-mounted display through Direct3D 11.

use std::process::ExitCode;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use openxr_placement::config::{ClipPlanes, Config, ReferenceSpace};
use openxr_placement::Error;

#[derive(ValueEnum, Debug, Clone, Copy)]
enum SpaceArg {
    Local,
    Stage,
    View,
}

impl From<SpaceArg> for ReferenceSpace {
    fn from(space: SpaceArg) -> Self {
        match space {
            SpaceArg::Local => ReferenceSpace::Local,
            SpaceArg::Stage => ReferenceSpace::Stage,
            SpaceArg::View => ReferenceSpace::View,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "openxr-placement", version, about = "Place cubes with your hands in OpenXR")]
struct Cli {
    /// Space every pose is expressed in
    #[arg(long, value_enum, default_value_t = SpaceArg::Local)]
    reference_space: SpaceArg,

    /// Sleep between event polls while the session is not running
    #[arg(long, default_value_t = 250)]
    idle_backoff_ms: u64,

    /// Near clip plane in meters
    #[arg(long, default_value_t = 0.05)]
    near: f32,

    /// Far clip plane in meters
    #[arg(long, default_value_t = 100.0)]
    far: f32,

    /// Cube half-extent in meters
    #[arg(long, default_value_t = 0.05)]
    cube_scale: f32,
}

impl Cli {
    fn into_config(self) -> Config {
        Config {
            reference_space: self.reference_space.into(),
            idle_backoff: Duration::from_millis(self.idle_backoff_ms),
            clip: ClipPlanes {
                near: self.near,
                far: self.far,
            },
            cube_scale: self.cube_scale,
            ..Config::default()
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "openxr_placement=info".into()),
        )
        .init();

    #[cfg(all(windows, feature = "static"))]
    #[link(name = "advapi32")]
    unsafe extern "C" {}

    let interrupt = Arc::new(AtomicBool::new(false));
    let flag = interrupt.clone();
    if let Err(err) = ctrlc::set_handler(move || flag.store(true, Ordering::Relaxed)) {
        error!(%err, "couldn't install the Ctrl-C handler");
        return ExitCode::FAILURE;
    }

    let result = run(cli.into_config(), &interrupt);
    ExitCode::from(exit_status(&result))
}

/// Logs how `run` ended and maps it to the process exit status.
fn exit_status(result: &anyhow::Result<()>) -> u8 {
    match result {
        Ok(()) => {
            info!("exiting cleanly");
            0
        }
        Err(err) => {
            let startup = err
                .downcast_ref::<Error>()
                .is_some_and(Error::is_startup);
            if startup {
                error!("startup failed: {err:#}");
            } else {
                error!("{err:#}");
            }
            1
        }
    }
}

#[cfg(windows)]
fn run(config: Config, interrupt: &AtomicBool) -> anyhow::Result<()> {
    use anyhow::Context;
    use openxr as xr;
    use openxr_placement::App;
    use openxr_placement::d3d11::{self, D3D11Device};
    use openxr_placement::openxr_runtime::{OpenXrRuntime, XrBootstrap};

    let bootstrap = XrBootstrap::<xr::D3D11>::new(&config).context("initializing OpenXR")?;
    let requirements = bootstrap.graphics_requirements()?;
    let device = D3D11Device::new(&requirements).context("creating the D3D11 device")?;

    // SAFETY: the app owns the device and releases the runtime before it.
    let runtime = unsafe {
        OpenXrRuntime::new(
            bootstrap,
            &device.session_create_info(),
            d3d11::COLOR_FORMAT,
            config.reference_space,
        )
    }
    .context("creating the OpenXR session")?;

    let mut app = App::new(config, runtime, device).context("creating swapchains")?;
    let result = app.run(interrupt);
    app.shutdown();
    result.context("session loop failed")
}

#[cfg(not(windows))]
fn run(_config: Config, _interrupt: &AtomicBool) -> anyhow::Result<()> {
    Err(Error::UnsupportedPlatform.into())
}
