use openxr as xr;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("couldn't load the OpenXR loader: {0}")]
    LoaderUnavailable(String),

    #[error("OpenXR runtime does not support the {0} extension")]
    MissingExtension(&'static str),

    #[error("no graphics adapter matches the runtime's required adapter {0}")]
    NoMatchingAdapter(String),

    #[error("graphics device error: {0}")]
    Device(String),

    #[error("graphics device failed while rendering: {0}")]
    Draw(String),

    #[error("{call} failed: {result}")]
    Runtime {
        call: &'static str,
        result: xr::sys::Result,
    },

    #[error("runtime located {views} views but {swapchains} swapchains are provisioned")]
    ViewCountMismatch { views: usize, swapchains: usize },

    #[error("runtime returned image index {index} for view {view}, which only has {count} images")]
    ImageIndexOutOfRange {
        view: usize,
        index: u32,
        count: usize,
    },

    #[error("the Direct3D 11 backend is only available on Windows")]
    UnsupportedPlatform,
}

impl Error {
    pub fn device(msg: impl Into<String>) -> Self {
        Self::Device(msg.into())
    }

    pub fn draw(msg: impl Into<String>) -> Self {
        Self::Draw(msg.into())
    }

    /// True for failures raised while negotiating the runtime or the device,
    /// before the main loop ever ran.
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            Self::LoaderUnavailable(_)
                | Self::MissingExtension(_)
                | Self::NoMatchingAdapter(_)
                | Self::Device(_)
                | Self::UnsupportedPlatform
        )
    }
}

/// Attaches the name of the runtime call to a raw OpenXR result.
pub(crate) trait XrResultExt<T> {
    fn call(self, call: &'static str) -> Result<T>;
}

impl<T> XrResultExt<T> for xr::Result<T> {
    fn call(self, call: &'static str) -> Result<T> {
        self.map_err(|result| Error::Runtime { call, result })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_errors_name_the_call() {
        let err: Result<()> = Err(xr::sys::Result::ERROR_SESSION_NOT_RUNNING).call("xrEndSession");
        let msg = err.unwrap_err().to_string();
        assert!(msg.starts_with("xrEndSession failed"));
    }

    #[test]
    fn negotiation_failures_are_startup_errors() {
        assert!(Error::MissingExtension("XR_KHR_D3D11_enable").is_startup());
        assert!(Error::NoMatchingAdapter("0:1".into()).is_startup());
        assert!(
            !Error::ViewCountMismatch {
                views: 1,
                swapchains: 2
            }
            .is_startup()
        );
    }

    #[test]
    fn device_failures_split_by_phase() {
        assert!(Error::device("CreateTexture2D (depth): out of memory").is_startup());
        assert!(!Error::draw("Map constant buffer: device removed").is_startup());
    }
}
