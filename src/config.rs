use std::time::Duration;

/// Coordinate origin every pose is expressed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferenceSpace {
    #[default]
    Local,
    Stage,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipPlanes {
    pub near: f32,
    pub far: f32,
}

impl Default for ClipPlanes {
    fn default() -> Self {
        Self {
            near: 0.05,
            far: 100.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub application_name: String,
    pub reference_space: ReferenceSpace,
    /// How long the main loop sleeps while the session is not running.
    pub idle_backoff: Duration,
    pub clip: ClipPlanes,
    /// Edge half-length of every rendered cube, in meters.
    pub cube_scale: f32,
    pub clear_color: [f32; 4],
}

impl Default for Config {
    fn default() -> Self {
        Self {
            application_name: "openxr-placement".to_string(),
            reference_space: ReferenceSpace::Local,
            idle_backoff: Duration::from_millis(250),
            clip: ClipPlanes::default(),
            cube_scale: 0.05,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}
