use thiserror::Error;

// MARK: - PlayerError

#[derive(Error, Debug)]
pub enum PlayerError {
    #[error("Invalid usage: {reason}")]
    Usage { reason: String },

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Render error: {0}")]
    Render(#[from] RenderError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("VR runtime error: {0}")]
    Pose(#[from] PoseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure classes, each terminating the process with its own exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Usage,
    UnsupportedCapability,
    ResourceAcquisitionFailure,
    InvalidWindowReference,
    ShaderCompilationFailure,
    UpstreamFatalEvent,
    PoseSource,
}

impl ErrorClass {
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Usage => 1,
            Self::UnsupportedCapability => 2,
            Self::ResourceAcquisitionFailure => 3,
            Self::InvalidWindowReference => 4,
            Self::ShaderCompilationFailure => 5,
            Self::UpstreamFatalEvent => 6,
            Self::PoseSource => 7,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::UnsupportedCapability => "unsupported capability",
            Self::ResourceAcquisitionFailure => "resource acquisition failure",
            Self::InvalidWindowReference => "invalid window reference",
            Self::ShaderCompilationFailure => "shader compilation failure",
            Self::UpstreamFatalEvent => "playback failure",
            Self::PoseSource => "vr runtime failure",
        }
    }
}

impl PlayerError {
    pub fn usage(reason: impl Into<String>) -> Self {
        Self::Usage { reason: reason.into() }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Usage { .. } => ErrorClass::Usage,
            Self::Capture(e) => e.class(),
            Self::Render(e) => e.class(),
            Self::Decode(e) => e.class(),
            Self::Pose(_) => ErrorClass::PoseSource,
            Self::Io(_) => ErrorClass::ResourceAcquisitionFailure,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.class().exit_code()
    }
}

// MARK: - CaptureError

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Cannot open X display {name}")]
    DisplayUnavailable { name: String },

    #[error("Required extension missing: {name}")]
    ExtensionMissing { name: String },

    #[error("Redirected window capture unsupported (XComposite {major}.{minor}, need 0.2)")]
    CaptureUnsupported { major: i32, minor: i32 },

    #[error("Window {window:#x} is gone or cannot be queried")]
    WindowGone { window: u64 },

    #[error("No GLX framebuffer config can bind pixmaps to textures")]
    NoFramebufferConfig,

    #[error("Failed to acquire backing pixmap of window {window:#x}")]
    PixmapUnavailable { window: u64 },

    #[error("Failed to bind pixmap to texture: {reason}")]
    BindFailed { reason: String },
}

impl CaptureError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::DisplayUnavailable { .. }
            | Self::ExtensionMissing { .. }
            | Self::CaptureUnsupported { .. } => ErrorClass::UnsupportedCapability,
            Self::WindowGone { .. } => ErrorClass::InvalidWindowReference,
            Self::NoFramebufferConfig
            | Self::PixmapUnavailable { .. }
            | Self::BindFailed { .. } => ErrorClass::ResourceAcquisitionFailure,
        }
    }

    /// Whether the next resize may succeed where this attempt failed.
    pub fn is_retryable(&self) -> bool {
        matches!(self.class(), ErrorClass::ResourceAcquisitionFailure)
    }
}

// MARK: - RenderError

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Failed to compile {stage} shader '{program}': {log}")]
    ShaderCompilation {
        program: String,
        stage: String,
        log: String,
    },

    #[error("Failed to link shader program '{program}': {log}")]
    ProgramLink { program: String, log: String },

    #[error("Uniform '{name}' missing from program '{program}'")]
    MissingUniform { program: String, name: String },

    #[error("Framebuffer incomplete (status {status:#x})")]
    FramebufferIncomplete { status: u32 },

    #[error("Failed to allocate {resource}: {reason}")]
    ResourceAllocation { resource: String, reason: String },

    #[error("GL context unavailable: {reason}")]
    ContextUnavailable { reason: String },

    #[error("Required extension missing: {name}")]
    MissingExtension { name: String },
}

impl RenderError {
    pub fn allocation(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceAllocation {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::ShaderCompilation { .. } | Self::ProgramLink { .. } | Self::MissingUniform { .. } => {
                ErrorClass::ShaderCompilationFailure
            }
            Self::MissingExtension { .. } => ErrorClass::UnsupportedCapability,
            Self::FramebufferIncomplete { .. }
            | Self::ResourceAllocation { .. }
            | Self::ContextUnavailable { .. } => ErrorClass::ResourceAcquisitionFailure,
        }
    }
}

// MARK: - DecodeError

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Failed to initialise video engine: {reason}")]
    InitFailed { reason: String },

    #[error("Failed to load '{path}': {reason}")]
    LoadFailed { path: String, reason: String },

    #[error("Failed to render video frame: {reason}")]
    RenderFailed { reason: String },

    #[error("Playback error: {reason}")]
    Playback { reason: String },

    #[error("Decode thread unavailable: {reason}")]
    ThreadUnavailable { reason: String },
}

impl DecodeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Playback { .. } | Self::LoadFailed { .. } => ErrorClass::UpstreamFatalEvent,
            Self::InitFailed { .. } | Self::RenderFailed { .. } | Self::ThreadUnavailable { .. } => {
                ErrorClass::ResourceAcquisitionFailure
            }
        }
    }
}

// MARK: - PoseError

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PoseError {
    #[error("VR runtime unavailable: {reason}")]
    RuntimeUnavailable { reason: String },

    #[error("VR session error: {reason}")]
    Session { reason: String },

    #[error("VR frame error: {reason}")]
    Frame { reason: String },
}
