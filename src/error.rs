use thiserror::Error;

/// Main error type for the splash sequencer
#[derive(Error, Debug)]
pub enum SplashError {
    #[error("Clip error: {0}")]
    Clip(#[from] ClipError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    #[error("Render surface error: {0}")]
    Surface(#[from] SurfaceError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reading clip descriptors
#[derive(Error, Debug)]
pub enum ClipError {
    #[error("Failed to read clip file: {path}")]
    ReadFailed { path: String },

    #[error("Failed to parse clip file: {path} - {reason}")]
    ParseFailed { path: String, reason: String },
}

/// Errors raised by the output pipeline while driving one clip
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Failed to attach subgraph {name}: {reason}")]
    AttachFailed { name: String, reason: String },

    #[error("Failed to link {branch} to the {sink} sink: {reason}")]
    LinkFailed {
        branch: String,
        sink: String,
        reason: String,
    },

    #[error("Failed to launch branch {branch}: {reason}")]
    LaunchFailed { branch: String, reason: String },

    #[error("Unknown subgraph: {name}")]
    UnknownSubgraph { name: String },

    #[error("Cover frame failed: {reason}")]
    CoverFailed { reason: String },
}

/// Errors acquiring the output surface
#[derive(Error, Debug)]
pub enum SurfaceError {
    #[error("Failed to open display: {display}")]
    DisplayUnavailable { display: String },

    #[error("Failed to obtain root window on display {display}")]
    NoRootWindow { display: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using SplashError
pub type Result<T> = std::result::Result<T, SplashError>;

impl SplashError {
    /// Whether sequencing can continue past this error.
    ///
    /// Pipeline and clip failures only ever cost the current clip; surface and
    /// configuration failures happen before sequencing starts and stop the process.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Pipeline(_) | Self::Clip(_) => true,
            Self::Io(_) => true,
            Self::Surface(_) | Self::Config(_) => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Surface(SurfaceError::DisplayUnavailable { display }) => {
                format!("Could not open display '{}'. Is the display server running?", display)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Clip(ClipError::ParseFailed { path, .. }) => {
                format!("Clip file '{}' is malformed and was skipped.", path)
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_clip_errors_are_recoverable() {
        let err: SplashError = PipelineError::LinkFailed {
            branch: "video".to_string(),
            sink: "video".to_string(),
            reason: "caps".to_string(),
        }
        .into();
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_startup_errors_are_fatal() {
        let err: SplashError = SurfaceError::DisplayUnavailable {
            display: ":0".to_string(),
        }
        .into();
        assert!(!err.is_recoverable());
        assert!(err.user_message().contains(":0"));
    }
}
