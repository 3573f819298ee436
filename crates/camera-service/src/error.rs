use thiserror::Error;

/// Typed failure taxonomy for the camera subsystem.
///
/// Every variant carries a human-readable cause; `code` is the stable
/// machine identifier the request layer maps onto wire error responses.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("connect failed: {0}")]
    Connect(String),

    #[error("disconnect failed: {0}")]
    Disconnect(String),

    #[error("capture failed: {0}")]
    Capture(String),

    #[error("preview failed: {0}")]
    Preview(String),

    #[error("settings update failed: {0}")]
    Settings(String),

    #[error("device is not connected")]
    NotConnected,

    #[error("no active device")]
    NoActiveDevice,
}

impl CameraError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::Connect(_) => "connect_error",
            Self::Disconnect(_) => "disconnect_error",
            Self::Capture(_) => "capture_error",
            Self::Preview(_) => "preview_error",
            Self::Settings(_) => "settings_error",
            Self::NotConnected => "not_connected",
            Self::NoActiveDevice => "no_active_device",
        }
    }

    /// Innermost cause message, for re-wrapping an error under the
    /// operation that actually failed (a frame-read error surfaces as a
    /// `Capture` or `Preview` error depending on the caller).
    pub fn cause(&self) -> String {
        match self {
            Self::Validation(m)
            | Self::NotFound(m)
            | Self::BackendUnavailable(m)
            | Self::Connect(m)
            | Self::Disconnect(m)
            | Self::Capture(m)
            | Self::Preview(m)
            | Self::Settings(m) => m.clone(),
            Self::NotConnected | Self::NoActiveDevice => self.to_string(),
        }
    }
}
