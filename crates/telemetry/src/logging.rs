use serde::{Deserialize, Serialize};
use std::env;
use std::io;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LogFormat {
    /// Human-readable format (default for development)
    #[default]
    Pretty,
    /// Compact text format
    Compact,
    /// JSON format for log aggregation systems
    Json,
}

impl LogFormat {
    /// Parse log format from the `LOG_FORMAT` environment variable
    pub fn from_env() -> Self {
        match env::var("LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => Self::Json,
            "compact" => Self::Compact,
            "pretty" => Self::Pretty,
            _ => Self::default(),
        }
    }
}

/// Initialize structured logging for the given service.
///
/// Honors `RUST_LOG` for filtering and `LOG_FORMAT` for output shape.
/// Safe to call more than once; later calls are no-ops.
pub fn init_with_service(service_name: impl Into<String>) {
    let service_name = service_name.into();
    let format = LogFormat::from_env();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tokio=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    let initialized = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true)
                    .with_writer(io::stdout),
            )
            .try_init()
            .is_ok(),
        LogFormat::Compact => registry
            .with(fmt::layer().compact().with_target(true))
            .try_init()
            .is_ok(),
        LogFormat::Pretty => registry
            .with(fmt::layer().pretty().with_target(true).with_line_number(true))
            .try_init()
            .is_ok(),
    };

    if initialized {
        tracing::info!(
            service.name = %service_name,
            format = ?format,
            "structured logging initialized"
        );
    }
}

/// Initialize logging with simple defaults
pub fn init() {
    init_with_service("camera-service");
}
