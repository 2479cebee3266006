// =============================================================================
// Application Identity
// =============================================================================

/// Application name (for logging and diagnostics)
pub const APP_NAME: &str = "telebridge";

// =============================================================================
// Environment Variables
// =============================================================================

/// Environment variable for the OTLP receiver listen port
pub const ENV_PORT: &str = "OTLP_RECEIVER_PORT";

/// Environment variable for log verbosity (debug|info|warn|error)
pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";

/// Environment variable for session idle timeout in milliseconds
pub const ENV_SESSION_TIMEOUT: &str = "SESSION_TIMEOUT";

/// Environment variable for the ingress body cap in bytes
pub const ENV_MAX_REQUEST_SIZE: &str = "MAX_REQUEST_SIZE";

/// Environment variable for the Langfuse base URL
pub const ENV_LANGFUSE_HOST: &str = "LANGFUSE_HOST";

/// Environment variable for the Langfuse public key
pub const ENV_LANGFUSE_PUBLIC_KEY: &str = "LANGFUSE_PUBLIC_KEY";

/// Environment variable for the Langfuse secret key
pub const ENV_LANGFUSE_SECRET_KEY: &str = "LANGFUSE_SECRET_KEY";

/// Environment variable for the optional ingress bearer token
pub const ENV_API_KEY: &str = "API_KEY";

// =============================================================================
// Server Defaults
// =============================================================================

/// Listen on all interfaces; the receiver typically fronts a local client
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default OTLP/HTTP receiver port
pub const DEFAULT_PORT: u16 = 4318;

/// Default ingress body cap (10 MiB)
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 10 * 1024 * 1024;

// =============================================================================
// Sessions
// =============================================================================

/// Default session idle timeout in milliseconds (1 hour)
pub const DEFAULT_SESSION_TIMEOUT_MS: u64 = 3_600_000;

/// Sweeper interval in seconds
pub const SWEEP_INTERVAL_SECS: u64 = 60;

// =============================================================================
// Langfuse
// =============================================================================

/// Default Langfuse host
pub const DEFAULT_LANGFUSE_HOST: &str = "https://cloud.langfuse.com";

/// Sink flush timeout on shutdown, in seconds
pub const FLUSH_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// Shutdown
// =============================================================================

/// Bound on waiting for background tasks during shutdown, in seconds
pub const SHUTDOWN_TIMEOUT_SECS: u64 = 10;
