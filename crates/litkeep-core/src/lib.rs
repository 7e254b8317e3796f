//! litkeep-core - Shared infrastructure for the litkeep pipeline
//!
//! HTTP facade, rate limiting, worker coordination, logging, and
//! progress reporting used by the registry and pipeline crates.

pub mod http;
pub mod logging;
pub mod progress;
pub mod ratelimit;
pub mod shutdown;
pub mod work_queue;

// Re-exports for convenience
pub use http::{
    FetchResponse, Fetcher, HttpConfig, HttpError, HttpFetcher, SHARED_RUNTIME, get_with_retry,
    http_client, http_config, set_http_config,
};
pub use logging::init_logging;
pub use progress::{ProgressContext, SharedProgress, fmt_num};
pub use ratelimit::TokenBucket;
pub use shutdown::{install_signal_handlers, shutdown_requested, trigger_shutdown};
pub use work_queue::WorkQueue;
