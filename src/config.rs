//! Engine configuration.

use crate::limits::ResourceLimits;

/// Upper bound on worker threads.
pub const MAX_WORKER_THREADS: usize = 64;

/// Default cap applied to the detected core count.
pub const DEFAULT_WORKER_CAP: usize = 4;

/// Configuration for a [`RenderEngine`](crate::RenderEngine).
///
/// ```
/// use rawview::{EngineConfig, ResourceLimits};
///
/// let config = EngineConfig::new()
///     .with_worker_threads(2)
///     .with_thread_name_prefix("viewer-decode")
///     .with_limits(ResourceLimits::none().with_max_pixels(50_000_000));
/// assert_eq!(config.worker_threads(), 2);
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    worker_threads: Option<usize>,
    thread_name_prefix: String,
    limits: ResourceLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineConfig {
    /// Detected core count (capped at 4), no limits.
    pub fn new() -> Self {
        Self {
            worker_threads: None,
            thread_name_prefix: "rawview-render".to_owned(),
            limits: ResourceLimits::none(),
        }
    }

    /// Fix the worker count. Clamped to `1..=MAX_WORKER_THREADS`.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads.clamp(1, MAX_WORKER_THREADS));
        self
    }

    /// Prefix for worker thread names; workers are named `{prefix}-{index}`.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Limits checked before every render.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Resolved worker count.
    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
                .min(DEFAULT_WORKER_CAP)
        })
    }

    /// Worker thread name prefix.
    pub fn thread_name_prefix(&self) -> &str {
        &self.thread_name_prefix
    }

    /// Resource limits.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_capped() {
        let n = EngineConfig::default().worker_threads();
        assert!((1..=DEFAULT_WORKER_CAP).contains(&n));
        assert!(!EngineConfig::default().limits().has_any());
    }

    #[test]
    fn explicit_threads_are_clamped() {
        assert_eq!(EngineConfig::new().with_worker_threads(0).worker_threads(), 1);
        assert_eq!(
            EngineConfig::new().with_worker_threads(1000).worker_threads(),
            MAX_WORKER_THREADS
        );
        assert_eq!(EngineConfig::new().with_worker_threads(8).worker_threads(), 8);
    }

    #[test]
    fn prefix_and_limits() {
        let c = EngineConfig::new()
            .with_thread_name_prefix("x")
            .with_limits(ResourceLimits::none().with_max_width(10));
        assert_eq!(c.thread_name_prefix(), "x");
        assert_eq!(c.limits().max_width, Some(10));
    }
}
