//! Execution options

use sprig_config::Config;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Knobs for [`crate::BuildGraphScheduler::execute`]
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Builds running at once
    pub max_parallelism: usize,
    /// Wait for another holder of a hash lock before failing the node
    pub lock_timeout: Duration,
    /// Stop starting nodes after the first failure
    pub fail_fast: bool,
    /// Leave a failed build's prefix in place
    pub keep_prefix: bool,
    /// Parallel jobs handed to each build
    pub build_jobs: usize,
    /// Cancelling stops new nodes from starting; running builds finish
    pub cancel: CancellationToken,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            max_parallelism: 1,
            lock_timeout: Duration::from_secs(300),
            fail_fast: false,
            keep_prefix: false,
            build_jobs: 1,
            cancel: CancellationToken::new(),
        }
    }
}

impl ExecuteOptions {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_parallelism: config.max_parallelism(),
            lock_timeout: config.lock_timeout(),
            fail_fast: config.install.fail_fast,
            keep_prefix: config.install.keep_prefix,
            build_jobs: config.build_jobs(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_max_parallelism(mut self, max: usize) -> Self {
        self.max_parallelism = max.max(1);
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    #[must_use]
    pub fn with_keep_prefix(mut self, keep: bool) -> Self {
        self.keep_prefix = keep;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}
