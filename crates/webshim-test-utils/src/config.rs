//! Configuration builders for tests.
//!
//! Use [`TestConfigBuilder`] to create customised [`AppConfig`] values without
//! repeating boilerplate across crate boundaries.

use webshim_config::{AppConfig, BodyBuffering};

/// Fluent builder for [`AppConfig`] in tests.
///
/// # Example
///
/// ```ignore
/// let config = TestConfigBuilder::new()
///     .timeout_secs(5)
///     .body_buffering(BodyBuffering::LatestChunk)
///     .build();
/// ```
pub struct TestConfigBuilder {
    config: AppConfig,
}

impl TestConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: AppConfig::default(),
        }
    }

    pub fn user_agent(mut self, agent: &str) -> Self {
        self.config.fetch.user_agent = agent.to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch.timeout_secs = secs;
        self
    }

    pub fn max_redirects(mut self, n: usize) -> Self {
        self.config.fetch.max_redirects = n;
        self
    }

    pub fn body_buffering(mut self, buffering: BodyBuffering) -> Self {
        self.config.fetch.body_buffering = buffering;
        self
    }

    pub fn console_level(mut self, level: &str) -> Self {
        self.config.console.level = level.to_string();
        self
    }

    pub fn capture_capacity(mut self, n: usize) -> Self {
        self.config.console.capture_capacity = n;
        self
    }

    pub fn log_level(mut self, level: &str) -> Self {
        self.config.logging.level = level.to_string();
        self
    }

    pub fn build(self) -> AppConfig {
        self.config
    }
}

impl Default for TestConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
