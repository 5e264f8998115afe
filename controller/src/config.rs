// config.rs - Controller configuration, fixed for the duration of one run

use std::time::Duration;

/// Simulation parameters sent with `RunGame`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub width: usize,
    pub height: usize,
    pub threads: usize,
    pub turns: u32,
}

impl Params {
    /// Sink key for a board at `turn`: `{width}x{height}x{turn}`.
    pub fn output_name(&self, turn: u32) -> String {
        format!("{}x{}x{}", self.width, self.height, turn)
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub server_addr: String,
    pub params: Params,
    /// How often to ask for the alive-cell count.
    pub poll_interval: Duration,
    /// Limit on every call except `RunGame`.
    pub request_timeout: Duration,
    /// Extra attempts for a poll that hit a transport error.
    pub poll_retries: u32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{}", conway_rpc::DEFAULT_PORT),
            params: Params { width: 512, height: 512, threads: 8, turns: 1000 },
            poll_interval: Duration::from_secs(2),
            request_timeout: Duration::from_secs(5),
            poll_retries: 1,
        }
    }
}
