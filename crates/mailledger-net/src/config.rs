//! Stream configuration types.

use std::time::Duration;

/// Interval between cancellation checks while waiting for socket readiness.
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Network stream configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    /// Timeout for blocking reads. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Timeout for blocking writes. `None` waits forever.
    pub write_timeout: Option<Duration>,
    /// Tear down the connection when an async operation is cancelled.
    pub disconnect_on_cancel: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConfig {
    /// Creates a configuration without timeouts that disconnects on cancel.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            disconnect_on_cancel: true,
        }
    }

    /// Creates a configuration builder.
    #[must_use]
    pub const fn builder() -> StreamConfigBuilder {
        StreamConfigBuilder::new()
    }
}

/// Builder for stream configuration.
#[derive(Debug, Clone)]
pub struct StreamConfigBuilder {
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    disconnect_on_cancel: bool,
}

impl Default for StreamConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamConfigBuilder {
    /// Creates a new builder with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            read_timeout: None,
            write_timeout: None,
            disconnect_on_cancel: true,
        }
    }

    /// Sets the blocking read timeout.
    #[must_use]
    pub const fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Sets the blocking write timeout.
    #[must_use]
    pub const fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Sets both blocking timeouts.
    #[must_use]
    pub const fn io_timeout(self, timeout: Duration) -> Self {
        self.read_timeout(timeout).write_timeout(timeout)
    }

    /// Sets whether a cancelled async operation tears down the connection.
    #[must_use]
    pub const fn disconnect_on_cancel(mut self, disconnect: bool) -> Self {
        self.disconnect_on_cancel = disconnect;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub const fn build(self) -> StreamConfig {
        StreamConfig {
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            disconnect_on_cancel: self.disconnect_on_cancel,
        }
    }
}
