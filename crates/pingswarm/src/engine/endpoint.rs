use pingswarm_common::TargetConfig;
use std::fmt;

/// A target `(host, port)` pair. Fixed for the lifetime of the worker it is
/// assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Hands out endpoints round-robin over `[base_port, base_port + server_count)`.
///
/// The only state is the port counter; the sequence is fully determined by the
/// configuration and the number of calls made so far.
#[derive(Debug, Clone)]
pub struct EndpointAllocator {
    host: String,
    base_port: u16,
    server_count: u32,
    port_counter: u16,
}

impl EndpointAllocator {
    /// `server_count` must be at least 1 and the port range must fit in `u16`;
    /// both are enforced by `RunConfig::validate`.
    pub fn new(host: impl Into<String>, base_port: u16, server_count: u32) -> Self {
        Self {
            host: host.into(),
            base_port,
            server_count: server_count.max(1),
            port_counter: base_port,
        }
    }

    pub fn from_config(target: &TargetConfig) -> Self {
        Self::new(target.host.clone(), target.base_port, target.server_count)
    }

    /// Returns the endpoint for the current counter, then advances it, wrapping
    /// back to the base port after `server_count` ports.
    pub fn next(&mut self) -> Endpoint {
        let endpoint = Endpoint::new(self.host.clone(), self.port_counter);

        let next = u32::from(self.port_counter) + 1;
        self.port_counter = if next >= u32::from(self.base_port) + self.server_count {
            self.base_port
        } else {
            // next < base_port + server_count <= 65536
            next as u16
        };

        endpoint
    }

    /// Endpoint that worker `index` receives: `base_port + (index mod server_count)`.
    pub fn endpoint_for(&self, index: usize) -> Endpoint {
        let offset = (index as u64 % u64::from(self.server_count)) as u32;
        Endpoint::new(
            self.host.clone(),
            (u32::from(self.base_port) + offset) as u16,
        )
    }
}
