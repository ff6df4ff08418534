//! Server configuration.

/// Configuration for the record server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of changes per change page.
    pub max_page_size: usize,
    /// Maximum number of items (upserts plus deletes) per push.
    pub max_push_batch: usize,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_page_size: 100,
            max_push_batch: 1000,
        }
    }

    /// Sets the maximum page size.
    pub fn with_max_page_size(mut self, size: usize) -> Self {
        self.max_page_size = size.max(1);
        self
    }

    /// Sets the maximum push batch size.
    pub fn with_max_push_batch(mut self, size: usize) -> Self {
        self.max_push_batch = size;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.max_push_batch, 1000);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_page_size(0)
            .with_max_push_batch(50);

        assert_eq!(config.max_page_size, 1);
        assert_eq!(config.max_push_batch, 50);
    }
}
