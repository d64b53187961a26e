use std::sync::Arc;
use std::time::Duration;

/// Tunables for the reactor, the parser and the admission policy.
///
/// Built with the same pattern the rest of this crate's ancestry uses:
/// construct defaults with `Config::new()`, chain setters, then call
/// `.done()` to freeze it into an `Arc<Config>` that's cheap to clone
/// into every session.
#[derive(Debug, Clone)]
pub struct Config {
    request_buf_size: usize,
    response_buf_size: usize,
    request_timeout: Duration,
    keep_alive_timeout: Duration,
    max_content_length: u64,
    max_total_est_mem_usage: i64,
    max_token_length: usize,
    max_header_count: usize,
}

impl Config {
    /// Create a config with the defaults this crate ships with.
    pub fn new() -> Config {
        Config {
            request_buf_size: 1024,
            response_buf_size: 512,
            request_timeout: Duration::from_secs(20),
            keep_alive_timeout: Duration::from_secs(120),
            max_content_length: 8 * 1024 * 1024,
            max_total_est_mem_usage: 4 * 1024 * 1024 * 1024,
            max_token_length: 8 * 1024,
            max_header_count: 127,
        }
    }

    /// Initial capacity of a connection's read buffer.
    pub fn request_buf_size(&mut self, value: usize) -> &mut Self {
        self.request_buf_size = value;
        self
    }
    /// Initial capacity of a connection's write buffer.
    pub fn response_buf_size(&mut self, value: usize) -> &mut Self {
        self.response_buf_size = value;
        self
    }
    /// Deadline for a request's first byte and for each subsequent byte
    /// of its headers and body while data is still arriving.
    pub fn request_timeout(&mut self, value: Duration) -> &mut Self {
        self.request_timeout = value;
        self
    }
    /// Deadline for the next request to begin on an idle keep-alive
    /// connection.
    pub fn keep_alive_timeout(&mut self, value: Duration) -> &mut Self {
        self.keep_alive_timeout = value;
        self
    }
    /// Largest declared (or accumulated, for chunked) request body size
    /// this server will accept before responding `413`.
    pub fn max_content_length(&mut self, value: u64) -> &mut Self {
        self.max_content_length = value;
        self
    }
    /// Aggregate buffer capacity, across all connections, above which
    /// new connections are refused at accept time.
    pub fn max_total_est_mem_usage(&mut self, value: i64) -> &mut Self {
        self.max_total_est_mem_usage = value;
        self
    }
    /// Longest a single token (method, target, version, header name or
    /// value, chunk-size line) may grow before the request is rejected.
    pub fn max_token_length(&mut self, value: usize) -> &mut Self {
        self.max_token_length = value;
        self
    }
    /// Largest number of headers a single request may carry.
    pub fn max_header_count(&mut self, value: usize) -> &mut Self {
        self.max_header_count = value;
        self
    }

    /// Freeze this config into a reference-counted handle suitable for
    /// sharing across every session on the reactor.
    pub fn done(&mut self) -> Arc<Config> {
        Arc::new(self.clone())
    }

    pub fn get_request_buf_size(&self) -> usize { self.request_buf_size }
    pub fn get_response_buf_size(&self) -> usize { self.response_buf_size }
    pub fn get_request_timeout(&self) -> Duration { self.request_timeout }
    pub fn get_keep_alive_timeout(&self) -> Duration { self.keep_alive_timeout }
    pub fn get_max_content_length(&self) -> u64 { self.max_content_length }
    pub fn get_max_total_est_mem_usage(&self) -> i64 { self.max_total_est_mem_usage }
    pub fn get_max_token_length(&self) -> usize { self.max_token_length }
    pub fn get_max_header_count(&self) -> usize { self.max_header_count }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::new();
        assert_eq!(cfg.get_request_buf_size(), 1024);
        assert_eq!(cfg.get_response_buf_size(), 512);
        assert_eq!(cfg.get_max_content_length(), 8 * 1024 * 1024);
        assert_eq!(cfg.get_max_total_est_mem_usage(), 4 * 1024 * 1024 * 1024);
        assert_eq!(cfg.get_max_token_length(), 8 * 1024);
        assert_eq!(cfg.get_max_header_count(), 127);
    }

    #[test]
    fn builder_chains_and_freezes() {
        let cfg = Config::new()
            .max_header_count(16)
            .max_content_length(1024)
            .done();
        assert_eq!(cfg.get_max_header_count(), 16);
        assert_eq!(cfg.get_max_content_length(), 1024);
    }
}
