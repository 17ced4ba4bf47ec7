//! Source-side configuration consumed by the streamer.
//!
//! Loading and validating the config *file* is the binary's job; the core
//! only reads a handful of JSON-pointer paths out of the already-parsed
//! document, every one of them optional with a default:
//!
//! | path                                    | default               |
//! |-----------------------------------------|-----------------------|
//! | `/archiver/source/zmq_push_socket`      | `tcp://localhost:9999`|
//! | `/archiver/source/read_buffer_mb`       | 128                   |
//! | `/archiver/source/poll_interval`        | 3600 s                |
//! | `/archiver/source/workers`              | 1                     |
//! | `/archiver/source/using_header_appendix`| false                 |
//! | `/archiver/source/using_image_appendix` | false                 |
//!
//! The parsed value is passed by reference into constructors; nothing in
//! this crate holds process-wide configuration state.

use std::time::Duration;

use serde_json::Value;

use crate::json::{pointer_bool, pointer_i64, pointer_str};

/// Streamer parameters from the `/archiver/source` section.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Protocol and address of the DCU's ZeroMQ push socket.
    pub url: String,
    /// Receive buffer size in MiB. Must hold the largest single message
    /// part, i.e. one compressed image.
    pub read_buffer_mb: usize,
    /// Idle poll timeout between series.
    pub poll_interval: Duration,
    /// Transport I/O thread count.
    pub io_threads: i32,
    /// Expect a per-series appendix part after each global header.
    pub using_header_appendix: bool,
    /// Expect a per-image appendix part after each frame.
    pub using_image_appendix: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            url: "tcp://localhost:9999".to_owned(),
            read_buffer_mb: 128,
            poll_interval: Duration::from_secs(3600),
            io_threads: 1,
            using_header_appendix: false,
            using_image_appendix: false,
        }
    }
}

impl SourceConfig {
    /// Read the source section out of a loaded config document. Absent
    /// paths keep their defaults; present paths override only themselves.
    pub fn from_json(config: &Value) -> Self {
        let mut cfg = Self::default();

        if let Some(url) = pointer_str(config, "/archiver/source/zmq_push_socket") {
            cfg.url = url.to_owned();
        }
        if let Some(mb) = pointer_i64(config, "/archiver/source/read_buffer_mb") {
            cfg.read_buffer_mb = mb as usize;
        }
        if let Some(seconds) = pointer_i64(config, "/archiver/source/poll_interval") {
            cfg.poll_interval = Duration::from_secs(seconds as u64);
        }
        if let Some(workers) = pointer_i64(config, "/archiver/source/workers") {
            cfg.io_threads = workers as i32;
        }
        if let Some(flag) = pointer_bool(config, "/archiver/source/using_header_appendix") {
            cfg.using_header_appendix = flag;
        }
        if let Some(flag) = pointer_bool(config, "/archiver/source/using_image_appendix") {
            cfg.using_image_appendix = flag;
        }

        cfg
    }

    /// Receive buffer size in bytes.
    pub fn read_buffer_bytes(&self) -> usize {
        self.read_buffer_mb * 1024 * 1024
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_document_yields_all_defaults() {
        let cfg = SourceConfig::from_json(&json!({}));
        assert_eq!(cfg.url, "tcp://localhost:9999");
        assert_eq!(cfg.read_buffer_mb, 128);
        assert_eq!(cfg.read_buffer_bytes(), 128 * 1024 * 1024);
        assert_eq!(cfg.poll_interval, Duration::from_secs(3600));
        assert_eq!(cfg.io_threads, 1);
        assert!(!cfg.using_header_appendix);
        assert!(!cfg.using_image_appendix);
    }

    #[test]
    fn each_path_overrides_only_itself() {
        let cfg = SourceConfig::from_json(&json!({
            "archiver": {
                "source": {
                    "zmq_push_socket": "tcp://dcu.example.org:9999",
                    "poll_interval": 5,
                    "using_image_appendix": true,
                }
            }
        }));
        assert_eq!(cfg.url, "tcp://dcu.example.org:9999");
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
        assert!(cfg.using_image_appendix);
        // Untouched paths keep their defaults.
        assert_eq!(cfg.read_buffer_mb, 128);
        assert_eq!(cfg.io_threads, 1);
        assert!(!cfg.using_header_appendix);
    }

    #[test]
    fn ill_typed_values_fall_back_to_defaults() {
        let cfg = SourceConfig::from_json(&json!({
            "archiver": { "source": { "read_buffer_mb": "lots" } }
        }));
        assert_eq!(cfg.read_buffer_mb, 128);
    }
}
