//! `[serve]` section configuration.
//!
//! Contains development server settings.
//!
//! # Example
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"       # Network interface (127.0.0.1 = localhost only)
//! port = 24678                  # WebSocket port number
//! watch = ["src"]               # Directories to watch, relative to the root
//! manifest = "hmr-graph.json"   # Module graph written by the compiler
//! ```
//!
//! Use `interface = "0.0.0.0"` to make the server accessible from LAN.

use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigDiagnostics;

/// Development server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeSection {
    /// Network interface to bind.
    /// - `127.0.0.1` (default): localhost only
    /// - `0.0.0.0`: all interfaces (LAN accessible)
    pub interface: IpAddr,

    /// WebSocket port number. The next free port is used if taken.
    pub port: u16,

    /// Directories to watch for changes.
    pub watch: Vec<PathBuf>,

    /// Module manifest path.
    pub manifest: PathBuf,
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
            port: 24678,
            watch: vec![PathBuf::from("src")],
            manifest: PathBuf::from("hmr-graph.json"),
        }
    }
}

impl ServeSection {
    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.port == 0 {
            diag.error("serve.port", "must be greater than 0");
        }
        if self.manifest.as_os_str().is_empty() {
            diag.error("serve.manifest", "must not be empty");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
    use std::path::PathBuf;

    use crate::config::test_parse_config;

    #[test]
    fn test_serve_config() {
        let config = test_parse_config(
            "[serve]\ninterface = \"0.0.0.0\"\nport = 8080\nwatch = [\"app\", \"lib\"]",
        );

        assert_eq!(
            config.serve.interface,
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
        );
        assert_eq!(config.serve.port, 8080);
        assert_eq!(
            config.serve.watch,
            vec![PathBuf::from("app"), PathBuf::from("lib")]
        );
    }

    #[test]
    fn test_serve_config_defaults() {
        let config = test_parse_config("");

        assert_eq!(
            config.serve.interface,
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
        );
        assert_eq!(config.serve.port, 24678);
        assert_eq!(config.serve.watch, vec![PathBuf::from("src")]);
        assert_eq!(config.serve.manifest, PathBuf::from("hmr-graph.json"));
    }

    #[test]
    fn test_serve_config_ipv6() {
        let config = test_parse_config("[serve]\ninterface = \"::1\"");
        assert_eq!(
            config.serve.interface,
            IpAddr::V6(Ipv6Addr::new(0, 0, 0, 0, 0, 0, 0, 1))
        );
    }
}
