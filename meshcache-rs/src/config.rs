//! Contains the node configuration.
//!
//! A cache node is configured via a small YAML file which specifies the server binding,
//! the peer set and the caches to create:
//!
//! ```yaml
//! server:
//!     host: 0.0.0.0
//!     port: 9998
//!     # The URL prefix under which the peers reach this node. This is also the id of
//!     # the node on the consistent hash ring.
//!     public_url: http://cache-1:9998
//!     base_path: /_cacheserver/
//!
//! peers:
//!     - http://cache-1:9998
//!     - http://cache-2:9998
//!
//! caches:
//!     scores:
//!         # Supports common suffixes like: k, m, g, t. 0 means unbounded.
//!         max_memory: 64m
//! ```
//!
//! Everything is optional: a missing or partial config yields a single node listening on
//! **0.0.0.0:9998** without any peers. Invalid cache sections are skipped (with an error
//! log) instead of taking the node down.
use anyhow::Context;
use yaml_rust::{Yaml, YamlLoader};

use crate::fmt::parse_size;

/// Contains the fallback port on which a node listens.
const DEFAULT_PORT: i64 = 9998;

/// Provides access to the configuration of a cache node.
pub struct Config {
    doc: Yaml,
}

/// Describes a single cache to be created at startup.
pub struct CacheSettings {
    /// Contains the name of the cache (the namespace of its controller).
    pub name: String,

    /// Contains the memory budget of the cache in bytes (0 = unbounded).
    pub max_memory: usize,
}

impl Config {
    /// Loads the configuration from the given file.
    pub fn load_from_file(path: &str) -> anyhow::Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        Config::load_from_string(&contents)
    }

    /// Parses the configuration from the given YAML string.
    ///
    /// # Examples
    /// ```
    /// # use meshcache::config::Config;
    /// let config = Config::load_from_string("
    /// server:
    ///     port: 1503
    /// ").unwrap();
    ///
    /// assert_eq!(config.server_address(), "0.0.0.0:1503");
    /// assert_eq!(config.public_url(), "http://127.0.0.1:1503");
    /// ```
    pub fn load_from_string(yaml: &str) -> anyhow::Result<Config> {
        let docs = YamlLoader::load_from_str(yaml).context("Failed to parse the config")?;

        Ok(Config {
            doc: docs.into_iter().next().unwrap_or(Yaml::Null),
        })
    }

    fn port(&self) -> i64 {
        self.doc["server"]["port"]
            .as_i64()
            .filter(|port| *port > 0 && *port <= u16::MAX as i64)
            .unwrap_or(DEFAULT_PORT)
    }

    /// Returns the address (host and port) to bind the server socket to.
    ///
    /// If no, an invalid or a partial config is present, fallback values are used. By
    /// default we use port 9998 and bind to "0.0.0.0".
    pub fn server_address(&self) -> String {
        format!(
            "{}:{}",
            self.doc["server"]["host"].as_str().unwrap_or("0.0.0.0"),
            self.port()
        )
    }

    /// Returns the URL prefix under which the peers reach this node.
    ///
    /// This is the id of the node on the consistent hash ring and should therefore match
    /// one of the entries in the peer list exactly.
    pub fn public_url(&self) -> String {
        self.doc["server"]["public_url"]
            .as_str()
            .map(|url| url.to_owned())
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port()))
    }

    /// Returns the base path under which the cache endpoints are served (if configured).
    pub fn base_path(&self) -> Option<&str> {
        self.doc["server"]["base_path"].as_str()
    }

    /// Returns the URL prefixes of all peers forming the cache mesh.
    pub fn peers(&self) -> Vec<String> {
        self.doc["peers"]
            .as_vec()
            .map(|peers| {
                peers
                    .iter()
                    .filter_map(|peer| peer.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Returns the settings of all caches to create at startup.
    ///
    /// Invalid entries are skipped (and logged), so that one bad section cannot prevent
    /// the node from serving its remaining caches.
    pub fn caches(&self) -> Vec<CacheSettings> {
        let mut result = Vec::new();

        if let Some(caches) = self.doc["caches"].as_hash() {
            for (name, settings) in caches {
                let name = match name.as_str() {
                    Some(name) => name,
                    None => continue,
                };

                let max_memory = match &settings["max_memory"] {
                    Yaml::Integer(bytes) if *bytes >= 0 => *bytes as usize,
                    Yaml::String(expression) => match parse_size(expression) {
                        Ok(bytes) => bytes,
                        Err(error) => {
                            log::error!(
                                "Not going to create cache '{}' as its max_memory is invalid: {}",
                                name,
                                error
                            );
                            continue;
                        }
                    },
                    _ => {
                        log::error!(
                            "Not going to create cache '{}' as no max_memory was given.",
                            name
                        );
                        continue;
                    }
                };

                result.push(CacheSettings {
                    name: name.to_owned(),
                    max_memory,
                });
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use crate::config::Config;

    #[test]
    fn a_missing_config_yields_sane_defaults() {
        let config = Config::load_from_string("").unwrap();

        assert_eq!(config.server_address(), "0.0.0.0:9998");
        assert_eq!(config.public_url(), "http://127.0.0.1:9998");
        assert_eq!(config.base_path(), None);
        assert_eq!(config.peers().len(), 0);
        assert_eq!(config.caches().len(), 0);
    }

    #[test]
    fn a_full_config_is_read_correctly() {
        let config = Config::load_from_string(
            "
server:
    host: 127.0.0.1
    port: 1503
    public_url: http://cache-1:1503
    base_path: /_cache/

peers:
    - http://cache-1:1503
    - http://cache-2:1503

caches:
    scores:
        max_memory: 64m
    sessions:
        max_memory: 4096
",
        )
        .unwrap();

        assert_eq!(config.server_address(), "127.0.0.1:1503");
        assert_eq!(config.public_url(), "http://cache-1:1503");
        assert_eq!(config.base_path(), Some("/_cache/"));
        assert_eq!(
            config.peers(),
            vec!["http://cache-1:1503", "http://cache-2:1503"]
        );

        let caches = config.caches();
        assert_eq!(caches.len(), 2);
        assert_eq!(caches[0].name, "scores");
        assert_eq!(caches[0].max_memory, 64 * 1024 * 1024);
        assert_eq!(caches[1].name, "sessions");
        assert_eq!(caches[1].max_memory, 4096);
    }

    #[test]
    fn invalid_cache_sections_are_skipped() {
        let config = Config::load_from_string(
            "
caches:
    broken:
        max_memory: lots
    missing:
        size: 42
    scores:
        max_memory: 1k
",
        )
        .unwrap();

        let caches = config.caches();
        assert_eq!(caches.len(), 1);
        assert_eq!(caches[0].name, "scores");
        assert_eq!(caches[0].max_memory, 1024);
    }

    #[test]
    fn an_invalid_port_falls_back_to_the_default() {
        let config = Config::load_from_string(
            "
server:
    port: -2
",
        )
        .unwrap();

        assert_eq!(config.server_address(), "0.0.0.0:9998");
    }
}
