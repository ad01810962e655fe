//! Config file discovery, loading, and environment variable overlay.

use crate::{ConfigError, ExtentConfig};
use extent::FlushPolicy;
use std::env;
use std::path::{Path, PathBuf};

/// Information about where config values came from.
#[derive(Debug, Clone, Default)]
pub struct ConfigSources {
    /// Config files that were loaded (in order)
    pub files: Vec<PathBuf>,
    /// Environment variables that overrode config values
    pub env_overrides: Vec<String>,
}

/// Discover config files in standard locations.
///
/// Returns paths in load order (system, user, local).
/// Only returns files that exist.
pub fn discover_config_files() -> Vec<PathBuf> {
    discover_config_files_with_override(None)
}

/// Discover config files, optionally with a CLI override path.
///
/// If `cli_path` is provided it replaces the local `./extentfs.toml`. A CLI
/// path that does not exist is still returned so loading it fails loudly.
pub fn discover_config_files_with_override(cli_path: Option<&Path>) -> Vec<PathBuf> {
    let mut files = Vec::new();

    let system = PathBuf::from("/etc/extentfs/config.toml");
    if system.exists() {
        files.push(system);
    }

    // XDG_CONFIG_HOME or ~/.config
    if let Some(config_dir) = directories::BaseDirs::new().map(|d| d.config_dir().to_path_buf()) {
        let user = config_dir.join("extentfs/config.toml");
        if user.exists() {
            files.push(user);
        }
    }

    if let Some(path) = cli_path {
        files.push(path.to_path_buf());
        return files;
    }

    let local = PathBuf::from("extentfs.toml");
    if local.exists() {
        files.push(local);
    }

    files
}

/// Read a TOML file and layer it onto `config`.
pub fn apply_file(config: &mut ExtentConfig, path: &Path) -> Result<(), ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    apply_toml(config, &contents, path)
}

/// Layer a TOML document onto `config`. Keys absent from the document keep
/// their current value, so later files only override what they mention.
pub(crate) fn apply_toml(
    config: &mut ExtentConfig,
    contents: &str,
    path: &Path,
) -> Result<(), ConfigError> {
    let table: toml::Table = contents.parse().map_err(|e: toml::de::Error| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let invalid = |key: &str, reason: String| ConfigError::Invalid {
        key: format!("{}: {key}", path.display()),
        reason,
    };

    if let Some(paths) = table.get("paths").and_then(|v| v.as_table()) {
        if let Some(v) = paths.get("extent_dir").and_then(|v| v.as_str()) {
            config.paths.extent_dir = expand_path(v);
        }
    }

    if let Some(bind) = table.get("bind").and_then(|v| v.as_table()) {
        if let Some(v) = bind.get("host").and_then(|v| v.as_str()) {
            config.bind.host = v.to_string();
        }
        if let Some(v) = bind.get("port").and_then(|v| v.as_integer()) {
            config.bind.port =
                u16::try_from(v).map_err(|_| invalid("bind.port", format!("{v} is not a port")))?;
        }
    }

    if let Some(client) = table.get("client").and_then(|v| v.as_table()) {
        if let Some(v) = client.get("server_host").and_then(|v| v.as_str()) {
            config.client.server_host = v.to_string();
        }
        if let Some(v) = client.get("server_port").and_then(|v| v.as_integer()) {
            config.client.server_port = u16::try_from(v)
                .map_err(|_| invalid("client.server_port", format!("{v} is not a port")))?;
        }
        if let Some(v) = client.get("chunk_size").and_then(|v| v.as_integer()) {
            config.client.chunk_size = usize::try_from(v)
                .ok()
                .filter(|size| *size > 0)
                .ok_or_else(|| invalid("client.chunk_size", format!("{v} is not a positive size")))?;
        }
    }

    if let Some(store) = table.get("store").and_then(|v| v.as_table()) {
        if let Some(v) = store.get("flush_policy").and_then(|v| v.as_str()) {
            config.store.flush_policy = v
                .parse::<FlushPolicy>()
                .map_err(|reason| invalid("store.flush_policy", reason))?;
        }
    }

    if let Some(telemetry) = table.get("telemetry").and_then(|v| v.as_table()) {
        if let Some(v) = telemetry.get("log_level").and_then(|v| v.as_str()) {
            config.telemetry.log_level = v.to_string();
        }
        if let Some(v) = telemetry.get("otlp_endpoint").and_then(|v| v.as_str()) {
            config.telemetry.otlp_endpoint = Some(v.to_string());
        }
    }

    Ok(())
}

/// Apply environment variable overrides to config.
pub fn apply_env_overrides(
    config: &mut ExtentConfig,
    sources: &mut ConfigSources,
) -> Result<(), ConfigError> {
    apply_overrides_from(config, sources, |key| env::var(key).ok())
}

/// Apply overrides read through `lookup`, so tests need not touch the
/// process environment.
pub(crate) fn apply_overrides_from(
    config: &mut ExtentConfig,
    sources: &mut ConfigSources,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    let invalid = |key: &str, reason: String| ConfigError::Invalid {
        key: key.to_string(),
        reason,
    };

    if let Some(v) = lookup("EXTENTFS_EXTENT_DIR") {
        config.paths.extent_dir = expand_path(&v);
        sources.env_overrides.push("EXTENTFS_EXTENT_DIR".to_string());
    }

    // Server bind
    if let Some(v) = lookup("EXTENTFS_HOST") {
        config.bind.host = v;
        sources.env_overrides.push("EXTENTFS_HOST".to_string());
    }
    if let Some(v) = lookup("EXTENTFS_PORT") {
        config.bind.port = v
            .parse()
            .map_err(|_| invalid("EXTENTFS_PORT", format!("{v:?} is not a port")))?;
        sources.env_overrides.push("EXTENTFS_PORT".to_string());
    }

    // Client side: host:port of the server
    if let Some(v) = lookup("EXTENTFS_SERVER") {
        let (host, port) = v
            .rsplit_once(':')
            .and_then(|(host, port)| Some((host, port.parse::<u16>().ok()?)))
            .ok_or_else(|| invalid("EXTENTFS_SERVER", format!("{v:?} is not host:port")))?;
        config.client.server_host = host.to_string();
        config.client.server_port = port;
        sources.env_overrides.push("EXTENTFS_SERVER".to_string());
    }
    if let Some(v) = lookup("EXTENTFS_CHUNK_SIZE") {
        config.client.chunk_size = v
            .parse::<usize>()
            .ok()
            .filter(|size| *size > 0)
            .ok_or_else(|| invalid("EXTENTFS_CHUNK_SIZE", format!("{v:?} is not a positive size")))?;
        sources.env_overrides.push("EXTENTFS_CHUNK_SIZE".to_string());
    }

    if let Some(v) = lookup("EXTENTFS_FLUSH_POLICY") {
        config.store.flush_policy = v
            .parse()
            .map_err(|reason| invalid("EXTENTFS_FLUSH_POLICY", reason))?;
        sources.env_overrides.push("EXTENTFS_FLUSH_POLICY".to_string());
    }

    // Telemetry
    if let Some(v) = lookup("EXTENTFS_LOG_LEVEL") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("EXTENTFS_LOG_LEVEL".to_string());
    }
    // Also support RUST_LOG
    if let Some(v) = lookup("RUST_LOG") {
        config.telemetry.log_level = v;
        sources.env_overrides.push("RUST_LOG".to_string());
    }
    if let Some(v) = lookup("EXTENTFS_OTLP_ENDPOINT") {
        config.telemetry.otlp_endpoint = Some(v);
        sources.env_overrides.push("EXTENTFS_OTLP_ENDPOINT".to_string());
    }

    Ok(())
}

/// Expand ~ and environment variables in a path.
pub fn expand_path(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            home.join(stripped)
        } else {
            PathBuf::from(path)
        }
    } else if let Some(stripped) = path.strip_prefix('$') {
        // $VAR/rest/of/path
        if let Some((var_name, rest)) = stripped.split_once('/') {
            match env::var(var_name) {
                Ok(var_value) => PathBuf::from(var_value).join(rest),
                Err(_) => PathBuf::from(path),
            }
        } else {
            env::var(stripped)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(path))
        }
    } else {
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_in(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_expand_path_tilde() {
        let expanded = expand_path("~/test/path");
        assert!(!expanded.to_string_lossy().starts_with('~'));
        assert!(expanded.to_string_lossy().contains("test/path"));
    }

    #[test]
    fn test_expand_path_absolute() {
        assert_eq!(expand_path("/absolute/path"), PathBuf::from("/absolute/path"));
        assert_eq!(expand_path(".extents"), PathBuf::from(".extents"));
    }

    #[test]
    fn test_discover_config_files() {
        // Just verify it doesn't panic
        let _files = discover_config_files();
    }

    #[test]
    fn test_cli_path_is_always_listed() {
        let files = discover_config_files_with_override(Some(Path::new("/nonexistent/x.toml")));
        assert_eq!(files.last(), Some(&PathBuf::from("/nonexistent/x.toml")));
    }

    #[test]
    fn test_partial_toml_keeps_other_values() {
        let mut config = ExtentConfig::default();
        apply_toml(
            &mut config,
            "[paths]\nextent_dir = \"/srv/extents\"\n",
            Path::new("test.toml"),
        )
        .unwrap();

        assert_eq!(config.paths.extent_dir, PathBuf::from("/srv/extents"));
        assert_eq!(config.bind.port, 8989);
        assert_eq!(config.client.chunk_size, 4096);
    }

    #[test]
    fn test_full_toml() {
        let toml = r#"
[paths]
extent_dir = "/data/extents"

[bind]
host = "127.0.0.1"
port = 9000

[client]
server_host = "storage.local"
server_port = 9001
chunk_size = 65536

[store]
flush_policy = "dirty"

[telemetry]
log_level = "debug"
otlp_endpoint = "127.0.0.1:4317"
"#;
        let mut config = ExtentConfig::default();
        apply_toml(&mut config, toml, Path::new("test.toml")).unwrap();

        assert_eq!(config.paths.extent_dir, PathBuf::from("/data/extents"));
        assert_eq!(config.bind.addr(), "127.0.0.1:9000");
        assert_eq!(config.client.server_addr(), "storage.local:9001");
        assert_eq!(config.client.chunk_size, 65536);
        assert_eq!(config.store.flush_policy, FlushPolicy::Dirty);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(config.telemetry.otlp_endpoint.as_deref(), Some("127.0.0.1:4317"));
    }

    #[test]
    fn test_later_layer_wins_only_where_set() {
        let mut config = ExtentConfig::default();
        apply_toml(&mut config, "[bind]\nport = 7000\nhost = \"::\"\n", Path::new("a.toml")).unwrap();
        apply_toml(&mut config, "[bind]\nport = 7001\n", Path::new("b.toml")).unwrap();

        assert_eq!(config.bind.port, 7001);
        assert_eq!(config.bind.host, "::");
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let mut config = ExtentConfig::default();
        let path = Path::new("bad.toml");

        let err = apply_toml(&mut config, "[bind]\nport = 70000\n", path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = apply_toml(&mut config, "[client]\nchunk_size = 0\n", path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = apply_toml(&mut config, "[store]\nflush_policy = \"sometimes\"\n", path).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { .. }));

        let err = apply_toml(&mut config, "not = [valid", path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ExtentConfig::default();
        let mut sources = ConfigSources::default();
        let lookup = lookup_in(&[
            ("EXTENTFS_EXTENT_DIR", "/tmp/extents"),
            ("EXTENTFS_PORT", "9999"),
            ("EXTENTFS_SERVER", "10.0.0.5:9999"),
            ("EXTENTFS_FLUSH_POLICY", "dirty"),
            ("EXTENTFS_LOG_LEVEL", "debug"),
        ]);
        apply_overrides_from(&mut config, &mut sources, lookup).unwrap();

        assert_eq!(config.paths.extent_dir, PathBuf::from("/tmp/extents"));
        assert_eq!(config.bind.port, 9999);
        assert_eq!(config.client.server_host, "10.0.0.5");
        assert_eq!(config.client.server_port, 9999);
        assert_eq!(config.store.flush_policy, FlushPolicy::Dirty);
        assert_eq!(config.telemetry.log_level, "debug");
        assert_eq!(sources.env_overrides.len(), 5);
    }

    #[test]
    fn test_rust_log_beats_extentfs_log_level() {
        let mut config = ExtentConfig::default();
        let mut sources = ConfigSources::default();
        let lookup = lookup_in(&[("EXTENTFS_LOG_LEVEL", "debug"), ("RUST_LOG", "extentd=trace")]);
        apply_overrides_from(&mut config, &mut sources, lookup).unwrap();
        assert_eq!(config.telemetry.log_level, "extentd=trace");
    }

    #[test]
    fn test_bad_env_values() {
        let mut config = ExtentConfig::default();
        let mut sources = ConfigSources::default();

        let err = apply_overrides_from(&mut config, &mut sources, lookup_in(&[("EXTENTFS_SERVER", "nohost")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EXTENTFS_SERVER"));

        let err = apply_overrides_from(&mut config, &mut sources, lookup_in(&[("EXTENTFS_PORT", "http")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == "EXTENTFS_PORT"));
    }
}
