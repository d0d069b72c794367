//! Runtime settings access.
//!
//! A single `Settings` store is built once at startup and shared read-only by
//! every component. Typed getters never fail: a missing or malformed value
//! falls back to the next source in the chain and ultimately to the type's
//! zero value.
//!
//! Lookup precedence per key:
//! override > environment variable > config file > flag default > default.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::Duration;

use config::{Config, File, Value};

/// Dotted-key settings store backed by an optional configuration file.
pub struct Settings {
    file: Config,
    file_path: Option<PathBuf>,
    overrides: RwLock<HashMap<String, Value>>,
    flag_defaults: RwLock<HashMap<String, Value>>,
    defaults: RwLock<HashMap<String, Value>>,
}

impl Settings {
    /// An empty store with no file source. Used by tests and as the fallback
    /// when no configuration file is present.
    pub fn new() -> Self {
        Self::with_store(Config::default(), None)
    }

    fn with_store(file: Config, file_path: Option<PathBuf>) -> Self {
        Self {
            file,
            file_path,
            overrides: RwLock::new(HashMap::new()),
            flag_defaults: RwLock::new(HashMap::new()),
            defaults: RwLock::new(HashMap::new()),
        }
    }

    /// Load settings from an explicit config file path, or discover one by
    /// searching `config.*` in `$HOME`, the working directory, then `/app`.
    ///
    /// A missing or unreadable file is tolerated: the store starts empty and
    /// the problem is reported on stderr, matching the permissive startup
    /// policy. Logging is not initialized yet at this point.
    pub fn discover(explicit: Option<&Path>) -> Self {
        let Some(path) = discover_file(explicit) else {
            return Self::new();
        };
        match Config::builder().add_source(File::from(path.clone())).build() {
            Ok(store) => Self::with_store(store, Some(path)),
            Err(err) => {
                eprintln!("problem reading {}: {err}", path.display());
                Self::new()
            }
        }
    }

    /// The configuration file backing this store, if one was found.
    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Establish a fallback value used by all later reads of `key` that find
    /// no higher-priority source. Visible process-wide; callers must qualify
    /// key names to avoid collisions.
    pub fn set_default<V: Into<Value>>(&self, key: &str, value: V) {
        self.defaults
            .write()
            .expect("settings lock poisoned")
            .insert(key.to_string(), value.into());
    }

    /// Set an explicit value that wins over every other source.
    pub fn set_override<V: Into<Value>>(&self, key: &str, value: V) {
        self.overrides
            .write()
            .expect("settings lock poisoned")
            .insert(key.to_string(), value.into());
    }

    /// Bind a CLI flag to `key`. An explicitly passed value becomes an
    /// override; the flag's default sits above `set_default` defaults but
    /// below the environment and the config file.
    pub fn bind_flag<V: Into<Value>>(&self, key: &str, explicit: Option<V>, default: V) {
        match explicit {
            Some(value) => self.set_override(key, value),
            None => {
                self.flag_defaults
                    .write()
                    .expect("settings lock poisoned")
                    .insert(key.to_string(), default.into());
            }
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        if let Some(value) = self
            .overrides
            .read()
            .expect("settings lock poisoned")
            .get(key)
        {
            return Some(value.clone());
        }
        if let Some(value) = env_value(key) {
            return Some(Value::from(value));
        }
        if let Ok(value) = self.file.get::<Value>(key) {
            return Some(value);
        }
        if let Some(value) = self
            .flag_defaults
            .read()
            .expect("settings lock poisoned")
            .get(key)
        {
            return Some(value.clone());
        }
        self.defaults
            .read()
            .expect("settings lock poisoned")
            .get(key)
            .cloned()
    }

    pub fn get_string(&self, key: &str) -> String {
        self.lookup(key)
            .and_then(|v| v.into_string().ok())
            .unwrap_or_default()
    }

    pub fn get_int(&self, key: &str) -> i64 {
        self.lookup(key)
            .and_then(|v| v.into_int().ok())
            .unwrap_or_default()
    }

    pub fn get_float(&self, key: &str) -> f64 {
        self.lookup(key)
            .and_then(|v| v.into_float().ok())
            .unwrap_or_default()
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.lookup(key)
            .and_then(|v| v.into_bool().ok())
            .unwrap_or_default()
    }

    /// Read a duration value. Accepts `ms`/`s`/`m`/`h` suffixed strings; a
    /// bare number is seconds. Unparseable or missing values yield zero.
    pub fn get_duration(&self, key: &str) -> Duration {
        let raw = self.get_string(key);
        parse_duration(&raw).unwrap_or(Duration::ZERO)
    }

    /// Read a list of strings. File values may be arrays; environment values
    /// are split on commas and whitespace.
    pub fn get_string_slice(&self, key: &str) -> Vec<String> {
        match self.lookup(key) {
            Some(value) => match value.clone().into_array() {
                Ok(items) => items
                    .into_iter()
                    .filter_map(|item| item.into_string().ok())
                    .collect(),
                Err(_) => value
                    .into_string()
                    .map(|s| split_list(&s))
                    .unwrap_or_default(),
            },
            None => Vec::new(),
        }
    }

    /// Read a string-keyed table. Only the file store can hold tables; any
    /// other source yields an empty map.
    pub fn get_string_map(&self, key: &str) -> HashMap<String, Value> {
        self.lookup(key)
            .and_then(|v| v.into_table().ok())
            .map(|table| table.into_iter().collect())
            .unwrap_or_default()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::new()
    }
}

/// Environment variable override: `server.port` is overridden by
/// `SERVER_PORT` (replace `-` and `.` with `_`, upper-case).
fn env_value(key: &str) -> Option<String> {
    let name: String = key
        .chars()
        .map(|c| match c {
            '-' | '.' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect();
    std::env::var(name).ok()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

fn discover_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    let mut dirs: Vec<PathBuf> = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        dirs.push(PathBuf::from(home));
    }
    dirs.push(PathBuf::from("."));
    dirs.push(PathBuf::from("/app"));

    for dir in dirs {
        for ext in ["toml", "yaml", "yml", "json"] {
            let candidate = dir.join(format!("config.{ext}"));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Parse a human-readable duration: `250ms`, `15s`, `5m`, `12h`, or a bare
/// number of seconds.
pub fn parse_duration(raw: &str) -> Option<Duration> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Some(stripped) = raw.strip_suffix("ms") {
        return stripped.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(stripped) = raw.strip_suffix('s') {
        return stripped.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    if let Some(stripped) = raw.strip_suffix('m') {
        return stripped
            .trim()
            .parse::<u64>()
            .ok()
            .map(|n| Duration::from_secs(n * 60));
    }
    if let Some(stripped) = raw.strip_suffix('h') {
        return stripped
            .trim()
            .parse::<u64>()
            .ok()
            .map(|n| Duration::from_secs(n * 3600));
    }
    raw.parse::<u64>().ok().map(Duration::from_secs)
}
