//! Server environment handling.
//!
//! Parses `config/.env`, merges defaults beneath it, rewrites relative
//! path values to absolute ones rooted at the installation directory,
//! and redacts sensitive values in logs.

use crate::config;
use crate::error::{PortableError, Result};
use crate::platform::paths::PathSet;
use std::path::Path;
use tracing::{debug, info, warn};

const SENSITIVE_PATTERNS: [&str; 9] = [
    "PASSWORD",
    "SECRET",
    "KEY",
    "TOKEN",
    "PASS",
    "ENCRYPTION",
    "SMTP",
    "AUTH",
    "CREDENTIAL",
];

const PATH_PATTERNS: [&str; 9] = [
    "FOLDER",
    "PATH",
    "DIR",
    "DIRECTORY",
    "FILE",
    "LOCATION",
    "DATABASE",
    "STORAGE",
    "LOG",
];

/// Whether a variable's value must be hidden in output.
pub fn is_sensitive(key: &str) -> bool {
    let upper = key.to_uppercase();
    SENSITIVE_PATTERNS.iter().any(|p| upper.contains(p))
}

/// Whether a variable is expected to hold a filesystem path.
pub fn is_path_variable(key: &str) -> bool {
    let upper = key.to_uppercase();
    PATH_PATTERNS.iter().any(|p| upper.contains(p))
}

/// Value as printed in logs.
pub fn display_value<'a>(key: &str, value: &'a str) -> &'a str {
    if is_sensitive(key) {
        "******"
    } else {
        value
    }
}

/// Parse `.env` content into ordered key/value pairs.
///
/// Blank lines and `#` comments are skipped, as are lines without an
/// `=` or starting with one. Matching single or double quotes around a
/// value are stripped.
pub fn parse_env_content(content: &str) -> Vec<(String, String)> {
    let mut vars = vec![];

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(equal_index) = line.find('=') else {
            debug!("Skip: \"{}\" (invalid format)", line);
            continue;
        };
        if equal_index == 0 {
            debug!("Skip: \"{}\" (invalid format)", line);
            continue;
        }

        let key: String = line[..equal_index].split_whitespace().collect();
        let value = strip_quotes(line[equal_index + 1..].trim());

        vars.push((key, value.to_string()));
    }

    vars
}

fn strip_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2
        && ((bytes[0] == b'"' && bytes[bytes.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[bytes.len() - 1] == b'\''))
    {
        &value[1..value.len() - 1]
    } else {
        value
    }
}

/// Rewrite a relative path value to an absolute one under `root`.
///
/// Left untouched: absolute paths, empty values, URLs, and bare tokens
/// with no separator that do not start with a dot (those are names,
/// not paths).
pub fn absolutize(value: &str, root: &Path) -> String {
    if value.is_empty() || Path::new(value).is_absolute() {
        return value.to_string();
    }
    if value.starts_with("http://") || value.starts_with("https://") {
        return value.to_string();
    }
    if !value.contains('/') && !value.contains('\\') && !value.starts_with('.') {
        return value.to_string();
    }

    let absolute = root.join(value);
    debug!("Path rewrite: {} -> {}", value, absolute.display());
    absolute.display().to_string()
}

/// Fully resolved environment for the server process.
#[derive(Debug, Clone)]
pub struct Environment {
    vars: Vec<(String, String)>,
}

impl Environment {
    /// Load `config/.env` and merge defaults beneath it.
    ///
    /// File values win; defaults fill the gaps. Path-like file values
    /// are absolutized against the root so the server behaves the same
    /// regardless of its working directory. A missing file is fine and
    /// yields the defaults alone.
    pub fn load(paths: &PathSet) -> Result<Self> {
        let env_file = paths.env_file();
        let mut vars: Vec<(String, String)> = vec![];

        if env_file.exists() {
            let contents = std::fs::read_to_string(&env_file)
                .map_err(|e| PortableError::io_with_path(e, &env_file))?;
            for (key, value) in parse_env_content(&contents) {
                let value = if is_path_variable(&key) {
                    absolutize(&value, &paths.root)
                } else {
                    value
                };
                vars.push((key, value));
            }
            info!("Loaded {} variables from {}", vars.len(), env_file.display());
        } else {
            warn!(
                "No configuration file at {}, using defaults",
                env_file.display()
            );
        }

        for (key, value) in config::default_environment() {
            if !vars.iter().any(|(k, _)| k == key) {
                vars.push((key.to_string(), value.to_string()));
            }
        }

        Ok(Self { vars })
    }

    pub fn vars(&self) -> &[(String, String)] {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Port the server will listen on, falling back to the default.
    pub fn port(&self) -> u16 {
        self.get("N8N_PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(config::AppConfig::DEFAULT_PORT)
    }

    /// Log every variable, hiding sensitive values.
    pub fn log_summary(&self) {
        for (key, value) in &self.vars {
            debug!("  {}={}", key, display_value(key, value));
        }
    }
}

/// Write the default `.env` template if none exists.
///
/// Returns `true` when a file was created.
pub fn ensure_default_file(paths: &PathSet) -> Result<bool> {
    let env_file = paths.env_file();
    if env_file.exists() {
        return Ok(false);
    }

    std::fs::create_dir_all(&paths.config_dir)
        .map_err(|e| PortableError::io_with_path(e, &paths.config_dir))?;

    let mut contents = String::from("# n8n Portable Configuration\n");
    for (key, value) in config::default_environment() {
        contents.push_str(&format!("{key}={value}\n"));
    }
    std::fs::write(&env_file, contents).map_err(|e| PortableError::io_with_path(e, &env_file))?;

    info!("Created default configuration at {}", env_file.display());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_skips_comments_and_invalid_lines() {
        let content = "\n# comment\nN8N_PORT=5678\n=nokey\nbroken line\nN8N_HOST = localhost\n";
        let vars = parse_env_content(content);
        assert_eq!(
            vars,
            vec![
                ("N8N_PORT".to_string(), "5678".to_string()),
                ("N8N_HOST".to_string(), "localhost".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_strips_quotes_and_splits_on_first_equals() {
        let vars = parse_env_content("KEY=\"quoted value\"\nOTHER='single'\nEQ=a=b=c\n");
        assert_eq!(vars[0].1, "quoted value");
        assert_eq!(vars[1].1, "single");
        assert_eq!(vars[2].1, "a=b=c");
    }

    #[test]
    fn test_sensitive_detection() {
        assert!(is_sensitive("N8N_ENCRYPTION_KEY"));
        assert!(is_sensitive("DB_PASSWORD"));
        assert!(is_sensitive("smtp_user"));
        assert!(is_sensitive("AUTH_TOKEN"));
        assert!(!is_sensitive("N8N_HOST"));
        assert!(!is_sensitive("N8N_PORT"));
    }

    #[test]
    fn test_path_variable_detection() {
        assert!(is_path_variable("N8N_USER_FOLDER"));
        assert!(is_path_variable("DB_SQLITE_DATABASE"));
        assert!(is_path_variable("N8N_LOG_FILE_LOCATION"));
        assert!(!is_path_variable("N8N_HOST"));
    }

    #[test]
    fn test_absolutize_rules() {
        let root = PathBuf::from("/opt/portable");

        // Relative path with separator is rewritten
        assert_eq!(absolutize("./data", &root), "/opt/portable/./data");
        assert_eq!(absolutize("data/logs", &root), "/opt/portable/data/logs");

        // Left untouched
        assert_eq!(absolutize("/var/lib/n8n", &root), "/var/lib/n8n");
        assert_eq!(absolutize("", &root), "");
        assert_eq!(
            absolutize("http://localhost:5678/", &root),
            "http://localhost:5678/"
        );
        assert_eq!(absolutize("sqlite", &root), "sqlite");
    }

    #[test]
    fn test_load_merges_defaults_beneath_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        std::fs::create_dir_all(&paths.config_dir).unwrap();
        std::fs::write(paths.env_file(), "N8N_PORT=9999\n").unwrap();

        let env = Environment::load(&paths).unwrap();
        // File value wins
        assert_eq!(env.get("N8N_PORT"), Some("9999"));
        assert_eq!(env.port(), 9999);
        // Defaults fill the rest
        assert_eq!(env.get("N8N_HOST"), Some("localhost"));
        assert_eq!(env.get("DB_TYPE"), Some("sqlite"));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());

        let env = Environment::load(&paths).unwrap();
        assert_eq!(env.port(), 5678);
        assert_eq!(env.get("N8N_USER_FOLDER"), Some("./data"));
    }

    #[test]
    fn test_path_values_from_file_are_absolutized() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());
        std::fs::create_dir_all(&paths.config_dir).unwrap();
        std::fs::write(paths.env_file(), "N8N_USER_FOLDER=./data\n").unwrap();

        let env = Environment::load(&paths).unwrap();
        let value = env.get("N8N_USER_FOLDER").unwrap();
        assert!(Path::new(value).is_absolute());
        assert!(value.starts_with(&tmp.path().display().to_string()));
    }

    #[test]
    fn test_ensure_default_file_is_idempotent() {
        let tmp = tempfile::TempDir::new().unwrap();
        let paths = PathSet::new(tmp.path());

        assert!(ensure_default_file(&paths).unwrap());
        assert!(paths.env_file().exists());
        // Second call leaves the existing file alone
        assert!(!ensure_default_file(&paths).unwrap());
    }
}
