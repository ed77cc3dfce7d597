//! Secure secret management module
//!
//! Backend keys and API tokens are read from an environment variable or
//! from a file named by `<VAR>_FILE` (container secret mounts). Values are
//! returned as `Zeroizing<String>` so they are wiped from memory on drop.

use std::env;
use std::path::Path;
use tracing::{debug, warn};
use zeroize::Zeroizing;

/// Error type for secret loading operations
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("Secret not found: {0}")]
    NotFound(String),

    #[error("Failed to read secret file {path}: {reason}")]
    FileError { path: String, reason: String },

    #[error("Secret validation failed: {0}")]
    ValidationFailed(String),
}

/// Load a secret from `env_var_name`, or from the file named by
/// `<env_var_name>_FILE` when the variable itself is unset.
///
/// Surrounding whitespace is trimmed; an empty value is rejected.
pub fn load_secret(env_var_name: &str) -> Result<Zeroizing<String>, SecretError> {
    if let Ok(value) = env::var(env_var_name) {
        let value = Zeroizing::new(value);
        debug!("Loaded secret from environment variable: {}", env_var_name);
        return non_empty(env_var_name, value.trim());
    }

    let file_var = format!("{}_FILE", env_var_name);
    match env::var(&file_var) {
        Ok(path) => load_from_file(env_var_name, Path::new(path.trim())),
        Err(_) => Err(SecretError::NotFound(env_var_name.to_string())),
    }
}

/// Load the first secret that is configured among `names`
pub fn load_first_secret(names: &[&str]) -> Result<Zeroizing<String>, SecretError> {
    for name in names {
        match load_secret(name) {
            Ok(secret) => return Ok(secret),
            Err(SecretError::NotFound(_)) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(SecretError::NotFound(names.join(" / ")))
}

/// Load an optional secret; unset is `None`, but a set-and-invalid value is
/// still an error
pub fn load_optional_secret(env_var_name: &str) -> Result<Option<Zeroizing<String>>, SecretError> {
    match load_secret(env_var_name) {
        Ok(secret) => Ok(Some(secret)),
        Err(SecretError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn load_from_file(name: &str, path: &Path) -> Result<Zeroizing<String>, SecretError> {
    let contents = std::fs::read_to_string(path)
        .map(Zeroizing::new)
        .map_err(|e| SecretError::FileError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    debug!("Loaded secret {} from file", name);
    non_empty(name, contents.trim())
}

fn non_empty(name: &str, value: &str) -> Result<Zeroizing<String>, SecretError> {
    if value.is_empty() {
        warn!("Secret {} is set but empty", name);
        return Err(SecretError::ValidationFailed(format!("{} is empty", name)));
    }
    Ok(Zeroizing::new(value.to_string()))
}

/// Compare two secrets without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
