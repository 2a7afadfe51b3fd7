//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, address parses)
//! - Check that resource paths exist before the server starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::schema::ServerConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("`{0}` must be greater than zero")]
    Zero(&'static str),

    #[error("invalid ip-address `{0}`")]
    InvalidAddress(String),

    #[error("{kind} path does not exist: {}", .path.display())]
    MissingPath { kind: &'static str, path: PathBuf },
}

/// Check a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let server = &config.server;

    let non_zero = [
        ("request-size", server.request_size),
        ("connections-limit", server.connections_limit),
        ("client-connections-limit", server.client_connections_limit),
        ("keep-alive-max-requests", server.keep_alive_max_requests),
        ("keep-alive-timeout", server.keep_alive_timeout as usize),
        ("max-upload-size", server.max_upload_size),
    ];
    for (name, value) in non_zero {
        if value == 0 {
            errors.push(ValidationError::Zero(name));
        }
    }

    if server.ip_address.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress(server.ip_address.clone()));
    }

    let resources = &config.resources;
    check_exists(&mut errors, "root", &resources.root);
    check_exists(&mut errors, "home-page", &resources.home_page);
    check_exists(&mut errors, "media", &resources.media);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_exists(errors: &mut Vec<ValidationError>, kind: &'static str, path: &Path) {
    if !path.exists() {
        errors.push(ValidationError::MissingPath {
            kind,
            path: path.to_path_buf(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::*;

    fn config_in(dir: &Path) -> ServerConfig {
        let text = format!(
            r#"
            [server]
            port = 0
            ip-address = "127.0.0.1"

            [resources]
            root = "{0}/root"
            home-page = "{0}/root/index.html"
            media = "{0}/media"

            [logging]
            access-log = "{0}/access.log"
            "#,
            dir.display()
        );
        toml::from_str(&text).unwrap()
    }

    #[test]
    fn valid_tree_passes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("root")).unwrap();
        std::fs::create_dir_all(dir.path().join("media")).unwrap();
        std::fs::write(dir.path().join("root/index.html"), "<h1>home</h1>").unwrap();

        assert_eq!(validate_config(&config_in(dir.path())), Ok(()));
    }

    #[test]
    fn reports_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config_in(dir.path());
        config.server.request_size = 0;
        config.server.max_upload_size = 0;
        config.server.ip_address = "localhost:80".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::Zero("request-size")));
        assert!(errors.contains(&ValidationError::Zero("max-upload-size")));
        assert!(errors.contains(&ValidationError::InvalidAddress("localhost:80".into())));
        let missing = errors
            .iter()
            .filter(|e| matches!(e, ValidationError::MissingPath { .. }))
            .count();
        assert_eq!(missing, 3);
    }
}
