//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that TLS material comes in cert/key pairs
//! - Validate CIDR ranges and CORS origins
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use axum::http::HeaderValue;

use crate::config::schema::{Interface, ServeConfig, TlsConfig, UNIX_SOCKET_PREFIX};
use crate::security::IpRange;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &ServeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_tls("serve.tls", &config.serve.tls, &mut errors);

    for interface in Interface::ALL {
        let prefix = format!("serve.{interface}");
        let iface = config.interface(interface);

        if let Some(path) = iface.host.strip_prefix(UNIX_SOCKET_PREFIX) {
            if path.is_empty() {
                errors.push(ValidationError::new(
                    format!("{prefix}.host"),
                    "unix socket path is empty",
                ));
            }
        } else if iface.host.contains('/') && !iface.host.starts_with('/') {
            errors.push(ValidationError::new(
                format!("{prefix}.host"),
                "socket paths must be absolute or use the unix: prefix",
            ));
        }

        if let Some(permission) = &iface.socket {
            if permission.mode > 0o7777 {
                errors.push(ValidationError::new(
                    format!("{prefix}.socket.mode"),
                    format!("{:#o} is not a valid file mode", permission.mode),
                ));
            }
        }

        if let Some(tls) = &iface.tls {
            validate_tls(&format!("{prefix}.tls"), tls, &mut errors);
        }

        for origin in &iface.cors.allowed_origins {
            if origin != "*" && HeaderValue::from_str(origin).is_err() {
                errors.push(ValidationError::new(
                    format!("{prefix}.cors.allowed_origins"),
                    format!("invalid origin {origin:?}"),
                ));
            }
        }
    }

    if !config.urls.self_issuer.is_empty() && url::Url::parse(&config.urls.self_issuer).is_err() {
        errors.push(ValidationError::new(
            "urls.self_issuer",
            format!("{:?} is not a valid URL", config.urls.self_issuer),
        ));
    }

    if config.serve.shutdown_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "serve.shutdown_timeout_secs",
            "must be greater than zero",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tls(prefix: &str, tls: &TlsConfig, errors: &mut Vec<ValidationError>) {
    if tls.cert.is_set() != tls.key.is_set() {
        errors.push(ValidationError::new(
            prefix,
            "certificate and private key must be configured together",
        ));
    }
    for range in &tls.allow_termination_from {
        if let Err(e) = range.parse::<IpRange>() {
            errors.push(ValidationError::new(
                format!("{prefix}.allow_termination_from"),
                e.to_string(),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServeConfig::default()).is_ok());
    }

    #[test]
    fn reports_every_problem() {
        let mut config = ServeConfig::default();
        config.serve.tls.cert.path = Some(PathBuf::from("/etc/tls/cert.pem"));
        config.serve.tls.allow_termination_from = vec!["10.0.0.0/99".into()];
        config.serve.public.cors.allowed_origins = vec!["https://ok.example".into(), "bad\n".into()];
        config.serve.shutdown_timeout_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "serve.tls",
                "serve.tls.allow_termination_from",
                "serve.public.cors.allowed_origins",
                "serve.shutdown_timeout_secs",
            ]
        );
    }

    #[test]
    fn rejects_relative_socket_path() {
        let mut config = ServeConfig::default();
        config.serve.admin.host = "run/admin.sock".into();
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "serve.admin.host");
    }
}
