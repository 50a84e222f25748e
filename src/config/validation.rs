//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject unnamed and duplicate services
//! - Reject instance URLs that cannot be resolved
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MeshConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::MeshConfig;
use crate::discovery::ServiceInstance;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("service at index {0} has an empty name")]
    EmptyServiceName(usize),

    #[error("service {0} is defined more than once")]
    DuplicateService(String),

    #[error("service {service} has invalid URL {url}: {reason}")]
    InvalidUrl {
        service: String,
        url: String,
        reason: String,
    },

    #[error("invalid metrics address {0}")]
    InvalidMetricsAddress(String),
}

/// Check `config` and collect every problem found.
pub fn validate_config(config: &MeshConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut seen = HashSet::new();

    for (i, service) in config.services.iter().enumerate() {
        if service.name.trim().is_empty() {
            errors.push(ValidationError::EmptyServiceName(i));
        } else if !seen.insert(service.name.as_str()) {
            errors.push(ValidationError::DuplicateService(service.name.clone()));
        }

        for url in &service.urls {
            if let Err(e) = ServiceInstance::from_uri(&service.name, url) {
                errors.push(ValidationError::InvalidUrl {
                    service: service.name.clone(),
                    url: url.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ServiceConfig;

    fn service(name: &str, urls: &[&str]) -> ServiceConfig {
        ServiceConfig {
            name: name.to_string(),
            urls: urls.iter().map(|u| u.to_string()).collect(),
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = MeshConfig::default();
        config.services.push(service("users", &["http://10.0.0.1:8080"]));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MeshConfig::default();
        config.services.push(service("", &[]));
        config.services.push(service("users", &["http://a:1"]));
        config.services.push(service("users", &["not a url"]));
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert_eq!(errors[0], ValidationError::EmptyServiceName(0));
        assert_eq!(errors[1], ValidationError::DuplicateService("users".into()));
        assert!(matches!(errors[2], ValidationError::InvalidUrl { .. }));
        assert_eq!(
            errors[3],
            ValidationError::InvalidMetricsAddress("nowhere".into())
        );
    }
}
