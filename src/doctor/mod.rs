//! Doctor command for system diagnostics
//!
//! Checks the pieces `record` and `pull` depend on: configuration, the model
//! credential, the library file, and reachability of the model endpoint.

use crate::config::{Config, Credentials, API_KEY_ENV};
use crate::memory::experience::ExperienceStore;
use colored::Colorize;
use reqwest::Client;
use std::path::Path;
use std::time::Duration;

/// Health check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    Pass,
    Warn(String),
    Fail(String),
}

/// Individual health check
#[derive(Debug)]
pub struct HealthCheck {
    pub name: String,
    pub status: HealthStatus,
}

impl HealthCheck {
    fn new(name: &str, status: HealthStatus) -> Self {
        Self {
            name: name.to_string(),
            status,
        }
    }
}

/// Doctor diagnostics system
pub struct Doctor {
    config: Config,
    credential: Option<String>,
}

impl Doctor {
    /// Diagnose `config`, reading the credential from the environment
    pub fn new(config: Config) -> Self {
        Self::with_credential(config, std::env::var(API_KEY_ENV).ok())
    }

    pub fn with_credential(config: Config, credential: Option<String>) -> Self {
        Self { config, credential }
    }

    /// Run all health checks
    pub async fn run_diagnostics(&self) -> Vec<HealthCheck> {
        vec![
            self.check_config(),
            self.check_credential(),
            self.check_library(),
            self.check_library_writable(),
            self.check_endpoint().await,
        ]
    }

    fn check_config(&self) -> HealthCheck {
        match self.config.validate() {
            Ok(()) => HealthCheck::new("Configuration", HealthStatus::Pass),
            Err(e) => HealthCheck::new("Configuration", HealthStatus::Fail(e.to_string())),
        }
    }

    fn check_credential(&self) -> HealthCheck {
        match Credentials::from_value(self.credential.clone()) {
            Ok(_) => HealthCheck::new("Credential", HealthStatus::Pass),
            // Retrieval still works without a key; only extraction needs it.
            Err(e) => HealthCheck::new("Credential", HealthStatus::Warn(e.to_string())),
        }
    }

    fn check_library(&self) -> HealthCheck {
        let path = &self.config.library.path;
        if !path.exists() {
            return HealthCheck::new(
                "Library",
                HealthStatus::Warn(format!("{} does not exist yet", path.display())),
            );
        }

        match ExperienceStore::open(path.clone()) {
            Ok(store) => {
                tracing::debug!(experiences = store.len(), "library readable");
                HealthCheck::new("Library", HealthStatus::Pass)
            }
            Err(e) => HealthCheck::new("Library", HealthStatus::Fail(e.to_string())),
        }
    }

    fn check_library_writable(&self) -> HealthCheck {
        let dir = self
            .config
            .library
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));

        if let Err(e) = std::fs::create_dir_all(dir) {
            return HealthCheck::new(
                "Permissions",
                HealthStatus::Fail(format!("cannot create {}: {}", dir.display(), e)),
            );
        }

        let probe = dir.join(".tfgrpo_write_test");
        match std::fs::write(&probe, "test") {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                HealthCheck::new("Permissions", HealthStatus::Pass)
            }
            Err(_) => HealthCheck::new(
                "Permissions",
                HealthStatus::Fail(format!("no write permission in {}", dir.display())),
            ),
        }
    }

    async fn check_endpoint(&self) -> HealthCheck {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| Client::new());
        let url = format!("{}/models", self.config.model.base_url.trim_end_matches('/'));

        match client.get(&url).send().await {
            Ok(response) if response.status().is_success() => {
                HealthCheck::new("Model Endpoint", HealthStatus::Pass)
            }
            Ok(response) => HealthCheck::new(
                "Model Endpoint",
                HealthStatus::Warn(format!("{} answered HTTP {}", url, response.status())),
            ),
            Err(_) => HealthCheck::new(
                "Model Endpoint",
                HealthStatus::Warn(format!("cannot reach {}", url)),
            ),
        }
    }

    /// Display diagnostics results
    pub fn display_results(checks: &[HealthCheck]) {
        println!("\n{}\n", "tfgrpo diagnostics".bold());
        println!("{:<20} Status", "Check");
        println!("{}", "=".repeat(50));

        for check in checks {
            let status = match &check.status {
                HealthStatus::Pass => "PASS".green().to_string(),
                HealthStatus::Warn(msg) => format!("{} {}", "WARN:".yellow(), msg),
                HealthStatus::Fail(msg) => format!("{} {}", "FAIL:".red(), msg),
            };
            println!("{:<20} {}", check.name, status);
        }

        println!();
    }

    /// Get overall health status
    pub fn overall_status(checks: &[HealthCheck]) -> bool {
        !checks.iter().any(|c| matches!(c.status, HealthStatus::Fail(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_in(temp: &TempDir) -> Config {
        let mut config = Config::default();
        config.library.path = temp.path().join("lib").join("experiences.json");
        config
    }

    #[test]
    fn test_health_status_equality() {
        assert_eq!(HealthStatus::Pass, HealthStatus::Pass);
        assert_ne!(
            HealthStatus::Warn("test".to_string()),
            HealthStatus::Fail("test".to_string())
        );
    }

    #[test]
    fn test_overall_status() {
        let mut checks = vec![
            HealthCheck::new("a", HealthStatus::Pass),
            HealthCheck::new("b", HealthStatus::Warn("warning".to_string())),
        ];
        assert!(Doctor::overall_status(&checks));

        checks.push(HealthCheck::new("c", HealthStatus::Fail("error".to_string())));
        assert!(!Doctor::overall_status(&checks));
    }

    #[test]
    fn test_missing_credential_is_warning() {
        let temp = TempDir::new().unwrap();
        let doctor = Doctor::with_credential(config_in(&temp), None);
        assert!(matches!(doctor.check_credential().status, HealthStatus::Warn(_)));

        let doctor = Doctor::with_credential(config_in(&temp), Some("sk-x".to_string()));
        assert_eq!(doctor.check_credential().status, HealthStatus::Pass);
    }

    #[test]
    fn test_library_checks() {
        let temp = TempDir::new().unwrap();
        let config = config_in(&temp);
        let doctor = Doctor::with_credential(config.clone(), None);

        assert!(matches!(doctor.check_library().status, HealthStatus::Warn(_)));
        assert_eq!(doctor.check_library_writable().status, HealthStatus::Pass);

        std::fs::write(&config.library.path, "{ broken").unwrap();
        assert!(matches!(doctor.check_library().status, HealthStatus::Fail(_)));
    }
}
