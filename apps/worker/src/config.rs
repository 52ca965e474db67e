//! Worker identity and capability declaration (§3.1, §4.5), loaded from the
//! environment the same way every other config struct in this workspace is.

use std::collections::HashSet;

use broker_model::{Capabilities, CustomerIsolation, MatchSet};
use core_config::{env_or_default, ConfigError, FromEnv};

fn csv_set(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn match_set(value: &str) -> MatchSet {
    if value.trim().eq_ignore_ascii_case(broker_model::MATCH_ALL) {
        MatchSet::All
    } else {
        MatchSet::Only(csv_set(value))
    }
}

fn parse_optional<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<Option<T>, ConfigError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| ConfigError::ParseError {
            key: key.to_string(),
            details: format!("could not parse {raw:?}"),
        })
}

/// This binary's identity plus the capabilities it advertises to the broker.
#[derive(Debug, Clone)]
pub struct WorkerAppConfig {
    pub worker_id: String,
    pub machine_id: String,
    pub capabilities: Capabilities,
    pub health_port: u16,
}

impl FromEnv for WorkerAppConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let machine_id = env_or_default("MACHINE_ID", "local-machine");
        let worker_id = env_or_default("WORKER_ID", &format!("{machine_id}-0"));
        let health_port = env_or_default("WORKER_HEALTH_PORT", "8081")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "WORKER_HEALTH_PORT".to_string(),
                details: format!("{e}"),
            })?;

        let max_concurrent = env_or_default("WORKER_MAX_CONCURRENT_JOBS", "1")
            .parse()
            .map_err(|e| ConfigError::ParseError {
                key: "WORKER_MAX_CONCURRENT_JOBS".to_string(),
                details: format!("{e}"),
            })?;

        let isolation = match env_or_default("WORKER_CUSTOMER_ISOLATION", "open").as_str() {
            "strict" => CustomerIsolation::Strict,
            _ => CustomerIsolation::Open,
        };

        let capabilities = Capabilities {
            services: csv_set(&env_or_default("WORKER_SERVICES", "sim")),
            components: match_set(&env_or_default("WORKER_COMPONENTS", broker_model::MATCH_ALL)),
            workflows: match_set(&env_or_default("WORKER_WORKFLOWS", broker_model::MATCH_ALL)),
            models: match_set(&env_or_default("WORKER_MODELS", broker_model::MATCH_ALL)),
            gpu_memory_gb: parse_optional("WORKER_GPU_MEMORY_GB", &env_or_default("WORKER_GPU_MEMORY_GB", ""))?,
            ram_gb: parse_optional("WORKER_RAM_GB", &env_or_default("WORKER_RAM_GB", ""))?,
            cpu_cores: parse_optional("WORKER_CPU_CORES", &env_or_default("WORKER_CPU_CORES", ""))?,
            max_concurrent,
            customer_isolation: isolation,
            allowed_customers: {
                let raw = env_or_default("WORKER_ALLOWED_CUSTOMERS", "");
                if raw.trim().is_empty() { None } else { Some(csv_set(&raw)) }
            },
            denied_customers: csv_set(&env_or_default("WORKER_DENIED_CUSTOMERS", "")),
        };

        Ok(Self {
            worker_id,
            machine_id,
            capabilities,
            health_port,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_advertise_sim_service_with_permissive_matching() {
        temp_env::with_vars(
            [
                ("WORKER_ID", None::<&str>),
                ("MACHINE_ID", None::<&str>),
                ("WORKER_SERVICES", None::<&str>),
            ],
            || {
                let config = WorkerAppConfig::from_env().unwrap();
                assert_eq!(config.machine_id, "local-machine");
                assert_eq!(config.worker_id, "local-machine-0");
                assert!(config.capabilities.services.contains("sim"));
                assert_eq!(config.capabilities.components, MatchSet::All);
                assert_eq!(config.capabilities.max_concurrent, 1);
            },
        );
    }

    #[test]
    fn csv_env_vars_become_explicit_match_sets() {
        temp_env::with_vars(
            [
                ("WORKER_SERVICES", Some("sim,comfyui")),
                ("WORKER_MODELS", Some("sdxl, flux")),
            ],
            || {
                let config = WorkerAppConfig::from_env().unwrap();
                assert_eq!(
                    config.capabilities.services,
                    ["sim".to_string(), "comfyui".to_string()].into_iter().collect()
                );
                assert_eq!(
                    config.capabilities.models,
                    MatchSet::Only(["sdxl".to_string(), "flux".to_string()].into_iter().collect())
                );
            },
        );
    }

    #[test]
    fn strict_isolation_parses_allowed_and_denied_customers() {
        temp_env::with_vars(
            [
                ("WORKER_CUSTOMER_ISOLATION", Some("strict")),
                ("WORKER_ALLOWED_CUSTOMERS", Some("cust-a,cust-b")),
                ("WORKER_DENIED_CUSTOMERS", Some("cust-c")),
            ],
            || {
                let config = WorkerAppConfig::from_env().unwrap();
                assert_eq!(config.capabilities.customer_isolation, CustomerIsolation::Strict);
                assert_eq!(
                    config.capabilities.allowed_customers,
                    Some(["cust-a".to_string(), "cust-b".to_string()].into_iter().collect())
                );
                assert!(config.capabilities.denied_customers.contains("cust-c"));
            },
        );
    }

    #[test]
    fn invalid_numeric_override_is_an_error() {
        temp_env::with_var("WORKER_GPU_MEMORY_GB", Some("not-a-number"), || {
            let err = WorkerAppConfig::from_env().unwrap_err();
            assert!(err.to_string().contains("WORKER_GPU_MEMORY_GB"));
        });
    }
}
