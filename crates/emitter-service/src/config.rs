use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_FAKTORY_URL: &str = "tcp://localhost:7419";
pub const DEFAULT_PAYLOAD_PATH: &str = "./public/generated.json";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no value was found for the environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value {value:?} for the environment variable {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Which queue the emitters write to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueConfig {
    Sqs {
        queue_url: String,
        region: String,
    },
    Faktory {
        url: String,
        queue: String,
        job_kind: String,
        pool_size: usize,
    },
}

/// Process configuration, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of concurrent emission workers per invocation
    pub num_workers: usize,
    pub queue: QueueConfig,
    pub payload_path: PathBuf,
    pub bind_addr: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Empty values are
    /// treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.is_empty());

        let num_workers: usize = parse_required(&get, "NUM_THREADS")?;
        if num_workers == 0 {
            return Err(ConfigError::Invalid {
                key: "NUM_THREADS",
                value: "0".to_string(),
                reason: "at least one worker is required".to_string(),
            });
        }

        let backend = get("QUEUE_BACKEND").unwrap_or_else(|| "sqs".to_string());
        let queue = match backend.to_ascii_lowercase().as_str() {
            "sqs" => QueueConfig::Sqs {
                queue_url: get("SQS_URL").ok_or(ConfigError::Missing("SQS_URL"))?,
                region: get("AWS_REGION").unwrap_or_else(|| DEFAULT_REGION.to_string()),
            },
            "faktory" => QueueConfig::Faktory {
                url: get("FAKTORY_URL").unwrap_or_else(|| DEFAULT_FAKTORY_URL.to_string()),
                queue: get("FAKTORY_QUEUE").unwrap_or_else(|| "default".to_string()),
                job_kind: get("FAKTORY_JOB_KIND").unwrap_or_else(|| "caliper_event".to_string()),
                pool_size: parse_optional(&get, "FAKTORY_POOL_SIZE")?.unwrap_or(50),
            },
            _ => {
                return Err(ConfigError::Invalid {
                    key: "QUEUE_BACKEND",
                    value: backend,
                    reason: "expected sqs or faktory".to_string(),
                })
            }
        };

        Ok(Self {
            num_workers,
            queue,
            payload_path: get("PAYLOAD_PATH")
                .unwrap_or_else(|| DEFAULT_PAYLOAD_PATH.to_string())
                .into(),
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
        })
    }
}

fn parse_optional<T, G>(get: &G, key: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|value| {
            value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_required<T, G>(get: &G, key: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    parse_optional(get, key)?.ok_or(ConfigError::Missing(key))
}
