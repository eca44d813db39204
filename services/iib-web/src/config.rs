//! Configuration (SPEC_FULL.md §6/§4.9): the full set of `IIB_*`/`iib_*`
//! keys the core depends on, loaded from environment variables with the
//! teacher's `std::env::var` + parse pattern (`config.rs` in the teacher
//! has no external crate dependency for this either — config loading
//! itself is explicitly out of core scope per spec.md §1, so this stays a
//! plain env reader rather than reaching for the `config` crate).

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::db::DbConfig;
use crate::pipeline::CaCertSource;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Invalid(String),
}

/// `IIB_USER_TO_QUEUE` entry discriminant (SPEC_FULL.md §4.7 step 4).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueKey {
    Plain(String),
    Parallel(String),
    Serial(String),
}

impl QueueKey {
    fn parse(raw: &str) -> Self {
        if let Some(user) = raw.strip_prefix("PARALLEL:") {
            QueueKey::Parallel(user.to_string())
        } else if let Some(user) = raw.strip_prefix("SERIAL:") {
            QueueKey::Serial(user.to_string())
        } else {
            QueueKey::Plain(raw.to_string())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserToQueue {
    entries: HashMap<QueueKey, String>,
}

impl UserToQueue {
    pub fn parse(raw: &HashMap<String, String>) -> Self {
        let entries = raw
            .iter()
            .map(|(k, v)| (QueueKey::parse(k), v.clone()))
            .collect();
        Self { entries }
    }

    fn get(&self, key: &QueueKey) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Classify the worker queue for a user (SPEC_FULL.md §4.7 step 4).
    /// `overwrite_from_index` tries `SERIAL:user` then plain `user`;
    /// otherwise `PARALLEL:user` then plain `user`. Unknown user falls back
    /// to `default_queue`.
    pub fn classify<'a>(&'a self, user: &str, overwrite_from_index: bool, default_queue: &'a str) -> &'a str {
        let primary = if overwrite_from_index {
            QueueKey::Serial(user.to_string())
        } else {
            QueueKey::Parallel(user.to_string())
        };
        if let Some(q) = self.get(&primary) {
            return q;
        }
        if let Some(q) = self.get(&QueueKey::Plain(user.to_string())) {
            return q;
        }
        default_queue
    }

    pub fn known_queue_names(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(String::as_str)
    }
}

impl std::hash::Hash for QueueKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            QueueKey::Plain(u) => (0u8, u).hash(state),
            QueueKey::Parallel(u) => (1u8, u).hash(state),
            QueueKey::Serial(u) => (2u8, u).hash(state),
        }
    }
}

/// `IIB_BINARY_IMAGE_CONFIG`: distribution scope -> opm version -> binary image.
#[derive(Debug, Clone, Default)]
pub struct BinaryImageConfig {
    pub entries: HashMap<String, HashMap<String, String>>,
}

/// `IIB_GREENWAVE_CONFIG`: subject type -> list of gating queue names.
#[derive(Debug, Clone, Default)]
pub struct GreenwaveConfig {
    pub gating_queues: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct MessagingConfig {
    pub urls: Vec<String>,
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    pub durable: bool,
    pub timeout: Duration,
    pub batch_state_destination: String,
    pub build_state_destination: String,
}

#[derive(Debug, Clone)]
pub struct DogpileConfig {
    pub backend: String,
    pub expiration_time: Duration,
    pub arguments: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct KonfluxConfig {
    pub cluster_url: String,
    pub cluster_token: String,
    pub cluster_ca_cert: CaCertSource,
    pub namespace: String,
    pub pipeline_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct GitConfig {
    /// `iib_web_index_to_gitlab_push_map`: `registry/namespace/repo -> git_url`.
    pub index_to_gitlab_push_map: HashMap<String, String>,
    /// `iib_index_configs_gitlab_tokens_map`: `git_url -> (token_name, token)`.
    pub index_configs_gitlab_tokens_map: HashMap<String, (String, String)>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub log_level: String,
    pub log_format: LogFormat,
    pub additional_loggers: Vec<String>,
    pub dev_mode: bool,

    pub database: DbConfig,

    // §6 paging / dispatcher
    pub max_per_page: i64,
    pub user_to_queue: UserToQueue,
    pub default_queue: String,
    pub binary_image_config: BinaryImageConfig,
    pub greenwave_config: GreenwaveConfig,
    pub force_overwrite_from_index: bool,
    pub worker_usernames: Vec<String>,
    pub graph_mode_options: Vec<String>,
    pub graph_mode_index_allow_list: HashMap<String, Vec<String>>,

    // Request/log retention
    pub request_data_days_to_live: i64,
    pub request_logs_dir: Option<PathBuf>,
    pub request_logs_days_to_live: i64,
    pub request_related_bundles_dir: Option<PathBuf>,
    pub request_recursive_related_bundles_dir: Option<PathBuf>,
    pub aws_s3_bucket_name: Option<String>,
    pub aws_access_key_id: Option<String>,
    pub aws_secret_access_key: Option<String>,
    pub aws_region: Option<String>,

    // Messaging (C5)
    pub messaging: MessagingConfig,

    // Cache (C1)
    pub dogpile: DogpileConfig,

    // Git (C3)
    pub git: GitConfig,

    // Pipeline (C4)
    pub konflux: KonfluxConfig,

    // Artifact transport (C2)
    pub index_db_artifact_registry: String,
    pub index_db_artifact_template: String,
    pub index_db_artifact_tag_template: String,
    pub use_imagestream_cache: bool,
    pub imagestream_source_repository: Option<String>,
    pub total_attempts: u32,
    pub retry_multiplier: f64,
    pub image_push_template: String,
    pub registry: String,

    // Worker plane
    pub worker_pool_size: usize,
    pub bundle_validation_pool_size: usize,
    pub phase_timeout: Duration,
    pub total_request_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Plain,
    Json,
}

fn env_str(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.is_empty())
}

fn env_bool(key: &str, default: bool) -> bool {
    env_str(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(default)
}

fn env_i64(key: &str, default: i64) -> i64 {
    env_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    env_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env_str(key).and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env_str(key)
        .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

fn env_json<T: serde::de::DeserializeOwned + Default>(key: &str) -> T {
    env_str(key)
        .and_then(|v| serde_json::from_str(&v).ok())
        .unwrap_or_default()
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let listen_addr = env_str("IIB_LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:8080".to_string())
            .parse()
            .map_err(|e| ConfigError::Invalid(format!("invalid IIB_LISTEN_ADDR: {e}")))?;

        let log_format = match env_str("IIB_LOG_FORMAT").as_deref() {
            Some("plain") => LogFormat::Plain,
            _ => LogFormat::Json,
        };

        let user_to_queue_raw: HashMap<String, String> = env_json("IIB_USER_TO_QUEUE");
        let binary_image_config_raw: HashMap<String, HashMap<String, String>> =
            env_json("IIB_BINARY_IMAGE_CONFIG");
        let greenwave_config: GreenwaveConfig = GreenwaveConfig {
            gating_queues: env_json("IIB_GREENWAVE_CONFIG"),
        };

        let ca_cert = match (env_str("iib_konflux_cluster_ca_cert_file"), env_str("iib_konflux_cluster_ca_cert")) {
            (Some(path), _) => CaCertSource::Path(PathBuf::from(path)),
            (None, Some(inline)) => CaCertSource::Inline(inline),
            (None, None) => CaCertSource::Inline(String::new()),
        };

        let config = Self {
            listen_addr,
            log_level: env_str("IIB_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
            additional_loggers: env_list("IIB_ADDITIONAL_LOGGERS"),
            dev_mode: env_bool("IIB_DEV", false),

            database: DbConfig::from_env(),

            max_per_page: env_i64("IIB_MAX_PER_PAGE", 100),
            user_to_queue: UserToQueue::parse(&user_to_queue_raw),
            default_queue: env_str("IIB_DEFAULT_QUEUE").unwrap_or_else(|| "iib".to_string()),
            binary_image_config: BinaryImageConfig { entries: binary_image_config_raw },
            greenwave_config,
            force_overwrite_from_index: env_bool("IIB_FORCE_OVERWRITE_FROM_INDEX", false),
            worker_usernames: env_list("IIB_WORKER_USERNAMES"),
            graph_mode_options: {
                let v = env_list("IIB_GRAPH_MODE_OPTIONS");
                if v.is_empty() {
                    vec!["replaces".to_string(), "semver".to_string(), "semver-skippatch".to_string()]
                } else {
                    v
                }
            },
            graph_mode_index_allow_list: env_json("IIB_GRAPH_MODE_INDEX_ALLOW_LIST"),

            request_data_days_to_live: env_i64("IIB_REQUEST_DATA_DAYS_TO_LIVE", 3),
            request_logs_dir: env_str("IIB_REQUEST_LOGS_DIR").map(PathBuf::from),
            request_logs_days_to_live: env_i64("IIB_REQUEST_LOGS_DAYS_TO_LIVE", 3),
            request_related_bundles_dir: env_str("IIB_REQUEST_RELATED_BUNDLES_DIR").map(PathBuf::from),
            request_recursive_related_bundles_dir: env_str("IIB_REQUEST_RECURSIVE_RELATED_BUNDLES_DIR")
                .map(PathBuf::from),
            aws_s3_bucket_name: env_str("IIB_AWS_S3_BUCKET_NAME"),
            aws_access_key_id: env_str("AWS_ACCESS_KEY_ID"),
            aws_secret_access_key: env_str("AWS_SECRET_ACCESS_KEY"),
            aws_region: env_str("AWS_DEFAULT_REGION"),

            messaging: MessagingConfig {
                urls: env_list("IIB_MESSAGING_URLS"),
                ca: env_str("IIB_MESSAGING_CA").map(PathBuf::from),
                cert: env_str("IIB_MESSAGING_CERT").map(PathBuf::from),
                key: env_str("IIB_MESSAGING_KEY").map(PathBuf::from),
                durable: env_bool("IIB_MESSAGING_DURABLE", true),
                timeout: Duration::from_secs(env_u32("IIB_MESSAGING_TIMEOUT", 30) as u64),
                batch_state_destination: env_str("IIB_MESSAGING_BATCH_STATE_DESTINATION")
                    .unwrap_or_else(|| "topic://VirtualTopic.eng.iib.batch.state".to_string()),
                build_state_destination: env_str("IIB_MESSAGING_BUILD_STATE_DESTINATION")
                    .unwrap_or_else(|| "topic://VirtualTopic.eng.iib.build.state".to_string()),
            },

            dogpile: DogpileConfig {
                backend: env_str("iib_dogpile_backend").unwrap_or_else(|| "dogpile.cache.memory".to_string()),
                expiration_time: Duration::from_secs(env_u32("iib_dogpile_expiration_time", 3600) as u64),
                arguments: env_json("iib_dogpile_arguments"),
            },

            git: GitConfig {
                index_to_gitlab_push_map: env_json("iib_web_index_to_gitlab_push_map"),
                index_configs_gitlab_tokens_map: {
                    let raw: HashMap<String, (String, String)> =
                        env_json("iib_index_configs_gitlab_tokens_map");
                    raw
                },
            },

            konflux: KonfluxConfig {
                cluster_url: env_str("iib_konflux_cluster_url").unwrap_or_default(),
                cluster_token: env_str("iib_konflux_cluster_token").unwrap_or_default(),
                cluster_ca_cert: ca_cert,
                namespace: env_str("iib_konflux_namespace").unwrap_or_else(|| "iib".to_string()),
                pipeline_timeout: Duration::from_secs(env_u32("iib_konflux_pipeline_timeout", 3600) as u64),
            },

            index_db_artifact_registry: env_str("iib_index_db_artifact_registry").unwrap_or_default(),
            index_db_artifact_template: env_str("iib_index_db_artifact_template").unwrap_or_default(),
            index_db_artifact_tag_template: env_str("iib_index_db_artifact_tag_template").unwrap_or_default(),
            use_imagestream_cache: env_bool("iib_use_imagestream_cache", false),
            imagestream_source_repository: env_str("iib_imagestream_source_repository"),
            total_attempts: env_u32("iib_total_attempts", 5),
            retry_multiplier: env_f64("iib_retry_multiplier", 2.0),
            image_push_template: env_str("iib_image_push_template").unwrap_or_default(),
            registry: env_str("iib_registry").unwrap_or_default(),

            worker_pool_size: env_u32("IIB_WORKER_POOL_SIZE", 4) as usize,
            bundle_validation_pool_size: env_u32("IIB_BUNDLE_VALIDATION_POOL_SIZE", 5) as usize,
            phase_timeout: Duration::from_secs(env_u32("IIB_PHASE_TIMEOUT_SECS", 600) as u64),
            total_request_timeout: Duration::from_secs(env_u32("IIB_TOTAL_REQUEST_TIMEOUT_SECS", 7200) as u64),
        };

        config.validate()?;
        Ok(config)
    }

    /// Startup validation (SPEC_FULL.md §6/§9): reject bad configuration
    /// before the HTTP listener binds, never at request time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        const ALLOWED_SCOPES: [&str; 3] = ["prod", "stage", "dev"];
        for scope in self.binary_image_config.entries.keys() {
            if !ALLOWED_SCOPES.contains(&scope.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "IIB_BINARY_IMAGE_CONFIG outer key {scope:?} is not one of {ALLOWED_SCOPES:?}"
                )));
            }
        }

        let known_queues: std::collections::HashSet<&str> = self
            .user_to_queue
            .known_queue_names()
            .chain(std::iter::once(self.default_queue.as_str()))
            .collect();
        for queues in self.greenwave_config.gating_queues.values() {
            for queue in queues {
                if !known_queues.contains(queue.as_str()) {
                    return Err(ConfigError::Invalid(format!(
                        "IIB_GREENWAVE_CONFIG references unknown queue {queue:?}"
                    )));
                }
            }
        }

        if self.aws_s3_bucket_name.is_some() && self.request_logs_dir.is_some() {
            return Err(ConfigError::Invalid(
                "IIB_AWS_S3_BUCKET_NAME must not be set together with IIB_REQUEST_LOGS_DIR".to_string(),
            ));
        }

        if self.aws_s3_bucket_name.is_some()
            && (self.aws_access_key_id.is_none()
                || self.aws_secret_access_key.is_none()
                || self.aws_region.is_none())
        {
            return Err(ConfigError::Invalid(
                "IIB_AWS_S3_BUCKET_NAME set without AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY/AWS_DEFAULT_REGION"
                    .to_string(),
            ));
        }

        if self.use_imagestream_cache && self.imagestream_source_repository.is_none() {
            return Err(ConfigError::Invalid(
                "iib_use_imagestream_cache=true requires iib_imagestream_source_repository to be set"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// A fully-populated `Config` for tests across the crate, not just this
/// module's own.
#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config {
        listen_addr: "0.0.0.0:8080".parse().unwrap(),
        log_level: "info".to_string(),
        log_format: LogFormat::Json,
        additional_loggers: vec![],
        dev_mode: true,
        database: DbConfig::default(),
        max_per_page: 100,
        user_to_queue: UserToQueue::default(),
        default_queue: "iib".to_string(),
        binary_image_config: BinaryImageConfig::default(),
        greenwave_config: GreenwaveConfig::default(),
        force_overwrite_from_index: false,
        worker_usernames: vec![],
        graph_mode_options: vec!["replaces".to_string()],
        graph_mode_index_allow_list: HashMap::new(),
        request_data_days_to_live: 3,
        request_logs_dir: None,
        request_logs_days_to_live: 3,
        request_related_bundles_dir: None,
        request_recursive_related_bundles_dir: None,
        aws_s3_bucket_name: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: None,
        messaging: MessagingConfig {
            urls: vec![],
            ca: None,
            cert: None,
            key: None,
            durable: true,
            timeout: Duration::from_secs(30),
            batch_state_destination: "topic://batch".to_string(),
            build_state_destination: "topic://build".to_string(),
        },
        dogpile: DogpileConfig {
            backend: "dogpile.cache.memory".to_string(),
            expiration_time: Duration::from_secs(3600),
            arguments: HashMap::new(),
        },
        git: GitConfig {
            index_to_gitlab_push_map: HashMap::new(),
            index_configs_gitlab_tokens_map: HashMap::new(),
        },
        konflux: KonfluxConfig {
            cluster_url: String::new(),
            cluster_token: String::new(),
            cluster_ca_cert: CaCertSource::Inline(String::new()),
            namespace: "iib".to_string(),
            pipeline_timeout: Duration::from_secs(3600),
        },
        index_db_artifact_registry: String::new(),
        index_db_artifact_template: String::new(),
        index_db_artifact_tag_template: String::new(),
        use_imagestream_cache: false,
        imagestream_source_repository: None,
        total_attempts: 5,
        retry_multiplier: 2.0,
        image_push_template: String::new(),
        registry: String::new(),
        worker_pool_size: 4,
        bundle_validation_pool_size: 5,
        phase_timeout: Duration::from_secs(600),
        total_request_timeout: Duration::from_secs(7200),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_classification_serial_then_plain() {
        let mut raw = HashMap::new();
        raw.insert("SERIAL:tbrady@DOMAIN.LOCAL".to_string(), "Buccaneers".to_string());
        let u2q = UserToQueue::parse(&raw);
        assert_eq!(u2q.classify("tbrady@DOMAIN.LOCAL", true, "default"), "Buccaneers");
        assert_eq!(u2q.classify("tbrady@DOMAIN.LOCAL", false, "default"), "default");
    }

    #[test]
    fn test_queue_classification_parallel_then_plain() {
        let mut raw = HashMap::new();
        raw.insert("PARALLEL:alice".to_string(), "fast-lane".to_string());
        raw.insert("alice".to_string(), "slow-lane".to_string());
        let u2q = UserToQueue::parse(&raw);
        assert_eq!(u2q.classify("alice", false, "default"), "fast-lane");
        assert_eq!(u2q.classify("alice", true, "default"), "slow-lane");
    }

    #[test]
    fn test_unknown_user_falls_back_to_default_queue() {
        let u2q = UserToQueue::parse(&HashMap::new());
        assert_eq!(u2q.classify("nobody", false, "default"), "default");
    }

    #[test]
    fn test_binary_image_config_rejects_unknown_scope() {
        let mut config = test_config();
        config
            .binary_image_config
            .entries
            .insert("qa".to_string(), HashMap::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_imagestream_cache_requires_source_repository() {
        let mut config = test_config();
        config.use_imagestream_cache = true;
        config.imagestream_source_repository = None;
        assert!(config.validate().is_err());
        config.imagestream_source_repository = Some("registry.example.com/ns/repo".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_s3_and_local_logs_dir_are_mutually_exclusive() {
        let mut config = test_config();
        config.aws_s3_bucket_name = Some("bucket".to_string());
        config.request_logs_dir = Some(PathBuf::from("/var/log/iib"));
        assert!(config.validate().is_err());
    }
}
