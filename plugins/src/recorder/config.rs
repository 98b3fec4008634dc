use std::collections::BTreeMap;
use std::path::Path;

use pbench_core::api::RecorderError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Read a TOML backend config file.
pub fn load_backend_config<T: DeserializeOwned>(path: &Path) -> Result<T, RecorderError> {
    let text = std::fs::read_to_string(path).map_err(|e| {
        RecorderError::Config(format!("read {}: {e}", path.display()))
    })?;
    toml::from_str(&text)
        .map_err(|e| RecorderError::Config(format!("parse {}: {e}", path.display())))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InfluxConfig {
    pub url: String,
    #[serde(default)]
    pub org: String,
    pub bucket: String,
    #[serde(default)]
    pub token: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_measurement() -> String {
    "pbench".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MySqlConfig {
    /// Full connection url; wins over the individual fields.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_mysql_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_mysql_host() -> String {
    "127.0.0.1".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_max_connections() -> u32 {
    4
}

impl MySqlConfig {
    pub fn connection_url(&self) -> String {
        if let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) {
            return url.to_string();
        }
        let auth = match (self.user.is_empty(), self.password.is_empty()) {
            (true, _) => String::new(),
            (false, true) => format!("{}@", self.user),
            (false, false) => format!("{}:{}@", self.user, self.password),
        };
        format!("mysql://{auth}{}:{}/{}", self.host, self.port, self.database)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PulumiConfig {
    pub project_dir: String,
    pub stack: String,
    #[serde(default = "default_pulumi_bin")]
    pub pulumi_bin: String,
    /// Stack output holding the MySQL connection url.
    #[serde(default = "default_mysql_url_output")]
    pub mysql_url_output: String,
    #[serde(default)]
    pub destroy_on_finish: bool,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    /// Deadline for setup and teardown; `pulumi up` routinely takes minutes.
    #[serde(default = "default_pulumi_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_pulumi_bin() -> String {
    "pulumi".to_string()
}

fn default_pulumi_timeout_secs() -> u64 {
    1800
}

fn default_mysql_url_output() -> String {
    "mysql_url".to_string()
}
