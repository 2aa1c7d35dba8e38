use serde::Deserialize;

/// Queue service configuration, loaded from the environment.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0:3000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// SQLite connection string
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Directory for uploaded job artifacts
    #[serde(default = "default_upload_dir")]
    pub upload_dir: String,

    /// Maximum accepted upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Bearer tokens accepted for agent endpoints (comma-separated)
    #[serde(default)]
    pub agent_tokens: Vec<String>,

    /// Secret used to sign user access tokens
    #[serde(default = "default_app_secret")]
    pub app_secret: String,

    /// User access token lifetime in seconds
    #[serde(default = "default_access_token_ttl_seconds")]
    pub access_token_ttl_seconds: u64,

    /// Users seeded at startup, as comma-separated "username:password" pairs
    #[serde(default = "default_default_users")]
    pub default_users: Vec<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_database_url() -> String {
    "sqlite://data/print_jobs.db?mode=rwc".to_string()
}

fn default_upload_dir() -> String {
    "./data/uploads".to_string()
}

fn default_max_upload_bytes() -> usize {
    5 * 1024 * 1024
}

fn default_app_secret() -> String {
    "change-this-secret".to_string()
}

fn default_access_token_ttl_seconds() -> u64 {
    12 * 60 * 60
}

fn default_default_users() -> Vec<String> {
    vec!["admin:admin123".to_string()]
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}

/// Dispatch agent configuration, loaded from the environment.
#[derive(Debug, Deserialize)]
pub struct AgentConfig {
    /// Base URL of the queue service
    #[serde(default = "default_server_base_url")]
    pub server_base_url: String,

    /// Bearer token authorizing this process as an agent
    pub agent_token: String,

    /// Identifier this agent claims jobs under
    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// CUPS destination passed to `lp -d`
    #[serde(default = "default_printer_name")]
    pub printer_name: String,

    /// Seconds to sleep between empty polls
    #[serde(default = "default_poll_interval_seconds")]
    pub poll_interval_seconds: u64,

    /// Scratch directory for downloaded artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Copies per job
    #[serde(default = "default_copies")]
    pub copies: u32,
}

fn default_server_base_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_agent_id() -> String {
    "default-agent".to_string()
}

fn default_printer_name() -> String {
    "hp_m255nw".to_string()
}

fn default_poll_interval_seconds() -> u64 {
    3
}

fn default_work_dir() -> String {
    "./spool".to_string()
}

fn default_copies() -> u32 {
    1
}

impl AgentConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
