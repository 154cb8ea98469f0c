use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://fwwb.sjbsjb.xyz";
pub const API_PREFIX: &str = "/api/v1";
pub const API_KEY_HEADER: &str = "X-API-Key";

// Config is the one place runtime settings are read from the environment.
// Everything downstream receives it by value through AppContext.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    pub api_key: Option<String>,
    pub use_mock: bool,
    pub data_dir: PathBuf,
    pub request_timeout: Duration,
    pub api_addr: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            use_mock: false,
            data_dir: PathBuf::from(".autofill"),
            request_timeout: Duration::from_secs(30),
            api_addr: None,
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let base_url = env_nonempty("AUTOFILL_BASE_URL")
            .map(|s| normalize_base_url(&s))
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            anyhow::bail!("AUTOFILL_BASE_URL must start with http:// or https://, got {base_url}");
        }

        let api_key = env_nonempty("AUTOFILL_API_KEY");

        let use_mock = env_bool("AUTOFILL_USE_MOCK").unwrap_or(false);

        let data_dir = env_nonempty("AUTOFILL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".autofill"));

        let timeout_secs: u64 = env_nonempty("AUTOFILL_REQUEST_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30)
            .clamp(1, 600);

        let api_addr = env_nonempty("AUTOFILL_API_ADDR").and_then(|s| normalize_optional_addr(&s));

        Ok(Self {
            base_url,
            api_key,
            use_mock,
            data_dir,
            request_timeout: Duration::from_secs(timeout_secs),
            api_addr,
        })
    }
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

pub fn normalize_base_url(value: &str) -> String {
    value.trim().trim_end_matches('/').to_string()
}

fn normalize_optional_addr(value: &str) -> Option<String> {
    let v = value.trim();
    if v.is_empty() {
        return None;
    }
    if matches!(v.to_lowercase().as_str(), "0" | "off" | "false" | "none") {
        return None;
    }
    Some(v.to_string())
}
