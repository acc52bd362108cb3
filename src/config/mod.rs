#[cfg(feature = "cli")]
pub mod cli;

use crate::utils::error::{BeatError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_positive_number, validate_required_field,
    validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

const DEFAULT_PERIOD_SECS: u64 = 60;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
// Management Activity API 只保留七天內的內容
const DEFAULT_CONTENT_MAX_AGE_HOURS: u64 = 168;
const DEFAULT_LOGIN_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_RESOURCE_URL: &str = "https://manage.office.com";
const DEFAULT_REGISTRY_PATH: &str = "./o365beat.state";

const DEFAULT_CONTENT_TYPES: [&str; 5] = [
    "Audit.AzureActiveDirectory",
    "Audit.Exchange",
    "Audit.SharePoint",
    "Audit.General",
    "DLP.All",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeatConfig {
    pub beat: BeatSection,
    pub api: ApiSection,
    pub output: OutputSection,
    pub monitoring: Option<MonitoringSection>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeatSection {
    pub period_seconds: Option<u64>,
    pub registry_file_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSection {
    pub tenant_domain: String,
    pub client_id: String,
    pub client_secret: String,
    /// 即 tenant id，也作為每個請求的 PublisherIdentifier
    pub directory_id: String,
    pub login_url: Option<String>,
    pub resource_url: Option<String>,
    pub timeout_seconds: Option<u64>,
    pub content_max_age_hours: Option<u64>,
    pub content_types: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSection {
    pub r#type: String,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringSection {
    pub enabled: bool,
    pub log_level: Option<String>,
}

impl BeatConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(BeatError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        // 先處理環境變數替換，client_secret 通常以 ${O365_CLIENT_SECRET} 形式給
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| BeatError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${O365_CLIENT_SECRET})
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid");

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    pub fn period(&self) -> Duration {
        Duration::from_secs(self.beat.period_seconds.unwrap_or(DEFAULT_PERIOD_SECS))
    }

    pub fn registry_file_path(&self) -> &str {
        self.beat
            .registry_file_path
            .as_deref()
            .unwrap_or(DEFAULT_REGISTRY_PATH)
    }

    pub fn login_url(&self) -> &str {
        self.api.login_url.as_deref().unwrap_or(DEFAULT_LOGIN_URL)
    }

    pub fn resource_url(&self) -> &str {
        self.api
            .resource_url
            .as_deref()
            .unwrap_or(DEFAULT_RESOURCE_URL)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    pub fn content_max_age(&self) -> chrono::Duration {
        chrono::Duration::hours(
            self.api
                .content_max_age_hours
                .unwrap_or(DEFAULT_CONTENT_MAX_AGE_HOURS) as i64,
        )
    }

    pub fn content_types(&self) -> Vec<String> {
        match &self.api.content_types {
            Some(types) if !types.is_empty() => types.clone(),
            _ => DEFAULT_CONTENT_TYPES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// OAuth token 端點 (login url 加上 tenant domain)
    pub fn authentication_url(&self) -> String {
        format!(
            "{}/{}/oauth2/token?api-version=1.0",
            self.login_url(),
            self.api.tenant_domain
        )
    }

    /// Management Activity API 的根路徑，各操作往下接 subscriptions/*
    pub fn api_root_url(&self) -> String {
        format!(
            "{}/api/v1.0/{}/activity/feed/",
            self.resource_url(),
            self.api.directory_id
        )
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    /// 驗證配置的合理性
    pub fn validate_config(&self) -> Result<()> {
        validate_non_empty_string("api.tenant_domain", &self.api.tenant_domain)?;
        validate_non_empty_string("api.client_id", &self.api.client_id)?;
        validate_non_empty_string("api.client_secret", &self.api.client_secret)?;
        validate_non_empty_string("api.directory_id", &self.api.directory_id)?;

        // 沒被替換掉的 ${VAR} 代表環境變數沒設
        if self.api.client_secret.starts_with("${") {
            return Err(BeatError::InvalidConfigValueError {
                field: "api.client_secret".to_string(),
                value: self.api.client_secret.clone(),
                reason: "Environment variable was not substituted".to_string(),
            });
        }

        validate_url("api.login_url", self.login_url())?;
        validate_url("api.resource_url", self.resource_url())?;

        if let Some(period) = self.beat.period_seconds {
            validate_positive_number("beat.period_seconds", period, 1)?;
        }
        if let Some(timeout) = self.api.timeout_seconds {
            validate_positive_number("api.timeout_seconds", timeout, 1)?;
        }
        if let Some(max_age) = self.api.content_max_age_hours {
            validate_positive_number("api.content_max_age_hours", max_age, 1)?;
        }

        validate_path("beat.registry_file_path", self.registry_file_path())?;

        if self.content_types().is_empty() {
            return Err(BeatError::InvalidConfigValueError {
                field: "api.content_types".to_string(),
                value: String::new(),
                reason: "At least one content type is required".to_string(),
            });
        }

        match self.output.r#type.as_str() {
            "console" => {}
            "file" => {
                let path = validate_required_field("output.path", &self.output.path)?;
                validate_path("output.path", path)?;
            }
            other => {
                return Err(BeatError::InvalidConfigValueError {
                    field: "output.type".to_string(),
                    value: other.to_string(),
                    reason: "Supported output types: console, file".to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Validate for BeatConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
