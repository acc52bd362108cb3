use crate::utils::error::{BeatError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Microsoft OAuth 端點回傳的授權資訊，時間欄位都是字串形式的 unix timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token_type: String,
    pub expires_in: String,
    pub expires_on: String,
    pub not_before: String,
    pub resource: String,
    pub access_token: String,
}

impl AuthToken {
    // token 到期前 60 秒就提前視為過期
    const EXPIRATION_BUFFER_SECS: i64 = 60;

    pub fn header_value(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on.parse::<i64>() {
            Ok(expires_on) => now.timestamp() > expires_on - Self::EXPIRATION_BUFFER_SECS,
            // 解析不了就當作已過期，強制重新認證
            Err(_) => true,
        }
    }
}

/// 訂閱清單 API 回傳的單一訂閱狀態
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "contentType")]
    pub content_type: String,
    pub status: String,
    // webhook 等其餘欄位目前用不到，原樣保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Subscription {
    pub fn disabled(content_type: &str) -> Self {
        Self {
            content_type: content_type.to_string(),
            status: "disabled".to_string(),
            extra: Map::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.status.eq_ignore_ascii_case("enabled")
    }
}

/// 內容清單 API 回傳的 blob 位置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentBlob {
    #[serde(rename = "contentUri")]
    pub content_uri: String,
    #[serde(rename = "contentCreated")]
    pub content_created: DateTime<Utc>,
    #[serde(rename = "contentType", default)]
    pub content_type: String,
    #[serde(rename = "contentId", default)]
    pub content_id: String,
}

/// 送往 output 的單一事件：時間戳加上 audit 紀錄的全部欄位
#[derive(Debug, Clone, Serialize)]
pub struct BeatEvent {
    #[serde(rename = "@timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl BeatEvent {
    /// 從 API 回傳的 audit 紀錄建立事件。
    /// CreationTime 沒有時區後綴，需補 "Z" 才能當 RFC 3339 解析
    /// (blob 層的 contentCreated 反而有，兩者格式不一致)。
    pub fn from_audit_record(record: Map<String, Value>) -> Result<Self> {
        let creation_time = record
            .get("CreationTime")
            .and_then(Value::as_str)
            .ok_or_else(|| BeatError::ProcessingError {
                message: "audit record has no CreationTime field".to_string(),
            })?;

        let timestamp = DateTime::parse_from_rfc3339(&format!("{}Z", creation_time))
            .map_err(|e| BeatError::ProcessingError {
                message: format!("invalid CreationTime '{}': {}", creation_time, e),
            })?
            .with_timezone(&Utc);

        Ok(Self {
            timestamp,
            fields: record,
        })
    }
}
