use crate::config::BeatConfig;
use crate::core::auth::TokenClient;
use crate::domain::model::{AuthToken, ContentBlob, Subscription};
use crate::utils::error::{BeatError, Result};
use chrono::{DateTime, Duration, Utc};
use reqwest::{Client, Method, Response};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

// 內容清單分頁透過這個 response header 串接
const NEXT_PAGE_HEADER: &str = "NextPageUri";

// API 的時間參數要 UTC、無 "Z" 後綴的這個格式
const API_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Office 365 Management Activity API 用戶端。
/// token 快取在內部，過期時自動重新認證。
pub struct ActivityApi {
    http: Client,
    token_client: TokenClient,
    api_root_url: String,
    publisher_id: String,
    content_types: Vec<String>,
    content_max_age: Duration,
    token: Mutex<Option<AuthToken>>,
}

impl ActivityApi {
    pub fn from_config(config: &BeatConfig) -> Result<Self> {
        let http = Client::builder().timeout(config.api_timeout()).build()?;

        let token_client = TokenClient::new(
            http.clone(),
            config.authentication_url(),
            config.resource_url().to_string(),
            config.api.client_id.clone(),
            config.api.client_secret.clone(),
        );

        Ok(Self {
            http,
            token_client,
            api_root_url: config.api_root_url(),
            publisher_id: config.api.directory_id.clone(),
            content_types: config.content_types(),
            content_max_age: config.content_max_age(),
            token: Mutex::new(None),
        })
    }

    /// 取得目前快取的 Authorization header，沒有或過期就先重新認證
    async fn auth_header(&self) -> Result<String> {
        let mut guard = self.token.lock().await;

        if let Some(token) = guard.as_ref() {
            if !token.is_expired(Utc::now()) {
                return Ok(token.header_value());
            }
            tracing::info!("auth token expired, re-authenticating");
        } else {
            tracing::info!("no auth token yet, authenticating");
        }

        let token = self.token_client.fetch().await?;
        let header = token.header_value();
        *guard = Some(token);
        Ok(header)
    }

    /// 所有 API 請求的共同路徑：帶 PublisherIdentifier (避免被 API 節流)
    /// 與 Authorization header，非 2xx 一律視為錯誤
    async fn request(&self, method: Method, url: &str, query: &[(&str, String)]) -> Result<Response> {
        let auth_header = self.auth_header().await?;

        tracing::debug!("issuing api request: {}", url);
        let response = self
            .http
            .request(method, url)
            .query(&[("PublisherIdentifier", self.publisher_id.as_str())])
            .query(query)
            .header(reqwest::header::AUTHORIZATION, auth_header)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BeatError::ApiStatusError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// 取得目前所有訂閱及其狀態
    pub async fn list_subscriptions(&self) -> Result<Vec<Subscription>> {
        tracing::info!("getting content subscriptions");
        let url = format!("{}subscriptions/list", self.api_root_url);
        let response = self.request(Method::GET, &url, &[]).await?;
        let subscriptions: Vec<Subscription> = response.json().await?;
        tracing::debug!("got {} subscriptions", subscriptions.len());
        Ok(subscriptions)
    }

    /// 啟用指定 content type 的訂閱
    pub async fn start_subscription(&self, content_type: &str) -> Result<Value> {
        tracing::info!("subscribing to content type {}", content_type);
        tracing::info!("note that new subscriptions can take up to 12 hours to produce data");
        let url = format!("{}subscriptions/start", self.api_root_url);
        let response = self
            .request(
                Method::POST,
                &url,
                &[("contentType", content_type.to_string())],
            )
            .await?;
        let subscription: Value = response.json().await?;
        tracing::debug!("subscription response: {}", subscription);
        Ok(subscription)
    }

    /// 確保配置的 content type 都已訂閱。
    /// 清單裡找不到的配置類型視為 disabled，未啟用的逐一啟用。
    pub async fn enable_subscriptions(&self) -> Result<()> {
        tracing::info!(
            "enabling subscriptions for configured content types: {:?}",
            self.content_types
        );
        let mut subscriptions = self.list_subscriptions().await?;

        for content_type in &self.content_types {
            let listed = subscriptions
                .iter()
                .any(|sub| sub.content_type == *content_type);
            if !listed {
                tracing::debug!(
                    "no subscription for configured content type {}, will subscribe",
                    content_type
                );
                subscriptions.push(Subscription::disabled(content_type));
            }
        }

        for subscription in &subscriptions {
            if !subscription.is_enabled() {
                self.start_subscription(&subscription.content_type).await?;
            }
        }
        Ok(())
    }

    /// 單一 content type、最長 24 小時區間的 blob 清單 (API 的基本單位)。
    /// start 早於保留期限就夾回期限內；分頁由 NextPageUri header 串起來。
    pub async fn list_available_content(
        &self,
        content_type: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentBlob>> {
        let now = Utc::now();
        let mut start = start;
        if now - start > self.content_max_age {
            tracing::warn!(
                "start ({}) exceeds the {}h retention window, resetting",
                start,
                self.content_max_age.num_hours()
            );
            start = now - self.content_max_age;
        }
        if end - start > Duration::hours(24) {
            return Err(BeatError::ContentSpanError {
                message: format!(
                    "start ({}) and end ({}) must be at most 24 hours apart",
                    start, end
                ),
            });
        }
        if end < start {
            return Err(BeatError::ContentSpanError {
                message: format!("start ({}) must be before end ({})", start, end),
            });
        }

        let url = format!("{}subscriptions/content", self.api_root_url);
        let query = [
            ("contentType", content_type.to_string()),
            ("startTime", start.format(API_TIME_FORMAT).to_string()),
            ("endTime", end.format(API_TIME_FORMAT).to_string()),
        ];

        let mut response = self.request(Method::GET, &url, &query).await?;
        let mut blobs: Vec<ContentBlob> = Vec::new();
        loop {
            let next_page = response
                .headers()
                .get(NEXT_PAGE_HEADER)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string);

            let page: Vec<ContentBlob> = response.json().await?;
            blobs.extend(page);

            match next_page {
                Some(next_url) => {
                    tracing::debug!("following {}: {}", NEXT_PAGE_HEADER, next_url);
                    response = self.request(Method::GET, &next_url, &[]).await?;
                }
                None => break,
            }
        }

        tracing::info!(
            "got {} available content blobs of type {} between {} and {}",
            blobs.len(),
            content_type,
            start,
            end
        );
        Ok(blobs)
    }

    /// 跨 content type、任意長度區間的 blob 清單，
    /// 按 24 小時切片逐一查詢，結果依 contentCreated 排序
    pub async fn list_all_available_content(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ContentBlob>> {
        tracing::debug!("getting all available content between {} and {}", start, end);
        if end < start {
            return Err(BeatError::ContentSpanError {
                message: format!("start ({}) must be before end ({})", start, end),
            });
        }

        let mut blobs: Vec<ContentBlob> = Vec::new();
        for (span_start, span_end) in plan_spans(start, end) {
            for content_type in &self.content_types {
                let page = self
                    .list_available_content(content_type, span_start, span_end)
                    .await?;
                blobs.extend(page);
            }
            tracing::debug!("finished span {} to {}", span_start, span_end);
        }

        let sorted = blobs
            .windows(2)
            .all(|pair| pair[0].content_created <= pair[1].content_created);
        if !sorted {
            tracing::debug!("content blobs arrived unsorted, sorting by creation time");
            // 穩定排序，同一秒建立的 blob 保持 API 回傳順序
            blobs.sort_by_key(|blob| blob.content_created);
        }
        Ok(blobs)
    }

    /// 下載單一 blob 的 audit 紀錄
    pub async fn get_content(&self, uri: &str) -> Result<Vec<Map<String, Value>>> {
        tracing::debug!("getting content from {}", uri);
        let response = self.request(Method::GET, uri, &[]).await?;
        let records: Vec<Map<String, Value>> = response.json().await?;
        Ok(records)
    }
}

/// 把 [start, end) 切成最長 24 小時的查詢區間
pub(crate) fn plan_spans(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut spans = Vec::new();
    let mut span_start = start;
    while span_start < end {
        let span_end = (span_start + Duration::hours(24)).min(end);
        spans.push((span_start, span_end));
        span_start = span_end;
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ApiSection, BeatSection, OutputSection};
    use chrono::TimeZone;
    use httpmock::prelude::*;

    fn test_config(server_url: &str, content_types: Vec<String>) -> BeatConfig {
        BeatConfig {
            beat: BeatSection::default(),
            api: ApiSection {
                tenant_domain: "contoso.onmicrosoft.com".to_string(),
                client_id: "client-id".to_string(),
                client_secret: "client-secret".to_string(),
                directory_id: "dir-id".to_string(),
                login_url: Some(server_url.to_string()),
                resource_url: Some(server_url.to_string()),
                timeout_seconds: Some(5),
                content_max_age_hours: Some(24),
                content_types: Some(content_types),
            },
            output: OutputSection {
                r#type: "console".to_string(),
                path: None,
            },
            monitoring: None,
        }
    }

    fn mock_token(server: &MockServer) -> httpmock::Mock<'_> {
        server.mock(|when, then| {
            when.method(POST)
                .path("/contoso.onmicrosoft.com/oauth2/token");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({
                    "token_type": "Bearer",
                    "expires_in": "3599",
                    "expires_on": "9999999999",
                    "not_before": "0",
                    "resource": "https://manage.office.com",
                    "access_token": "token123",
                }));
        })
    }

    #[test]
    fn test_plan_spans_splits_into_24h_chunks() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 5, 3, 12, 0, 0).unwrap();

        let spans = plan_spans(start, end);
        assert_eq!(spans.len(), 3);
        assert_eq!(spans[0].0, start);
        assert_eq!(spans[0].1, start + Duration::hours(24));
        assert_eq!(spans[2].1, end);
    }

    #[test]
    fn test_plan_spans_empty_when_start_not_before_end() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        assert!(plan_spans(t, t).is_empty());
    }

    #[tokio::test]
    async fn test_span_longer_than_24h_is_rejected() {
        let server = MockServer::start();
        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        // 保留期限內的 start，但區間長度 25 小時
        let now = Utc::now();
        let start = now - Duration::hours(23);
        let end = now + Duration::hours(2);
        let result = api.list_available_content("Audit.Exchange", start, end).await;
        assert!(matches!(result, Err(BeatError::ContentSpanError { .. })));
    }

    #[tokio::test]
    async fn test_end_before_start_is_rejected() {
        let server = MockServer::start();
        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        let now = Utc::now();
        let result = api
            .list_all_available_content(now, now - Duration::hours(1))
            .await;
        assert!(matches!(result, Err(BeatError::ContentSpanError { .. })));
    }

    #[tokio::test]
    async fn test_requests_carry_publisher_identifier_and_auth_header() {
        let server = MockServer::start();
        let token_mock = mock_token(&server);

        let list_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/list")
                .query_param("PublisherIdentifier", "dir-id")
                .header("Authorization", "Bearer token123");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"contentType": "Audit.Exchange", "status": "enabled"}
                ]));
        });

        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        let subscriptions = api.list_subscriptions().await.unwrap();

        token_mock.assert();
        list_mock.assert();
        assert_eq!(subscriptions.len(), 1);
        assert!(subscriptions[0].is_enabled());
    }

    #[tokio::test]
    async fn test_token_is_cached_across_requests() {
        let server = MockServer::start();
        let token_mock = mock_token(&server);

        let list_mock = server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/list");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([]));
        });

        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        api.list_subscriptions().await.unwrap();
        api.list_subscriptions().await.unwrap();

        // 兩次 API 呼叫只認證一次
        token_mock.assert_hits(1);
        list_mock.assert_hits(2);
    }

    #[tokio::test]
    async fn test_enable_subscriptions_starts_missing_and_disabled_feeds() {
        let server = MockServer::start();
        mock_token(&server);

        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/list");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"contentType": "Audit.Exchange", "status": "enabled"},
                    {"contentType": "Audit.General", "status": "disabled"}
                ]));
        });

        let start_general = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/start")
                .query_param("contentType", "Audit.General");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"contentType": "Audit.General", "status": "enabled"}));
        });

        let start_sharepoint = server.mock(|when, then| {
            when.method(POST)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/start")
                .query_param("contentType", "Audit.SharePoint");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!({"contentType": "Audit.SharePoint", "status": "enabled"}));
        });

        // Audit.SharePoint 沒在清單裡，Audit.General 在清單但 disabled
        let config = test_config(
            &server.base_url(),
            vec!["Audit.Exchange".to_string(), "Audit.SharePoint".to_string()],
        );
        let api = ActivityApi::from_config(&config).unwrap();

        api.enable_subscriptions().await.unwrap();

        start_general.assert_hits(1);
        start_sharepoint.assert_hits(1);
    }

    #[tokio::test]
    async fn test_content_listing_follows_next_page_header() {
        let server = MockServer::start();
        mock_token(&server);

        let next_uri = server.url("/api/v1.0/dir-id/activity/feed/subscriptions/content/page2");

        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/content")
                .query_param("contentType", "Audit.Exchange");
            then.status(200)
                .header("Content-Type", "application/json")
                .header("NextPageUri", next_uri.as_str())
                .json_body(serde_json::json!([
                    {"contentUri": "https://example.invalid/blob1", "contentCreated": "2024-05-01T10:00:00Z"}
                ]));
        });

        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/content/page2");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"contentUri": "https://example.invalid/blob2", "contentCreated": "2024-05-01T11:00:00Z"}
                ]));
        });

        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        let end = Utc::now();
        let start = end - Duration::hours(1);
        let blobs = api
            .list_available_content("Audit.Exchange", start, end)
            .await
            .unwrap();

        assert_eq!(blobs.len(), 2);
        assert_eq!(blobs[0].content_uri, "https://example.invalid/blob1");
        assert_eq!(blobs[1].content_uri, "https://example.invalid/blob2");
    }

    #[tokio::test]
    async fn test_all_available_content_is_sorted_by_creation_time() {
        let server = MockServer::start();
        mock_token(&server);

        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/content");
            then.status(200)
                .header("Content-Type", "application/json")
                .json_body(serde_json::json!([
                    {"contentUri": "https://example.invalid/later", "contentCreated": "2024-05-01T12:00:00Z"},
                    {"contentUri": "https://example.invalid/earlier", "contentCreated": "2024-05-01T09:00:00Z"}
                ]));
        });

        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        let end = Utc::now();
        let start = end - Duration::hours(2);
        let blobs = api.list_all_available_content(start, end).await.unwrap();

        assert_eq!(blobs.len(), 2);
        assert!(blobs[0].content_created < blobs[1].content_created);
        assert_eq!(blobs[0].content_uri, "https://example.invalid/earlier");
    }

    #[tokio::test]
    async fn test_non_200_api_response_is_an_error() {
        let server = MockServer::start();
        mock_token(&server);

        server.mock(|when, then| {
            when.method(GET)
                .path("/api/v1.0/dir-id/activity/feed/subscriptions/list");
            then.status(503).body("AF429 throttled");
        });

        let config = test_config(&server.base_url(), vec!["Audit.Exchange".to_string()]);
        let api = ActivityApi::from_config(&config).unwrap();

        let err = api.list_subscriptions().await.unwrap_err();
        match err {
            BeatError::ApiStatusError { status, body } => {
                assert_eq!(status, 503);
                assert!(body.contains("throttled"));
            }
            other => panic!("expected ApiStatusError, got {:?}", other),
        }
    }
}
