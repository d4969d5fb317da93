use std::future::Future;
use std::time::Duration;

use reqwest::header::{
    CONTENT_DISPOSITION, CONTENT_TYPE, COOKIE, HeaderMap, HeaderName, HeaderValue, USER_AGENT,
};
use reqwest::{Client, RequestBuilder, Response};
use tracing::debug;

use crate::config::{self, ResolvedConfig};
use crate::domain::ContentCategory;
use crate::error::PesuError;
use crate::parser::RecordKind;

/// A named portal capability. The orchestrator and download engine only ever
/// speak in endpoints; URLs and form fields live in the HTTP client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    UserProfile,
    SubjectList,
    CourseUnits { subject_id: String },
    UnitClasses { unit_id: String },
    SemesterList,
    SemesterGpa { semester_id: String },
    Attendance { semester_id: String },
    CourseMaterial {
        subject_id: String,
        class_id: String,
        category: ContentCategory,
    },
    /// Faculty directory A-Z search. Served by the staff site, not the portal.
    FacultySearch { query: String },
    FacultyProfile { path: String },
}

impl Endpoint {
    pub fn name(&self) -> &'static str {
        match self {
            Endpoint::UserProfile => "user-profile",
            Endpoint::SubjectList => "subject-list",
            Endpoint::CourseUnits { .. } => "course-units",
            Endpoint::UnitClasses { .. } => "unit-classes",
            Endpoint::SemesterList => "semester-list",
            Endpoint::SemesterGpa { .. } => "semester-gpa",
            Endpoint::Attendance { .. } => "attendance",
            Endpoint::CourseMaterial { .. } => "course-material",
            Endpoint::FacultySearch { .. } => "faculty-search",
            Endpoint::FacultyProfile { .. } => "faculty-profile",
        }
    }

    /// Faculty directory pages are public and never see the portal session.
    pub fn needs_session(&self) -> bool {
        !matches!(
            self,
            Endpoint::FacultySearch { .. } | Endpoint::FacultyProfile { .. }
        )
    }

    pub fn record_kind(&self) -> RecordKind {
        match self {
            Endpoint::UserProfile => RecordKind::UserProfile,
            Endpoint::SubjectList => RecordKind::SubjectList,
            Endpoint::CourseUnits { .. } => RecordKind::UnitList,
            Endpoint::UnitClasses { .. } => RecordKind::ClassList,
            Endpoint::SemesterList => RecordKind::SemesterList,
            Endpoint::SemesterGpa { .. } => RecordKind::Gpa,
            Endpoint::Attendance { .. } => RecordKind::Attendance,
            Endpoint::CourseMaterial { .. } => RecordKind::DownloadLinks,
            Endpoint::FacultySearch { .. } => RecordKind::FacultySearch,
            Endpoint::FacultyProfile { .. } => RecordKind::FacultyProfile,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Binary,
    Html,
    Unknown,
}

/// Undecoded response body plus the headers needed to classify it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawPayload {
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
    pub body: Vec<u8>,
}

impl RawPayload {
    pub fn html(body: &str) -> Self {
        Self {
            content_type: Some("text/html;charset=UTF-8".to_string()),
            content_disposition: None,
            body: body.as_bytes().to_vec(),
        }
    }

    /// An HTML fragment wrapped in a JSON string, as most `/a/` endpoints send.
    pub fn json_string(html: &str) -> Self {
        Self {
            content_type: Some("application/json".to_string()),
            content_disposition: None,
            body: serde_json::to_vec(html).unwrap_or_default(),
        }
    }

    pub fn binary(content_type: &str, body: Vec<u8>) -> Self {
        Self {
            content_type: Some(content_type.to_string()),
            content_disposition: None,
            body,
        }
    }

    pub fn with_disposition(mut self, disposition: &str) -> Self {
        self.content_disposition = Some(disposition.to_string());
        self
    }

    pub fn kind(&self) -> PayloadKind {
        let content_type = self
            .content_type
            .as_deref()
            .unwrap_or("")
            .to_ascii_lowercase();
        let is_attachment = self
            .content_disposition
            .as_deref()
            .map(|value| value.to_ascii_lowercase().contains("attachment"))
            .unwrap_or(false);

        const BINARY_TYPES: [&str; 8] = [
            "application/pdf",
            "application/octet-stream",
            "application/vnd",
            "application/msword",
            "application/zip",
            "image/",
            "video/",
            "audio/",
        ];
        if is_attachment || BINARY_TYPES.iter().any(|ty| content_type.contains(ty)) {
            return PayloadKind::Binary;
        }
        if content_type.contains("text/html") || content_type.contains("application/json") {
            return PayloadKind::Html;
        }
        if self.body.starts_with(b"%PDF") || self.body.starts_with(b"PK\x03\x04") {
            return PayloadKind::Binary;
        }
        let head = String::from_utf8_lossy(&self.body[..self.body.len().min(512)]).to_string();
        let head = head.trim_start();
        if head.starts_with('<') || head.starts_with('"') {
            return PayloadKind::Html;
        }
        PayloadKind::Unknown
    }

    /// Body as HTML text. JSON-encoded strings are unwrapped and an empty body
    /// (or empty string) is `None`.
    pub fn html_text(&self) -> Result<Option<String>, PesuError> {
        let text = String::from_utf8_lossy(&self.body);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let html = if trimmed.starts_with('"') {
            serde_json::from_str::<String>(trimmed)
                .map_err(|err| PesuError::parse("JSON-encoded HTML", err.to_string()))?
        } else {
            trimmed.to_string()
        };
        Ok((!html.trim().is_empty()).then_some(html))
    }
}

pub trait PortalClient: Send + Sync {
    fn fetch(
        &self,
        session: &str,
        endpoint: &Endpoint,
    ) -> impl Future<Output = Result<RawPayload, PesuError>> + Send;

    /// Fetches an absolute URL resolved from a material page.
    fn fetch_url(
        &self,
        session: &str,
        url: &str,
    ) -> impl Future<Output = Result<RawPayload, PesuError>> + Send;

    /// Root that relative material links resolve against.
    fn base_url(&self) -> &str {
        config::DEFAULT_BASE_URL
    }
}

/// Source of the opaque portal session token (e.g. the browser's JSESSIONID).
pub trait CredentialProvider: Send + Sync {
    fn session(&self) -> impl Future<Output = Option<String>> + Send;
}

/// Reads the token from `PESU_SESSION`.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    async fn session(&self) -> Option<String> {
        config::session_from_env()
    }
}

#[derive(Clone)]
pub struct PortalHttpClient {
    client: Client,
    base_url: String,
    staff_url: String,
    max_retries: usize,
}

impl PortalHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, PesuError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("pesu-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PesuError::PortalHttp(err.to_string()))?,
        );
        headers.insert("X-Requested-With", HeaderValue::from_static("XMLHttpRequest"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| PesuError::PortalHttp(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            staff_url: config.staff_url.clone(),
            max_retries: config.max_retries,
        })
    }

    fn request(&self, session: &str, endpoint: &Endpoint) -> RequestBuilder {
        let admin_url = format!("{}/s/studentProfilePESUAdmin", self.base_url);
        let builder = match endpoint {
            Endpoint::UserProfile => {
                let now = chrono::Utc::now().timestamp_millis().to_string();
                self.client.get(&admin_url).query(&[
                    ("menuId", "670"),
                    ("url", "studentProfilePESUAdmin"),
                    ("controllerMode", "6414"),
                    ("actionType", "5"),
                    ("id", "0"),
                    ("selectedData", "0"),
                    ("_", now.as_str()),
                ])
            }
            Endpoint::SubjectList => self
                .client
                .get(format!("{}/a/g/getSubjectsCode", self.base_url)),
            Endpoint::CourseUnits { subject_id } => self
                .client
                .get(format!("{}/a/i/getCourse/{subject_id}", self.base_url)),
            Endpoint::UnitClasses { unit_id } => self
                .client
                .get(format!("{}/a/i/getCourseClasses/{unit_id}", self.base_url)),
            Endpoint::SemesterList => self.client.get(format!(
                "{}/a/studentProfilePESU/getStudentSemestersPESU",
                self.base_url
            )),
            Endpoint::SemesterGpa { semester_id } => self.client.post(&admin_url).form(&[
                ("controllerMode", "6403"),
                ("actionType", "38"),
                ("id", semester_id.as_str()),
                ("menuId", "653"),
            ]),
            Endpoint::Attendance { semester_id } => self.client.post(&admin_url).form(&[
                ("controllerMode", "6407"),
                ("actionType", "8"),
                ("batchClassId", semester_id.as_str()),
                ("menuId", "660"),
            ]),
            Endpoint::CourseMaterial {
                subject_id,
                class_id,
                category,
            } => {
                let category = category.id().to_string();
                self.client.get(&admin_url).query(&[
                    ("url", "studentProfilePESUAdmin"),
                    ("controllerMode", "6403"),
                    ("actionType", "60"),
                    ("selectedData", subject_id.as_str()),
                    ("id", category.as_str()),
                    ("unitid", class_id.as_str()),
                ])
            }
            Endpoint::FacultySearch { query } => self
                .client
                .get(format!("{}/atoz/list/", self.staff_url))
                .query(&[("search", query.as_str())]),
            Endpoint::FacultyProfile { path } => self
                .client
                .get(format!("{}/{}", self.staff_url, path.trim_start_matches('/'))),
        };
        if endpoint.needs_session() {
            builder.header(COOKIE, format!("JSESSIONID={session}"))
        } else {
            builder
        }
    }

    async fn handle_status(response: Response) -> Result<Response, PesuError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "portal request failed".to_string());
        Err(PesuError::PortalStatus { status, message })
    }

    async fn into_payload(response: Response) -> Result<RawPayload, PesuError> {
        let content_type = header_value(response.headers(), CONTENT_TYPE);
        let content_disposition = header_value(response.headers(), CONTENT_DISPOSITION);
        let body = response
            .bytes()
            .await
            .map_err(|err| PesuError::PortalHttp(err.to_string()))?;
        Ok(RawPayload {
            content_type,
            content_disposition,
            body: body.to_vec(),
        })
    }

    async fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, PesuError>
    where
        F: FnMut() -> RequestBuilder,
    {
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send().await {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < self.max_retries && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < self.max_retries && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        tokio::time::sleep(Duration::from_millis(delay)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(PesuError::PortalHttp(err.to_string()));
                }
            }
        }
    }
}

impl PortalClient for PortalHttpClient {
    async fn fetch(&self, session: &str, endpoint: &Endpoint) -> Result<RawPayload, PesuError> {
        debug!(endpoint = endpoint.name(), "portal request");
        let response = self
            .send_with_retries(|| self.request(session, endpoint))
            .await?;
        let response = Self::handle_status(response).await?;
        Self::into_payload(response).await
    }

    async fn fetch_url(&self, session: &str, url: &str) -> Result<RawPayload, PesuError> {
        debug!(url, "portal file request");
        let response = self
            .send_with_retries(|| {
                self.client
                    .get(url)
                    .header(COOKIE, format!("JSESSIONID={session}"))
            })
            .await?;
        let response = Self::handle_status(response).await?;
        Self::into_payload(response).await
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}

fn header_value(headers: &HeaderMap, name: HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string())
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
