//! Stateless HTTP request builder and response parser for the Prominis API.
//!
//! # Design
//! `ProminisClient` holds only a `base_url` and carries no mutable state
//! between calls. Every endpoint has a `build_*` method producing an
//! `HttpRequest`; responses go through one of the shape-generic parsers
//! (`parse_json`, `parse_page`, `parse_empty`, `parse_bytes`). Credentials
//! are not added here: `ApiClient` injects the bearer token at send time so
//! that requests stay reproducible data.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ApiError;
use crate::http::{FilePart, HttpMethod, HttpRequest, HttpResponse, RequestBody};
use crate::page::{decode_page, Page, PageParams};
use crate::types::{
    AdminUserUpdate, ApplicationDraft, Credentials, JobDraft, JobUpdate, NewMessage,
    PasswordChange, ProfileUpdate, Rating, Registration, Role,
};

/// Multipart field name expected by every file-bearing endpoint.
pub const FILE_FIELD: &str = "file";

/// Synchronous, stateless client for the Prominis API.
#[derive(Debug, Clone)]
pub struct ProminisClient {
    base_url: String,
}

impl ProminisClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: HttpMethod, path: &str) -> HttpRequest {
        HttpRequest::new(method, format!("{}{path}", self.base_url))
    }

    fn get(&self, path: &str) -> HttpRequest {
        self.request(HttpMethod::Get, path)
    }

    fn paged(&self, path: &str, params: &PageParams) -> HttpRequest {
        let mut req = self.get(path);
        req.query = params.to_query();
        req
    }

    fn json<B: Serialize>(&self, method: HttpMethod, path: &str, body: &B) -> Result<HttpRequest, ApiError> {
        let body = serde_json::to_string(body).map_err(|e| ApiError::Serialization(e.to_string()))?;
        let mut req = self.request(method, path);
        req.headers
            .push(("content-type".to_string(), "application/json".to_string()));
        req.body = Some(RequestBody::Json(body));
        Ok(req)
    }

    fn multipart(&self, path: &str, part: FilePart) -> HttpRequest {
        let mut req = self.request(HttpMethod::Post, path);
        req.body = Some(RequestBody::Multipart {
            field: FILE_FIELD.to_string(),
            part,
        });
        req
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub fn build_login(&self, credentials: &Credentials) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/login", credentials)
    }

    pub fn build_register(&self, registration: &Registration) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/auth/register", registration)
    }

    pub fn build_verify(&self) -> HttpRequest {
        self.get("/auth/verify")
    }

    pub fn build_forgot_password(&self, email: &str) -> Result<HttpRequest, ApiError> {
        self.json(
            HttpMethod::Post,
            "/auth/forgot-password",
            &serde_json::json!({ "email": email }),
        )
    }

    pub fn build_reset_password(&self, token: &str, password: &str) -> Result<HttpRequest, ApiError> {
        self.json(
            HttpMethod::Post,
            "/auth/reset-password",
            &serde_json::json!({ "token": token, "password": password }),
        )
    }

    // -----------------------------------------------------------------------
    // User
    // -----------------------------------------------------------------------

    pub fn build_get_profile(&self) -> HttpRequest {
        self.get("/user/profile")
    }

    pub fn build_update_profile(&self, update: &ProfileUpdate) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, "/user/profile", update)
    }

    pub fn build_upload_avatar(&self, part: FilePart) -> HttpRequest {
        self.multipart("/user/avatar", part)
    }

    pub fn build_change_password(&self, change: &PasswordChange) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, "/user/password", change)
    }

    pub fn build_delete_account(&self) -> HttpRequest {
        self.request(HttpMethod::Delete, "/user")
    }

    // -----------------------------------------------------------------------
    // Jobs
    // -----------------------------------------------------------------------

    pub fn build_list_jobs(&self, params: &PageParams) -> HttpRequest {
        self.paged("/jobs", params)
    }

    pub fn build_search_jobs(&self, params: &PageParams) -> HttpRequest {
        self.paged("/jobs/search", params)
    }

    pub fn build_get_job(&self, id: i64) -> HttpRequest {
        self.get(&format!("/jobs/{id}"))
    }

    pub fn build_create_job(&self, draft: &JobDraft) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/jobs", draft)
    }

    pub fn build_update_job(&self, id: i64, update: &JobUpdate) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &format!("/jobs/{id}"), update)
    }

    pub fn build_delete_job(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/jobs/{id}"))
    }

    pub fn build_apply(&self, job_id: i64, draft: &ApplicationDraft) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, &format!("/jobs/{job_id}/apply"), draft)
    }

    pub fn build_accept_application(&self, job_id: i64, application_id: i64) -> HttpRequest {
        self.request(
            HttpMethod::Post,
            &format!("/jobs/{job_id}/applications/{application_id}/accept"),
        )
    }

    pub fn build_reject_application(&self, job_id: i64, application_id: i64) -> HttpRequest {
        self.request(
            HttpMethod::Post,
            &format!("/jobs/{job_id}/applications/{application_id}/reject"),
        )
    }

    pub fn build_complete_job(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Post, &format!("/jobs/{id}/complete"))
    }

    pub fn build_rate_job(&self, id: i64, rating: &Rating) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, &format!("/jobs/{id}/rate"), rating)
    }

    pub fn build_job_applications(&self, id: i64, params: &PageParams) -> HttpRequest {
        self.paged(&format!("/jobs/{id}/applications"), params)
    }

    // -----------------------------------------------------------------------
    // Applications
    // -----------------------------------------------------------------------

    pub fn build_my_applications(&self) -> HttpRequest {
        self.get("/applications")
    }

    pub fn build_get_application(&self, id: i64) -> HttpRequest {
        self.get(&format!("/applications/{id}"))
    }

    pub fn build_update_application(&self, id: i64, draft: &ApplicationDraft) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &format!("/applications/{id}"), draft)
    }

    pub fn build_withdraw_application(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/applications/{id}"))
    }

    // -----------------------------------------------------------------------
    // Files
    // -----------------------------------------------------------------------

    pub fn build_upload_file(&self, part: FilePart) -> HttpRequest {
        self.multipart("/files/upload", part)
    }

    pub fn build_download_file(&self, id: i64) -> HttpRequest {
        self.get(&format!("/files/{id}/download"))
    }

    pub fn build_delete_file(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/files/{id}"))
    }

    // -----------------------------------------------------------------------
    // Admin
    // -----------------------------------------------------------------------

    pub fn build_admin_users(&self, params: &PageParams) -> HttpRequest {
        self.paged("/admin/users", params)
    }

    pub fn build_admin_user(&self, id: i64) -> HttpRequest {
        self.get(&format!("/admin/users/{id}"))
    }

    pub fn build_admin_update_user(&self, id: i64, update: &AdminUserUpdate) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Put, &format!("/admin/users/{id}"), update)
    }

    pub fn build_admin_delete_user(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/users/{id}"))
    }

    pub fn build_admin_jobs(&self, params: &PageParams) -> HttpRequest {
        self.paged("/admin/jobs", params)
    }

    pub fn build_admin_delete_job(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/admin/jobs/{id}"))
    }

    pub fn build_admin_flag_job(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Post, &format!("/admin/jobs/{id}/flag"))
    }

    pub fn build_audit_logs(&self, params: &PageParams) -> HttpRequest {
        self.paged("/admin/audit-logs", params)
    }

    pub fn build_analytics(&self, query: &[(String, String)]) -> HttpRequest {
        let mut req = self.get("/admin/analytics");
        req.query = query.to_vec();
        req
    }

    /// `kind` names the dataset, e.g. `users` or `jobs`.
    pub fn build_export(&self, kind: &str) -> HttpRequest {
        self.get(&format!("/admin/export/{kind}"))
    }

    // -----------------------------------------------------------------------
    // Dashboard, messages, notifications
    // -----------------------------------------------------------------------

    pub fn build_dashboard_stats(&self, role: Role) -> HttpRequest {
        let segment = match role {
            Role::Requester => "requester",
            Role::Tasker => "tasker",
            Role::Admin => "admin",
        };
        self.get(&format!("/dashboard/{segment}"))
    }

    pub fn build_conversations(&self) -> HttpRequest {
        self.get("/messages")
    }

    pub fn build_conversation_messages(&self, conversation_id: i64) -> HttpRequest {
        self.get(&format!("/messages/{conversation_id}"))
    }

    pub fn build_send_message(&self, message: &NewMessage) -> Result<HttpRequest, ApiError> {
        self.json(HttpMethod::Post, "/messages", message)
    }

    pub fn build_mark_message_read(&self, message_id: i64) -> HttpRequest {
        self.request(HttpMethod::Put, &format!("/messages/{message_id}/read"))
    }

    pub fn build_notifications(&self) -> HttpRequest {
        self.get("/notifications")
    }

    pub fn build_mark_notification_read(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Put, &format!("/notifications/{id}/read"))
    }

    pub fn build_mark_all_notifications_read(&self) -> HttpRequest {
        self.request(HttpMethod::Put, "/notifications/read-all")
    }

    pub fn build_delete_notification(&self, id: i64) -> HttpRequest {
        self.request(HttpMethod::Delete, &format!("/notifications/{id}"))
    }

    // -----------------------------------------------------------------------
    // Parsers
    // -----------------------------------------------------------------------

    pub fn parse_json<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<T, ApiError> {
        check_status(&response)?;
        serde_json::from_slice(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    pub fn parse_page<T: DeserializeOwned>(&self, response: HttpResponse) -> Result<Page<T>, ApiError> {
        check_status(&response)?;
        decode_page(&response.body).map_err(|e| ApiError::Deserialization(e.to_string()))
    }

    /// Accept any 2xx and ignore the body.
    pub fn parse_empty(&self, response: HttpResponse) -> Result<(), ApiError> {
        check_status(&response)
    }

    pub fn parse_bytes(&self, response: HttpResponse) -> Result<Vec<u8>, ApiError> {
        check_status(&response)?;
        Ok(response.body)
    }
}

/// Map non-2xx status codes to the appropriate `ApiError` variant.
pub fn check_status(response: &HttpResponse) -> Result<(), ApiError> {
    if response.is_success() {
        return Ok(());
    }
    let message = server_message(&response.body);
    match response.status {
        401 => Err(ApiError::Unauthorized { message }),
        404 => Err(ApiError::NotFound),
        status => Err(ApiError::Http {
            status,
            message,
            body: response.body_text(),
        }),
    }
}

/// Extract the `message` field of a JSON error body.
pub fn server_message(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|message| !message.trim().is_empty())
        .map(str::to_string)
}
