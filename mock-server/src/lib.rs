//! In-memory stand-in for the Prominis REST API.
//!
//! Serves the subset of endpoints the client core is tested against, nested
//! under `/api`. Everything except sign-in and registration requires a
//! bearer token issued by this server. State lives in one `RwLock`ed store
//! seeded with the three demo accounts and a page-able job board.

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const SEEDED_JOBS: i64 = 30;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub deadline: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub skills: Vec<String>,
    pub status: String,
    pub requester: User,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: i64,
    pub proposal: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_amount: Option<f64>,
    pub status: String,
    pub job_id: i64,
    pub tasker: User,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    pub title: String,
    pub message: String,
    pub read: bool,
}

/// One page of `T` in the server's envelope format.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T> {
    pub content: Vec<T>,
    pub number: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterInput {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub role: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    pub title: String,
    pub description: String,
    pub budget: f64,
    pub deadline: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyInput {
    pub proposal: String,
    #[serde(default)]
    pub proposed_amount: Option<f64>,
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub location: Option<String>,
    pub bio: Option<String>,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub q: Option<String>,
}

struct Account {
    user: User,
    password: String,
}

struct StoredFile {
    content_type: String,
    bytes: Vec<u8>,
}

#[derive(Default)]
pub struct Store {
    accounts: Vec<Account>,
    sessions: HashMap<String, i64>,
    jobs: Vec<Job>,
    applications: Vec<Application>,
    notifications: Vec<Notification>,
    files: HashMap<i64, StoredFile>,
    next_id: i64,
}

impl Store {
    /// Demo accounts, `SEEDED_JOBS` jobs and a welcome notification each.
    pub fn seeded() -> Self {
        let mut store = Store {
            next_id: 1000,
            ..Store::default()
        };
        let demo = [
            (1, "Rita", "Requester", "requester@promin.com", "requester123", "REQUESTER"),
            (2, "Tom", "Tasker", "tasker@promin.com", "tasker123", "TASKER"),
            (3, "Ada", "Admin", "admin@promin.com", "admin123", "ADMIN"),
        ];
        for (id, first, last, email, password, role) in demo {
            store.accounts.push(Account {
                user: User {
                    id,
                    first_name: first.to_string(),
                    last_name: last.to_string(),
                    email: email.to_string(),
                    role: role.to_string(),
                    phone: None,
                    location: None,
                    bio: None,
                    avatar: None,
                },
                password: password.to_string(),
            });
            store.notifications.push(Notification {
                id,
                user_id: id,
                title: "Welcome".to_string(),
                message: format!("Welcome to Prominis, {first}!"),
                read: false,
            });
        }

        let requester = store.accounts[0].user.clone();
        for n in 1..=SEEDED_JOBS {
            store.jobs.push(Job {
                id: n,
                title: format!("Seeded job {n}"),
                description: format!("Placeholder description for seeded job number {n}."),
                budget: 50.0 * n as f64,
                deadline: "2030-01-01T12:00:00".to_string(),
                location: (n % 3 == 0).then(|| "Remote".to_string()),
                skills: vec!["writing".to_string()],
                status: if n % 5 == 0 { "COMPLETED" } else { "OPEN" }.to_string(),
                requester: requester.clone(),
            });
        }
        store
    }

    fn issue_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn issue_token(&mut self, user_id: i64) -> String {
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), user_id);
        token
    }

    fn user_for(&self, headers: &HeaderMap) -> Result<User, Failure> {
        let token = headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "Authentication required"))?;
        let id = self
            .sessions
            .get(token)
            .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "Invalid token"))?;
        self.account(*id)
            .map(|account| account.user.clone())
            .ok_or_else(|| Failure::new(StatusCode::UNAUTHORIZED, "Invalid token"))
    }

    fn account(&self, id: i64) -> Option<&Account> {
        self.accounts.iter().find(|account| account.user.id == id)
    }

    fn account_mut(&mut self, id: i64) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|account| account.user.id == id)
    }
}

pub type Db = Arc<RwLock<Store>>;

/// Error response with a `{"message": ...}` body.
#[derive(Debug)]
pub struct Failure {
    status: StatusCode,
    message: String,
}

impl Failure {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for Failure {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

pub fn app() -> Router {
    app_with(Store::seeded())
}

pub fn app_with(store: Store) -> Router {
    let db: Db = Arc::new(RwLock::new(store));
    let api = Router::new()
        .route("/auth/login", post(login))
        .route("/auth/register", post(register))
        .route("/auth/verify", get(verify))
        .route("/user/profile", get(profile).put(update_profile))
        .route("/user/avatar", post(upload_avatar))
        .route("/jobs", get(list_jobs).post(create_job))
        .route("/jobs/search", get(search_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/apply", post(apply))
        .route("/files/upload", post(upload_file))
        .route("/files/{id}/download", get(download_file))
        .route("/notifications", get(notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read));
    Router::new().nest("/api", api).with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

fn paginate<T: Clone>(items: &[T], page: u32, size: u32) -> PageBody<T> {
    let size = if size == 0 { DEFAULT_PAGE_SIZE } else { size };
    let total_elements = items.len() as u64;
    let total_pages = total_elements.div_ceil(u64::from(size)) as u32;
    let content = items
        .iter()
        .skip(page as usize * size as usize)
        .take(size as usize)
        .cloned()
        .collect();
    PageBody {
        content,
        number: page,
        size,
        total_elements,
        total_pages,
    }
}

async fn login(State(db): State<Db>, Json(input): Json<LoginInput>) -> Result<Json<serde_json::Value>, Failure> {
    let mut store = db.write().await;
    let user = store
        .accounts
        .iter()
        .find(|account| account.user.email == input.email && account.password == input.password)
        .map(|account| account.user.clone())
        .ok_or_else(|| Failure::new(StatusCode::BAD_REQUEST, "Invalid credentials"))?;
    let token = store.issue_token(user.id);
    tracing::debug!(user_id = user.id, "login");
    Ok(Json(json!({ "user": user, "token": token })))
}

async fn register(
    State(db): State<Db>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<serde_json::Value>, Failure> {
    let mut store = db.write().await;
    if store.accounts.iter().any(|account| account.user.email == input.email) {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "Email already in use"));
    }
    let id = store.issue_id();
    let user = User {
        id,
        first_name: input.first_name,
        last_name: input.last_name,
        email: input.email,
        role: input.role,
        phone: None,
        location: None,
        bio: None,
        avatar: None,
    };
    store.accounts.push(Account {
        user: user.clone(),
        password: input.password,
    });
    let token = store.issue_token(id);
    Ok(Json(json!({ "user": user, "token": token })))
}

async fn verify(State(db): State<Db>, headers: HeaderMap) -> Result<Json<serde_json::Value>, Failure> {
    let user = db.read().await.user_for(&headers)?;
    Ok(Json(json!({ "user": user })))
}

async fn profile(State(db): State<Db>, headers: HeaderMap) -> Result<Json<User>, Failure> {
    Ok(Json(db.read().await.user_for(&headers)?))
}

async fn update_profile(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<ProfileInput>,
) -> Result<Json<User>, Failure> {
    let mut store = db.write().await;
    let id = store.user_for(&headers)?.id;
    let account = store
        .account_mut(id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "User not found"))?;
    let user = &mut account.user;
    if let Some(first_name) = input.first_name {
        user.first_name = first_name;
    }
    if let Some(last_name) = input.last_name {
        user.last_name = last_name;
    }
    if let Some(email) = input.email {
        user.email = email;
    }
    user.phone = input.phone.or(user.phone.take());
    user.location = input.location.or(user.location.take());
    user.bio = input.bio.or(user.bio.take());
    Ok(Json(user.clone()))
}

async fn read_file(mut multipart: Multipart) -> Result<StoredFile, Failure> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Failure::new(StatusCode::BAD_REQUEST, e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| Failure::new(StatusCode::BAD_REQUEST, e.body_text()))?;
        return Ok(StoredFile {
            content_type,
            bytes: bytes.to_vec(),
        });
    }
    Err(Failure::new(StatusCode::BAD_REQUEST, "No file provided"))
}

async fn upload_avatar(
    State(db): State<Db>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, Failure> {
    let user_id = db.read().await.user_for(&headers)?.id;
    let file = read_file(multipart).await?;
    let mut store = db.write().await;
    let id = store.issue_id();
    store.files.insert(id, file);
    let url = format!("/api/files/{id}/download");
    if let Some(account) = store.account_mut(user_id) {
        account.user.avatar = Some(url.clone());
    }
    Ok(Json(json!({ "url": url })))
}

async fn upload_file(
    State(db): State<Db>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<Json<serde_json::Value>, Failure> {
    db.read().await.user_for(&headers)?;
    let file = read_file(multipart).await?;
    let mut store = db.write().await;
    let id = store.issue_id();
    tracing::debug!(id, bytes = file.bytes.len(), "stored upload");
    store.files.insert(id, file);
    Ok(Json(json!({ "id": id, "url": format!("/api/files/{id}/download") })))
}

async fn download_file(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Response, Failure> {
    let store = db.read().await;
    store.user_for(&headers)?;
    let file = store
        .files
        .get(&id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "File not found"))?;
    Ok(([(header::CONTENT_TYPE, file.content_type.clone())], file.bytes.clone()).into_response())
}

async fn list_jobs(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageBody<Job>>, Failure> {
    let store = db.read().await;
    store.user_for(&headers)?;
    let jobs: Vec<Job> = store
        .jobs
        .iter()
        .filter(|job| query.status.as_ref().is_none_or(|status| job.status == *status))
        .cloned()
        .collect();
    Ok(Json(paginate(&jobs, query.page, query.size.unwrap_or(DEFAULT_PAGE_SIZE))))
}

async fn search_jobs(
    State(db): State<Db>,
    headers: HeaderMap,
    Query(query): Query<PageQuery>,
) -> Result<Json<PageBody<Job>>, Failure> {
    let store = db.read().await;
    store.user_for(&headers)?;
    let needle = query.q.unwrap_or_default().to_lowercase();
    let jobs: Vec<Job> = store
        .jobs
        .iter()
        .filter(|job| job.title.to_lowercase().contains(&needle))
        .cloned()
        .collect();
    Ok(Json(paginate(&jobs, query.page, query.size.unwrap_or(DEFAULT_PAGE_SIZE))))
}

async fn get_job(State(db): State<Db>, headers: HeaderMap, Path(id): Path<i64>) -> Result<Json<Job>, Failure> {
    let store = db.read().await;
    store.user_for(&headers)?;
    store
        .jobs
        .iter()
        .find(|job| job.id == id)
        .cloned()
        .map(Json)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Job not found"))
}

async fn create_job(
    State(db): State<Db>,
    headers: HeaderMap,
    Json(input): Json<JobInput>,
) -> Result<Json<Job>, Failure> {
    let mut store = db.write().await;
    let requester = store.user_for(&headers)?;
    if requester.role != "REQUESTER" {
        return Err(Failure::new(StatusCode::FORBIDDEN, "Only requesters can post jobs"));
    }
    let job = Job {
        id: store.issue_id(),
        title: input.title,
        description: input.description,
        budget: input.budget,
        deadline: input.deadline,
        location: input.location,
        skills: input.skills,
        status: "OPEN".to_string(),
        requester,
    };
    store.jobs.push(job.clone());
    Ok(Json(job))
}

async fn delete_job(State(db): State<Db>, headers: HeaderMap, Path(id): Path<i64>) -> Result<StatusCode, Failure> {
    let mut store = db.write().await;
    store.user_for(&headers)?;
    let before = store.jobs.len();
    store.jobs.retain(|job| job.id != id);
    if store.jobs.len() == before {
        return Err(Failure::new(StatusCode::NOT_FOUND, "Job not found"));
    }
    Ok(StatusCode::NO_CONTENT)
}

async fn apply(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(job_id): Path<i64>,
    Json(input): Json<ApplyInput>,
) -> Result<Json<Application>, Failure> {
    let mut store = db.write().await;
    let tasker = store.user_for(&headers)?;
    if !store.jobs.iter().any(|job| job.id == job_id) {
        return Err(Failure::new(StatusCode::NOT_FOUND, "Job not found"));
    }
    if store
        .applications
        .iter()
        .any(|app| app.job_id == job_id && app.tasker.id == tasker.id)
    {
        return Err(Failure::new(StatusCode::BAD_REQUEST, "You have already applied to this job"));
    }
    let application = Application {
        id: store.issue_id(),
        proposal: input.proposal,
        proposed_amount: input.proposed_amount,
        status: "PENDING".to_string(),
        job_id,
        tasker,
    };
    store.applications.push(application.clone());
    Ok(Json(application))
}

async fn notifications(State(db): State<Db>, headers: HeaderMap) -> Result<Json<Vec<Notification>>, Failure> {
    let store = db.read().await;
    let user = store.user_for(&headers)?;
    Ok(Json(
        store
            .notifications
            .iter()
            .filter(|n| n.user_id == user.id)
            .cloned()
            .collect(),
    ))
}

async fn mark_read(
    State(db): State<Db>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, Failure> {
    let mut store = db.write().await;
    let user = store.user_for(&headers)?;
    let notification = store
        .notifications
        .iter_mut()
        .find(|n| n.id == id && n.user_id == user.id)
        .ok_or_else(|| Failure::new(StatusCode::NOT_FOUND, "Notification not found"))?;
    notification.read = true;
    Ok(Json(json!({ "message": "Notification marked as read" })))
}

async fn mark_all_read(State(db): State<Db>, headers: HeaderMap) -> Result<Json<serde_json::Value>, Failure> {
    let mut store = db.write().await;
    let user = store.user_for(&headers)?;
    for notification in store.notifications.iter_mut().filter(|n| n.user_id == user.id) {
        notification.read = true;
    }
    Ok(Json(json!({ "message": "All notifications marked as read" })))
}
