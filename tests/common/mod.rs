//! In-process stand-in for the monitoring backend.
//!
//! Serves the same paths, status codes and body shapes as the real service
//! from in-memory tables, and records what each request carried.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Form, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use facility_console_lib::resources::ApiClient;
use facility_console_lib::session::SessionController;
use facility_console_lib::token::TokenStore;
use facility_console_lib::transport::Transport;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "admin123";

/// (path under /api/v1, id field, display name). More specific prefixes first.
const COLLECTIONS: &[(&str, &str, &str)] = &[
    ("cameras/sites", "site_id", "Site"),
    ("cameras/zones", "zone_id", "Zone"),
    ("checklists/templates", "template_id", "Template"),
    ("cameras", "camera_id", "Camera"),
    ("checklists", "checklist_id", "Checklist"),
    ("executions", "execution_id", "Execution"),
    ("users", "user_id", "User"),
];

#[derive(Default)]
struct Db {
    tables: HashMap<String, BTreeMap<u64, Value>>,
    next_id: HashMap<String, u64>,
    valid_tokens: HashSet<String>,
    issued: u64,
    /// Authorization header of every non-login request, in arrival order
    seen_auth: Vec<Option<String>>,
    last_body: Option<Value>,
    /// Canned response for the next non-login request
    fail_next: Option<(StatusCode, String)>,
    /// How long a rejected login waits before answering
    reject_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct Backend {
    db: Arc<Mutex<Db>>,
}

pub struct FakeBackend {
    pub addr: SocketAddr,
    pub backend: Backend,
}

impl FakeBackend {
    pub async fn start() -> Self {
        let backend = Backend::default();
        backend.seed_admin();

        let app = Router::new()
            .route("/api/v1/login", post(login))
            .fallback(dispatch)
            .with_state(backend.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind listener");
        let addr = listener.local_addr().expect("local addr");
        tokio::spawn(async move { axum::serve(listener, app).await.expect("serve fake backend") });

        Self { addr, backend }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// A client stack with its own in-memory token store
    pub fn session(&self) -> SessionController {
        self.session_with(Arc::new(TokenStore::ephemeral()))
    }

    pub fn session_with(&self, tokens: Arc<TokenStore>) -> SessionController {
        let transport = Transport::new(&self.url(), None, tokens).expect("build transport");
        SessionController::new(ApiClient::new(Arc::new(transport)))
    }

    pub async fn logged_in(&self) -> SessionController {
        let session = self.session();
        session.login(USERNAME, PASSWORD).await.expect("login");
        session
    }
}

impl Backend {
    fn lock(&self) -> std::sync::MutexGuard<'_, Db> {
        self.db.lock().expect("backend state")
    }

    fn seed_admin(&self) {
        let mut db = self.lock();
        let now = now();
        db.tables.entry("users".into()).or_default().insert(
            1,
            json!({
                "user_id": 1,
                "username": USERNAME,
                "email": "admin@plant.local",
                "first_name": "Site",
                "last_name": "Admin",
                "status": "Active",
                "created_at": now,
                "updated_at": now,
                "roles": [{"role_id": 1, "role_name": "Administrator", "description": null,
                           "created_at": now, "updated_at": now}]
            }),
        );
        db.next_id.insert("users".into(), 2);
    }

    /// Invalidate every issued token, as an expiry would
    pub fn revoke_all(&self) {
        self.lock().valid_tokens.clear();
    }

    pub fn fail_next(&self, status: u16, body: &str) {
        self.lock().fail_next = Some((StatusCode::from_u16(status).unwrap(), body.to_string()));
    }

    pub fn slow_rejections(&self, delay: Duration) {
        self.lock().reject_delay = Some(delay);
    }

    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.lock().seen_auth.clone()
    }

    pub fn request_count(&self) -> usize {
        self.lock().seen_auth.len()
    }

    pub fn last_body(&self) -> Option<Value> {
        self.lock().last_body.clone()
    }

    /// Insert a raw row, bypassing validation
    pub fn insert(&self, collection: &str, id: u64, row: Value) {
        let mut db = self.lock();
        db.tables.entry(collection.into()).or_default().insert(id, row);
        let next = db.next_id.entry(collection.into()).or_insert(1);
        *next = (*next).max(id + 1);
    }
}

fn now() -> String {
    chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S%.6f")
        .to_string()
}

fn detail(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "detail": message }))).into_response()
}

#[derive(Deserialize)]
struct LoginForm {
    username: String,
    password: String,
}

async fn login(State(backend): State<Backend>, Form(form): Form<LoginForm>) -> Response {
    if form.username != USERNAME || form.password != PASSWORD {
        let delay = backend.lock().reject_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        return detail(StatusCode::UNAUTHORIZED, "Incorrect username or password");
    }
    let mut db = backend.lock();
    db.issued += 1;
    let token = format!("token-{}", db.issued);
    db.valid_tokens.insert(token.clone());
    Json(json!({ "access_token": token, "token_type": "bearer" })).into_response()
}

async fn dispatch(
    State(backend): State<Backend>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mut db = backend.lock();

    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    db.seen_auth.push(auth.clone());

    if let Some((status, body)) = db.fail_next.take() {
        return (status, body).into_response();
    }

    let token = auth.as_deref().and_then(|v| v.strip_prefix("Bearer "));
    if !token.is_some_and(|t| db.valid_tokens.contains(t)) {
        return detail(StatusCode::UNAUTHORIZED, "Could not validate credentials");
    }

    let Some(path) = uri.path().strip_prefix("/api/v1/") else {
        return detail(StatusCode::NOT_FOUND, "Not Found");
    };
    if path == "me" && method == Method::GET {
        return Json(db.tables["users"][&1u64].clone()).into_response();
    }

    let Some(&(collection, id_field, name)) = COLLECTIONS
        .iter()
        .find(|(prefix, _, _)| path == *prefix || path.starts_with(&format!("{}/", prefix)))
    else {
        return detail(StatusCode::NOT_FOUND, "Not Found");
    };
    let rest: Vec<&str> = path[collection.len()..]
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    let payload: Option<Value> = serde_json::from_slice(&body).ok();
    if payload.is_some() {
        db.last_body = payload.clone();
    }
    let query = parse_query(uri.query());

    match (method, rest.as_slice()) {
        (Method::GET, []) => list(&db, collection, &query),
        (Method::POST, []) => create(&mut db, collection, id_field, payload.unwrap_or(json!({}))),
        (method, [id]) => {
            let Ok(id) = id.parse::<u64>() else {
                return detail(StatusCode::UNPROCESSABLE_ENTITY, "value is not a valid integer");
            };
            item(&mut db, method, collection, name, id, payload)
        }
        (Method::PUT, [id, "complete"]) if collection == "executions" => {
            let id: u64 = id.parse().unwrap_or(u64::MAX);
            match db.tables.entry(collection.into()).or_default().get_mut(&id) {
                Some(row) => {
                    row["status"] = json!("Completed");
                    row["end_time"] = json!(now());
                    row["updated_at"] = json!(now());
                    Json(row.clone()).into_response()
                }
                None => detail(StatusCode::NOT_FOUND, "Execution not found"),
            }
        }
        (Method::PUT, ["steps", step]) if collection == "executions" => {
            let Ok(step) = step.parse::<u64>() else {
                return detail(StatusCode::UNPROCESSABLE_ENTITY, "value is not a valid integer");
            };
            item(&mut db, Method::PUT, "step_executions", "Step execution", step, payload)
        }
        (method, [id, "steps", step]) if collection == "checklists" => {
            let parent: u64 = id.parse().unwrap_or(u64::MAX);
            let step: u64 = step.parse().unwrap_or(u64::MAX);
            let belongs = db
                .tables
                .get("checklist_steps")
                .and_then(|t| t.get(&step))
                .is_some_and(|row| row["checklist_id"] == json!(parent));
            if !belongs {
                return detail(StatusCode::NOT_FOUND, "Step not found");
            }
            item(&mut db, method, "checklist_steps", "Step", step, payload)
        }
        (method, [id, "steps"]) => {
            let parent: u64 = id.parse().unwrap_or(u64::MAX);
            let (table, step_field, parent_field) = match collection {
                "checklists" => ("checklist_steps", "step_id", "checklist_id"),
                "executions" => ("step_executions", "exec_step_id", "execution_id"),
                _ => return detail(StatusCode::NOT_FOUND, "Not Found"),
            };
            if !db.tables.get(collection).is_some_and(|t| t.contains_key(&parent)) {
                return detail(StatusCode::NOT_FOUND, &format!("{} not found", name));
            }
            if method == Method::POST {
                let mut row = payload.unwrap_or(json!({}));
                row[parent_field] = json!(parent);
                if table == "step_executions" && row.get("status").is_none() {
                    row["status"] = json!("Pending");
                }
                create(&mut db, table, step_field, row)
            } else {
                let rows: Vec<Value> = db
                    .tables
                    .get(table)
                    .map(|t| t.values().filter(|r| r[parent_field] == json!(parent)).cloned().collect())
                    .unwrap_or_default();
                Json(rows).into_response()
            }
        }
        _ => detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    }
}

fn parse_query(raw: Option<&str>) -> HashMap<String, String> {
    raw.unwrap_or_default()
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn list(db: &Db, collection: &str, query: &HashMap<String, String>) -> Response {
    let skip: usize = query.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);

    let rows: Vec<Value> = db
        .tables
        .get(collection)
        .map(|t| {
            t.values()
                .filter(|row| {
                    ["site_id", "zone_id", "checklist_id"].iter().all(|field| {
                        match query.get(*field).and_then(|v| v.parse::<u64>().ok()) {
                            Some(want) => row[*field] == json!(want),
                            None => true,
                        }
                    })
                })
                .skip(skip)
                .take(limit)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(rows).into_response()
}

fn exists(db: &Db, collection: &str, id: Option<&Value>) -> bool {
    id.and_then(Value::as_u64)
        .is_some_and(|id| db.tables.get(collection).is_some_and(|t| t.contains_key(&id)))
}

fn create(db: &mut Db, collection: &str, id_field: &str, payload: Value) -> Response {
    let Value::Object(mut row) = payload else {
        return detail(StatusCode::UNPROCESSABLE_ENTITY, "body must be an object");
    };

    match collection {
        "cameras/zones" if !exists(db, "cameras/sites", row.get("site_id")) => {
            return detail(StatusCode::NOT_FOUND, "Site not found");
        }
        "cameras" if !exists(db, "cameras/zones", row.get("zone_id")) => {
            return detail(StatusCode::NOT_FOUND, "Zone not found");
        }
        "executions" if !exists(db, "checklists", row.get("checklist_id")) => {
            return detail(StatusCode::NOT_FOUND, "Checklist not found");
        }
        _ => {}
    }

    let id = {
        let next = db.next_id.entry(collection.into()).or_insert(1);
        let id = *next;
        *next += 1;
        id
    };
    let now = now();
    row.insert(id_field.into(), json!(id));
    row.insert("created_at".into(), json!(now));
    row.insert("updated_at".into(), json!(now));

    let default_status = match collection {
        "cameras" => Some("Online"),
        "executions" => Some("In Progress"),
        "checklists/templates" | "checklist_steps" | "step_executions" => None,
        _ => Some("Active"),
    };
    if let Some(status) = default_status {
        row.entry("status").or_insert(json!(status));
    }

    match collection {
        "executions" => {
            row.insert("user_id".into(), json!(1));
            row.insert("start_time".into(), json!(now));
            // Stored as sent; only `complete` stamps an end time.
            row.insert("end_time".into(), Value::Null);
            row.insert("step_executions".into(), json!([]));
        }
        "users" => {
            row.remove("password");
            row.insert("roles".into(), json!([]));
        }
        "checklists" => {
            row.insert("created_by".into(), json!(1));
            row.insert("steps".into(), json!([]));
        }
        "checklists/templates" => {
            row.entry("version").or_insert(json!("1.0"));
        }
        _ => {}
    }

    let row = Value::Object(row);
    db.tables.entry(collection.into()).or_default().insert(id, row.clone());
    (StatusCode::CREATED, Json(row)).into_response()
}

fn item(
    db: &mut Db,
    method: Method,
    collection: &str,
    name: &str,
    id: u64,
    payload: Option<Value>,
) -> Response {
    // Executions are only read, created and completed.
    if collection == "executions" && method != Method::GET {
        return detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed");
    }
    let table = db.tables.entry(collection.into()).or_default();
    let not_found = || detail(StatusCode::NOT_FOUND, &format!("{} not found", name));

    match method {
        Method::GET => match table.get(&id) {
            Some(row) => Json(row.clone()).into_response(),
            None => not_found(),
        },
        Method::PUT => {
            let Some(row) = table.get_mut(&id) else {
                return not_found();
            };
            let changes = match payload {
                Some(Value::Object(changes)) => changes,
                _ => Map::new(),
            };
            for (field, value) in changes {
                row[field.as_str()] = value;
            }
            row["updated_at"] = json!(now());
            Json(row.clone()).into_response()
        }
        Method::DELETE => match table.remove(&id) {
            Some(_) => StatusCode::NO_CONTENT.into_response(),
            None => not_found(),
        },
        _ => detail(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
    }
}
