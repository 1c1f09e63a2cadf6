//! In-memory imitation of the Laposta API, for end-to-end tests.
//!
//! Covers lists (including bulk member sync), members, campaigns and
//! reports under `/v2`, protected by basic auth with `API_KEY` as the user
//! name. Errors use the API's `{"error": {...}}` envelope. A few routes
//! outside `/v2` (`/_echo`, `/_slow`, `/_text`) exist only to let tests
//! observe the raw exchange.

mod form;

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{AppendHeaders, IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};
use uuid::Uuid;

pub use form::{nest_pairs, Payload};

/// The key accepted by `app()`.
pub const API_KEY: &str = "JdMtbsMq2jqJdQZD9AHC";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct MailingList {
    pub list_id: String,
    pub name: String,
    pub remarks: String,
    pub state: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub member_id: String,
    pub list_id: String,
    pub email: String,
    pub state: String,
    pub ip: String,
    pub custom_fields: Map<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Campaign {
    pub campaign_id: String,
    pub name: String,
    pub subject: String,
    pub state: String,
    pub delivery_requested: Option<String>,
    pub html: Option<String>,
}

#[derive(Default, Debug)]
pub struct Store {
    pub lists: Vec<MailingList>,
    pub members: Vec<Member>,
    pub campaigns: Vec<Campaign>,
}

pub type Db = Arc<RwLock<Store>>;

#[derive(Clone)]
pub struct AppState {
    api_key: Arc<str>,
    db: Db,
}

/// An API error in the service's envelope format.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiFailure {
    pub status: StatusCode,
    pub kind: &'static str,
    pub message: String,
    pub code: Option<u16>,
    pub parameter: Option<&'static str>,
}

impl ApiFailure {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_request",
            message: message.into(),
            code: None,
            parameter: None,
        }
    }

    fn invalid_input(code: u16, parameter: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "invalid_input",
            message: message.into(),
            code: Some(code),
            parameter: Some(parameter),
        }
    }

    fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            kind: "invalid_request",
            message: format!("Unknown {what}"),
            code: None,
            parameter: None,
        }
    }

    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            kind: "invalid_request",
            message: "No valid API-key provided".to_string(),
            code: None,
            parameter: None,
        }
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let mut error = json!({ "type": self.kind, "message": self.message });
        if let Some(code) = self.code {
            error["code"] = json!(code);
        }
        if let Some(parameter) = self.parameter {
            error["parameter"] = json!(parameter);
        }
        (self.status, Json(json!({ "error": error }))).into_response()
    }
}

type ApiResult = Result<(StatusCode, Json<Value>), ApiFailure>;

pub fn app() -> Router {
    app_with_key(API_KEY)
}

pub fn app_with_key(api_key: &str) -> Router {
    let state = AppState {
        api_key: Arc::from(api_key),
        db: Arc::new(RwLock::new(Store::default())),
    };

    let api = Router::new()
        .route("/list", get(list_lists).post(create_list))
        .route("/list/{id}", get(get_list).post(update_list).delete(delete_list))
        .route("/list/{id}/members", post(sync_members).delete(purge_members))
        .route("/member", get(list_members).post(create_member))
        .route("/member/{id}", get(get_member).post(update_member).delete(delete_member))
        .route("/campaign", get(list_campaigns).post(create_campaign))
        .route("/campaign/{id}", get(get_campaign).delete(delete_campaign))
        .route("/campaign/{id}/content", get(get_content).post(update_content))
        .route("/campaign/{id}/action/{action}", post(campaign_action))
        .route("/report", get(list_reports))
        .route("/report/{id}", get(get_report))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .nest("/v2", api)
        .route("/_echo", any(echo))
        .route("/_slow", get(slow))
        .route("/_text", get(text))
        .with_state(state)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn require_api_key(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .and_then(|encoded| BASE64.decode(encoded).ok())
        .is_some_and(|decoded| decoded == format!("{}:", state.api_key).as_bytes());
    if !authorized {
        return ApiFailure::unauthorized().into_response();
    }
    next.run(request).await
}

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()[..10].to_string()
}

fn ok(value: Value) -> ApiResult {
    Ok((StatusCode::OK, Json(value)))
}

// --- lists ---

async fn list_lists(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.db.read().await;
    let data: Vec<Value> = store.lists.iter().map(|l| json!({ "list": l })).collect();
    (
        AppendHeaders([(header::CACHE_CONTROL, "no-cache"), (header::CACHE_CONTROL, "private")]),
        Json(json!({ "data": data })),
    )
}

async fn create_list(State(state): State<AppState>, body: Payload) -> ApiResult {
    let name = body
        .str("name")
        .ok_or_else(|| ApiFailure::invalid_input(201, "name", "name: missing"))?;
    let list = MailingList {
        list_id: new_id(),
        name: name.to_string(),
        remarks: body.str("remarks").unwrap_or_default().to_string(),
        state: "active".to_string(),
    };
    state.db.write().await.lists.push(list.clone());
    Ok((StatusCode::CREATED, Json(json!({ "list": list }))))
}

async fn get_list(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let store = state.db.read().await;
    let list = store.lists.iter().find(|l| l.list_id == id).ok_or_else(|| ApiFailure::not_found("list"))?;
    ok(json!({ "list": list }))
}

async fn update_list(State(state): State<AppState>, Path(id): Path<String>, body: Payload) -> ApiResult {
    let mut store = state.db.write().await;
    let list = store
        .lists
        .iter_mut()
        .find(|l| l.list_id == id)
        .ok_or_else(|| ApiFailure::not_found("list"))?;
    if let Some(name) = body.str("name") {
        list.name = name.to_string();
    }
    if let Some(remarks) = body.str("remarks") {
        list.remarks = remarks.to_string();
    }
    ok(json!({ "list": list }))
}

async fn delete_list(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    let index = store
        .lists
        .iter()
        .position(|l| l.list_id == id)
        .ok_or_else(|| ApiFailure::not_found("list"))?;
    let mut list = store.lists.remove(index);
    list.state = "deleted".to_string();
    store.members.retain(|m| m.list_id != id);
    ok(json!({ "list": list }))
}

async fn purge_members(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    let list = store
        .lists
        .iter()
        .find(|l| l.list_id == id)
        .cloned()
        .ok_or_else(|| ApiFailure::not_found("list"))?;
    store.members.retain(|m| m.list_id != id);
    ok(json!({ "list": list }))
}

/// Bulk endpoint: `{"actions": [...], "members": [...]}`, or the older
/// `{"mode": ..., "members": [...]}`.
async fn sync_members(State(state): State<AppState>, Path(id): Path<String>, body: Payload) -> ApiResult {
    let actions: Vec<String> = match (body.0.get("actions"), body.str("mode")) {
        (Some(Value::Array(actions)), _) => actions.iter().filter_map(|a| a.as_str().map(str::to_string)).collect(),
        (_, Some("add")) => vec!["add".to_string()],
        (_, Some("edit")) => vec!["update".to_string()],
        (_, Some("add_and_edit")) => vec!["add".to_string(), "update".to_string()],
        _ => return Err(ApiFailure::invalid_input(201, "actions", "actions: missing")),
    };
    let Some(Value::Array(incoming)) = body.0.get("members") else {
        return Err(ApiFailure::invalid_input(201, "members", "members: missing"));
    };

    let mut store = state.db.write().await;
    if !store.lists.iter().any(|l| l.list_id == id) {
        return Err(ApiFailure::not_found("list"));
    }

    let (mut added, mut updated, mut skipped) = (0, 0, 0);
    let mut seen = Vec::new();
    for entry in incoming {
        let Some(email) = entry.get("email").and_then(Value::as_str) else {
            skipped += 1;
            continue;
        };
        seen.push(email.to_string());
        let fields = entry
            .get("custom_fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let existing = store.members.iter().position(|m| m.list_id == id && m.email == email);
        match existing {
            Some(index) if actions.iter().any(|a| a == "update") => {
                store.members[index].custom_fields.extend(fields);
                updated += 1;
            }
            None if actions.iter().any(|a| a == "add") => {
                store.members.push(Member {
                    member_id: new_id(),
                    list_id: id.clone(),
                    email: email.to_string(),
                    state: "active".to_string(),
                    ip: String::new(),
                    custom_fields: fields,
                });
                added += 1;
            }
            _ => skipped += 1,
        }
    }

    let mut unsubscribed = 0;
    if actions.iter().any(|a| a == "unsubscribe_excluded") {
        for member in store.members.iter_mut().filter(|m| m.list_id == id) {
            if !seen.contains(&member.email) && member.state == "active" {
                member.state = "unsubscribed".to_string();
                unsubscribed += 1;
            }
        }
    }

    ok(json!({
        "report": {
            "provided_count": incoming.len(),
            "added": added,
            "updated": updated,
            "unsubscribed": unsubscribed,
            "skipped": skipped,
            "errors": 0,
        }
    }))
}

// --- members ---

#[derive(Debug, Deserialize)]
struct ListQuery {
    list_id: Option<String>,
}

impl ListQuery {
    fn required(self) -> Result<String, ApiFailure> {
        self.list_id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ApiFailure::invalid_input(201, "list_id", "list_id: missing"))
    }
}

fn find_member<'a>(store: &'a Store, list_id: &str, id: &str) -> Result<&'a Member, ApiFailure> {
    store
        .members
        .iter()
        .find(|m| m.list_id == list_id && (m.member_id == id || m.email == id))
        .ok_or_else(|| ApiFailure::not_found("member"))
}

async fn list_members(State(state): State<AppState>, Query(query): Query<ListQuery>) -> ApiResult {
    let list_id = query.required()?;
    let store = state.db.read().await;
    let data: Vec<Value> = store
        .members
        .iter()
        .filter(|m| m.list_id == list_id)
        .map(|m| json!({ "member": m }))
        .collect();
    ok(json!({ "data": data }))
}

async fn create_member(State(state): State<AppState>, body: Payload) -> ApiResult {
    let list_id = body
        .str("list_id")
        .ok_or_else(|| ApiFailure::invalid_input(201, "list_id", "list_id: missing"))?;
    let email = body
        .str("email")
        .ok_or_else(|| ApiFailure::invalid_input(201, "email", "email: missing"))?;
    if !email.contains('@') {
        return Err(ApiFailure::invalid_input(208, "email", "Email address is invalid"));
    }

    let mut store = state.db.write().await;
    if !store.lists.iter().any(|l| l.list_id == list_id) {
        return Err(ApiFailure::not_found("list"));
    }
    if store.members.iter().any(|m| m.list_id == list_id && m.email == email) {
        return Err(ApiFailure::invalid_input(204, "email", "Email address exists"));
    }

    let member = Member {
        member_id: new_id(),
        list_id: list_id.to_string(),
        email: email.to_string(),
        state: "active".to_string(),
        ip: body.str("ip").unwrap_or_default().to_string(),
        custom_fields: body
            .0
            .get("custom_fields")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default(),
    };
    store.members.push(member.clone());
    Ok((StatusCode::CREATED, Json(json!({ "member": member }))))
}

async fn get_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let list_id = query.required()?;
    let store = state.db.read().await;
    ok(json!({ "member": find_member(&store, &list_id, &id)? }))
}

async fn update_member(State(state): State<AppState>, Path(id): Path<String>, body: Payload) -> ApiResult {
    let list_id = body
        .str("list_id")
        .ok_or_else(|| ApiFailure::invalid_input(201, "list_id", "list_id: missing"))?
        .to_string();
    let mut store = state.db.write().await;
    let member = store
        .members
        .iter_mut()
        .find(|m| m.list_id == list_id && (m.member_id == id || m.email == id))
        .ok_or_else(|| ApiFailure::not_found("member"))?;
    if let Some(email) = body.str("email") {
        member.email = email.to_string();
    }
    if let Some(member_state) = body.str("state") {
        member.state = member_state.to_string();
    }
    if let Some(Value::Object(fields)) = body.0.get("custom_fields") {
        member.custom_fields.extend(fields.clone());
    }
    ok(json!({ "member": member }))
}

async fn delete_member(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ListQuery>,
) -> ApiResult {
    let list_id = query.required()?;
    let mut store = state.db.write().await;
    let mut member = find_member(&store, &list_id, &id)?.clone();
    store.members.retain(|m| m.member_id != member.member_id);
    member.state = "deleted".to_string();
    ok(json!({ "member": member }))
}

// --- campaigns and reports ---

fn find_campaign<'a>(store: &'a mut Store, id: &str) -> Result<&'a mut Campaign, ApiFailure> {
    store
        .campaigns
        .iter_mut()
        .find(|c| c.campaign_id == id)
        .ok_or_else(|| ApiFailure::not_found("campaign"))
}

async fn list_campaigns(State(state): State<AppState>) -> ApiResult {
    let store = state.db.read().await;
    let data: Vec<Value> = store.campaigns.iter().map(|c| json!({ "campaign": c })).collect();
    ok(json!({ "data": data }))
}

async fn create_campaign(State(state): State<AppState>, body: Payload) -> ApiResult {
    let name = body
        .str("name")
        .ok_or_else(|| ApiFailure::invalid_input(201, "name", "name: missing"))?;
    let campaign = Campaign {
        campaign_id: new_id(),
        name: name.to_string(),
        subject: body.str("subject").unwrap_or_default().to_string(),
        state: "conceptual".to_string(),
        delivery_requested: None,
        html: None,
    };
    state.db.write().await.campaigns.push(campaign.clone());
    Ok((StatusCode::CREATED, Json(json!({ "campaign": campaign }))))
}

async fn get_campaign(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    ok(json!({ "campaign": find_campaign(&mut store, &id)? }))
}

async fn delete_campaign(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    let mut campaign = find_campaign(&mut store, &id)?.clone();
    store.campaigns.retain(|c| c.campaign_id != id);
    campaign.state = "deleted".to_string();
    ok(json!({ "campaign": campaign }))
}

async fn get_content(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    let campaign = find_campaign(&mut store, &id)?;
    ok(json!({ "campaign": { "campaign_id": campaign.campaign_id, "html": campaign.html } }))
}

async fn update_content(State(state): State<AppState>, Path(id): Path<String>, body: Payload) -> ApiResult {
    let html = body
        .str("html")
        .ok_or_else(|| ApiFailure::invalid_input(201, "html", "html: missing"))?;
    let mut store = state.db.write().await;
    let campaign = find_campaign(&mut store, &id)?;
    campaign.html = Some(html.to_string());
    ok(json!({ "campaign": { "campaign_id": campaign.campaign_id, "html": campaign.html } }))
}

async fn campaign_action(
    State(state): State<AppState>,
    Path((id, action)): Path<(String, String)>,
    body: Payload,
) -> ApiResult {
    let mut store = state.db.write().await;
    let campaign = find_campaign(&mut store, &id)?;
    match action.as_str() {
        "send" => {
            if campaign.html.is_none() {
                return Err(ApiFailure {
                    status: StatusCode::PAYMENT_REQUIRED,
                    kind: "request_failed",
                    message: "Campaign has no content".to_string(),
                    code: None,
                    parameter: None,
                });
            }
            campaign.state = "sent".to_string();
        }
        "schedule" => {
            let when = body
                .str("delivery_requested")
                .ok_or_else(|| ApiFailure::invalid_input(201, "delivery_requested", "delivery_requested: missing"))?;
            campaign.delivery_requested = Some(when.to_string());
            campaign.state = "scheduled".to_string();
        }
        "testmail" => {
            let email = body
                .str("email")
                .ok_or_else(|| ApiFailure::invalid_input(201, "email", "email: missing"))?;
            return ok(json!({ "campaign": { "campaign_id": campaign.campaign_id, "testmail": email } }));
        }
        _ => return Err(ApiFailure::not_found("action")),
    }
    ok(json!({ "campaign": campaign }))
}

fn report_for(campaign: &Campaign) -> Value {
    let sent = u32::from(campaign.state == "sent");
    json!({ "report": { "campaign_id": campaign.campaign_id, "sent": sent, "opened": 0, "clicked": 0 } })
}

async fn list_reports(State(state): State<AppState>) -> ApiResult {
    let store = state.db.read().await;
    let data: Vec<Value> = store.campaigns.iter().map(report_for).collect();
    ok(json!({ "data": data }))
}

async fn get_report(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult {
    let mut store = state.db.write().await;
    let campaign = find_campaign(&mut store, &id)?;
    ok(report_for(campaign))
}

// --- diagnostics ---

/// Reflect the request back so tests can see what went over the wire.
async fn echo(method: Method, uri: Uri, headers: HeaderMap, body: axum::body::Bytes) -> Json<Value> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(json!({
        "method": method.as_str(),
        "path": uri.path(),
        "query": uri.query().unwrap_or_default(),
        "headers": seen,
        "body": String::from_utf8_lossy(&body),
    }))
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: u64,
}

async fn slow(Query(query): Query<SlowQuery>) -> Json<Value> {
    tokio::time::sleep(Duration::from_millis(query.ms)).await;
    Json(json!({ "slept_ms": query.ms }))
}

async fn text() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "not json")
}
