use std::sync::Arc;
use std::time::Duration;

use actix_web::{delete, get, patch, post, put, web, HttpResponse};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

use crate::auth::{AuthSession, AuthState, IdentityChanges, TokenIdentityProvider};
use crate::gateway::RemoteCollectionGateway;
use crate::schemas::{GroupPatch, Identity, NewExpense, NewMember};
use crate::session::Session;

const FOLLOW_TIMEOUT: Duration = Duration::from_secs(5);

pub struct ApiState {
    pub session: Mutex<Session>,
    pub auth: Arc<AuthSession>,
    pub provider: Arc<TokenIdentityProvider>,
    /// Last identity the follower has applied to the session.
    applied: watch::Sender<Option<Identity>>,
}

impl ApiState {
    pub fn new(
        gateway: Arc<RemoteCollectionGateway>,
        auth: Arc<AuthSession>,
        provider: Arc<TokenIdentityProvider>,
    ) -> Self {
        ApiState {
            session: Mutex::new(Session::new(gateway)),
            auth,
            provider,
            applied: watch::channel(None).0,
        }
    }
}

/// Feeds identity transitions into the session until the subscription ends.
pub async fn follow_identity(state: web::Data<ApiState>, mut changes: IdentityChanges) {
    while let Some(identity) = changes.next().await {
        state
            .session
            .lock()
            .await
            .on_identity_change(identity.clone())
            .await;
        state.applied.send_replace(identity);
    }
    debug!("identity subscription closed");
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct GroupJson {
    name: String,
    description: Option<String>,
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct ActiveGroupJson {
    group_id: Option<String>,
}

#[derive(Serialize)]
struct TokenJson {
    token: String,
}

#[get("/session")]
async fn get_session(state: web::Data<ApiState>) -> HttpResponse {
    HttpResponse::Ok().json(state.session.lock().await.snapshot())
}

#[get("/session/token")]
async fn get_token(state: web::Data<ApiState>) -> HttpResponse {
    match state.provider.session_token() {
        Some(token) => HttpResponse::Ok().json(TokenJson { token }),
        None => HttpResponse::NotFound().body("No active session"),
    }
}

/// Answers once the follower has applied the transitions the sign-out
/// emitted, so the snapshot already belongs to the replacement identity.
#[post("/session/sign-out")]
async fn sign_out(state: web::Data<ApiState>) -> HttpResponse {
    let mut applied = state.applied.subscribe();
    match state.auth.sign_out().await {
        Ok(auth_state) => {
            let expected = match auth_state {
                AuthState::Identified(uid) => Some(uid),
                _ => None,
            };
            let caught_up = applied.wait_for(|current| *current == expected);
            if tokio::time::timeout(FOLLOW_TIMEOUT, caught_up).await.is_err() {
                warn!("identity follower did not apply the sign-out in time");
            }
        }
        // Logged by the auth session; the identity is unchanged
        Err(err) => debug!(error = %err, "sign-out failed"),
    }
    HttpResponse::Ok().json(state.session.lock().await.snapshot())
}

#[put("/session/active-group")]
async fn select_group(
    state: web::Data<ApiState>,
    json: web::Json<ActiveGroupJson>,
) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.select_group_by_id(json.group_id.as_deref()).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[post("/groups")]
async fn create_group(state: web::Data<ApiState>, json: web::Json<GroupJson>) -> HttpResponse {
    let group = json.into_inner();
    let mut session = state.session.lock().await;
    session
        .create_group(&group.name, group.description.as_deref())
        .await;
    HttpResponse::Ok().json(session.snapshot())
}

#[patch("/groups/{id}")]
async fn update_group(
    state: web::Data<ApiState>,
    id: web::Path<String>,
    patch: web::Json<GroupPatch>,
) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.update_group(&id, patch.into_inner()).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[delete("/groups/{id}")]
async fn delete_group(state: web::Data<ApiState>, id: web::Path<String>) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.delete_group(&id).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[post("/members")]
async fn add_member(state: web::Data<ApiState>, member: web::Json<NewMember>) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.add_member(member.into_inner()).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[delete("/members/{id}")]
async fn remove_member(state: web::Data<ApiState>, id: web::Path<String>) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.remove_member(&id).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[post("/expenses")]
async fn add_expense(state: web::Data<ApiState>, expense: web::Json<NewExpense>) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.add_expense(expense.into_inner()).await;
    HttpResponse::Ok().json(session.snapshot())
}

#[delete("/expenses/{id}")]
async fn delete_expense(state: web::Data<ApiState>, id: web::Path<String>) -> HttpResponse {
    let mut session = state.session.lock().await;
    session.delete_expense(&id).await;
    HttpResponse::Ok().json(session.snapshot())
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(get_session)
        .service(get_token)
        .service(sign_out)
        .service(select_group)
        .service(create_group)
        .service(update_group)
        .service(delete_group)
        .service(add_member)
        .service(remove_member)
        .service(add_expense)
        .service(delete_expense);
}
