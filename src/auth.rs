use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use async_trait::async_trait;
use bson::oid::ObjectId;
use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use futures::Stream;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::error::AuthError;
use crate::schemas::Identity;

type HmacSha256 = Hmac<Sha256>;

/// Identity provider boundary.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The identity of an already established session, if any.
    async fn current_identity(&self) -> Result<Option<Identity>, AuthError>;

    async fn create_anonymous_identity(&self) -> Result<Identity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

fn signing_key(secret: &str) -> Vec<u8> {
    let mut sha256_hasher = Sha256::new();
    sha256_hasher.update(secret.as_bytes());
    sha256_hasher.finalize().to_vec()
}

fn compute_signature(key: &[u8], uid: &str) -> Result<Vec<u8>, AuthError> {
    let mut hmac_hasher = HmacSha256::new_from_slice(key)
        .map_err(|err| AuthError::AnonymousSignIn(err.to_string()))?;
    hmac_hasher.update(format!("uid={uid}").as_bytes());
    Ok(hmac_hasher.finalize().into_bytes().to_vec())
}

/// Mints anonymous identities and signs them into `uid.signature` session
/// tokens so a later process can restore the same identity.
pub struct TokenIdentityProvider {
    key: Vec<u8>,
    token: Mutex<Option<String>>,
}

impl TokenIdentityProvider {
    pub fn new(secret: &str, token: Option<String>) -> Self {
        TokenIdentityProvider {
            key: signing_key(secret),
            token: Mutex::new(token),
        }
    }

    pub fn session_token(&self) -> Option<String> {
        self.lock().clone()
    }

    pub fn issue_token(&self, uid: &str) -> Result<String, AuthError> {
        let signature = compute_signature(&self.key, uid)?;
        Ok(format!("{uid}.{}", hex::encode(signature)))
    }

    pub fn verify_token(&self, token: &str) -> Option<Identity> {
        let (uid, signature) = token.rsplit_once('.')?;
        let signature = hex::decode(signature).ok()?;
        let mut hmac_hasher = HmacSha256::new_from_slice(&self.key).ok()?;
        hmac_hasher.update(format!("uid={uid}").as_bytes());
        hmac_hasher.verify_slice(&signature).ok()?;
        Some(uid.to_owned())
    }

    fn lock(&self) -> MutexGuard<'_, Option<String>> {
        self.token.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl IdentityProvider for TokenIdentityProvider {
    async fn current_identity(&self) -> Result<Option<Identity>, AuthError> {
        let Some(token) = self.session_token() else {
            return Ok(None);
        };
        match self.verify_token(&token) {
            Some(uid) => Ok(Some(uid)),
            None => {
                warn!("ignoring session token with a bad signature");
                *self.lock() = None;
                Ok(None)
            }
        }
    }

    async fn create_anonymous_identity(&self) -> Result<Identity, AuthError> {
        let uid = ObjectId::new().to_hex();
        let token = self.issue_token(&uid)?;
        *self.lock() = Some(token);
        Ok(uid)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.lock() = None;
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Loading,
    Identified(Identity),
    /// Anonymous creation failed; nothing retries it.
    AnonymousFailed,
}

/// Stream of identity transitions handed to the single subscriber.
pub struct IdentityChanges {
    receiver: UnboundedReceiver<Option<Identity>>,
}

impl Stream for IdentityChanges {
    type Item = Option<Identity>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_next(cx)
    }
}

/// Handle releasing the identity subscription.
pub struct Subscription {
    sender: UnboundedSender<Option<Identity>>,
}

impl Subscription {
    /// Ends the change stream and frees the slot for a new subscriber.
    pub fn unsubscribe(self) {
        self.sender.close_channel();
    }
}

/// Bootstraps and observes the session's identity.
pub struct AuthSession {
    provider: Arc<dyn IdentityProvider>,
    state: Mutex<AuthState>,
    observer: Mutex<Option<UnboundedSender<Option<Identity>>>>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        AuthSession {
            provider,
            state: Mutex::new(AuthState::Uninitialized),
            observer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> AuthState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    fn set_state(&self, state: AuthState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    /// Registers the only observer of identity transitions.
    pub fn subscribe(&self) -> Result<(Subscription, IdentityChanges), AuthError> {
        let mut observer = self.observer.lock().unwrap_or_else(|p| p.into_inner());
        if observer.as_ref().is_some_and(|sender| !sender.is_closed()) {
            return Err(AuthError::AlreadySubscribed);
        }
        let (sender, receiver) = mpsc::unbounded();
        *observer = Some(sender.clone());
        Ok((Subscription { sender }, IdentityChanges { receiver }))
    }

    fn emit(&self, identity: Option<Identity>) {
        let observer = self.observer.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(sender) = observer.as_ref() {
            // A closed channel means the subscriber went away
            let _ = sender.unbounded_send(identity);
        }
    }

    /// Restores the existing identity or mints an anonymous one. This is the
    /// only place new identities are created.
    pub async fn bootstrap(&self) -> AuthState {
        self.set_state(AuthState::Loading);
        let existing = match self.provider.current_identity().await {
            Ok(existing) => existing,
            Err(err) => {
                error!(error = %err, "error restoring session");
                None
            }
        };
        let identity = match existing {
            Some(uid) => {
                info!(%uid, "restored existing session");
                uid
            }
            None => match self.provider.create_anonymous_identity().await {
                Ok(uid) => {
                    info!(%uid, "signed in anonymously");
                    uid
                }
                Err(err) => {
                    error!(error = %err, "error signing in anonymously");
                    self.set_state(AuthState::AnonymousFailed);
                    return AuthState::AnonymousFailed;
                }
            },
        };
        let state = AuthState::Identified(identity.clone());
        self.set_state(state.clone());
        self.emit(Some(identity));
        state
    }

    /// Signs out, reports the cleared identity, then bootstraps a fresh
    /// anonymous one.
    pub async fn sign_out(&self) -> Result<AuthState, AuthError> {
        if let Err(err) = self.provider.sign_out().await {
            error!(error = %err, "error signing out");
            return Err(err);
        }
        self.set_state(AuthState::Loading);
        self.emit(None);
        Ok(self.bootstrap().await)
    }
}
