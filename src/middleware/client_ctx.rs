use crate::app_config::AuthConfig;
use crate::db::Store;
use crate::error::ForumError;
use crate::orm::users;
use crate::session;
use crate::user;
use actix_session::Session;
use actix_web::dev::{self, Extensions, Payload, Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{web::Data, Error, FromRequest, HttpMessage, HttpRequest};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;

/// Cookie session key holding the server-side session token.
pub const SESSION_TOKEN_KEY: &str = "token";

/// Header carrying the static admin credential.
pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

/// Client data stored for a single request cycle.
/// Distinct from ClientCtx because it is defined through request data.
#[derive(Clone, Debug, Default)]
pub struct ClientCtxInner {
    /// User data. Optional. None is a guest.
    pub client: Option<users::Model>,
    /// Session token the user was resolved from.
    pub token: Option<String>,
}

impl ClientCtxInner {
    /// Resolve the session cookie into a user.
    ///
    /// A token that no longer resolves (expired, revoked by a ban) is
    /// removed from the cookie so the client stops sending it.
    pub async fn from_session(session: &Session, store: &Store) -> Self {
        let token = match session.get::<String>(SESSION_TOKEN_KEY) {
            Ok(Some(token)) => token,
            Ok(None) => return Self::default(),
            Err(err) => {
                log::warn!("Unreadable session cookie: {}", err);
                session.purge();
                return Self::default();
            }
        };

        match session::resolve(store, &token).await {
            Ok(Some(user)) => ClientCtxInner {
                client: Some(user),
                token: Some(token),
            },
            Ok(None) => {
                session.purge();
                Self::default()
            }
            Err(err) => {
                log::error!("Unable to resolve session: {}", err);
                Self::default()
            }
        }
    }
}

/// Client context passed to routes.
/// Wraps ClientCtxInner, which is set at the beginning of the request.
#[derive(Clone, Debug)]
pub struct ClientCtx(Data<ClientCtxInner>);

impl Default for ClientCtx {
    fn default() -> Self {
        Self(Data::new(ClientCtxInner::default()))
    }
}

impl ClientCtx {
    pub fn get_or_default_from_extensions(extensions: &mut Extensions) -> Self {
        match extensions.get::<Data<ClientCtxInner>>() {
            // Existing record in extensions; pull it and return clone.
            Some(cbox) => Self(cbox.clone()),
            // No existing record; create and insert it.
            None => {
                let cbox = Data::new(ClientCtxInner::default());
                extensions.insert(cbox.clone());
                Self(cbox)
            }
        }
    }

    /// Returns either the user's id or None.
    pub fn get_id(&self) -> Option<i32> {
        self.0.client.as_ref().map(|u| u.id)
    }

    pub fn get_user(&self) -> Option<&users::Model> {
        self.0.client.as_ref()
    }

    pub fn get_token(&self) -> Option<&str> {
        self.0.token.as_deref()
    }

    pub fn is_user(&self) -> bool {
        self.0.client.is_some()
    }

    /// Require user to be logged in.
    pub fn require_login(&self) -> Result<&users::Model, ForumError> {
        self.get_user()
            .ok_or_else(|| ForumError::Unauthorized("login required".to_string()))
    }

    /// Require the super-admin session or a valid admin token header.
    pub fn require_admin(&self, req: &HttpRequest, auth: &AuthConfig) -> Result<(), ForumError> {
        if let Some(user) = self.get_user() {
            if user::is_protected(&user.username, &auth.super_admin_username) {
                return Ok(());
            }
        }

        let header = req
            .headers()
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty());

        match header {
            Some(given) if token_matches(given, &auth.admin_token) => Ok(()),
            Some(_) => Err(ForumError::Forbidden("admin token invalid".to_string())),
            None if self.is_user() => {
                Err(ForumError::Forbidden("admin privileges required".to_string()))
            }
            None => Err(ForumError::Unauthorized("admin token invalid".to_string())),
        }
    }
}

/// Compare without an early exit on the first differing byte.
fn token_matches(given: &str, expected: &str) -> bool {
    if expected.is_empty() || given.len() != expected.len() {
        return false;
    }
    given
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}

/// This implementation is what actually provides the `client: ClientCtx` in the parameters of route functions.
impl FromRequest for ClientCtx {
    type Error = Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(Ok(ClientCtx::get_or_default_from_extensions(
            &mut req.extensions_mut(),
        )))
    }
}

impl<S: 'static, B> Transform<S, ServiceRequest> for ClientCtx
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = ClientCtxMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(ClientCtxMiddleware {
            service: Rc::new(service),
        }))
    }
}

/// Client context middleware
pub struct ClientCtxMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for ClientCtxMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    dev::forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let svc = self.service.clone();

        // Borrows of `req` must be done in a precise way to avoid conflicts. This order is important.
        let (httpreq, payload) = req.into_parts();
        let session = Session::extract(&httpreq).into_inner();
        let req = ServiceRequest::from_parts(httpreq, payload);

        // Without a store there is no identity to resolve; handlers see a guest.
        Box::pin(async move {
            if let Some(store) = req.app_data::<Data<Store>>() {
                let store = store.clone();

                match session {
                    Ok(session) => req.extensions_mut().insert(Data::new(
                        ClientCtxInner::from_session(&session, &store).await,
                    )),
                    Err(err) => {
                        log::error!("Unable to extract Session data in middleware: {}", err);
                        None
                    }
                };
            };

            svc.call(req).await
        })
    }
}
