use std::{ops::Deref, sync::Arc};

use agora_api::{AuthToken, Db, UserId, Uuid};
use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use chrono::Utc;

use crate::Error;

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: DbHandle,
    pub admin_token: Option<AuthToken>,
    pub session_length: SessionLength,
}

/// Shared handle to whichever store the server was started with
#[derive(Clone)]
pub struct DbHandle(Arc<dyn Db>);

impl DbHandle {
    pub fn new(db: Arc<dyn Db>) -> DbHandle {
        DbHandle(db)
    }
}

impl Deref for DbHandle {
    type Target = dyn Db;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// How long a login stays valid
#[derive(Clone, Copy, Debug)]
pub struct SessionLength(pub chrono::Duration);

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        match req.headers.get(http::header::AUTHORIZATION) {
            None => Err(Error::unauthenticated()),
            Some(auth) => {
                let auth = auth.to_str().map_err(|_| Error::unauthenticated())?;
                let mut auth = auth.split(' ');
                if !auth
                    .next()
                    .ok_or(Error::unauthenticated())?
                    .eq_ignore_ascii_case("bearer")
                {
                    return Err(Error::unauthenticated());
                }
                let token = auth.next().ok_or(Error::unauthenticated())?;
                if auth.next().is_some() {
                    return Err(Error::unauthenticated());
                }
                let token = Uuid::try_from(token).map_err(|_| Error::unauthenticated())?;
                Ok(PreAuth(AuthToken(token)))
            }
        }
    }
}

/// The user behind a valid, unexpired session token
pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let user = state
            .db
            .recover_session(token, Utc::now())
            .await
            .context("recovering session")?
            .ok_or(Error::unauthenticated())?;
        Ok(Auth(user))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let admin_token = state
            .admin_token
            .ok_or_else(|| Error::configuration("ADMIN_TOKEN"))?;
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if token == admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}
