use std::{convert::Infallible, sync::Arc};

use log::{info, warn};
use serde::{de::DeserializeOwned, Serialize};
use warp::{
    filters::body::BodyDeserializeError,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    reject::{self, MethodNotAllowed, PayloadTooLarge, UnsupportedMediaType},
    Filter, Rejection, Reply,
};

use crate::accounts::{Accounts, AccountsAuthed, Error};
use crate::auth::Bearer;
use crate::user::{UserCreate, UserId, UserLogin, UserUpdate};

const BODY_LIMIT: u64 = 16 * 1024;

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

pub fn routes(
    accounts: Arc<Accounts>,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let signup = warp::path!("signup")
        .and(warp::post())
        .and(with_accounts(&accounts))
        .and(json_body())
        .and_then(|accounts: Arc<Accounts>, create: UserCreate| async move {
            accounts
                .signup(create)
                .await
                .map(|created| {
                    warp::reply::with_status(warp::reply::json(&created), StatusCode::CREATED)
                })
                .map_err(reject::custom)
        });

    let login = warp::path!("login")
        .and(warp::post())
        .and(with_accounts(&accounts))
        .and(json_body())
        .and_then(|accounts: Arc<Accounts>, login: UserLogin| async move {
            accounts
                .login(login)
                .await
                .map(|token| warp::reply::json(&token))
                .map_err(reject::custom)
        });

    let users = {
        let list = warp::path!("users")
            .and(warp::get())
            .and(authed(&accounts))
            .and_then(|authed: AccountsAuthed| async move {
                authed
                    .users()
                    .await
                    .map(|users| warp::reply::json(&users))
                    .map_err(reject::custom)
            });

        let get = warp::path!("users" / UserId)
            .and(warp::get())
            .and(authed(&accounts))
            .and_then(|id: UserId, authed: AccountsAuthed| async move {
                authed
                    .user(id)
                    .await
                    .map(|user| warp::reply::json(&user))
                    .map_err(reject::custom)
            });

        let update = warp::path!("users" / UserId)
            .and(warp::put())
            .and(authed(&accounts))
            .and(json_body())
            .and_then(
                |id: UserId, authed: AccountsAuthed, update: UserUpdate| async move {
                    authed
                        .update_user(id, update)
                        .await
                        .map(|user| warp::reply::json(&user))
                        .map_err(reject::custom)
                },
            );

        let delete = warp::path!("users" / UserId)
            .and(warp::delete())
            .and(authed(&accounts))
            .and_then(|id: UserId, authed: AccountsAuthed| async move {
                authed
                    .delete_user(id)
                    .await
                    .map(|msg| warp::reply::json(&msg))
                    .map_err(reject::custom)
            });

        list.or(get).or(update).or(delete)
    };

    signup
        .or(login)
        .or(users)
        .recover(handle_rejection)
        .with(warp::log("accountd"))
}

fn with_accounts(
    accounts: &Arc<Accounts>,
) -> impl Filter<Extract = (Arc<Accounts>,), Error = Infallible> + Clone {
    let accounts = Arc::clone(accounts);
    warp::any().map(move || Arc::clone(&accounts))
}

fn json_body<T: DeserializeOwned + Send>() -> impl Filter<Extract = (T,), Error = Rejection> + Clone
{
    warp::body::content_length_limit(BODY_LIMIT).and(warp::body::json())
}

/// Only lets the request through with a valid `Authorization: Bearer` token.
fn authed(
    accounts: &Arc<Accounts>,
) -> impl Filter<Extract = (AccountsAuthed,), Error = Rejection> + Clone {
    let accounts = Arc::clone(accounts);

    warp::header::headers_cloned().and_then(move |headers: HeaderMap| {
        let accounts = Arc::clone(&accounts);
        async move {
            let bearer = headers
                .get(AUTHORIZATION)
                .ok_or("no authorization header")
                .and_then(|value| value.to_str().map_err(|_| "authorization header isn't ascii"))
                .and_then(str::parse::<Bearer>)
                .map_err(|e| {
                    info!("rejecting request: {e}");
                    reject::custom(Error::Unauthorized)
                })?;

            accounts.authenticate(&bearer).map_err(reject::custom)
        }
    })
}

async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (status, detail) = if let Some(&e) = err.find::<Error>() {
        (e.into(), e.to_string())
    } else if let Some(e) = err.find::<BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".into())
    } else if err.find::<UnsupportedMediaType>().is_some() {
        (
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "Expected a JSON body".into(),
        )
    } else if err.find::<MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".into())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".into())
    } else {
        warn!("unhandled rejection: {err:?}");
        (StatusCode::BAD_REQUEST, "Bad request".into())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ErrorBody { detail }),
        status,
    ))
}
