use std::{result, sync::Arc};

use log::{debug, error, info, trace, warn};
use thiserror::Error;
use warp::http;

use crate::auth::Bearer;
use crate::backend::{self, Backend};
use crate::password;
use crate::token::{AccessToken, TokenService};
use crate::user::{
    Created, Message, UserChanges, UserCreate, UserId, UserLogin, UserOut, UserUpdate,
};

pub struct Accounts {
    backend: Backend,
    tokens: TokenService,
}

/// A request whose bearer token checked out. Every operation on other
/// users' records goes through one of these.
pub struct AccountsAuthed {
    accounts: Arc<Accounts>,
    principal: UserId,
}

#[derive(Copy, Clone, Debug, Error, PartialEq, Eq)]
pub enum Error {
    #[error("Could not validate credentials")]
    Unauthorized,
    #[error("You cannot delete your own account")]
    Forbidden,
    #[error("User not found")]
    NotFound,
    #[error("Username or email already exists")]
    Conflict,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("Internal server error")]
    Internal,
}

pub type Result<T> = result::Result<T, Error>;

impl From<Error> for http::StatusCode {
    fn from(e: Error) -> Self {
        match e {
            Error::Unauthorized => http::StatusCode::UNAUTHORIZED,
            Error::Forbidden => http::StatusCode::FORBIDDEN,
            Error::NotFound => http::StatusCode::NOT_FOUND,
            Error::Conflict | Error::BadRequest(_) => http::StatusCode::BAD_REQUEST,
            Error::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<backend::Error> for Error {
    fn from(e: backend::Error) -> Self {
        match e {
            backend::Error::NotFound => Self::NotFound,
            backend::Error::Conflict => Self::Conflict,
            backend::Error::Internal => Self::Internal,
        }
    }
}

impl warp::reject::Reject for Error {}

impl Accounts {
    pub fn new(backend: Backend, tokens: TokenService) -> Self {
        Self { backend, tokens }
    }

    pub async fn signup(&self, create: UserCreate) -> Result<Created> {
        create.validate()?;

        let UserCreate {
            username,
            email,
            password,
        } = create;

        let password_hash = match password {
            Some(password) => Some(hash_password(password).await?),
            None => None,
        };

        let mut tx = self.backend.begin().await?;
        let user_id = tx
            .create_user(&username, email.as_deref(), password_hash.as_deref())
            .await
            .map_err(|e| {
                if e == backend::Error::Conflict {
                    info!("signup for {username} rejected: username or email taken");
                }
                e
            })?;
        tx.commit().await?;

        info!("{username} signed up as user {user_id}");

        Ok(Created {
            message: "User created successfully".into(),
            user_id,
        })
    }

    pub async fn login(&self, login: UserLogin) -> Result<AccessToken> {
        login.validate()?;

        let UserLogin { email, password } = login;

        let user = {
            let mut tx = self.backend.begin().await?;
            match tx.find_user_by_email(&email).await {
                Ok(user) => Some(user),
                Err(backend::Error::NotFound) => None,
                Err(e) => return Err(e.into()),
            }
        };

        // unknown email, no password and wrong password all cost one argon2
        // verify and look the same to the client
        let hash = user.as_ref().and_then(|user| user.password_hash.clone());
        let matched = verify_password(password, hash).await?;

        let user = match user {
            None => {
                info!("login rejected: no user with email {email}");
                return Err(Error::Unauthorized);
            }
            Some(user) if user.password_hash.is_none() => {
                info!("login rejected: user {} has no password", user.id);
                return Err(Error::Unauthorized);
            }
            Some(user) if !matched => {
                info!("login rejected: wrong password for user {}", user.id);
                return Err(Error::Unauthorized);
            }
            Some(user) => user,
        };

        let token = self.tokens.issue(&user.id.to_string()).map_err(|e| {
            error!("couldn't issue token for user {}: {e}", user.id);
            Error::Internal
        })?;

        info!("user {} logged in", user.id);
        Ok(token)
    }

    pub fn authenticate(self: &Arc<Self>, bearer: &Bearer) -> Result<AccountsAuthed> {
        let identity = self.tokens.verify(bearer.token()).ok_or_else(|| {
            info!("rejecting invalid or expired token");
            Error::Unauthorized
        })?;

        let principal = identity.parse::<UserId>().map_err(|e| {
            warn!("rejecting token with non-numeric identity {identity:?}: {e}");
            Error::Unauthorized
        })?;

        debug!("authenticated user {principal}");
        Ok(AccountsAuthed {
            accounts: Arc::clone(self),
            principal,
        })
    }
}

impl AccountsAuthed {
    pub async fn user(&self, id: UserId) -> Result<UserOut> {
        trace!("user {} fetching user {id}", self.principal);

        let mut tx = self.accounts.backend.begin().await?;
        let user = tx.find_user(id).await?;

        Ok(user.into())
    }

    pub async fn users(&self) -> Result<Vec<UserOut>> {
        trace!("user {} listing users", self.principal);

        let mut tx = self.accounts.backend.begin().await?;
        let users = tx.users().await?;

        debug!("{} users", users.len());
        Ok(users.into_iter().map(UserOut::from).collect())
    }

    pub async fn update_user(&self, id: UserId, update: UserUpdate) -> Result<UserOut> {
        update.validate()?;

        let UserUpdate {
            username,
            email,
            password,
        } = update;

        let password_hash = match password {
            Some(password) => Some(hash_password(password).await?),
            None => None,
        };

        let changes = UserChanges {
            username,
            email,
            password_hash,
        };

        let mut tx = self.accounts.backend.begin().await?;
        let user = tx.update_user(id, &changes).await?;
        tx.commit().await?;

        info!("user {} updated user {id}", self.principal);
        Ok(user.into())
    }

    pub async fn delete_user(&self, id: UserId) -> Result<Message> {
        let mut tx = self.accounts.backend.begin().await?;
        let user = tx.find_user(id).await?;

        if user.id == self.principal {
            warn!("user {id} tried to delete their own account");
            return Err(Error::Forbidden);
        }

        tx.delete_user(id).await?;
        tx.commit().await?;

        info!("user {} deleted user {id} ({})", self.principal, user.username);
        Ok(Message {
            message: format!("User with ID {id} deleted successfully"),
        })
    }
}

// argon2 takes tens of milliseconds per call, run it on the blocking pool
async fn hash_password(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || password::hash(&password))
        .await
        .map_err(|e| {
            error!("password hashing task failed: {e:?}");
            Error::Internal
        })?
        .map_err(|e| {
            error!("couldn't hash password: {e}");
            Error::Internal
        })
}

async fn verify_password(password: String, hash: Option<String>) -> Result<bool> {
    tokio::task::spawn_blocking(move || password::verify_or_burn(&password, hash.as_deref()))
        .await
        .map_err(|e| {
            error!("password verification task failed: {e:?}");
            Error::Internal
        })?
        .map_err(|e| {
            error!("stored password hash is unusable: {e}");
            Error::Internal
        })
}
