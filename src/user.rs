use std::{fmt, num::ParseIntError, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::accounts::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[derive(sqlx::Type)]
#[sqlx(transparent)]
pub struct UserId(i64);

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl FromStr for UserId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}", self.0)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

/// What clients get to see of a user
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct UserOut {
    pub id: UserId,
    pub username: String,
    pub email: Option<String>,
}

impl From<User> for UserOut {
    fn from(user: User) -> Self {
        let User { id, username, email, password_hash: _ } = user;
        Self { id, username, email }
    }
}

#[derive(Debug, Deserialize)]
pub struct UserCreate {
    pub username: String,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UserLogin {
    pub email: String,
    pub password: String,
}

/// The fields a client may change. Anything else in the body is rejected.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

/// A validated `UserUpdate`, password already hashed.
/// `None` leaves the stored column as is.
#[derive(Debug, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Created {
    pub message: String,
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl UserCreate {
    pub fn validate(&self) -> Result<()> {
        check_username(&self.username)?;
        self.email.as_deref().map(check_email).transpose()?;
        Ok(())
    }
}

impl UserLogin {
    pub fn validate(&self) -> Result<()> {
        check_email(&self.email)
    }
}

impl UserUpdate {
    pub fn validate(&self) -> Result<()> {
        self.username.as_deref().map(check_username).transpose()?;
        self.email.as_deref().map(check_email).transpose()?;
        Ok(())
    }
}

fn check_username(username: &str) -> Result<()> {
    if username.trim().is_empty() {
        return Err(Error::BadRequest("username must not be empty"));
    }
    Ok(())
}

fn check_email(email: &str) -> Result<()> {
    is_email_shaped(email)
        .then_some(())
        .ok_or(Error::BadRequest("invalid email address"))
}

// local@domain.tld, nothing fancier
fn is_email_shaped(s: &str) -> bool {
    if s.chars().any(char::is_whitespace) {
        return false;
    }

    let Some((local, domain)) = s.split_once('@') else {
        return false;
    };

    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && domain.split('.').all(|label| !label.is_empty())
}
