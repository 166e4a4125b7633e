use std::str::FromStr;

use log::{error, info};
use sqlx::{
    query, query_as,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite, Transaction,
};

use super::{Error, Result};
use crate::user::{User, UserChanges, UserId};

pub struct Backend(pub Pool<Sqlite>);

/// One unit of work against the store. Dropping it without `commit`
/// rolls back and hands the connection back to the pool.
pub struct Tx(Transaction<'static, Sqlite>);

impl Backend {
    pub async fn new(url: &str) -> std::result::Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        info!("Using {url}");

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self(pool))
    }

    pub async fn begin(&self) -> Result<Tx> {
        self.0.begin().await.map(Tx).map_err(|e| {
            error!("error beginning transaction: {e:?}");
            Error::Internal
        })
    }
}

fn translate(context: &str, e: sqlx::Error) -> Error {
    match e {
        sqlx::Error::RowNotFound => Error::NotFound,
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            info!("{context}: {db}");
            Error::Conflict
        }
        e => {
            error!("{context}: {e:?}");
            Error::Internal
        }
    }
}

impl Tx {
    pub async fn commit(self) -> Result<()> {
        self.0.commit().await.map_err(|e| {
            error!("error committing transaction: {e:?}");
            Error::Internal
        })
    }

    pub async fn find_user(&mut self, id: UserId) -> Result<User> {
        query_as::<_, User>(
            "
            SELECT id, username, email, password_hash
            FROM users
            WHERE id = ?
            ",
        )
        .bind(id)
        .fetch_one(&mut *self.0)
        .await
        .map_err(|e| translate("find user", e))
    }

    pub async fn find_user_by_email(&mut self, email: &str) -> Result<User> {
        query_as::<_, User>(
            "
            SELECT id, username, email, password_hash
            FROM users
            WHERE email = ?
            ",
        )
        .bind(email)
        .fetch_one(&mut *self.0)
        .await
        .map_err(|e| translate("find user by email", e))
    }

    pub async fn users(&mut self) -> Result<Vec<User>> {
        query_as::<_, User>(
            "
            SELECT id, username, email, password_hash
            FROM users
            ORDER BY id
            ",
        )
        .fetch_all(&mut *self.0)
        .await
        .map_err(|e| translate("list users", e))
    }

    pub async fn create_user(
        &mut self,
        username: &str,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<UserId> {
        query(
            "
            INSERT INTO users
            (username, email, password_hash)
            VALUES
            (?, ?, ?)
            ",
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .execute(&mut *self.0)
        .await
        .map(|done| UserId::from(done.last_insert_rowid()))
        .map_err(|e| translate("create user", e))
    }

    /// Columns left as `None` in `changes` keep their value.
    pub async fn update_user(&mut self, id: UserId, changes: &UserChanges) -> Result<User> {
        let done = query(
            "
            UPDATE users
            SET
                username = coalesce(?, username),
                email = coalesce(?, email),
                password_hash = coalesce(?, password_hash)
            WHERE id = ?
            ",
        )
        .bind(changes.username.as_deref())
        .bind(changes.email.as_deref())
        .bind(changes.password_hash.as_deref())
        .bind(id)
        .execute(&mut *self.0)
        .await
        .map_err(|e| translate("update user", e))?;

        if done.rows_affected() == 0 {
            return Err(Error::NotFound);
        }

        self.find_user(id).await
    }

    pub async fn delete_user(&mut self, id: UserId) -> Result<()> {
        let done = query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *self.0)
            .await
            .map_err(|e| translate("delete user", e))?;

        match done.rows_affected() {
            0 => Err(Error::NotFound),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
pub mod test {
    use std::time::Duration;

    use sqlx::sqlite::SqlitePoolOptions;

    use super::Backend;

    pub async fn create_db() -> Backend {
        // a single connection that never idles out, so the in-memory
        // database lives as long as the pool
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::migrate!("./migrations").run(&pool).await.unwrap();

        Backend(pool)
    }

    mod store {
        use super::create_db;
        use crate::backend::Error;
        use crate::user::{UserChanges, UserId};

        #[tokio::test]
        async fn create_and_find() {
            let backend = create_db().await;
            let mut tx = backend.begin().await.unwrap();

            let id = tx
                .create_user("alice", Some("a@x.com"), Some("hash"))
                .await
                .unwrap();
            assert_eq!(id, UserId::from(1));

            let user = tx.find_user(id).await.unwrap();
            assert_eq!(user.username, "alice");
            assert_eq!(user.email.as_deref(), Some("a@x.com"));
            assert_eq!(user.password_hash.as_deref(), Some("hash"));

            let by_email = tx.find_user_by_email("a@x.com").await.unwrap();
            assert_eq!(by_email.id, id);

            assert_eq!(tx.find_user(UserId::from(2)).await.unwrap_err(), Error::NotFound);
            assert_eq!(
                tx.find_user_by_email("b@x.com").await.unwrap_err(),
                Error::NotFound
            );
        }

        #[tokio::test]
        async fn uniqueness() {
            let backend = create_db().await;
            let mut tx = backend.begin().await.unwrap();

            tx.create_user("alice", Some("a@x.com"), None).await.unwrap();

            assert_eq!(
                tx.create_user("alice", Some("other@x.com"), None).await.unwrap_err(),
                Error::Conflict
            );
            assert_eq!(
                tx.create_user("bob", Some("a@x.com"), None).await.unwrap_err(),
                Error::Conflict
            );

            // NULL emails don't collide
            tx.create_user("bob", None, None).await.unwrap();
            tx.create_user("carol", None, None).await.unwrap();

            assert_eq!(tx.users().await.unwrap().len(), 3);
        }

        #[tokio::test]
        async fn partial_update() {
            let backend = create_db().await;
            let mut tx = backend.begin().await.unwrap();

            let alice = tx.create_user("alice", Some("a@x.com"), Some("h1")).await.unwrap();
            let bob = tx.create_user("bob", None, None).await.unwrap();

            let changes = UserChanges {
                email: Some("alice@x.com".into()),
                ..Default::default()
            };
            let user = tx.update_user(alice, &changes).await.unwrap();
            assert_eq!(user.username, "alice");
            assert_eq!(user.email.as_deref(), Some("alice@x.com"));
            assert_eq!(user.password_hash.as_deref(), Some("h1"));

            let changes = UserChanges {
                username: Some("alice".into()),
                ..Default::default()
            };
            assert_eq!(tx.update_user(bob, &changes).await.unwrap_err(), Error::Conflict);

            assert_eq!(
                tx.update_user(UserId::from(99), &UserChanges::default())
                    .await
                    .unwrap_err(),
                Error::NotFound
            );
        }

        #[tokio::test]
        async fn delete() {
            let backend = create_db().await;
            let mut tx = backend.begin().await.unwrap();

            let id = tx.create_user("alice", None, None).await.unwrap();
            tx.delete_user(id).await.unwrap();

            assert_eq!(tx.find_user(id).await.unwrap_err(), Error::NotFound);
            assert_eq!(tx.delete_user(id).await.unwrap_err(), Error::NotFound);
        }

        #[tokio::test]
        async fn rollback_on_drop() {
            let backend = create_db().await;

            {
                let mut tx = backend.begin().await.unwrap();
                tx.create_user("alice", None, None).await.unwrap();
            }

            let mut tx = backend.begin().await.unwrap();
            assert!(tx.users().await.unwrap().is_empty());
        }

        #[tokio::test]
        async fn commit_persists() {
            let backend = create_db().await;

            let mut tx = backend.begin().await.unwrap();
            let id = tx.create_user("alice", None, None).await.unwrap();
            tx.commit().await.unwrap();

            let mut tx = backend.begin().await.unwrap();
            assert_eq!(tx.find_user(id).await.unwrap().username, "alice");
        }
    }
}
