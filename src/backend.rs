/// Storage failures, already logged where they happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    NotFound,
    /// a UNIQUE column (username, email) already holds the value
    Conflict,
    Internal,
}

pub type Result<T> = std::result::Result<T, Error>;

mod backend_sql;
pub use backend_sql::*;
