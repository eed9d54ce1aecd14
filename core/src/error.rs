use thiserror::Error;

/// Failures surfaced by the core library.
///
/// `NotFound` is kept apart from `Storage` so callers can tell a missing
/// record from a broken database.
#[derive(Debug, Error)]
pub enum Error {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("food catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("unexpected food catalog response: {0}")]
    CatalogFormat(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("export failed: {0}")]
    Export(#[from] csv::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Map "no rows" to `NotFound`, leaving every other SQLite failure as `Storage`.
pub(crate) trait OptionalRow<T> {
    fn or_not_found(self, entity: &'static str, id: impl ToString) -> Result<T>;
}

impl<T> OptionalRow<T> for rusqlite::Result<T> {
    fn or_not_found(self, entity: &'static str, id: impl ToString) -> Result<T> {
        match self {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Err(Error::not_found(entity, id)),
            Err(e) => Err(Error::Storage(e)),
        }
    }
}
