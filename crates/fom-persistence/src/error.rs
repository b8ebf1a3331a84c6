//! Errores de persistencia.
//! Mapea errores de Diesel / conexión a variantes semánticas y de ahí al
//! `EngineError` único que ve el core.

use diesel::result::{ConnectionError, DatabaseErrorKind, Error as DieselError};
use fom_core::EngineError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("unique violation: {0}")]
    UniqueViolation(String),
    #[error("check violation: {0}")]
    CheckViolation(String),
    #[error("foreign key violation: {0}")]
    ForeignKeyViolation(String),
    #[error("not null violation: {0}")]
    NotNullViolation(String),
    #[error("not found")]
    NotFound,
    #[error("serialization conflict")]
    SerializationConflict,
    #[error("unknown database error: {0}")]
    Unknown(String),
}

impl From<ConnectionError> for PersistenceError {
    fn from(err: ConnectionError) -> Self {
        Self::Connection(err.to_string())
    }
}

impl From<DieselError> for PersistenceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => Self::NotFound,
            DieselError::DatabaseError(kind, info) => match kind {
                DatabaseErrorKind::UniqueViolation => Self::UniqueViolation(info.message().to_string()),
                DatabaseErrorKind::CheckViolation => Self::CheckViolation(info.message().to_string()),
                DatabaseErrorKind::ForeignKeyViolation => Self::ForeignKeyViolation(info.message().to_string()),
                DatabaseErrorKind::NotNullViolation => Self::NotNullViolation(info.message().to_string()),
                DatabaseErrorKind::SerializationFailure => Self::SerializationConflict,
                DatabaseErrorKind::ClosedConnection => Self::Connection(info.message().to_string()),
                other => Self::Unknown(format!("db error kind {:?}: {}", other, info.message())),
            },
            DieselError::DeserializationError(e) => Self::Unknown(format!("deser: {e}")),
            DieselError::SerializationError(e) => Self::Unknown(format!("ser: {e}")),
            DieselError::QueryBuilderError(e) => Self::Unknown(format!("query builder: {e}")),
            DieselError::InvalidCString(e) => Self::Unknown(format!("invalid cstring: {e}")),
            DieselError::BrokenTransactionManager => Self::Connection("broken transaction manager".into()),
            other => Self::Unknown(format!("unhandled diesel error: {other:?}")),
        }
    }
}

impl From<PersistenceError> for EngineError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Connection(msg) => EngineError::Connection(msg),
            PersistenceError::UniqueViolation(msg)
            | PersistenceError::CheckViolation(msg)
            | PersistenceError::ForeignKeyViolation(msg)
            | PersistenceError::NotNullViolation(msg) => EngineError::Constraint(msg),
            PersistenceError::NotFound => EngineError::Malformed("statement returned no rows".into()),
            PersistenceError::SerializationConflict => EngineError::Statement("serialization conflict".into()),
            PersistenceError::Unknown(msg) => EngineError::Statement(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_kinds_collapse_to_constraint() {
        let e: EngineError = PersistenceError::UniqueViolation("dup".into()).into();
        assert_eq!(e, EngineError::Constraint("dup".into()));
        let e: EngineError = PersistenceError::NotNullViolation("null".into()).into();
        assert_eq!(e, EngineError::Constraint("null".into()));
    }

    #[test]
    fn not_found_maps_to_malformed_result() {
        let p: PersistenceError = DieselError::NotFound.into();
        assert!(matches!(EngineError::from(p), EngineError::Malformed(_)));
    }

    #[test]
    fn connection_errors_stay_connection_errors() {
        let p: PersistenceError = ConnectionError::BadConnection("refused".into()).into();
        assert_eq!(EngineError::from(p), EngineError::Connection("refused".into()));
    }
}
