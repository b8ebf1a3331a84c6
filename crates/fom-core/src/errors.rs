//! Errores del core de evaluación.
//!
//! - `EngineError`: cualquier fallo al hablar con el motor espacial
//!   (conectividad, sentencia mal formada, constraint). No se reintenta.
//! - `ConfigLoadError`: un directorio de corrida sin configuración válida.
//!   Siempre nombra el archivo o directorio culpable.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("statement error: {0}")]
    Statement(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("malformed engine result: {0}")]
    Malformed(String),
    /// Fallo de un paso del pipeline, con el nombre del paso.
    #[error("step `{step}` failed: {source}")]
    Step { step: String, source: Box<EngineError> },
}

impl EngineError {
    pub fn in_step(self, step: &str) -> Self {
        EngineError::Step { step: step.to_string(),
                            source: Box::new(self) }
    }

    /// Error raíz, descartando envolturas de paso.
    pub fn root(&self) -> &EngineError {
        match self {
            EngineError::Step { source, .. } => source.root(),
            other => other,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("no configuration file found in {0}")]
    MissingFile(PathBuf),
    #[error("{path}: missing key [{section}] {key}")]
    MissingKey { path: PathBuf, section: String, key: String },
    #[error("{path}: invalid value for {key}: {value}")]
    InvalidValue { path: PathBuf, key: String, value: String },
    #[error("environment: {0}")]
    Env(String),
}

impl ConfigLoadError {
    /// Ruta asociada al error (vacía para errores de entorno).
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            ConfigLoadError::Io { path, .. }
            | ConfigLoadError::MissingKey { path, .. }
            | ConfigLoadError::InvalidValue { path, .. } => Some(path),
            ConfigLoadError::MissingFile(path) => Some(path),
            ConfigLoadError::Env(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_error_keeps_root_cause() {
        let err = EngineError::Statement("syntax".into()).in_step("merge");
        assert_eq!(err.to_string(), "step `merge` failed: statement error: syntax");
        assert_eq!(err.root(), &EngineError::Statement("syntax".into()));
    }

    #[test]
    fn config_error_names_the_file() {
        let err = ConfigLoadError::MissingKey { path: PathBuf::from("runs/r1/run.ini"),
                                                section: "DataBaseInfo".into(),
                                                key: "Schema".into() };
        assert_eq!(err.to_string(), "runs/r1/run.ini: missing key [DataBaseInfo] Schema");
        assert_eq!(err.path(), Some(&PathBuf::from("runs/r1/run.ini")));
    }
}
