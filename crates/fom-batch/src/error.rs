//! Errores fatales para un lote completo. Los fallos de una corrida NO son
//! fatales: quedan en su `RunOutcome`.

use std::path::PathBuf;

use fom_core::{ConfigLoadError, EngineError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("csv error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
    #[error("manifest {0} has no `run_id` column")]
    MissingRunIdColumn(PathBuf),
    #[error("manifest {path} line {line}: {fields} fields, header has {expected}")]
    MalformedRow { path: PathBuf, line: u64, fields: usize, expected: usize },
    #[error("refusing to overwrite the input manifest {0}")]
    WouldOverwriteInput(PathBuf),
    #[error("worker count must be at least 1")]
    InvalidWorkerCount,
    #[error("worker pool: {0}")]
    Pool(String),
    #[error(transparent)]
    ConfigLoad(#[from] ConfigLoadError),
    #[error("{} run configuration(s) rejected: {}", .0.len(), .0.join("; "))]
    RejectedConfigs(Vec<String>),
    #[error("ground truth priming failed: {0}")]
    Priming(EngineError),
    #[error("zone table initialization failed: {0}")]
    ZoneInit(EngineError),
}
