//! fom-persistence
//!
//! Acceso al motor espacial PostGIS.
//!
//! Módulos:
//! - `gateway`: una conexión y una transacción por llamada, cierre garantizado.
//! - `pg`: `PgSpatialEngine`, implementación de `SpatialEngine` sobre las
//!   funciones `viirs_*`.
//! - `error`: mapeo de errores Diesel a `PersistenceError` / `EngineError`.

pub mod error;
pub mod gateway;
pub mod pg;

pub use fom_core::config::init_dotenv;
pub use error::PersistenceError;
pub use gateway::{execute, execute_all, query, quote_ident, Bind, Statement};
pub use pg::PgSpatialEngine;
