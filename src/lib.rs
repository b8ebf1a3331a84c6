//! VIIRS FOM
//!
//! Librería raíz del workspace:
//! - `fom_core`: configuración por corrida, pipeline de máscaras, FOM y zonas.
//! - `fom_persistence`: gateway y motor PostGIS.
//! - `fom_batch`: evaluación por lotes con pool de workers.
//!
//! `prelude` reúne lo necesario para lanzar un lote desde otro crate.

pub use fom_batch;
pub use fom_core;
pub use fom_persistence;

pub mod prelude {
    pub use fom_batch::{evaluate_batch, evaluate_zone_batch, BatchError, BatchOptions, BatchReport, RunStatus, ZoneBatchReport};
    pub use fom_core::{DbParams, Fom, InMemorySpatialEngine, LoadPolicy, RunConfig, RunId, SpatialEngine, TableRef, Zonation};
    pub use fom_persistence::PgSpatialEngine;
}
