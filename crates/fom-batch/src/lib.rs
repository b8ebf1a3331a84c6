//! fom-batch: evaluación por lotes de corridas independientes.
//!
//! - `manifest`: tabla CSV de corridas (`run_id`, luego `fom`).
//! - `pool`: pool de workers de tamaño fijo.
//! - `evaluator`: `evaluate_batch` (FOM) y `evaluate_zone_batch` (zonas).
//! - `report`: estado por corrida, huecos de join y reporte final.

pub mod error;
pub mod evaluator;
pub mod manifest;
pub mod pool;
pub mod report;

pub use error::BatchError;
pub use evaluator::{evaluate_batch, evaluate_zone_batch, BatchOptions};
pub use manifest::RunManifest;
pub use pool::WorkerPool;
pub use report::{BatchReport, ManifestJoinGap, RunOutcome, RunStatus, ZoneBatchReport, ZoneRunOutcome};
