//! fom-core: evaluación de exactitud de detecciones de incendios VIIRS.
//!
//! Módulos:
//! - `config`: `RunConfig` (INI por corrida), `DbParams`, carga por lotes.
//! - `engine`: trait `SpatialEngine` y backend en memoria.
//! - `pipeline`: pasos idempotentes que producen el raster de comparación.
//! - `fom`: intersección sobre unión.
//! - `zone`: acumulación por zonas.
//! - `mask`: máscaras y conteos en memoria.
//! - `scenes`: índice tipado de escenas procesadas.

pub mod config;
pub mod constants;
pub mod engine;
pub mod errors;
pub mod fom;
pub mod mask;
pub mod pipeline;
pub mod scenes;
pub mod zone;

pub use config::{load_batch, BatchLoad, DbParams, LoadPolicy, RunConfig, RunId};
pub use engine::{Band, InMemorySpatialEngine, SpatialEngine, TableRef, ZoneUpdate};
pub use errors::{ConfigLoadError, EngineError};
pub use fom::{compute_fom, evaluate_run, Fom};
pub use mask::{BinaryMask, ComparisonRaster, PixelCounts};
pub use pipeline::{extract_mask_points, MaskPipeline, MaskStep};
pub use zone::{init_zone_table, run_zone_update, Zonation, ZonationOutcome};
