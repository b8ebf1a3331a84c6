//! Evaluación por lotes.
//!
//! Cada directorio de corrida es una unidad independiente. Las unidades se
//! reparten en un `WorkerPool`; una unidad que falla queda registrada con su
//! error y el resto sigue. El resultado se publica sólo después de que
//! terminaron todas las unidades.

use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use fom_core::{evaluate_run, extract_mask_points, init_zone_table, load_batch, run_zone_update, BatchLoad, DbParams, LoadPolicy, RunConfig,
               SpatialEngine, TableRef, Zonation};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BatchError;
use crate::manifest::RunManifest;
use crate::pool::WorkerPool;
use crate::report::{join_outcomes, BatchReport, RunOutcome, RunStatus, SkippedConfig, ZoneBatchReport, ZoneRunOutcome, ZoneRunStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    pub workers: usize,
    pub load_policy: LoadPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self { workers: 1,
               load_policy: LoadPolicy::Skip }
    }
}

/// Carga las configuraciones bajo `base_dir` aplicando la política de
/// configuraciones inválidas.
fn load_configs(base_dir: &Path, policy: LoadPolicy) -> Result<(Vec<RunConfig>, Vec<SkippedConfig>), BatchError> {
    let BatchLoad { configs, failures } = load_batch(base_dir)?;
    if policy == LoadPolicy::FailBatch && !failures.is_empty() {
        return Err(BatchError::RejectedConfigs(failures.iter().map(ToString::to_string).collect()));
    }
    let skipped = failures.into_iter()
                          .map(|e| {
                              warn!("batch: skipping run: {e}");
                              SkippedConfig { path: e.path().cloned(),
                                              reason: e.to_string() }
                          })
                          .collect();
    Ok((configs, skipped))
}

fn evaluate_unit<E: SpatialEngine + ?Sized>(engine: &E, config: &RunConfig, ground_truth: &TableRef) -> RunOutcome {
    let started = Instant::now();
    let status = match evaluate_run(engine, config, ground_truth) {
        Ok(fom) => {
            info!("batch: run_id={} schema={} fom={fom}", config.run_id, config.schema);
            RunStatus::from_fom(fom)
        }
        Err(e) => {
            error!("batch: run_id={} schema={} failed: {e}", config.run_id, config.schema);
            RunStatus::Failed(e.to_string())
        }
    };
    RunOutcome { run_id: config.run_id.clone(),
                 schema: config.schema.clone(),
                 status,
                 elapsed_ms: started.elapsed().as_millis() as u64 }
}

/// Evalúa todas las corridas que están junto al manifest y escribe
/// `new_<manifest>` con las columnas `fom` y `fom_status`.
///
/// Antes de repartir trabajo se extraen una vez los puntos de la verdad de
/// campo con `priming`; si eso falla el lote no empieza.
pub fn evaluate_batch<E: SpatialEngine + ?Sized>(engine: &E,
                                                 manifest_path: &Path,
                                                 ground_truth: &TableRef,
                                                 priming: &DbParams,
                                                 options: &BatchOptions)
                                                 -> Result<BatchReport, BatchError> {
    let batch_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("evaluate_batch:start batch_id={batch_id} manifest={} ground_truth={ground_truth} workers={}",
          manifest_path.display(),
          options.workers);

    let manifest = RunManifest::load(manifest_path)?;
    let base_dir = parent_dir(manifest_path);
    let pool = WorkerPool::new(options.workers)?;
    let (configs, skipped) = load_configs(&base_dir, options.load_policy)?;

    extract_mask_points(engine, priming, ground_truth).map_err(BatchError::Priming)?;

    let outcomes = pool.map(&configs, |config| evaluate_unit(engine, config, ground_truth));

    let (cells, gaps) = join_outcomes(&manifest.run_ids(), &outcomes);
    for gap in &gaps {
        warn!("evaluate_batch: manifest gap {gap:?}");
    }
    let output = manifest.write_with_fom(&cells)?;

    let report = BatchReport { batch_id,
                               started_at,
                               finished_at: Utc::now(),
                               workers: pool.workers(),
                               manifest: manifest_path.to_path_buf(),
                               output,
                               outcomes,
                               gaps,
                               skipped };
    info!("evaluate_batch:done batch_id={batch_id} runs={} failed={}",
          report.outcomes.len(),
          report.failed().count());
    Ok(report)
}

/// Inicializa cada tabla de zonas una vez y luego suma la contribución de
/// cada corrida bajo `base_dir`. La suma es conmutativa: el orden en que
/// terminan los workers no cambia el resultado.
pub fn evaluate_zone_batch<E: SpatialEngine + ?Sized>(engine: &E,
                                                      base_dir: &Path,
                                                      zone_schema: &str,
                                                      zonations: &[Zonation],
                                                      init_db: &DbParams,
                                                      options: &BatchOptions)
                                                      -> Result<ZoneBatchReport, BatchError> {
    let batch_id = Uuid::new_v4();
    let started_at = Utc::now();
    info!("evaluate_zone_batch:start batch_id={batch_id} base_dir={} zone_schema={zone_schema} workers={}",
          base_dir.display(),
          options.workers);

    let pool = WorkerPool::new(options.workers)?;
    let (configs, skipped) = load_configs(base_dir, options.load_policy)?;

    let mut zone_tables: Vec<String> = Vec::new();
    for z in zonations {
        if !zone_tables.contains(&z.zone_table) {
            zone_tables.push(z.zone_table.clone());
        }
    }
    for table in &zone_tables {
        init_zone_table(engine, zone_schema, table, init_db).map_err(BatchError::ZoneInit)?;
    }

    let outcomes = pool.map(&configs, |config| {
                           let started = Instant::now();
                           let status = match run_zone_update(engine, zone_schema, zonations, config) {
                               Ok(updates) => ZoneRunStatus::Applied(updates),
                               Err(e) => {
                                   error!("zone batch: run_id={} schema={} failed: {e}", config.run_id, config.schema);
                                   ZoneRunStatus::Failed(e.to_string())
                               }
                           };
                           ZoneRunOutcome { run_id: config.run_id.clone(),
                                            schema: config.schema.clone(),
                                            status,
                                            elapsed_ms: started.elapsed().as_millis() as u64 }
                       });

    let report = ZoneBatchReport { batch_id,
                                   started_at,
                                   finished_at: Utc::now(),
                                   workers: pool.workers(),
                                   zone_schema: zone_schema.to_string(),
                                   zone_tables,
                                   outcomes,
                                   skipped };
    info!("evaluate_zone_batch:done batch_id={batch_id} runs={} failed={}",
          report.outcomes.len(),
          report.failed().count());
    Ok(report)
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
