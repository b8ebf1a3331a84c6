//! Resultado de un lote: estado por corrida, huecos del join con el
//! manifest y metadatos del lote.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use fom_core::{Fom, RunId, ZonationOutcome};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::manifest::FomCell;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum RunStatus {
    Ok(f64),
    /// Unión vacía: FOM indefinido.
    NoData,
    Failed(String),
}

impl RunStatus {
    pub fn from_fom(fom: Fom) -> Self {
        match fom {
            Fom::Defined(v) => RunStatus::Ok(v),
            Fom::Undefined => RunStatus::NoData,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RunStatus::Failed(_))
    }

    /// Celda del manifest de salida.
    pub fn cell(&self) -> FomCell {
        match self {
            RunStatus::Ok(v) => FomCell { fom: Some(*v),
                                          status: "ok".into() },
            RunStatus::NoData => FomCell { fom: None,
                                           status: "no_data".into() },
            RunStatus::Failed(msg) => FomCell { fom: None,
                                                status: format!("failed: {msg}") },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: RunId,
    pub schema: String,
    pub status: RunStatus,
    pub elapsed_ms: u64,
}

/// Discrepancias entre las corridas evaluadas y las filas del manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ManifestJoinGap {
    /// Corrida evaluada sin fila en el manifest.
    RunWithoutRow { run_id: RunId },
    /// Fila del manifest sin corrida evaluada.
    RowWithoutRun { run_id: RunId, row: usize },
    /// Varias filas con el mismo `run_id`; todas reciben el mismo valor.
    DuplicateRows { run_id: RunId, rows: Vec<usize> },
    /// Varias corridas con el mismo `run_id`; ninguna se escribe.
    DuplicateRuns { run_id: RunId, schemas: Vec<String> },
}

/// Une filas del manifest con resultados. Devuelve una celda por fila más
/// las discrepancias encontradas.
pub fn join_outcomes(row_ids: &[RunId], outcomes: &[RunOutcome]) -> (Vec<FomCell>, Vec<ManifestJoinGap>) {
    let mut by_run: BTreeMap<&RunId, Vec<&RunOutcome>> = BTreeMap::new();
    for o in outcomes {
        by_run.entry(&o.run_id).or_default().push(o);
    }
    let mut rows_by_run: BTreeMap<&RunId, Vec<usize>> = BTreeMap::new();
    for (i, id) in row_ids.iter().enumerate() {
        rows_by_run.entry(id).or_default().push(i);
    }

    let mut gaps = Vec::new();
    for (run_id, runs) in &by_run {
        if runs.len() > 1 {
            gaps.push(ManifestJoinGap::DuplicateRuns { run_id: (*run_id).clone(),
                                                       schemas: runs.iter().map(|o| o.schema.clone()).collect() });
        }
        if !rows_by_run.contains_key(run_id) {
            gaps.push(ManifestJoinGap::RunWithoutRow { run_id: (*run_id).clone() });
        }
    }
    for (run_id, rows) in &rows_by_run {
        if rows.len() > 1 {
            gaps.push(ManifestJoinGap::DuplicateRows { run_id: (*run_id).clone(),
                                                       rows: rows.clone() });
        }
    }

    let cells = row_ids.iter()
                       .enumerate()
                       .map(|(row, id)| match by_run.get(id).map(Vec::as_slice) {
                           Some([only]) => only.status.cell(),
                           Some(_) => FomCell { fom: None,
                                                status: "ambiguous".into() },
                           None => {
                               gaps.push(ManifestJoinGap::RowWithoutRun { run_id: id.clone(),
                                                                          row });
                               FomCell { fom: None,
                                         status: "missing".into() }
                           }
                       })
                       .collect();
    (cells, gaps)
}

/// Configuración que no se pudo cargar (corrida omitida).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedConfig {
    pub path: Option<PathBuf>,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers: usize,
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub outcomes: Vec<RunOutcome>,
    pub gaps: Vec<ManifestJoinGap>,
    pub skipped: Vec<SkippedConfig>,
}

impl BatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &RunOutcome> {
        self.outcomes.iter().filter(|o| o.status.is_failed())
    }

    /// Sin corridas fallidas, sin huecos y sin configuraciones omitidas.
    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none() && self.gaps.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ZoneRunStatus {
    Applied(Vec<ZonationOutcome>),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneRunOutcome {
    pub run_id: RunId,
    pub schema: String,
    pub status: ZoneRunStatus,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneBatchReport {
    pub batch_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub workers: usize,
    pub zone_schema: String,
    pub zone_tables: Vec<String>,
    pub outcomes: Vec<ZoneRunOutcome>,
    pub skipped: Vec<SkippedConfig>,
}

impl ZoneBatchReport {
    pub fn failed(&self) -> impl Iterator<Item = &ZoneRunOutcome> {
        self.outcomes.iter().filter(|o| matches!(o.status, ZoneRunStatus::Failed(_)))
    }

    pub fn is_clean(&self) -> bool {
        self.failed().next().is_none() && self.skipped.is_empty()
    }
}
