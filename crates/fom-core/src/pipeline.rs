//! Pipeline de máscaras por corrida.
//!
//! Orden fijo (cada paso es una sentencia contra el motor y es idempotente
//! por drop + recreate):
//! 1. `project`: columna `geom_nlcd` en `fire_events`.
//! 2. `rasterize_band_a` (750m) y `rasterize_band_b` (375m), alineadas a la
//!    verdad de campo.
//! 3. `merge`: OR lógico en la grilla de 375m.
//! 4. `sum_with_ground_truth`: raster {0,1,2}.
//!
//! Un paso sólo se ejecuta si el anterior terminó sin error; el primer fallo
//! corta la corrida y se devuelve envuelto con el nombre del paso.

use log::debug;

use crate::config::{DbParams, RunConfig};
use crate::constants::{GEOM_COLUMN, MERGED_RASTER_TABLE, NLCD_SRID, RAST_COLUMN};
use crate::engine::{Band, SpatialEngine, TableRef};
use crate::errors::EngineError;

/// Pasos del pipeline, en orden de ejecución.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskStep {
    Project,
    RasterizeBandA,
    RasterizeBandB,
    Merge,
    SumWithGroundTruth,
}

impl MaskStep {
    pub const ALL: [MaskStep; 5] = [MaskStep::Project,
                                    MaskStep::RasterizeBandA,
                                    MaskStep::RasterizeBandB,
                                    MaskStep::Merge,
                                    MaskStep::SumWithGroundTruth];

    pub fn name(self) -> &'static str {
        match self {
            MaskStep::Project => "project",
            MaskStep::RasterizeBandA => "rasterize_750",
            MaskStep::RasterizeBandB => "rasterize_375",
            MaskStep::Merge => "merge",
            MaskStep::SumWithGroundTruth => "sum_with_ground_truth",
        }
    }
}

/// Pipeline de una corrida contra un motor concreto.
pub struct MaskPipeline<'a, E: SpatialEngine + ?Sized> {
    engine: &'a E,
}

impl<'a, E: SpatialEngine + ?Sized> MaskPipeline<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self { engine }
    }

    pub fn project(&self, config: &RunConfig) -> Result<(), EngineError> {
        self.engine.project_fire_events(&config.db, &config.schema, NLCD_SRID)
    }

    /// Máscara de la banda M (750m).
    pub fn rasterize_band_a(&self, config: &RunConfig, ground_truth: &TableRef, proximity: f64) -> Result<(), EngineError> {
        self.engine.rasterize(&config.db, Band::M750, &config.schema, ground_truth, proximity)
    }

    /// Máscara de la banda I (375m).
    pub fn rasterize_band_b(&self, config: &RunConfig, ground_truth: &TableRef, proximity: f64) -> Result<(), EngineError> {
        self.engine.rasterize(&config.db, Band::I375, &config.schema, ground_truth, proximity)
    }

    pub fn merge(&self, config: &RunConfig) -> Result<(), EngineError> {
        self.engine.merge_masks(&config.db, &config.schema)
    }

    /// Si falta la máscara combinada o la verdad de campo, `mask_sum` se
    /// recrea todo-cero en lugar de fallar, para que el FOM tenga una entrada
    /// definida (unión vacía).
    pub fn sum_with_ground_truth(&self, config: &RunConfig, ground_truth: &TableRef) -> Result<(), EngineError> {
        let merged = TableRef::new(config.schema.clone(), MERGED_RASTER_TABLE);
        let detection_present = self.engine.table_exists(&config.db, &merged)?;
        let truth_present = self.engine.table_exists(&config.db, ground_truth)?;
        if detection_present && truth_present {
            self.engine.mask_sum(&config.db, &config.schema, ground_truth)
        } else {
            debug!("sum_with_ground_truth: schema={} detection_present={} truth_present={} -> all-zero mask_sum",
                   config.schema,
                   detection_present,
                   truth_present);
            self.engine.reset_mask_sum(&config.db, &config.schema)
        }
    }

    pub fn run_step(&self, step: MaskStep, config: &RunConfig, ground_truth: &TableRef) -> Result<(), EngineError> {
        match step {
            MaskStep::Project => self.project(config),
            MaskStep::RasterizeBandA => self.rasterize_band_a(config, ground_truth, config.spatial_proximity),
            MaskStep::RasterizeBandB => self.rasterize_band_b(config, ground_truth, config.spatial_proximity),
            MaskStep::Merge => self.merge(config),
            MaskStep::SumWithGroundTruth => self.sum_with_ground_truth(config, ground_truth),
        }
    }

    /// Ejecuta los cuatro pasos en orden. Idempotente: correrlo dos veces
    /// con las mismas entradas deja el mismo raster de comparación.
    pub fn run(&self, config: &RunConfig, ground_truth: &TableRef) -> Result<(), EngineError> {
        for step in MaskStep::ALL {
            debug!("mask_pipeline:start run_id={} step={}", config.run_id, step.name());
            self.run_step(step, config, ground_truth).map_err(|e| e.in_step(step.name()))?;
            debug!("mask_pipeline:done run_id={} step={}", config.run_id, step.name());
        }
        Ok(())
    }
}

/// Prepara una tabla de máscara (p.ej. la verdad de campo) agregando la
/// geometría multipunto de sus pixeles "verdaderos". Se hace una vez por
/// lote, no por corrida.
pub fn extract_mask_points<E: SpatialEngine + ?Sized>(engine: &E, db: &DbParams, mask: &TableRef) -> Result<(), EngineError> {
    engine.extract_mask_points(db, mask, RAST_COLUMN, GEOM_COLUMN, NLCD_SRID)
}
