//! Motor espacial como colaborador con capacidades tipadas.
//!
//! El core no implementa álgebra raster: sólo define qué operaciones se le
//! piden al motor, en qué orden y con qué garantías de idempotencia. Cada
//! método corresponde a UNA sentencia contra el motor; las implementaciones
//! no reintentan.
//!
//! Implementaciones:
//! - `InMemorySpatialEngine` (este crate): backend en memoria con la misma
//!   semántica, usado en tests y para razonar sobre el contrato.
//! - `PgSpatialEngine` (`fom-persistence`): PostGIS + funciones `viirs_*`.

pub mod memory;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::DbParams;
use crate::errors::EngineError;
use crate::mask::PixelCounts;

pub use memory::{FireEvent, InMemorySpatialEngine, ZoneDef};

/// Referencia `(schema, tabla)` dentro del motor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self { schema: schema.into(),
               table: table.into() }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Banda del sensor VIIRS de la que provienen las detecciones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Band {
    /// Banda M, producto AVAFO, 750m.
    M750,
    /// Banda I, producto VF375, 375m.
    I375,
}

impl Band {
    pub fn resolution_m(self) -> f64 {
        match self {
            Band::M750 => 750.0,
            Band::I375 => 375.0,
        }
    }

    pub fn raster_table(self) -> &'static str {
        match self {
            Band::M750 => crate::constants::RASTER_750_TABLE,
            Band::I375 => crate::constants::RASTER_375_TABLE,
        }
    }
}

/// Resultado de aplicar la contribución de una corrida a una tabla de zonas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ZoneUpdate {
    Applied,
    /// La corrida ya había contribuido a esta tabla en el lote actual.
    AlreadyCounted,
}

pub trait SpatialEngine: Send + Sync {
    /// Agrega a cada fila de `mask` una geometría multipunto con los centros
    /// de los pixeles con valor 1.
    fn extract_mask_points(&self, db: &DbParams, mask: &TableRef, rast_col: &str, geom_col: &str, srid: i32) -> Result<(), EngineError>;

    /// Agrega (o sobrescribe) la columna de geometría proyectada de
    /// `fire_events`.
    fn project_fire_events(&self, db: &DbParams, schema: &str, srid: i32) -> Result<(), EngineError>;

    /// Rasteriza las detecciones de `band` alineadas a `ground_truth`
    /// (drop + recreate).
    fn rasterize(&self, db: &DbParams, band: Band, schema: &str, ground_truth: &TableRef, proximity: f64) -> Result<(), EngineError>;

    /// OR lógico de las dos máscaras de banda en la grilla de 375m.
    fn merge_masks(&self, db: &DbParams, schema: &str) -> Result<(), EngineError>;

    fn table_exists(&self, db: &DbParams, table: &TableRef) -> Result<bool, EngineError>;

    /// Suma pixel a pixel de la máscara combinada y la verdad de campo.
    fn mask_sum(&self, db: &DbParams, schema: &str, ground_truth: &TableRef) -> Result<(), EngineError>;

    /// Recrea `mask_sum` como raster todo-cero.
    fn reset_mask_sum(&self, db: &DbParams, schema: &str) -> Result<(), EngineError>;

    /// Reducción sobre `mask_sum`: pixeles == 2 y pixeles > 0.
    fn pixel_counts(&self, db: &DbParams, schema: &str) -> Result<PixelCounts, EngineError>;

    /// Drop + recreate de la tabla de acumulación y de su ledger.
    fn zone_table_init(&self, db: &DbParams, zone_table: &TableRef, srid: i32) -> Result<(), EngineError>;

    /// Incremento aditivo por zona, en una única sentencia, protegido por el
    /// ledger de contribuciones.
    fn zone_table_update(&self,
                         db: &DbParams,
                         zone_table: &TableRef,
                         zonedef_table: &str,
                         run_schema: &str,
                         zone_column: &str)
                         -> Result<ZoneUpdate, EngineError>;
}
