//! Constantes compartidas: SRID de la grilla de análisis y nombres de tablas
//! que producen las funciones `viirs_*` del motor espacial.

/// SRID de la proyección NLCD (Albers CONUS) usada como grilla común.
pub const NLCD_SRID: i32 = 96630;

pub const FIRE_EVENTS_TABLE: &str = "fire_events";
pub const RASTER_750_TABLE: &str = "fire_events_raster_750";
pub const RASTER_375_TABLE: &str = "fire_events_raster_375";
/// Máscara combinada (OR lógico) a 375m.
pub const MERGED_RASTER_TABLE: &str = "fire_events_raster";
pub const MASK_SUM_TABLE: &str = "mask_sum";

pub const RAST_COLUMN: &str = "rast";
pub const GEOM_COLUMN: &str = "geom";
pub const PROJECTED_GEOM_COLUMN: &str = "geom_nlcd";

pub const DEFAULT_ZONEDEF_TABLE: &str = "dissolve_eval_zones";
pub const DEFAULT_ZONE_TABLE: &str = "eval_zone_counts";
pub const DEFAULT_ZONE_COLUMN: &str = "zone";

/// Sufijo del ledger de contribuciones asociado a cada tabla de zonas.
pub const ZONE_LEDGER_SUFFIX: &str = "_runs";

/// Prefijo del manifiesto de salida.
pub const OUTPUT_MANIFEST_PREFIX: &str = "new_";
