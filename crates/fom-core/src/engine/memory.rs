//! Backend en memoria del motor espacial (paridad con `PgSpatialEngine`).
//!
//! Modela la misma semántica que las funciones `viirs_*` sobre una grilla de
//! 375m: coordenadas de entrada en metros (ya en la proyección de análisis),
//! máscaras como conjuntos de pixeles. Cada método toma los locks de las
//! tablas que toca, de modo que una llamada equivale a una sentencia atómica.
//!
//! Además permite inyectar fallos por `(schema, operación)` y consultar el
//! orden de operaciones ejecutadas por schema.

use std::collections::{BTreeMap, BTreeSet};

use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};

use super::{Band, SpatialEngine, TableRef, ZoneUpdate};
use crate::config::DbParams;
use crate::constants::{MASK_SUM_TABLE, MERGED_RASTER_TABLE, PROJECTED_GEOM_COLUMN, RASTER_375_TABLE, RASTER_750_TABLE};
use crate::errors::EngineError;
use crate::mask::{BinaryMask, Cell, ComparisonRaster, Extent, PixelCounts};

const GRID_M: f64 = 375.0;

/// Punto de detección de la tabla `fire_events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FireEvent {
    pub x: f64,
    pub y: f64,
    pub band: Band,
    /// Geometría proyectada (`geom_nlcd`), poblada por la proyección.
    pub projected: Option<(f64, f64)>,
}

impl FireEvent {
    pub fn new(x: f64, y: f64, band: Band) -> Self {
        Self { x, y, band, projected: None }
    }

    fn cell(&self, resolution: f64) -> Option<Cell> {
        self.projected.map(|(x, y)| ((y / resolution).floor() as i64, (x / resolution).floor() as i64))
    }
}

/// Polígono (rectangular) de una tabla de definición de zonas.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDef {
    pub attributes: BTreeMap<String, String>,
    pub extent: Extent,
}

impl ZoneDef {
    pub fn new(column: &str, id: &str, extent: Extent) -> Self {
        Self { attributes: BTreeMap::from([(column.to_string(), id.to_string())]),
               extent }
    }
}

#[derive(Debug, Clone)]
struct ZoneTable {
    /// Conteo por `(tabla de definición, zona)`.
    counts: BTreeMap<(String, String), u64>,
    /// `(schema de corrida, tabla de definición)` que ya contribuyeron.
    ledger: BTreeSet<(String, String)>,
}

#[derive(Default)]
pub struct InMemorySpatialEngine {
    fire_events: DashMap<String, Vec<FireEvent>>,
    masks: DashMap<TableRef, BinaryMask>,
    /// Centros de pixel extraídos por `extract_mask_points`, por tabla y
    /// columna de geometría.
    mask_points: DashMap<(TableRef, String), Vec<Cell>>,
    sums: DashMap<String, ComparisonRaster>,
    zone_defs: DashMap<TableRef, Vec<ZoneDef>>,
    zone_tables: DashMap<TableRef, ZoneTable>,
    failures: DashMap<(String, &'static str), String>,
    journal: DashMap<String, Vec<&'static str>>,
}

impl InMemorySpatialEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Carga la tabla `fire_events` de una corrida (reemplaza la existente).
    pub fn insert_fire_events(&self, schema: &str, events: Vec<FireEvent>) {
        self.fire_events.insert(schema.to_string(), events);
    }

    /// Carga una máscara 0/1 (p.ej. la verdad de campo) en la grilla de 375m.
    pub fn insert_mask(&self, table: TableRef, mask: BinaryMask) {
        self.masks.insert(table, mask);
    }

    pub fn insert_zone_defs(&self, table: TableRef, zones: Vec<ZoneDef>) {
        self.zone_defs.insert(table, zones);
    }

    /// Hace fallar la operación `op` para `schema` con el mensaje dado.
    pub fn fail_on(&self, schema: &str, op: &'static str, message: &str) {
        self.failures.insert((schema.to_string(), op), message.to_string());
    }

    pub fn mask(&self, table: &TableRef) -> Option<BinaryMask> {
        self.masks.get(table).map(|m| m.clone())
    }

    pub fn comparison_raster(&self, schema: &str) -> Option<ComparisonRaster> {
        self.sums.get(schema).map(|s| s.clone())
    }

    /// Conteos por zona aportados desde `zonedef_table` a `zone_table`.
    pub fn zone_counts(&self, zone_table: &TableRef, zonedef_table: &str) -> Option<BTreeMap<String, u64>> {
        self.zone_tables.get(zone_table).map(|t| {
                                             t.counts
                                              .iter()
                                              .filter(|((def, _), _)| def == zonedef_table)
                                              .map(|((_, zone), n)| (zone.clone(), *n))
                                              .collect()
                                         })
    }

    /// Operaciones ejecutadas con éxito para `schema`, en orden.
    pub fn journal(&self, schema: &str) -> Vec<&'static str> {
        self.journal.get(schema).map(|j| j.clone()).unwrap_or_default()
    }

    fn check(&self, schema: &str, op: &'static str) -> Result<(), EngineError> {
        match self.failures.get(&(schema.to_string(), op)) {
            Some(msg) => Err(EngineError::Statement(msg.clone())),
            None => Ok(()),
        }
    }

    fn record(&self, schema: &str, op: &'static str) {
        debug!("memory-engine: {op} schema={schema}");
        self.journal.entry(schema.to_string()).or_default().push(op);
    }

    fn missing(table: &TableRef) -> EngineError {
        EngineError::Statement(format!("relation \"{table}\" does not exist"))
    }
}

impl SpatialEngine for InMemorySpatialEngine {
    fn extract_mask_points(&self, _db: &DbParams, mask: &TableRef, _rast_col: &str, geom_col: &str, _srid: i32) -> Result<(), EngineError> {
        self.check(&mask.schema, "extract_mask_points")?;
        let cells: Vec<Cell> = self.masks
                                   .get(mask)
                                   .ok_or_else(|| Self::missing(mask))?
                                   .cells()
                                   .copied()
                                   .collect();
        self.mask_points.insert((mask.clone(), geom_col.to_string()), cells);
        self.record(&mask.schema, "extract_mask_points");
        Ok(())
    }

    fn project_fire_events(&self, _db: &DbParams, schema: &str, _srid: i32) -> Result<(), EngineError> {
        self.check(schema, "project")?;
        let mut events = self.fire_events
                             .get_mut(schema)
                             .ok_or_else(|| Self::missing(&TableRef::new(schema, crate::constants::FIRE_EVENTS_TABLE)))?;
        for ev in events.iter_mut() {
            ev.projected = Some((ev.x, ev.y));
        }
        drop(events);
        self.record(schema, "project");
        Ok(())
    }

    fn rasterize(&self, _db: &DbParams, band: Band, schema: &str, ground_truth: &TableRef, proximity: f64) -> Result<(), EngineError> {
        let op = match band {
            Band::M750 => "rasterize_750",
            Band::I375 => "rasterize_375",
        };
        self.check(schema, op)?;
        let gt_extent = self.masks
                            .get(ground_truth)
                            .ok_or_else(|| Self::missing(ground_truth))?
                            .extent();
        let resolution = band.resolution_m();
        let factor = (resolution / GRID_M).round() as i64;
        let margin = (proximity / GRID_M).ceil() as i64;

        let mask: BinaryMask = match self.fire_events.get(schema) {
            Some(events) => events.iter()
                                  .filter(|e| e.band == band)
                                  .filter_map(|e| e.cell(resolution))
                                  .collect(),
            None => return Err(Self::missing(&TableRef::new(schema, crate::constants::FIRE_EVENTS_TABLE))),
        };
        // Alineado a la extensión de la verdad de campo más el margen de
        // proximidad, expresado en la grilla propia de la banda.
        let mask = match gt_extent {
            Some(ext) => {
                let ext = ext.grow(margin);
                let own = Extent::new((ext.min.0.div_euclid(factor), ext.min.1.div_euclid(factor)),
                                      (ext.max.0.div_euclid(factor), ext.max.1.div_euclid(factor)));
                mask.clip(&own)
            }
            None => BinaryMask::new(),
        };

        let table = TableRef::new(schema, band.raster_table());
        // Sin features no se genera raster (la tabla queda ausente).
        if mask.is_empty() {
            self.masks.remove(&table);
        } else {
            self.masks.insert(table, mask);
        }
        self.record(schema, op);
        Ok(())
    }

    fn merge_masks(&self, _db: &DbParams, schema: &str) -> Result<(), EngineError> {
        self.check(schema, "merge")?;
        let m750 = self.mask(&TableRef::new(schema, RASTER_750_TABLE)).map(|m| m.upsample(2));
        let m375 = self.mask(&TableRef::new(schema, RASTER_375_TABLE));
        let merged_ref = TableRef::new(schema, MERGED_RASTER_TABLE);
        match (m750, m375) {
            (Some(a), Some(b)) => {
                self.masks.insert(merged_ref, a.union(&b));
            }
            (Some(m), None) | (None, Some(m)) => {
                self.masks.insert(merged_ref, m);
            }
            (None, None) => {
                self.masks.remove(&merged_ref);
            }
        }
        self.record(schema, "merge");
        Ok(())
    }

    fn table_exists(&self, _db: &DbParams, table: &TableRef) -> Result<bool, EngineError> {
        Ok(self.masks.contains_key(table) || (table.table == MASK_SUM_TABLE && self.sums.contains_key(&table.schema)))
    }

    fn mask_sum(&self, _db: &DbParams, schema: &str, ground_truth: &TableRef) -> Result<(), EngineError> {
        self.check(schema, "mask_sum")?;
        let merged_ref = TableRef::new(schema, MERGED_RASTER_TABLE);
        let detection = self.mask(&merged_ref).ok_or_else(|| Self::missing(&merged_ref))?;
        let truth = self.mask(ground_truth).ok_or_else(|| Self::missing(ground_truth))?;
        self.sums.insert(schema.to_string(), ComparisonRaster::sum(&detection, &truth));
        self.record(schema, "mask_sum");
        Ok(())
    }

    fn reset_mask_sum(&self, _db: &DbParams, schema: &str) -> Result<(), EngineError> {
        self.check(schema, "reset_mask_sum")?;
        self.sums.insert(schema.to_string(), ComparisonRaster::zeros());
        self.record(schema, "reset_mask_sum");
        Ok(())
    }

    fn pixel_counts(&self, _db: &DbParams, schema: &str) -> Result<PixelCounts, EngineError> {
        self.check(schema, "pixel_counts")?;
        let counts = self.sums
                         .get(schema)
                         .map(|s| s.counts())
                         .ok_or_else(|| Self::missing(&TableRef::new(schema, MASK_SUM_TABLE)))?;
        self.record(schema, "pixel_counts");
        Ok(counts)
    }

    fn zone_table_init(&self, _db: &DbParams, zone_table: &TableRef, _srid: i32) -> Result<(), EngineError> {
        self.check(&zone_table.schema, "zone_init")?;
        self.zone_tables.insert(zone_table.clone(),
                                ZoneTable { counts: BTreeMap::new(),
                                            ledger: BTreeSet::new() });
        self.record(&zone_table.schema, "zone_init");
        Ok(())
    }

    fn zone_table_update(&self,
                         _db: &DbParams,
                         zone_table: &TableRef,
                         zonedef_table: &str,
                         run_schema: &str,
                         zone_column: &str)
                         -> Result<ZoneUpdate, EngineError> {
        self.check(run_schema, "zone_update")?;
        let zonedef_ref = TableRef::new(zone_table.schema.clone(), zonedef_table);
        let points_key = (TableRef::new(run_schema, MERGED_RASTER_TABLE), PROJECTED_GEOM_COLUMN.to_string());
        let points = self.mask_points.get(&points_key).map(|p| p.clone()).ok_or_else(|| {
                                                                             EngineError::Statement(format!("column \"{PROJECTED_GEOM_COLUMN}\" of \"{}\" does not exist",
                                                                                                            points_key.0))
                                                                         })?;
        let zones = self.zone_defs.get(&zonedef_ref).map(|z| z.clone()).ok_or_else(|| Self::missing(&zonedef_ref))?;

        let mut increments: BTreeMap<String, u64> = BTreeMap::new();
        for zone in &zones {
            let id = zone.attributes
                         .get(zone_column)
                         .ok_or_else(|| EngineError::Statement(format!("column \"{zone_column}\" does not exist")))?;
            let hits = points.iter().filter(|p| zone.extent.contains(**p)).count() as u64;
            *increments.entry(id.clone()).or_insert(0) += hits;
        }

        // El guard del shard mantiene ledger + contadores bajo el mismo lock:
        // reclamar y sumar es una sola operación.
        let mut table = self.zone_tables.get_mut(zone_table).ok_or_else(|| Self::missing(zone_table))?;
        if !table.ledger.insert((run_schema.to_string(), zonedef_table.to_string())) {
            return Ok(ZoneUpdate::AlreadyCounted);
        }
        for (id, n) in increments {
            *table.counts.entry((zonedef_table.to_string(), id)).or_insert(0) += n;
        }
        drop(table);
        self.record(run_schema, "zone_update");
        Ok(ZoneUpdate::Applied)
    }
}
