//! Agregación de detecciones por zonas.
//!
//! La tabla de resultados se inicializa una vez por lote y luego cada corrida
//! suma su contribución. Los incrementos son sentencias únicas en el motor
//! (nunca leer-modificar-escribir desde aquí), así que corridas concurrentes
//! no pierden actualizaciones; el ledger evita contar dos veces una corrida.

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::config::{DbParams, RunConfig};
use crate::constants::{DEFAULT_ZONEDEF_TABLE, DEFAULT_ZONE_COLUMN, DEFAULT_ZONE_TABLE, MERGED_RASTER_TABLE, NLCD_SRID, PROJECTED_GEOM_COLUMN, RAST_COLUMN};
use crate::engine::{SpatialEngine, TableRef, ZoneUpdate};
use crate::errors::EngineError;

/// Una zonificación: tabla de definición, tabla de acumulación y columna que
/// identifica la zona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Zonation {
    pub zonedef_table: String,
    pub zone_table: String,
    pub zone_column: String,
}

impl Zonation {
    pub fn new(zonedef_table: impl Into<String>, zone_table: impl Into<String>, zone_column: impl Into<String>) -> Self {
        Self { zonedef_table: zonedef_table.into(),
               zone_table: zone_table.into(),
               zone_column: zone_column.into() }
    }
}

impl Default for Zonation {
    fn default() -> Self {
        Zonation::new(DEFAULT_ZONEDEF_TABLE, DEFAULT_ZONE_TABLE, DEFAULT_ZONE_COLUMN)
    }
}

/// Resultado de una zonificación para una corrida.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZonationOutcome {
    pub zone_table: String,
    pub update: ZoneUpdate,
}

/// Drop + recreate de la tabla de acumulación. Una sola vez por lote, antes
/// de cualquier contribución.
pub fn init_zone_table<E: SpatialEngine + ?Sized>(engine: &E, zone_schema: &str, zone_table: &str, db: &DbParams) -> Result<(), EngineError> {
    info!("init_zone_table: {zone_schema}.{zone_table}");
    engine.zone_table_init(db, &TableRef::new(zone_schema, zone_table), NLCD_SRID)
}

/// Suma la máscara combinada de la corrida a cada zonificación, en el orden
/// dado. Las zonificaciones no dependen entre sí.
pub fn run_zone_update<E: SpatialEngine + ?Sized>(engine: &E,
                                                  zone_schema: &str,
                                                  zonations: &[Zonation],
                                                  config: &RunConfig)
                                                  -> Result<Vec<ZonationOutcome>, EngineError> {
    let merged = TableRef::new(config.schema.clone(), MERGED_RASTER_TABLE);
    engine.extract_mask_points(&config.db, &merged, RAST_COLUMN, PROJECTED_GEOM_COLUMN, NLCD_SRID)
          .map_err(|e| e.in_step("extract_mask_points"))?;

    let mut outcomes = Vec::with_capacity(zonations.len());
    for z in zonations {
        let zone_table = TableRef::new(zone_schema, z.zone_table.clone());
        let update = engine.zone_table_update(&config.db, &zone_table, &z.zonedef_table, &config.schema, &z.zone_column)
                           .map_err(|e| e.in_step("zone_update"))?;
        debug!("run_zone_update: run_id={} zone_table={} update={:?}", config.run_id, zone_table, update);
        outcomes.push(ZonationOutcome { zone_table: z.zone_table.clone(),
                                        update });
    }
    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunId;
    use crate::engine::InMemorySpatialEngine;
    use crate::engine::ZoneDef;
    use crate::mask::Extent;

    fn config(schema: &str) -> RunConfig {
        RunConfig { run_id: RunId::normalize(schema),
                    schema: schema.into(),
                    spatial_proximity: 0.0,
                    temporal_proximity: None,
                    run_dir: schema.into(),
                    out_dir: None,
                    db: DbParams::new("mem", "test", "") }
    }

    fn engine_with_zones() -> InMemorySpatialEngine {
        let engine = InMemorySpatialEngine::new();
        engine.insert_zone_defs(TableRef::new("eval", DEFAULT_ZONEDEF_TABLE),
                                vec![ZoneDef::new("zone", "north", Extent::new((0, 0), (9, 9))),
                                     ZoneDef::new("zone", "south", Extent::new((10, 0), (19, 9)))]);
        engine.insert_mask(TableRef::new("r1", MERGED_RASTER_TABLE), [(1, 1), (2, 2), (12, 3)].into_iter().collect());
        engine
    }

    #[test]
    fn counts_points_per_zone() {
        let engine = engine_with_zones();
        let db = DbParams::new("mem", "test", "");
        init_zone_table(&engine, "eval", DEFAULT_ZONE_TABLE, &db).expect("init");
        let out = run_zone_update(&engine, "eval", &[Zonation::default()], &config("r1")).expect("update");
        assert_eq!(out, vec![ZonationOutcome { zone_table: DEFAULT_ZONE_TABLE.into(),
                                               update: ZoneUpdate::Applied }]);
        let counts = engine.zone_counts(&TableRef::new("eval", DEFAULT_ZONE_TABLE), DEFAULT_ZONEDEF_TABLE).expect("table");
        assert_eq!(counts.get("north"), Some(&2));
        assert_eq!(counts.get("south"), Some(&1));
    }

    #[test]
    fn repeated_contribution_is_not_double_counted() {
        let engine = engine_with_zones();
        let db = DbParams::new("mem", "test", "");
        init_zone_table(&engine, "eval", DEFAULT_ZONE_TABLE, &db).expect("init");
        run_zone_update(&engine, "eval", &[Zonation::default()], &config("r1")).expect("first");
        let again = run_zone_update(&engine, "eval", &[Zonation::default()], &config("r1")).expect("second");
        assert_eq!(again[0].update, ZoneUpdate::AlreadyCounted);
        let counts = engine.zone_counts(&TableRef::new("eval", DEFAULT_ZONE_TABLE), DEFAULT_ZONEDEF_TABLE).expect("table");
        assert_eq!(counts.get("north"), Some(&2));
    }

    #[test]
    fn two_definitions_into_one_table_both_count() {
        let engine = engine_with_zones();
        engine.insert_zone_defs(TableRef::new("eval", "ecoregions"),
                                vec![ZoneDef::new("eco_id", "north", Extent::new((0, 0), (19, 9)))]);
        let db = DbParams::new("mem", "test", "");
        init_zone_table(&engine, "eval", DEFAULT_ZONE_TABLE, &db).expect("init");
        let zonations = [Zonation::default(), Zonation::new("ecoregions", DEFAULT_ZONE_TABLE, "eco_id")];
        let out = run_zone_update(&engine, "eval", &zonations, &config("r1")).expect("update");
        assert!(out.iter().all(|o| o.update == ZoneUpdate::Applied), "{out:?}");

        let table = TableRef::new("eval", DEFAULT_ZONE_TABLE);
        // El mismo id de zona en dos definiciones no se mezcla.
        assert_eq!(engine.zone_counts(&table, DEFAULT_ZONEDEF_TABLE).expect("table").get("north"), Some(&2));
        assert_eq!(engine.zone_counts(&table, "ecoregions").expect("table").get("north"), Some(&3));

        let again = run_zone_update(&engine, "eval", &zonations, &config("r1")).expect("again");
        assert!(again.iter().all(|o| o.update == ZoneUpdate::AlreadyCounted), "{again:?}");
    }

    #[test]
    fn update_without_init_fails() {
        let engine = engine_with_zones();
        let err = run_zone_update(&engine, "eval", &[Zonation::default()], &config("r1")).unwrap_err();
        assert!(matches!(&err, EngineError::Step { step, .. } if step == "zone_update"));
    }
}
