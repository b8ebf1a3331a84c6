//! Implementación PostGIS de `SpatialEngine`.
//!
//! Cada operación es una llamada al gateway (una conexión, una transacción).
//! Los nombres de schema/tabla que son argumentos de las funciones `viirs_*`
//! viajan como parámetros de texto; los que aparecen como identificadores en
//! el SQL se citan con `quote_ident`.
//!
//! Funciones del servidor usadas:
//! - `viirs_get_mask_pts(schema, table, rast_col, geom_col, srid)`
//! - `viirs_nlcd_geom(schema, 'fire_events', srid)`
//! - `viirs_rasterize_750 / _375(schema, gt_schema, gt_table, proximity)`
//! - `viirs_rasterize_merge(schema)`
//! - `viirs_mask_sum(schema, gt_schema, gt_table)`
//! - `viirs_zonetbl_init(zone_schema, zone_table, srid)`
//! - `viirs_zonetbl_run(zone_schema, zone_table, zonedef_table, run_schema, zone_col)`

use diesel::sql_types::{BigInt, Bool};
use diesel::QueryableByName;
use fom_core::constants::{FIRE_EVENTS_TABLE, MASK_SUM_TABLE, ZONE_LEDGER_SUFFIX};
use fom_core::{Band, DbParams, EngineError, PixelCounts, SpatialEngine, TableRef, ZoneUpdate};
use log::debug;

use crate::gateway::{execute, execute_all, qualified, query, query_one, Statement};

#[derive(QueryableByName, Debug)]
struct PresentRow {
    #[diesel(sql_type = Bool)]
    present: bool,
}

#[derive(QueryableByName, Debug)]
struct CountsRow {
    #[diesel(sql_type = BigInt)]
    intersection: i64,
    #[diesel(sql_type = BigInt)]
    union_count: i64,
}

#[derive(QueryableByName, Debug)]
struct AppliedRow {
    #[diesel(sql_type = Bool)]
    applied: bool,
}

/// Motor PostGIS. Sin estado: los parámetros de conexión llegan en cada
/// llamada con la configuración de la corrida.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgSpatialEngine;

impl PgSpatialEngine {
    pub fn new() -> Self {
        Self
    }
}

/// Reducción del raster de comparación: pixeles == 2 y pixeles > 0.
pub(crate) fn pixel_counts_sql(schema: &str) -> String {
    format!("SELECT COALESCE(SUM((vc).count) FILTER (WHERE (vc).value = 2), 0)::bigint AS intersection, \
             COALESCE(SUM((vc).count) FILTER (WHERE (vc).value > 0), 0)::bigint AS union_count \
             FROM (SELECT ST_ValueCount(rast, 1, true) AS vc FROM {}) AS counts",
            qualified(schema, MASK_SUM_TABLE))
}

fn ledger_table(zone_table: &TableRef) -> String {
    qualified(&zone_table.schema, &format!("{}{}", zone_table.table, ZONE_LEDGER_SUFFIX))
}

/// Reclamo en el ledger + incremento por zona en UNA sentencia: la función
/// sólo corre si el INSERT reclamó la fila `(corrida, definición)`.
pub(crate) fn zone_update_sql(zone_table: &TableRef) -> String {
    let ledger = ledger_table(zone_table);
    format!("WITH claim AS (INSERT INTO {ledger} (run_schema, zonedef_table) VALUES ($4, $3) ON CONFLICT DO NOTHING RETURNING run_schema) \
             SELECT true AS applied, viirs_zonetbl_run($1, $2, $3, claim.run_schema, $5) AS zone_run FROM claim")
}

/// Tabla de resultados + ledger recreados juntos.
pub(crate) fn zone_init_statements(zone_table: &TableRef, srid: i32) -> Vec<Statement> {
    let ledger = ledger_table(zone_table);
    vec![Statement::new("SELECT viirs_zonetbl_init($1, $2, $3)").text(&zone_table.schema)
                                                                .text(&zone_table.table)
                                                                .int(srid),
         Statement::new(format!("DROP TABLE IF EXISTS {ledger}")),
         Statement::new(format!("CREATE TABLE {ledger} (run_schema text NOT NULL, zonedef_table text NOT NULL, \
                                 counted_at timestamptz NOT NULL DEFAULT now(), PRIMARY KEY (run_schema, zonedef_table))")),]
}

pub(crate) fn reset_mask_sum_statements(schema: &str) -> Vec<Statement> {
    let table = qualified(schema, MASK_SUM_TABLE);
    vec![Statement::new(format!("DROP TABLE IF EXISTS {table}")),
         Statement::new(format!("CREATE TABLE {table} (rid serial PRIMARY KEY, rast raster)")),]
}

impl SpatialEngine for PgSpatialEngine {
    fn extract_mask_points(&self, db: &DbParams, mask: &TableRef, rast_col: &str, geom_col: &str, srid: i32) -> Result<(), EngineError> {
        let stmt = Statement::new("SELECT viirs_get_mask_pts($1, $2, $3, $4, $5)").text(&mask.schema)
                                                                                  .text(&mask.table)
                                                                                  .text(rast_col)
                                                                                  .text(geom_col)
                                                                                  .int(srid);
        execute(db, &stmt)
    }

    fn project_fire_events(&self, db: &DbParams, schema: &str, srid: i32) -> Result<(), EngineError> {
        let stmt = Statement::new("SELECT viirs_nlcd_geom($1, $2, $3)").text(schema)
                                                                       .text(FIRE_EVENTS_TABLE)
                                                                       .int(srid);
        execute(db, &stmt)
    }

    fn rasterize(&self, db: &DbParams, band: Band, schema: &str, ground_truth: &TableRef, proximity: f64) -> Result<(), EngineError> {
        if !proximity.is_finite() {
            return Err(EngineError::Statement(format!("invalid proximity {proximity}")));
        }
        let function = match band {
            Band::M750 => "viirs_rasterize_750",
            Band::I375 => "viirs_rasterize_375",
        };
        // La distancia va como literal numérico: su tipo lo resuelve la firma
        // de la función del servidor.
        let stmt = Statement::new(format!("SELECT {function}($1, $2, $3, {proximity})")).text(schema)
                                                                                        .text(&ground_truth.schema)
                                                                                        .text(&ground_truth.table);
        execute(db, &stmt)
    }

    fn merge_masks(&self, db: &DbParams, schema: &str) -> Result<(), EngineError> {
        execute(db, &Statement::new("SELECT viirs_rasterize_merge($1)").text(schema))
    }

    fn table_exists(&self, db: &DbParams, table: &TableRef) -> Result<bool, EngineError> {
        let stmt = Statement::new("SELECT EXISTS (SELECT 1 FROM information_schema.tables WHERE table_schema = $1 AND table_name = $2) AS present")
            .text(&table.schema)
            .text(&table.table);
        let row: PresentRow = query_one(db, &stmt)?;
        debug!("table_exists: {table} -> {}", row.present);
        Ok(row.present)
    }

    fn mask_sum(&self, db: &DbParams, schema: &str, ground_truth: &TableRef) -> Result<(), EngineError> {
        let stmt = Statement::new("SELECT viirs_mask_sum($1, $2, $3)").text(schema)
                                                                      .text(&ground_truth.schema)
                                                                      .text(&ground_truth.table);
        execute(db, &stmt)
    }

    fn reset_mask_sum(&self, db: &DbParams, schema: &str) -> Result<(), EngineError> {
        execute_all(db, &reset_mask_sum_statements(schema))
    }

    fn pixel_counts(&self, db: &DbParams, schema: &str) -> Result<PixelCounts, EngineError> {
        let row: CountsRow = query_one(db, &Statement::new(pixel_counts_sql(schema)))?;
        if row.intersection < 0 || row.union_count < 0 {
            return Err(EngineError::Malformed(format!("negative pixel counts ({}, {})", row.intersection, row.union_count)));
        }
        Ok(PixelCounts { intersection: row.intersection as u64,
                         union: row.union_count as u64 })
    }

    fn zone_table_init(&self, db: &DbParams, zone_table: &TableRef, srid: i32) -> Result<(), EngineError> {
        execute_all(db, &zone_init_statements(zone_table, srid))
    }

    fn zone_table_update(&self,
                         db: &DbParams,
                         zone_table: &TableRef,
                         zonedef_table: &str,
                         run_schema: &str,
                         zone_column: &str)
                         -> Result<ZoneUpdate, EngineError> {
        let stmt = Statement::new(zone_update_sql(zone_table)).text(&zone_table.schema)
                                                               .text(&zone_table.table)
                                                               .text(zonedef_table)
                                                               .text(run_schema)
                                                               .text(zone_column);
        let rows: Vec<AppliedRow> = query(db, &stmt)?;
        match rows.as_slice() {
            [] => Ok(ZoneUpdate::AlreadyCounted),
            [row] if row.applied => Ok(ZoneUpdate::Applied),
            _ => Err(EngineError::Malformed(format!("unexpected zone update result ({} rows)", rows.len()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_counts_reads_the_run_schema() {
        let sql = pixel_counts_sql("run_7");
        assert!(sql.contains("FROM \"run_7\".\"mask_sum\""));
        assert!(sql.contains("AS intersection"));
        assert!(sql.contains("AS union_count"));
    }

    #[test]
    fn zone_update_claims_the_ledger_first() {
        let sql = zone_update_sql(&TableRef::new("eval", "eval_zone_counts"));
        assert!(sql.starts_with("WITH claim AS (INSERT INTO \"eval\".\"eval_zone_counts_runs\""));
        assert!(sql.contains("ON CONFLICT DO NOTHING"));
        assert!(sql.contains("(run_schema, zonedef_table) VALUES ($4, $3)"));
        assert!(sql.contains("viirs_zonetbl_run($1, $2, $3, claim.run_schema, $5)"));
    }

    #[test]
    fn ledger_is_keyed_by_run_and_definition() {
        let stmts = zone_init_statements(&TableRef::new("eval", "eval_zone_counts"), 96630);
        assert_eq!(stmts.len(), 3);
        assert_eq!(stmts[0].binds[2], crate::gateway::Bind::Int(96630));
        assert_eq!(stmts[1].sql, "DROP TABLE IF EXISTS \"eval\".\"eval_zone_counts_runs\"");
        assert!(stmts[2].sql.contains("PRIMARY KEY (run_schema, zonedef_table)"));
    }

    #[test]
    fn mask_sum_reset_is_drop_then_create() {
        let stmts = reset_mask_sum_statements("run_7");
        let sql: Vec<&str> = stmts.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(sql,
                   vec!["DROP TABLE IF EXISTS \"run_7\".\"mask_sum\"",
                        "CREATE TABLE \"run_7\".\"mask_sum\" (rid serial PRIMARY KEY, rast raster)"]);
    }
}
