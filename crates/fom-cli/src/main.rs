//! fom-cli: evaluación por lotes contra PostGIS.
//!
//! Conexión compartida (priming / init de zonas) desde `PG*` (.env opcional).
//! Reporte JSON en stdout. Códigos de salida: 0 todo ok, 3 corridas fallidas
//! u omitidas, 2 uso incorrecto, 1 error fatal del lote.

mod args;

use std::process::ExitCode;

use fom_batch::{evaluate_batch, evaluate_zone_batch, BatchOptions};
use fom_core::{DbParams, TableRef};
use fom_persistence::PgSpatialEngine;
use log::error;
use serde::Serialize;

use crate::args::{parse, Command, USAGE};

fn setup_logging() -> Result<flexi_logger::LoggerHandle, flexi_logger::FlexiLoggerError> {
    flexi_logger::Logger::try_with_env_or_str("info")?.log_to_stderr().start()
}

fn print_report<T: Serialize>(report: &T) -> Result<(), serde_json::Error> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}

fn run(command: Command) -> Result<bool, String> {
    let shared = DbParams::from_env().map_err(|e| e.to_string())?;
    let engine = PgSpatialEngine::new();
    match command {
        Command::Fom { manifest,
                       gt_schema,
                       gt_table,
                       workers,
                       load_policy, } => {
            let options = BatchOptions { workers, load_policy };
            let gt = TableRef::new(gt_schema, gt_table);
            let report = evaluate_batch(&engine, &manifest, &gt, &shared, &options).map_err(|e| e.to_string())?;
            print_report(&report).map_err(|e| e.to_string())?;
            Ok(report.is_clean())
        }
        Command::Zones { base_dir,
                         zone_schema,
                         zonations,
                         workers,
                         load_policy, } => {
            let options = BatchOptions { workers, load_policy };
            let report = evaluate_zone_batch(&engine, &base_dir, &zone_schema, &zonations, &shared, &options).map_err(|e| e.to_string())?;
            print_report(&report).map_err(|e| e.to_string())?;
            Ok(report.is_clean())
        }
    }
}

fn main() -> ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse(&argv) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("[fom-cli] {msg}\n{USAGE}");
            return ExitCode::from(2);
        }
    };
    // El handle debe vivir hasta el final para no perder registros.
    let _logger = match setup_logging() {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("[fom-cli] logger: {e}");
            None
        }
    };
    match run(command) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(3),
        Err(e) => {
            error!("fom-cli: {e}");
            eprintln!("[fom-cli] error: {e}");
            ExitCode::from(1)
        }
    }
}
