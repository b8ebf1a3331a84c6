//! Manifest de corridas: CSV con encabezado, primera columna índice de fila
//! y una columna `run_id`. La salida es una copia con las columnas `fom` y
//! `fom_status` agregadas (o reemplazadas), escrita junto a la entrada como
//! `new_<nombre>`. La entrada nunca se modifica.
//!
//! Filas más cortas que el encabezado se completan con celdas vacías; filas
//! más largas se rechazan al cargar.

use std::path::{Path, PathBuf};

use csv::StringRecord;
use fom_core::constants::OUTPUT_MANIFEST_PREFIX;
use fom_core::RunId;
use log::{debug, info};

use crate::error::BatchError;

pub const RUN_ID_COLUMN: &str = "run_id";
pub const FOM_COLUMN: &str = "fom";
pub const FOM_STATUS_COLUMN: &str = "fom_status";

/// Celda de resultado para una fila del manifest. `fom == None` se escribe
/// como celda vacía.
#[derive(Debug, Clone, PartialEq)]
pub struct FomCell {
    pub fom: Option<f64>,
    pub status: String,
}

#[derive(Debug, Clone)]
pub struct RunManifest {
    path: PathBuf,
    headers: StringRecord,
    rows: Vec<StringRecord>,
    run_id_col: usize,
}

impl RunManifest {
    pub fn load(path: &Path) -> Result<Self, BatchError> {
        let csv_err = |source| BatchError::Csv { path: path.to_path_buf(),
                                                 source };
        let mut reader = csv::ReaderBuilder::new().has_headers(true)
                                                  .flexible(true)
                                                  .from_path(path)
                                                  .map_err(csv_err)?;
        let headers = reader.headers().map_err(csv_err)?.clone();
        let run_id_col = headers.iter()
                                .position(|h| h.trim() == RUN_ID_COLUMN)
                                .ok_or_else(|| BatchError::MissingRunIdColumn(path.to_path_buf()))?;
        let rows = reader.records().collect::<Result<Vec<_>, _>>().map_err(csv_err)?;
        for (i, row) in rows.iter().enumerate() {
            if row.len() > headers.len() {
                return Err(BatchError::MalformedRow { path: path.to_path_buf(),
                                                      line: row.position().map_or(i as u64 + 2, |p| p.line()),
                                                      fields: row.len(),
                                                      expected: headers.len() });
            }
        }
        debug!("manifest: {} rows from {}", rows.len(), path.display());
        Ok(Self { path: path.to_path_buf(),
                  headers,
                  rows,
                  run_id_col })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// `run_id` de cada fila, normalizado, en orden de fila.
    pub fn run_ids(&self) -> Vec<RunId> {
        self.rows
            .iter()
            .map(|r| RunId::normalize(r.get(self.run_id_col).unwrap_or_default()))
            .collect()
    }

    /// `new_<nombre>` en el mismo directorio que la entrada.
    pub fn output_path(&self) -> Result<PathBuf, BatchError> {
        let name = self.path
                       .file_name()
                       .and_then(|n| n.to_str())
                       .ok_or_else(|| BatchError::Io { path: self.path.clone(),
                                                       source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "manifest path has no file name") })?;
        Ok(self.path.with_file_name(format!("{OUTPUT_MANIFEST_PREFIX}{name}")))
    }

    /// Escribe la copia aumentada; `cells[i]` corresponde a la fila `i`.
    pub fn write_with_fom(&self, cells: &[FomCell]) -> Result<PathBuf, BatchError> {
        let out = self.output_path()?;
        if out == self.path {
            return Err(BatchError::WouldOverwriteInput(out));
        }
        let csv_err = |source| BatchError::Csv { path: out.clone(),
                                                 source };

        let mut headers: Vec<String> = self.headers.iter().map(str::to_string).collect();
        let fom_col = column_index(&mut headers, FOM_COLUMN);
        let status_col = column_index(&mut headers, FOM_STATUS_COLUMN);

        let mut writer = csv::Writer::from_path(&out).map_err(csv_err)?;
        writer.write_record(&headers).map_err(csv_err)?;
        for (i, row) in self.rows.iter().enumerate() {
            let mut fields: Vec<String> = row.iter().map(str::to_string).collect();
            fields.resize(headers.len(), String::new());
            let cell = cells.get(i);
            fields[fom_col] = cell.and_then(|c| c.fom).map(format_fom).unwrap_or_default();
            fields[status_col] = cell.map(|c| c.status.clone()).unwrap_or_default();
            writer.write_record(&fields).map_err(csv_err)?;
        }
        writer.flush().map_err(|source| BatchError::Io { path: out.clone(),
                                                         source })?;
        info!("manifest: wrote {} rows to {}", self.rows.len(), out.display());
        Ok(out)
    }
}

/// Valores enteros conservan un decimal (`0.0`, `1.0`) para que la columna
/// se lea siempre como flotante.
fn format_fom(v: f64) -> String {
    if v.fract() == 0.0 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

fn column_index(headers: &mut Vec<String>, name: &str) -> usize {
    match headers.iter().position(|h| h.trim() == name) {
        Some(i) => i,
        None => {
            headers.push(name.to_string());
            headers.len() - 1
        }
    }
}
