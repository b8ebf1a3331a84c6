//! Configuración de una corrida (`RunConfig`) y su carga por lotes.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::ini::IniDocument;
use crate::errors::ConfigLoadError;

/// Identificador de corrida normalizado en el borde: los valores con forma
/// de entero se guardan en su texto canónico (`"007"` -> `"7"`), el resto
/// recortado.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.parse::<i64>() {
            Ok(n) => RunId(n.to_string()),
            Err(_) => RunId(trimmed.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for RunId {
    fn from(n: i64) -> Self {
        RunId(n.to_string())
    }
}

impl From<&str> for RunId {
    fn from(s: &str) -> Self {
        RunId::normalize(s)
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parámetros de conexión al motor espacial. Viajan explícitos con cada
/// operación; no existe estado de conexión global.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbParams {
    pub host: String,
    pub port: u16,
    pub dbname: String,
    pub user: String,
    pub password: String,
}

impl DbParams {
    pub fn new(dbname: impl Into<String>, user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { host: "localhost".into(),
               port: 5432,
               dbname: dbname.into(),
               user: user.into(),
               password: password.into() }
    }

    /// Cadena de conexión libpq `clave=valor` (acepta espacios y comillas en
    /// los valores).
    pub fn conninfo(&self) -> String {
        format!("host={} port={} dbname={} user={} password={}",
                quote_conninfo(&self.host),
                self.port,
                quote_conninfo(&self.dbname),
                quote_conninfo(&self.user),
                quote_conninfo(&self.password))
    }
}

// El password nunca aparece en logs.
impl fmt::Debug for DbParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbParams")
         .field("host", &self.host)
         .field("port", &self.port)
         .field("dbname", &self.dbname)
         .field("user", &self.user)
         .field("password", &"***")
         .finish()
    }
}

fn quote_conninfo(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'"))
}

/// Configuración inmutable de una corrida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub run_id: RunId,
    /// Namespace del motor que aísla las tablas derivadas de esta corrida.
    pub schema: String,
    /// Distancia (metros) a un punto de fuego activo.
    pub spatial_proximity: f64,
    /// Ventana temporal (días).
    pub temporal_proximity: Option<u32>,
    pub run_dir: PathBuf,
    pub out_dir: Option<PathBuf>,
    pub db: DbParams,
}

impl RunConfig {
    /// Construye la configuración a partir del INI de `path`. Si el INI no
    /// declara `[Run] run_id`, se usa el nombre del directorio de la corrida.
    pub fn from_ini_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigLoadError::Io { path: path.to_path_buf(),
                                                                                    source })?;
        let run_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_ini(&IniDocument::parse(&text), path, run_dir)
    }

    pub fn from_ini(doc: &IniDocument, path: &Path, run_dir: PathBuf) -> Result<Self, ConfigLoadError> {
        let required = |section: &str, key: &str| {
            doc.get(section, key).ok_or_else(|| ConfigLoadError::MissingKey { path: path.to_path_buf(),
                                                                             section: section.to_string(),
                                                                             key: key.to_string() })
        };
        let invalid = |key: &str, value: &str| ConfigLoadError::InvalidValue { path: path.to_path_buf(),
                                                                                key: key.to_string(),
                                                                                value: value.to_string() };

        let run_id = match doc.get("Run", "run_id") {
            Some(raw) => RunId::normalize(raw),
            None => {
                let name = run_dir.file_name().and_then(|n| n.to_str()).ok_or_else(|| ConfigLoadError::MissingKey { path: path.to_path_buf(),
                                                                                                                      section: "Run".into(),
                                                                                                                      key: "run_id".into() })?;
                RunId::normalize(name)
            }
        };

        let schema = required("DataBaseInfo", "Schema")?.to_string();
        let proximity_raw = required("ConfirmBurnParameters", "SpatialProximity")?;
        let spatial_proximity = proximity_raw.parse::<f64>()
                                             .ok()
                                             .filter(|v| v.is_finite() && *v >= 0.0)
                                             .ok_or_else(|| invalid("SpatialProximity", proximity_raw))?;
        let temporal_proximity = match doc.get("ConfirmBurnParameters", "TemporalProximity") {
            Some(raw) => Some(raw.parse::<u32>().map_err(|_| invalid("TemporalProximity", raw))?),
            None => None,
        };

        let mut db = DbParams::new(required("DataBaseInfo", "DataBaseName")?,
                                   required("DataBaseInfo", "UserName")?,
                                   doc.get("DataBaseInfo", "password").unwrap_or_default());
        if let Some(host) = doc.get("DataBaseInfo", "Host") {
            db.host = host.to_string();
        }
        if let Some(port) = doc.get("DataBaseInfo", "Port") {
            db.port = port.parse().map_err(|_| invalid("Port", port))?;
        }

        Ok(RunConfig { run_id,
                       schema,
                       spatial_proximity,
                       temporal_proximity,
                       out_dir: doc.get("OutputFlags", "OutShapeDir").map(PathBuf::from),
                       run_dir,
                       db })
    }
}

/// Política ante un directorio de corrida con configuración inválida.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LoadPolicy {
    /// Omitir la corrida y reportarla.
    #[default]
    Skip,
    /// Fallar el lote completo.
    FailBatch,
}

/// Resultado de cargar un lote: configuraciones válidas más los directorios
/// que no se pudieron cargar.
#[derive(Debug, Default)]
pub struct BatchLoad {
    pub configs: Vec<RunConfig>,
    pub failures: Vec<ConfigLoadError>,
}

/// Descubre los directorios de corrida bajo `base_dir` (subdirectorios
/// inmediatos con al menos un `*.ini`) y carga cada configuración, en orden
/// lexicográfico de directorio.
///
/// Los subdirectorios sin `*.ini` no son corridas y se ignoran; un `*.ini`
/// que no se puede interpretar se registra en `failures`.
pub fn load_batch(base_dir: &Path) -> Result<BatchLoad, ConfigLoadError> {
    let io_err = |source| ConfigLoadError::Io { path: base_dir.to_path_buf(),
                                                source };
    let mut dirs: Vec<PathBuf> = fs::read_dir(base_dir).map_err(io_err)?
                                                       .filter_map(|e| e.ok())
                                                       .map(|e| e.path())
                                                       .filter(|p| p.is_dir())
                                                       .collect();
    dirs.sort();

    let mut load = BatchLoad::default();
    for dir in dirs {
        let ini = match first_ini_file(&dir) {
            Ok(Some(path)) => path,
            Ok(None) => {
                debug!("load_batch: skip {} (no *.ini)", dir.display());
                continue;
            }
            Err(e) => {
                warn!("load_batch: unreadable run dir: {e}");
                load.failures.push(e);
                continue;
            }
        };
        match RunConfig::from_ini_file(&ini) {
            Ok(cfg) => {
                debug!("load_batch: run_id={} schema={} file={}", cfg.run_id, cfg.schema, ini.display());
                load.configs.push(cfg);
            }
            Err(e) => {
                warn!("load_batch: invalid configuration: {e}");
                load.failures.push(e);
            }
        }
    }
    Ok(load)
}

fn first_ini_file(dir: &Path) -> Result<Option<PathBuf>, ConfigLoadError> {
    let entries = fs::read_dir(dir).map_err(|source| ConfigLoadError::Io { path: dir.to_path_buf(),
                                                                           source })?;
    let mut inis: Vec<PathBuf> = entries.filter_map(|e| e.ok())
                                        .map(|e| e.path())
                                        .filter(|p| p.is_file() && p.extension().is_some_and(|x| x.eq_ignore_ascii_case("ini")))
                                        .collect();
    inis.sort();
    Ok(inis.into_iter().next())
}
