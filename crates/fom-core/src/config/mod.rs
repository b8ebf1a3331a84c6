//! Configuración: INI por corrida y parámetros de conexión compartidos desde
//! el entorno (`.env` opcional).

pub mod ini;
pub mod run;

use std::env;

use dotenvy::dotenv;
use once_cell::sync::Lazy;

use crate::errors::ConfigLoadError;
pub use run::{load_batch, BatchLoad, DbParams, LoadPolicy, RunConfig, RunId};

// Carga perezosa del archivo .env una sola vez.
static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    let _ = dotenv(); // ignora error si no existe .env
});

/// Forzar carga temprana de .env desde aplicaciones externas si se desea.
pub fn init_dotenv() {
    Lazy::force(&DOTENV_LOADED);
}

impl DbParams {
    /// Lee `PGHOST`, `PGPORT`, `PGDATABASE`, `PGUSER`, `PGPASSWORD`.
    /// `PGDATABASE` y `PGUSER` son obligatorios.
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        init_dotenv();
        let required = |key: &str| env::var(key).map_err(|_| ConfigLoadError::Env(format!("{key} no definido")));
        let mut params = DbParams::new(required("PGDATABASE")?,
                                       required("PGUSER")?,
                                       env::var("PGPASSWORD").unwrap_or_default());
        if let Ok(host) = env::var("PGHOST") {
            params.host = host;
        }
        if let Ok(port) = env::var("PGPORT") {
            params.port = port.parse()
                              .map_err(|_| ConfigLoadError::Env(format!("PGPORT inválido: {port}")))?;
        }
        Ok(params)
    }
}
