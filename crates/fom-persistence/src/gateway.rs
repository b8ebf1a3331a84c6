//! Query gateway: una conexión por llamada, una transacción, commit, cierre.
//! `execute_all` agrupa varias sentencias en esa misma transacción.
//!
//! No hay pool ni reintentos: cada llamada es autocontenida y falla de forma
//! independiente, así un paso fallido no deja una transacción abierta que
//! afecte al siguiente. La conexión se cierra al salir de la función en
//! cualquier camino (drop de `PgConnection`).

use std::time::Instant;

use diesel::pg::{Pg, PgConnection};
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{Double, Integer, Text};
use fom_core::{DbParams, EngineError};
use log::{debug, error};

use crate::error::PersistenceError;

/// Valor ligado a un placeholder `$n`.
#[derive(Debug, Clone, PartialEq)]
pub enum Bind {
    Text(String),
    Int(i32),
    Double(f64),
}

/// Sentencia SQL con sus parámetros, en orden de placeholder.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub binds: Vec<Bind>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(),
               binds: Vec::new() }
    }

    pub fn text(mut self, value: impl Into<String>) -> Self {
        self.binds.push(Bind::Text(value.into()));
        self
    }

    pub fn int(mut self, value: i32) -> Self {
        self.binds.push(Bind::Int(value));
        self
    }

    pub fn double(mut self, value: f64) -> Self {
        self.binds.push(Bind::Double(value));
        self
    }

    fn boxed(&self) -> BoxedSqlQuery<'static, Pg, SqlQuery> {
        let mut q = diesel::sql_query(self.sql.clone()).into_boxed::<Pg>();
        for b in &self.binds {
            q = match b {
                Bind::Text(v) => q.bind::<Text, _>(v.clone()),
                Bind::Int(v) => q.bind::<Integer, _>(*v),
                Bind::Double(v) => q.bind::<Double, _>(*v),
            };
        }
        q
    }
}

/// Cita un identificador SQL (schema, tabla) con comillas dobles.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// `schema.tabla` con ambos identificadores citados.
pub fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn connect(db: &DbParams) -> Result<PgConnection, PersistenceError> {
    PgConnection::establish(&db.conninfo()).map_err(PersistenceError::from)
}

/// Ejecuta una sentencia sin filas de resultado y la confirma.
pub fn execute(db: &DbParams, stmt: &Statement) -> Result<(), EngineError> {
    debug!("execute:start db={} sql={}", db.dbname, stmt.sql);
    let started = Instant::now();
    let result = connect(db).and_then(|mut conn| {
                                conn.transaction(|tx| stmt.boxed().execute(tx))
                                    .map_err(PersistenceError::from)
                            });
    match result {
        Ok(_) => {
            debug!("execute:done db={} elapsed_ms={}", db.dbname, started.elapsed().as_millis());
            Ok(())
        }
        Err(e) => {
            error!("execute:error db={} sql={} err={e}", db.dbname, stmt.sql);
            Err(e.into())
        }
    }
}

/// Ejecuta varias sentencias en una sola transacción: o se confirman todas o
/// ninguna.
pub fn execute_all(db: &DbParams, stmts: &[Statement]) -> Result<(), EngineError> {
    debug!("execute_all:start db={} statements={}", db.dbname, stmts.len());
    let started = Instant::now();
    let result = connect(db).and_then(|mut conn| {
                                conn.transaction(|tx| {
                                        for stmt in stmts {
                                            stmt.boxed().execute(tx)?;
                                        }
                                        Ok::<_, diesel::result::Error>(())
                                    })
                                    .map_err(PersistenceError::from)
                            });
    match result {
        Ok(()) => {
            debug!("execute_all:done db={} elapsed_ms={}", db.dbname, started.elapsed().as_millis());
            Ok(())
        }
        Err(e) => {
            let sql: Vec<&str> = stmts.iter().map(|s| s.sql.as_str()).collect();
            error!("execute_all:error db={} sql={sql:?} err={e}", db.dbname);
            Err(e.into())
        }
    }
}

/// Ejecuta una sentencia, la confirma y devuelve todas sus filas.
pub fn query<T>(db: &DbParams, stmt: &Statement) -> Result<Vec<T>, EngineError>
    where T: QueryableByName<Pg> + 'static
{
    debug!("query:start db={} sql={}", db.dbname, stmt.sql);
    let started = Instant::now();
    let result = connect(db).and_then(|mut conn| {
                                conn.transaction(|tx| stmt.boxed().load::<T>(tx))
                                    .map_err(PersistenceError::from)
                            });
    match result {
        Ok(rows) => {
            debug!("query:done db={} rows={} elapsed_ms={}", db.dbname, rows.len(), started.elapsed().as_millis());
            Ok(rows)
        }
        Err(e) => {
            error!("query:error db={} sql={} err={e}", db.dbname, stmt.sql);
            Err(e.into())
        }
    }
}

/// Variante de `query` para reducciones escalares: exactamente una fila.
pub fn query_one<T>(db: &DbParams, stmt: &Statement) -> Result<T, EngineError>
    where T: QueryableByName<Pg> + 'static
{
    let mut rows = query::<T>(db, stmt)?;
    match rows.len() {
        1 => Ok(rows.remove(0)),
        n => Err(EngineError::Malformed(format!("expected one row, got {n}"))),
    }
}
