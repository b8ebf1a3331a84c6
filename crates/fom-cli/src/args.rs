//! Argumentos de línea de comandos.
//!
//! `fom-cli fom <manifest.csv> <gt_schema> <gt_table> [--workers N] [--skip-bad-configs]`
//! `fom-cli zones <base_dir> <zone_schema> [--workers N] [--skip-bad-configs] [--zone DEF:TABLA:COLUMNA]...`

use std::path::PathBuf;

use fom_core::{LoadPolicy, Zonation};

pub const USAGE: &str = "Uso:\n  fom-cli fom <manifest.csv> <gt_schema> <gt_table> [--workers N] [--skip-bad-configs]\n  fom-cli zones <base_dir> <zone_schema> [--workers N] [--skip-bad-configs] [--zone DEF:TABLA:COLUMNA]...";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Fom {
        manifest: PathBuf,
        gt_schema: String,
        gt_table: String,
        workers: usize,
        load_policy: LoadPolicy,
    },
    Zones {
        base_dir: PathBuf,
        zone_schema: String,
        zonations: Vec<Zonation>,
        workers: usize,
        load_policy: LoadPolicy,
    },
}

pub fn parse(args: &[String]) -> Result<Command, String> {
    let (sub, rest) = args.split_first().ok_or("falta subcomando")?;
    let mut positional: Vec<&str> = Vec::new();
    let mut workers = 1usize;
    let mut load_policy = LoadPolicy::FailBatch;
    let mut zonations = Vec::new();
    let mut i = 0;
    while i < rest.len() {
        match rest[i].as_str() {
            "--workers" => {
                i += 1;
                let raw = rest.get(i).ok_or("--workers requiere un valor")?;
                workers = raw.parse::<usize>()
                             .ok()
                             .filter(|n| *n >= 1)
                             .ok_or_else(|| format!("--workers inválido: {raw}"))?;
            }
            "--skip-bad-configs" => load_policy = LoadPolicy::Skip,
            "--zone" => {
                i += 1;
                let raw = rest.get(i).ok_or("--zone requiere un valor")?;
                zonations.push(parse_zonation(raw)?);
            }
            flag if flag.starts_with("--") => return Err(format!("opción desconocida: {flag}")),
            value => positional.push(value),
        }
        i += 1;
    }

    match (sub.as_str(), positional.as_slice()) {
        ("fom", [manifest, gt_schema, gt_table]) => {
            if !zonations.is_empty() {
                return Err("--zone sólo aplica a `zones`".into());
            }
            Ok(Command::Fom { manifest: PathBuf::from(*manifest),
                              gt_schema: gt_schema.to_string(),
                              gt_table: gt_table.to_string(),
                              workers,
                              load_policy })
        }
        ("zones", [base_dir, zone_schema]) => {
            if zonations.is_empty() {
                zonations.push(Zonation::default());
            }
            Ok(Command::Zones { base_dir: PathBuf::from(*base_dir),
                                zone_schema: zone_schema.to_string(),
                                zonations,
                                workers,
                                load_policy })
        }
        ("fom", _) | ("zones", _) => Err(format!("número de argumentos incorrecto para `{sub}`")),
        (other, _) => Err(format!("subcomando desconocido: {other}")),
    }
}

fn parse_zonation(raw: &str) -> Result<Zonation, String> {
    match raw.split(':').collect::<Vec<_>>().as_slice() {
        [def, table, column] if !def.is_empty() && !table.is_empty() && !column.is_empty() => Ok(Zonation::new(*def, *table, *column)),
        _ => Err(format!("--zone espera DEF:TABLA:COLUMNA, recibido {raw}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_fom_with_options() {
        let cmd = parse(&args("fom /data/runs.csv gt perimeters --workers 4 --skip-bad-configs")).expect("parse");
        assert_eq!(cmd,
                   Command::Fom { manifest: PathBuf::from("/data/runs.csv"),
                                  gt_schema: "gt".into(),
                                  gt_table: "perimeters".into(),
                                  workers: 4,
                                  load_policy: LoadPolicy::Skip });
    }

    #[test]
    fn zones_defaults_to_standard_zonation() {
        match parse(&args("zones /data gt")).expect("parse") {
            Command::Zones { zonations, workers, load_policy, .. } => {
                assert_eq!(zonations, vec![Zonation::default()]);
                assert_eq!((workers, load_policy), (1, LoadPolicy::FailBatch));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zones_accepts_explicit_zonations() {
        match parse(&args("zones /data gt --zone ecoregions:eco_counts:eco_id --zone d:t:c")).expect("parse") {
            Command::Zones { zonations, .. } => {
                assert_eq!(zonations, vec![Zonation::new("ecoregions", "eco_counts", "eco_id"), Zonation::new("d", "t", "c")]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&args("fom runs.csv gt")).is_err());
        assert!(parse(&args("fom runs.csv gt t --workers 0")).is_err());
        assert!(parse(&args("fom runs.csv gt t --verbose")).is_err());
        assert!(parse(&args("zones /data gt --zone a:b")).is_err());
        assert!(parse(&args("retry")).is_err());
        assert!(parse(&[]).is_err());
    }
}
