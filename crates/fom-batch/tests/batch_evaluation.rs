//! Lotes completos sobre directorios temporales.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use fom_batch::{evaluate_batch, evaluate_zone_batch, BatchError, BatchOptions, ManifestJoinGap, RunStatus};
use fom_batch::report::ZoneRunStatus;
use fom_core::constants::{DEFAULT_ZONEDEF_TABLE, DEFAULT_ZONE_TABLE, MERGED_RASTER_TABLE};
use fom_core::engine::{FireEvent, ZoneDef};
use fom_core::mask::{Cell, Extent};
use fom_core::{Band, BinaryMask, DbParams, EngineError, InMemorySpatialEngine, LoadPolicy, PixelCounts, RunId, SpatialEngine, TableRef,
               ZoneUpdate, Zonation};

fn ini(run_id: &str, schema: &str) -> String {
    format!("[Run]\nrun_id = {run_id}\n\n[ConfirmBurnParameters]\nSpatialProximity = 5000\nTemporalProximity = 10\n\n[DataBaseInfo]\nDataBaseName = VIIRS_burned_area\nSchema = {schema}\nUserName = postgres\npassword = secret\n")
}

fn write_run(base: &Path, run_id: &str, schema: &str) {
    let dir = base.join(format!("run_{schema}"));
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("run.ini"), ini(run_id, schema)).expect("write ini");
}

fn write_manifest(base: &Path, ids: &[&str]) -> std::path::PathBuf {
    let mut text = String::from(",run_id\n");
    for (i, id) in ids.iter().enumerate() {
        text.push_str(&format!("{i},{id}\n"));
    }
    let path = base.join("runs.csv");
    fs::write(&path, text).expect("write manifest");
    path
}

fn priming() -> DbParams {
    DbParams::new("VIIRS_burned_area", "postgres", "")
}

fn gt() -> TableRef {
    TableRef::new("gt", "perimeters")
}

fn events(cells: &[Cell]) -> Vec<FireEvent> {
    cells.iter()
         .map(|&(r, c)| FireEvent::new(c as f64 * 375.0 + 187.5, r as f64 * 375.0 + 187.5, Band::I375))
         .collect()
}

fn options(workers: usize) -> BatchOptions {
    BatchOptions { workers,
                   ..BatchOptions::default() }
}

/// Motor que sólo responde conteos fijos por schema.
#[derive(Default)]
struct ScriptedEngine {
    counts: HashMap<String, PixelCounts>,
    primed: Mutex<Vec<TableRef>>,
}

impl ScriptedEngine {
    fn with(mut self, schema: &str, intersection: u64, union: u64) -> Self {
        self.counts.insert(schema.into(), PixelCounts { intersection, union });
        self
    }
}

impl SpatialEngine for ScriptedEngine {
    fn extract_mask_points(&self, _db: &DbParams, mask: &TableRef, _rast_col: &str, _geom_col: &str, _srid: i32) -> Result<(), EngineError> {
        self.primed.lock().unwrap().push(mask.clone());
        Ok(())
    }
    fn project_fire_events(&self, _db: &DbParams, _schema: &str, _srid: i32) -> Result<(), EngineError> {
        Ok(())
    }
    fn rasterize(&self, _db: &DbParams, _band: Band, _schema: &str, _gt: &TableRef, _proximity: f64) -> Result<(), EngineError> {
        Ok(())
    }
    fn merge_masks(&self, _db: &DbParams, _schema: &str) -> Result<(), EngineError> {
        Ok(())
    }
    fn table_exists(&self, _db: &DbParams, _table: &TableRef) -> Result<bool, EngineError> {
        Ok(true)
    }
    fn mask_sum(&self, _db: &DbParams, _schema: &str, _gt: &TableRef) -> Result<(), EngineError> {
        Ok(())
    }
    fn reset_mask_sum(&self, _db: &DbParams, _schema: &str) -> Result<(), EngineError> {
        Ok(())
    }
    fn pixel_counts(&self, _db: &DbParams, schema: &str) -> Result<PixelCounts, EngineError> {
        self.counts.get(schema).copied().ok_or_else(|| EngineError::Statement(format!("no counts for {schema}")))
    }
    fn zone_table_init(&self, _db: &DbParams, _zone_table: &TableRef, _srid: i32) -> Result<(), EngineError> {
        Ok(())
    }
    fn zone_table_update(&self, _db: &DbParams, _t: &TableRef, _d: &str, _s: &str, _c: &str) -> Result<ZoneUpdate, EngineError> {
        Ok(ZoneUpdate::Applied)
    }
}

#[test]
fn manifest_gets_fom_column_and_input_is_untouched() {
    let tmp = tempfile::tempdir().expect("tempdir");
    for (id, schema) in [("1", "s1"), ("2", "s2"), ("3", "s3")] {
        write_run(tmp.path(), id, schema);
    }
    let manifest = write_manifest(tmp.path(), &["1", "2", "3"]);
    let original = fs::read_to_string(&manifest).unwrap();
    let engine = ScriptedEngine::default().with("s1", 1, 2).with("s2", 0, 0).with("s3", 0, 4);

    let report = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(1)).expect("batch");

    assert_eq!(report.output, tmp.path().join("new_runs.csv"));
    assert_eq!(fs::read_to_string(&report.output).unwrap(),
               ",run_id,fom,fom_status\n0,1,0.5,ok\n1,2,,no_data\n2,3,0.0,ok\n");
    assert_eq!(fs::read_to_string(&manifest).unwrap(), original);
    assert_eq!(*engine.primed.lock().unwrap(), vec![gt()]);
    assert!(report.is_clean());
}

#[test]
fn parallel_and_sequential_batches_agree() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = InMemorySpatialEngine::new();
    engine.insert_mask(gt(), [(0, 0), (0, 1), (1, 1), (2, 2)].into_iter().collect::<BinaryMask>());
    let mut ids = Vec::new();
    for i in 0..12 {
        let schema = format!("s{i:02}");
        write_run(tmp.path(), &i.to_string(), &schema);
        let cells: Vec<Cell> = (0..=i % 4).map(|k| (k, k)).collect();
        engine.insert_fire_events(&schema, events(&cells));
        ids.push(i.to_string());
    }
    let id_refs: Vec<&str> = ids.iter().map(String::as_str).collect();
    let manifest = write_manifest(tmp.path(), &id_refs);

    let seq = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(1)).expect("sequential");
    let seq_csv = fs::read_to_string(&seq.output).unwrap();
    let par = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(4)).expect("parallel");
    let par_csv = fs::read_to_string(&par.output).unwrap();

    assert_eq!(seq_csv, par_csv);
    let statuses = |r: &fom_batch::BatchReport| r.outcomes.iter().map(|o| (o.run_id.clone(), o.status.clone())).collect::<Vec<_>>();
    assert_eq!(statuses(&seq), statuses(&par));
    assert_eq!(par.workers, 4);
    assert!(par.outcomes.iter().all(|o| matches!(o.status, RunStatus::Ok(_))));
}

#[test]
fn failing_run_is_reported_and_others_continue() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = InMemorySpatialEngine::new();
    engine.insert_mask(gt(), [(0, 0)].into_iter().collect::<BinaryMask>());
    for (id, schema) in [("1", "a"), ("2", "b")] {
        write_run(tmp.path(), id, schema);
        engine.insert_fire_events(schema, events(&[(0, 0)]));
    }
    engine.fail_on("a", "merge", "disk full");
    let manifest = write_manifest(tmp.path(), &["1", "2"]);

    let report = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(2)).expect("batch");

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].run_id, RunId::from(1));
    match &failed[0].status {
        RunStatus::Failed(msg) => assert!(msg.contains("merge") && msg.contains("disk full"), "{msg}"),
        other => panic!("unexpected {other:?}"),
    }
    let csv = fs::read_to_string(&report.output).unwrap();
    assert!(csv.contains("0,1,,failed: "), "{csv}");
    assert!(csv.contains("1,2,1.0,ok"), "{csv}");
    assert!(!report.is_clean());
}

#[test]
fn priming_failure_aborts_before_any_run() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = InMemorySpatialEngine::new();
    write_run(tmp.path(), "1", "a");
    engine.insert_fire_events("a", events(&[(0, 0)]));
    let manifest = write_manifest(tmp.path(), &["1"]);

    // Sin verdad de campo cargada.
    let err = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(1)).unwrap_err();
    assert!(matches!(err, BatchError::Priming(_)), "{err}");
    assert!(engine.journal("a").is_empty());
    assert!(!tmp.path().join("new_runs.csv").exists());
}

#[test]
fn join_gaps_are_reported() {
    let tmp = tempfile::tempdir().expect("tempdir");
    for (id, schema) in [("1", "s1"), ("5", "s5")] {
        write_run(tmp.path(), id, schema);
    }
    let manifest = write_manifest(tmp.path(), &["001", "2"]);
    let engine = ScriptedEngine::default().with("s1", 1, 1).with("s5", 1, 1);

    let report = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(1)).expect("batch");

    assert!(report.gaps.contains(&ManifestJoinGap::RunWithoutRow { run_id: RunId::from(5) }));
    assert!(report.gaps.contains(&ManifestJoinGap::RowWithoutRun { run_id: RunId::from(2), row: 1 }));
    let csv = fs::read_to_string(&report.output).unwrap();
    assert_eq!(csv, ",run_id,fom,fom_status\n0,001,1.0,ok\n1,2,,missing\n");
}

#[test]
fn invalid_config_is_skipped_or_fails_the_batch() {
    let tmp = tempfile::tempdir().expect("tempdir");
    write_run(tmp.path(), "1", "s1");
    let bad = tmp.path().join("run_bad");
    fs::create_dir_all(&bad).unwrap();
    fs::write(bad.join("run.ini"), "[DataBaseInfo]\nSchema = x\n").unwrap();
    let manifest = write_manifest(tmp.path(), &["1"]);
    let engine = ScriptedEngine::default().with("s1", 1, 3);

    let report = evaluate_batch(&engine, &manifest, &gt(), &priming(), &options(1)).expect("skip policy");
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].path.as_deref(), Some(bad.join("run.ini").as_path()));

    let strict = BatchOptions { load_policy: LoadPolicy::FailBatch,
                                ..options(1) };
    let err = evaluate_batch(&engine, &manifest, &gt(), &priming(), &strict).unwrap_err();
    assert!(matches!(err, BatchError::RejectedConfigs(ref v) if v.len() == 1), "{err}");
}

fn zone_fixture(tmp: &Path, runs: usize) -> InMemorySpatialEngine {
    let engine = InMemorySpatialEngine::new();
    engine.insert_zone_defs(TableRef::new("gt", DEFAULT_ZONEDEF_TABLE),
                            vec![ZoneDef::new("zone", "north", Extent::new((0, 0), (4, 9))),
                                 ZoneDef::new("zone", "south", Extent::new((5, 0), (9, 9))),]);
    for i in 0..runs {
        let schema = format!("z{i:02}");
        write_run(tmp, &i.to_string(), &schema);
        let cells: Vec<Cell> = vec![(i as i64 % 10, 0), (9, 9)];
        engine.insert_mask(TableRef::new(schema, MERGED_RASTER_TABLE), cells.into_iter().collect());
    }
    engine
}

fn expected_zone_counts(runs: usize) -> (u64, u64) {
    let north = (0..runs).filter(|i| i % 10 < 5).count() as u64;
    let south = (runs as u64 - north) + runs as u64;
    (north, south)
}

#[test]
fn zone_totals_do_not_depend_on_worker_count() {
    let zone_table = TableRef::new("gt", DEFAULT_ZONE_TABLE);
    let runs = 16;
    let (north, south) = expected_zone_counts(runs);
    for workers in [1, 4] {
        let tmp = tempfile::tempdir().expect("tempdir");
        let engine = zone_fixture(tmp.path(), runs);
        let report = evaluate_zone_batch(&engine, tmp.path(), "gt", &[Zonation::default()], &priming(), &options(workers)).expect("zones");
        assert!(report.is_clean(), "{:?}", report.outcomes);
        let counts = engine.zone_counts(&zone_table, DEFAULT_ZONEDEF_TABLE).expect("zone table");
        assert_eq!(counts.get("north"), Some(&north), "workers={workers}");
        assert_eq!(counts.get("south"), Some(&south), "workers={workers}");
    }
}

#[test]
fn zone_batch_initializes_each_table_once_and_reports_failures() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = zone_fixture(tmp.path(), 3);
    engine.fail_on("z01", "zone_update", "deadlock detected");
    let zonations = [Zonation::default(), Zonation::new(DEFAULT_ZONEDEF_TABLE, "eval_zone_counts_b", "zone"), Zonation::default()];

    let report = evaluate_zone_batch(&engine, tmp.path(), "gt", &zonations, &priming(), &options(2)).expect("zones");

    assert_eq!(report.zone_tables, vec![DEFAULT_ZONE_TABLE.to_string(), "eval_zone_counts_b".to_string()]);
    assert_eq!(engine.journal("gt").iter().filter(|op| **op == "zone_init").count(), 2);
    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].schema, "z01");
    let applied = report.outcomes
                        .iter()
                        .find(|o| o.schema == "z00")
                        .map(|o| o.status.clone())
                        .expect("z00");
    match applied {
        // La tercera zonificación repite la tabla: la corrida ya estaba contada.
        ZoneRunStatus::Applied(updates) => {
            let kinds: Vec<ZoneUpdate> = updates.iter().map(|u| u.update).collect();
            assert_eq!(kinds, vec![ZoneUpdate::Applied, ZoneUpdate::Applied, ZoneUpdate::AlreadyCounted]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn zone_init_failure_is_fatal() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let engine = zone_fixture(tmp.path(), 1);
    engine.fail_on("gt", "zone_init", "permission denied");
    let err = evaluate_zone_batch(&engine, tmp.path(), "gt", &[Zonation::default()], &priming(), &options(1)).unwrap_err();
    assert!(matches!(err, BatchError::ZoneInit(_)), "{err}");
    assert!(engine.journal("z00").is_empty());
}
