use chrono::{Local, NaiveDate};
use coloc_processor::models::{ColocatedResult, ObsKind, TsType};
use coloc_processor::processors::{ColocationRunner, JobState};
use coloc_processor::readers::ReaderCatalog;
use coloc_processor::setup::{ColocationSetup, SetupOverrides};
use coloc_processor::utils::filename::run_log_path;
use coloc_processor::writers::ColocatedWriter;
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const MONTHS: [&str; 3] = ["2010-01-01", "2010-02-01", "2010-03-01"];

/// Long-format grid file on a 2 x 2 grid with a constant value
fn write_grid(dir: &Path, file_name: &str, dates: &[&str], value: f64) {
    let mut content = String::from("time,latitude,longitude,value\n");
    for date in dates {
        for lat in [-45.0, 45.0] {
            for lon in [0.0, 90.0] {
                content.push_str(&format!("{},{},{},{}\n", date, lat, lon, value));
            }
        }
    }
    fs::write(dir.join(file_name), content).unwrap();
}

/// Data root with a gridded model (TM5), gridded obs (MODIS) and station obs (AERONET)
fn data_root() -> TempDir {
    let root = TempDir::new().unwrap();

    let tm5 = root.path().join("TM5");
    fs::create_dir_all(&tm5).unwrap();
    fs::write(tm5.join("variables.csv"), "var_name,units\nconcpm10,ug m-3\n").unwrap();
    write_grid(&tm5, "od550aer_monthly_Column.csv", &MONTHS, 0.25);
    write_grid(&tm5, "od550so4_monthly.csv", &MONTHS, 0.1);
    write_grid(&tm5, "od550oa_monthly.csv", &MONTHS, 0.15);
    // outside the analysis period
    write_grid(&tm5, "concpm10_monthly.csv", &["2011-01-01"], 12.0);

    let modis = root.path().join("MODIS");
    fs::create_dir_all(&modis).unwrap();
    write_grid(&modis, "od550aer_monthly.csv", &MONTHS, 0.2);

    let aeronet = root.path().join("AERONET");
    fs::create_dir_all(&aeronet).unwrap();
    fs::write(
        aeronet.join("stations.csv"),
        "station_name,latitude,longitude,altitude,instrument,ts_type\n\
         Lille,50:36:42,3:08:28,60,sun photometer,daily\n\
         Mauna_Loa,19.54,-155.58,3397,,daily\n",
    )
    .unwrap();
    fs::write(
        aeronet.join("od550aer.csv"),
        "station_name,time,value\n\
         Lille,2010-01-05,0.2\n\
         Lille,2010-01-20,0.4\n\
         Lille,2010-02-03,0.3\n\
         Mauna_Loa,2010-02-10,0.05\n\
         Mauna_Loa,2010-03-01,0.07\n",
    )
    .unwrap();
    fs::write(
        aeronet.join("concpm10.csv"),
        "station_name,time,value\nLille,2010-01-05,15.0\n",
    )
    .unwrap();
    fs::write(aeronet.join("variables.csv"), "var_name,units\nconcpm10,ug m-3\n").unwrap();

    root
}

fn catalog(root: &Path) -> ReaderCatalog {
    let mut catalog = ReaderCatalog::new();
    assert_eq!(catalog.register_csv_root(root).unwrap(), 3);
    catalog
}

fn setup(obs_id: &str, obs_vars: &[&str], basedir: &Path) -> ColocationSetup {
    let mut setup = ColocationSetup::new("TM5", obs_id, obs_vars);
    setup.start = NaiveDate::from_ymd_opt(2010, 1, 1);
    setup.stop = NaiveDate::from_ymd_opt(2010, 3, 31);
    setup.ts_type = TsType::Monthly;
    setup.basedir_coldata = basedir.to_path_buf();
    setup
}

fn log_lines(basedir: &Path, obs_id: &str, kind: &str) -> usize {
    let path = run_log_path(basedir, "TM5", obs_id, Local::now().date_naive());
    let marker = format!("] {}: ", kind);
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| l.contains(&marker))
        .count()
}

#[test]
fn test_station_sweep_from_csv() {
    let root = data_root();
    let out = TempDir::new().unwrap();
    let mut setup = setup("AERONET", &["od550aer", "concpm10"], out.path());
    setup.obs_vert_type = Some("Surface".to_string());
    setup.obs_vert_type_alt = Some("Column".to_string());

    let outcome = ColocationRunner::new(setup, catalog(root.path())).run().unwrap();
    assert_eq!(outcome.computed(), 1);
    assert_eq!(outcome.failed(), 1);
    assert!(matches!(&outcome.jobs[1].state, JobState::Failed(reason) if reason.contains("concpm10")));
    assert_eq!(log_lines(out.path(), "AERONET", "WRITE"), 1);
    assert_eq!(log_lines(out.path(), "AERONET", "ERROR"), 1);

    let result = &outcome.results["od550aer"];
    let names: Vec<_> = result.locations().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["Lille", "Mauna_Loa"]);
    assert!((result.locations()[0].latitude - 50.611_666).abs() < 1e-4);
    assert_eq!(result.shape(), (3, 2));
    assert_eq!(result.num_valid_pairs(), 4);
    assert_eq!(result.metadata().obs_kind, ObsKind::Ungridded);

    let stats = result.statistics();
    assert!((stats.mean_model - 0.25).abs() < 1e-9);
    assert!((stats.mean_obs - 0.18).abs() < 1e-9);
    assert!((stats.mean_bias - 0.07).abs() < 1e-9);

    let path = outcome.jobs[0].output.clone().unwrap();
    assert_eq!(
        path.file_name().unwrap().to_str().unwrap(),
        "od550aer_REF-AERONET_MOD-TM5_20100101_20100331_monthly_WORLD-wMOUNTAINS.parquet"
    );
    let loaded = ColocatedResult::read(&path).unwrap();
    assert_eq!(loaded.metadata(), result.metadata());
    assert_eq!(loaded.shape(), result.shape());
    assert_eq!(loaded.num_valid_pairs(), result.num_valid_pairs());
    assert_eq!(loaded.times(), result.times());
}

#[test]
fn test_gridded_sweep_from_csv() {
    let root = data_root();
    let out = TempDir::new().unwrap();
    let setup = setup("MODIS", &["od550aer"], out.path());

    let outcome = ColocationRunner::new(setup, catalog(root.path())).run().unwrap();
    let result = &outcome.results["od550aer"];
    assert_eq!(result.metadata().obs_kind, ObsKind::Gridded);
    assert_eq!(result.shape(), (3, 4));
    assert_eq!(result.num_valid_pairs(), 12);
    assert!((result.statistics().mean_bias - 0.05).abs() < 1e-9);
}

#[test]
fn test_auxiliary_model_variable() {
    let root = data_root();
    let out = TempDir::new().unwrap();
    let mut setup = setup("AERONET", &["od550aer"], out.path());
    setup
        .model_use_vars
        .insert("od550aer".to_string(), "od550sum".to_string());
    setup.model_read_aux.insert(
        "od550sum".to_string(),
        coloc_processor::models::AuxSpec::new("add_cubes", &["od550so4", "od550oa"]),
    );

    let outcome = ColocationRunner::new(setup, catalog(root.path())).run().unwrap();
    let result = &outcome.results["od550sum"];
    assert_eq!(result.metadata().model_var, "od550sum");
    assert_eq!(result.metadata().obs_var, "od550aer");
    assert!((result.statistics().mean_model - 0.25).abs() < 1e-9);
    assert!(result.savename().starts_with("od550sum_REF-AERONET_MOD-TM5_"));
}

#[test]
fn test_setup_file_and_cache_reuse() {
    let root = data_root();
    let out = TempDir::new().unwrap();
    let config_path = out.path().join("setup.toml");
    fs::write(
        &config_path,
        format!(
            r#"
model_id = "TM5"
obs_id = "MODIS"
obs_vars = ["od550aer"]
start = "2010-01-01"
stop = "2010-03-31"
ts_type = "monthly"
basedir_coldata = "{}"
"#,
            out.path().display().to_string().replace('\\', "/")
        ),
    )
    .unwrap();

    let setup = ColocationSetup::load(&config_path).unwrap();
    let first = ColocationRunner::new(setup.clone(), catalog(root.path())).run().unwrap();
    assert_eq!(first.computed(), 1);

    let keep = setup
        .with_overrides(SetupOverrides {
            reanalyse_existing: Some(false),
            ..Default::default()
        })
        .unwrap();
    let second = ColocationRunner::new(keep, catalog(root.path())).run().unwrap();
    assert_eq!(second.skipped(), 1);
    assert!(second.results.is_empty());
    assert_eq!(log_lines(out.path(), "MODIS", "SKIP"), 1);

    let info = ColocatedWriter::new()
        .get_file_info(first.jobs[0].output.as_ref().unwrap())
        .unwrap();
    assert_eq!(info.total_rows, 12);
}

#[test]
fn test_parallel_strict_sweep() {
    let root = data_root();
    let out = TempDir::new().unwrap();
    let mut setup = setup("AERONET", &["concpm10", "od550aer"], out.path());
    setup.max_workers = 2;
    setup.raise_exceptions = true;

    let err = ColocationRunner::new(setup, catalog(root.path())).run().unwrap_err();
    assert_eq!(err.kind(), "JobFailed");
    assert!(err.to_string().contains("concpm10"));
    assert_eq!(log_lines(out.path(), "AERONET", "ERROR"), 1);
}
