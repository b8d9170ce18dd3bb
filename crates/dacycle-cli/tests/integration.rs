#![allow(deprecated)]
use assert_cmd::Command;
use predicates::prelude::*;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn dacycle(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("dacycle").unwrap();
    cmd.current_dir(dir.path()).env_remove("DACYCLE_CONFIG");
    cmd
}

const TEMPLATE: &str = "\
&model_nml
   init_template_filename = 'template.nc'
/
&filter_nml
   ens_size = 1
   cutoff = 0.2 ! localization half-width
/
&perfect_model_obs_nml
   obs_seq_in_file_name = 'obs_seq.in'
/
";

const STREAMS: &str = r#"<streams>
<stream name="da_restart" type="output" filename_template="restart.nc" output_interval="1_00:00:00">
</stream>
</streams>
"#;

/// A project with templates and a params.yaml pointing into the temp dir.
fn project(dir: &TempDir, extra: &str) {
    let root = dir.path();
    let templates = root.join("templates");
    std::fs::create_dir_all(&templates).unwrap();
    std::fs::write(templates.join("input.nml"), TEMPLATE).unwrap();
    std::fs::write(templates.join("streams.atmosphere"), STREAMS).unwrap();
    let yaml = format!(
        r#"proj_dir: {root}
run_dir: {root}/run
DART_dir: {root}/DART
rtcoef_file: {root}/rttov/rtcoef.dat
sccldcoef_file: {root}/rttov/sccldcoef.dat
obs_kind: [GOES_16_ABI_RADIANCE]
obs_dir: {root}/obs
inout_state: {root}/inout
init_state: {root}/init
mpas_vars: [theta, qv]
MPAS_stream: {root}/templates/streams.atmosphere
filter:
  ens_size: 40
  num_output_obs_members: 40
  assimilation_period_days: 0
  cutoff: 0.05
  vert_normalization_height: 10000.0
  distribute_mean: true
  convert_all_obs_verticals_first: true
  write_binary_obs_sequence: false
  tasks_per_node: 128
  adaptive_inf: 'true'
  input_priorinf: /input_priorinf
{extra}"#,
        root = root.display()
    );
    std::fs::write(root.join("params.yaml"), yaml).unwrap();
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

const FAST_BATCH: &str = "batch:\n  settle_secs: 0\n  poll_secs: 1\n";

/// Stand-ins for the PBS client programs. `qsub` runs the job on the spot:
/// it writes the log named by `#PBS -o`, drops the observation sequence in
/// the working directory and records the script it was given. `qstat`
/// lists nothing, so every job has already left the queue.
fn fake_pbs(dir: &TempDir, finishes: bool) -> PathBuf {
    let bin = dir.path().join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let log_line = if finishes {
        r"running\n Finished ... at YYYY MM DD HH MM SS = \n"
    } else {
        r"MPI_ABORT was invoked\n"
    };
    let qsub = format!(
        "#!/bin/sh\n\
         echo \"$1\" >> \"{bin}/submitted\"\n\
         log=$(sed -n 's/^#PBS -o //p' \"$1\")\n\
         printf '{log_line}' > \"$log\"\n\
         echo obs > obs_seq.out\n\
         echo 4821337.desched1\n",
        bin = bin.display()
    );
    for (name, body) in [
        ("qsub", qsub.as_str()),
        ("qstat", "#!/bin/sh\nexit 0\n"),
        ("qdel", "#!/bin/sh\nexit 0\n"),
    ] {
        let path = bin.join(name);
        std::fs::write(&path, body).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    bin
}

fn with_pbs(cmd: &mut Command, bin: &Path) {
    let path = std::env::var("PATH").unwrap_or_default();
    cmd.env("PATH", format!("{}:{path}", bin.display()))
        .env("USER", "tester");
}

fn submissions(bin: &Path) -> usize {
    std::fs::read_to_string(bin.join("submitted"))
        .map(|s| s.lines().count())
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// dacycle dates
// ---------------------------------------------------------------------------

#[test]
fn dates_lists_inclusive_range() {
    let dir = TempDir::new().unwrap();
    dacycle(&dir)
        .args(["dates", "2021010100", "2021010112", "6"])
        .assert()
        .success()
        .stdout("2021010100\n2021010106\n2021010112\n");
}

#[test]
fn dates_json_carries_previous_cycle() {
    let dir = TempDir::new().unwrap();
    let out = dacycle(&dir)
        .args(["--json", "dates", "2021010100", "2021010106", "6"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value[0]["prev_date_str"], "none");
    assert_eq!(value[1]["prev_date_str"], "2021010100");
}

#[test]
fn bad_date_is_rejected() {
    let dir = TempDir::new().unwrap();
    dacycle(&dir)
        .args(["dates", "20210101", "2021010112", "6"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("expected YYYYMMDDHH"));
}

#[test]
fn reversed_range_is_rejected() {
    let dir = TempDir::new().unwrap();
    dacycle(&dir)
        .args(["dates", "2021010112", "2021010100", "6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is after end"));
}

// ---------------------------------------------------------------------------
// dacycle config
// ---------------------------------------------------------------------------

#[test]
fn config_validate_clean_project() {
    let dir = TempDir::new().unwrap();
    project(&dir, "");
    dacycle(&dir)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Config is valid"));
}

#[test]
fn config_validate_reports_errors() {
    let dir = TempDir::new().unwrap();
    project(&dir, "batch:\n  job_id_pattern: '\\d+'\n");
    dacycle(&dir)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("[error]"));
}

#[test]
fn config_found_from_subdirectory() {
    let dir = TempDir::new().unwrap();
    project(&dir, "");
    let sub = dir.path().join("run/deep");
    std::fs::create_dir_all(&sub).unwrap();
    let mut cmd = Command::cargo_bin("dacycle").unwrap();
    cmd.current_dir(&sub)
        .env_remove("DACYCLE_CONFIG")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ens_size: 40"));
}

#[test]
fn missing_config_is_an_error() {
    let dir = TempDir::new().unwrap();
    dacycle(&dir)
        .args(["--config", "nowhere.yaml", "config", "show"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config not found"));
}

// ---------------------------------------------------------------------------
// dry runs
// ---------------------------------------------------------------------------

#[test]
fn assimilate_dry_run_prepares_run_dir() {
    let dir = TempDir::new().unwrap();
    project(&dir, "");
    dacycle(&dir)
        .args(["assimilate", "2021010100", "2021010106", "6", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Processing date: 2021010106"))
        .stdout(predicate::str::contains("Dry run"));

    let run = dir.path().join("run");
    let nml = read(&run.join("input.nml"));
    assert!(nml.contains("ens_size = 40"));
    assert!(nml.contains("cutoff = 0.05"));
    assert!(nml.contains("inf_initial_from_restart = .false., .false."));
    assert!(nml.contains("obs_sequence_in_name = "));
    assert!(nml.contains("&perfect_model_obs_nml"));

    let streams = read(&run.join("streams.atmosphere.edited"));
    assert!(streams.contains(r#"output_interval="6:00:00""#));

    let script = read(&run.join("filter.pbs"));
    assert!(script.contains("#PBS -N filter_2021010106"));
    assert!(script.contains("#PBS -A NMMM0063"));
    assert!(script.contains("./filter"));

    assert!(std::fs::symlink_metadata(run.join("filter")).unwrap().file_type().is_symlink());
    assert!(!dir.path().join("obs").exists());
}

#[test]
fn perfect_model_dry_run_json_report() {
    let dir = TempDir::new().unwrap();
    project(&dir, "");
    let out = dacycle(&dir)
        .args(["--json", "perfect-model", "2021010100", "2021010100", "6", "--dry-run"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["variant"], "perfect_model");
    assert_eq!(value["outcome"]["kind"], "dry_run");
    assert_eq!(value["cycles"][0]["date"], "2021010100");
    assert_eq!(value["cycles"][0]["prev_date"], "none");

    let nml = read(&dir.path().join("run/input.nml"));
    assert!(nml.contains("obs_seq.in.2021010100"));
    assert!(nml.contains("perfect_2021010100.nc"));
}

#[test]
fn run_refuses_invalid_config() {
    let dir = TempDir::new().unwrap();
    project(&dir, "batch:\n  job_id_pattern: '(unclosed'\n");
    dacycle(&dir)
        .args(["assimilate", "2021010100", "2021010100", "6", "--dry-run"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("config has errors"));
    assert!(!dir.path().join("run").exists());
}

// ---------------------------------------------------------------------------
// runs against the PBS client programs
// ---------------------------------------------------------------------------

#[test]
fn perfect_model_run_archives_each_cycle() {
    let dir = TempDir::new().unwrap();
    project(&dir, FAST_BATCH);
    let bin = fake_pbs(&dir, true);
    let mut cmd = dacycle(&dir);
    with_pbs(&mut cmd, &bin);
    cmd.args(["perfect-model", "2021010100", "2021010106", "6"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Submitted job 4821337.desched1 for 2021010100"))
        .stdout(predicate::str::contains("Processing date: 2021010106"));

    assert_eq!(submissions(&bin), 2);
    let obs = dir.path().join("obs");
    assert_eq!(read(&obs.join("obs_seq.out.2021010100")), "obs\n");
    assert!(obs.join("obs_seq.out.2021010106").is_file());
    assert!(!dir.path().join("run/obs_seq.out").exists());
    assert!(dir
        .path()
        .join("logs/output.perfect_model_obs_2021010106.log")
        .is_file());
}

#[test]
fn job_without_trailer_stops_with_exit_code_2() {
    let dir = TempDir::new().unwrap();
    project(&dir, FAST_BATCH);
    let bin = fake_pbs(&dir, false);
    let mut cmd = dacycle(&dir);
    with_pbs(&mut cmd, &bin);
    cmd.args(["assimilate", "2021010100", "2021010112", "6"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Process did not finish correctly"))
        .stdout(predicate::str::contains("Stopped after failed cycle 2021010100."))
        .stderr(predicate::str::contains("stopped at 2021010100"));

    assert_eq!(submissions(&bin), 1);
    assert!(!dir.path().join("obs/obs_seq.final.2021010100").exists());
    assert!(dir.path().join("run/output.filter_2021010100.log").is_file());
}

#[test]
fn skipped_failures_still_exit_non_zero() {
    let dir = TempDir::new().unwrap();
    project(&dir, &format!("{FAST_BATCH}on_job_failure: skip\n"));
    let bin = fake_pbs(&dir, false);
    let mut cmd = dacycle(&dir);
    with_pbs(&mut cmd, &bin);
    let out = cmd
        .args(["--json", "perfect-model", "2021010100", "2021010106", "6"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(2));
    assert_eq!(submissions(&bin), 2);
    let value: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(value["outcome"]["kind"], "completed");
    assert_eq!(value["cycles"][0]["status"], -1);
    assert_eq!(value["cycles"][1]["status"], -1);
    assert_eq!(value["cycles"][1]["prev_date"], "2021010100");
}
