use chrono::{Datelike, NaiveDateTime, Timelike};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// File and directory names
// ---------------------------------------------------------------------------

pub const CONFIG_FILE: &str = "params.yaml";

/// Only one ensemble member is cycled.
pub const MEMBER: &str = "member00";

pub const DART_WORK_DIR: &str = "models/mpas_atm/work";
pub const ADVANCE_TIME: &str = "advance_time";

pub const RTCOEF_LINK: &str = "rtcoef_dummy_5_dummyir.dat";
pub const SCCLDCOEF_LINK: &str = "sccldcoef_dummy_5_dummyir.dat";

pub const NAMELIST_TEMPLATE: &str = "templates/input.nml";
pub const NAMELIST_FILE: &str = "input.nml";
pub const EDITED_STREAMS_FILE: &str = "streams.atmosphere.edited";
pub const INIT_FILE: &str = "x1.10242.init.nc";
pub const LOG_DIR: &str = "logs";

/// Placeholder written in place of the previous cycle on the first cycle.
pub const NO_PREVIOUS_CYCLE: &str = "none";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn dart_executable(dart_dir: &Path, exe: &str) -> PathBuf {
    dart_dir.join(DART_WORK_DIR).join(exe)
}

pub fn member_dir(inout_state: &Path, date_str: &str) -> PathBuf {
    inout_state.join(date_str).join(MEMBER)
}

/// MPAS restart-file timestamp, e.g. `2021-01-01_06.00.00`.
pub fn mpas_file_time(date: &NaiveDateTime) -> String {
    format!(
        "{}-{:02}-{:02}_{:02}.00.00",
        date.year(),
        date.month(),
        date.day(),
        date.hour()
    )
}

pub fn input_state(inout_state: &Path, date_str: &str, date: &NaiveDateTime) -> PathBuf {
    member_dir(inout_state, date_str).join(format!("mpasout.{}.nc", mpas_file_time(date)))
}

pub fn perfect_state(inout_state: &Path, date_str: &str) -> PathBuf {
    member_dir(inout_state, date_str).join(format!("perfect_{date_str}.nc"))
}

pub fn init_state(init_state: &Path) -> PathBuf {
    init_state.join(MEMBER).join(INIT_FILE)
}

/// Inflation file for a cycle: `<inout>/<date>/member00/<fragment>_<suffix>.nc`.
///
/// The fragment is usually written with a leading slash in `params.yaml`
/// (`/input_priorinf`); it is treated as a plain file-name stem.
pub fn inflation_file(inout_state: &Path, date_str: &str, fragment: &str, suffix: &str) -> PathBuf {
    member_dir(inout_state, date_str).join(inflation_name(fragment, suffix))
}

pub fn inflation_name(fragment: &str, suffix: &str) -> String {
    format!("{}_{suffix}.nc", fragment.trim_start_matches('/'))
}

pub fn stamped(name: &str, date_str: &str) -> String {
    format!("{name}.{date_str}")
}

pub fn namelist_template(proj_dir: &Path) -> PathBuf {
    proj_dir.join(NAMELIST_TEMPLATE)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
