//! # Centroid Export
//!
//! Tabular export of every centroid of a run, one CSV row per floor per
//! named series, ready for a spreadsheet or a stick-model input sheet.
//!
//! | Column       | Value                                         |
//! |--------------|-----------------------------------------------|
//! | `series`     | Series name, e.g. `Accumulative_ALL_DL`       |
//! | `floor`      | Floor pass label                              |
//! | `node`       | 1-based floor position among exported floors  |
//! | `x`, `y`     | Plan coordinates (m)                          |
//! | `sg_x`       | Stick-model X = `x`                           |
//! | `sg_y`       | Stick-model height = `(floors - node) × 3`    |
//! | `sg_z`       | Stick-model Z = `-y`                          |
//! | `drawing_x/y`| `-coord × 100 / scale` (cm on a 1:scale sheet)|
//! | `fz_kn`      | Total load, rounded to kN                     |
//!
//! Rows are grouped by series in the order of the first floor, then by
//! floor in run order. Absent centroids produce no row.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::info;

use crate::centroid::{FloorCentroids, LoadCentroid};
use crate::errors::{RundownError, RundownResult};
use crate::file_io::{timestamp_label, write_atomic};

/// Storey height (m) of the stick model
pub const STICK_STOREY_HEIGHT: f64 = 3.0;

/// Header line of the export
pub const CSV_HEADER: &str = "series,floor,node,x,y,sg_x,sg_y,sg_z,drawing_x,drawing_y,fz_kn";

/// Export file path for a run finished at `at`
pub fn export_path(dir: &Path, at: &DateTime<Local>) -> PathBuf {
    dir.join(format!("centroids_{}.csv", timestamp_label(at)))
}

fn round3(value: f64) -> f64 {
    let rounded = (value * 1000.0).round() / 1000.0;
    // avoid "-0" in the sheet
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row(out: &mut String, series: &str, floor: &str, node: usize, floors: usize, centroid: &LoadCentroid, scale: f64) {
    let x = centroid.location.x;
    let y = centroid.location.y;
    let drawing = 100.0 / scale;
    // Writing to a String cannot fail
    let _ = writeln!(
        out,
        "{},{},{},{},{},{},{},{},{},{},{}",
        quote(series),
        quote(floor),
        node,
        round3(x),
        round3(y),
        round3(x),
        (floors - node) as f64 * STICK_STOREY_HEIGHT,
        round3(-y),
        round3(-drawing * x),
        round3(-drawing * y),
        centroid.fz.round()
    );
}

/// Render the export as CSV text
pub fn centroid_csv(floors: &[FloorCentroids], drawing_scale: f64) -> String {
    let mut out = String::new();
    out.push_str(CSV_HEADER);
    out.push('\n');

    let Some(first) = floors.first() else {
        return out;
    };

    for entry in &first.entries {
        for (index, floor) in floors.iter().enumerate() {
            if let Some(centroid) = floor.get(&entry.series) {
                push_row(&mut out, &entry.series, &floor.floor, index + 1, floors.len(), centroid, drawing_scale);
            }
        }
    }
    out
}

/// Write the export to `<dir>/centroids_<timestamp>.csv` and return its path.
///
/// # Errors
///
/// * `InvalidSetting` - drawing scale is not positive
/// * `FileError` - the file could not be written
pub fn write_centroid_export(
    dir: &Path,
    floors: &[FloorCentroids],
    drawing_scale: f64,
    at: &DateTime<Local>,
) -> RundownResult<PathBuf> {
    if !(drawing_scale > 0.0) {
        return Err(RundownError::invalid_setting(
            "drawing_scale",
            drawing_scale.to_string(),
            "Drawing scale must be greater than 0",
        ));
    }

    let path = export_path(dir, at);
    write_atomic(&path, centroid_csv(floors, drawing_scale).as_bytes())?;
    info!(path = %path.display(), floors = floors.len(), "Centroid export written");
    Ok(path)
}
