//! Table source: a CSV job table mirrored into a JSON baseline snapshot.
//!
//! The snapshot, not the CSV, is what filtering runs against.

use std::fs;
use std::path::Path;

use csv::ReaderBuilder;
use tracing::debug;

use crate::error::RunnerError;
use crate::job::JobRecord;

/// Reads the CSV table into header names and one record per data row.
pub fn read_csv_records(path: &Path) -> Result<(Vec<String>, Vec<JobRecord>), RunnerError> {
    if !path.exists() {
        return Err(RunnerError::SourceNotFound(path.to_path_buf()));
    }
    let bytes =
        fs::read(path).map_err(|e| RunnerError::SourceUnreadable(path.to_path_buf(), e.to_string()))?;
    let text = String::from_utf8_lossy(&bytes);
    parse_csv_records(text.trim_start_matches('\u{feff}'), path)
}

pub fn parse_csv_records(
    text: &str,
    path: &Path,
) -> Result<(Vec<String>, Vec<JobRecord>), RunnerError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = reader.records();
    let Some(header) = rows.next() else {
        return Ok((Vec::new(), Vec::new()));
    };
    let header = header.map_err(|e| RunnerError::SourceUnreadable(path.to_path_buf(), e.to_string()))?;

    let headers: Vec<String> = header
        .iter()
        .map(str::trim)
        .filter(|h| !h.is_empty())
        .map(str::to_string)
        .collect();
    if headers.is_empty() {
        return Err(RunnerError::EmptyHeader(path.to_path_buf()));
    }

    let mut records: Vec<JobRecord> = Vec::new();
    for (idx, row) in rows.enumerate() {
        let row = row.map_err(|e| RunnerError::SourceUnreadable(path.to_path_buf(), e.to_string()))?;
        let cells: Vec<String> = row.iter().map(|c| c.trim().to_string()).collect();

        if cells.is_empty() || cells[0].starts_with('#') || cells.iter().all(String::is_empty) {
            continue;
        }

        // blank lines are skipped by the reader, so count source lines, not records
        let line = row
            .position()
            .map_or(idx + 2, |pos| pos.line() as usize);
        let values = normalize_row(cells, headers.len(), line)?;
        records.push(headers.iter().cloned().zip(values).collect());
    }

    debug!(path = %path.display(), rows = records.len(), "read table source");
    Ok((headers, records))
}

/// Reconciles a row with the header arity.
///
/// Short rows are lines that used a comma only for the leading fields and
/// spaces afterwards: the last cell is re-split on whitespace. Wide rows keep
/// the leading fields and join the surplus, comma-separated, into the last one.
pub fn normalize_row(
    cells: Vec<String>,
    expected: usize,
    row: usize,
) -> Result<Vec<String>, RunnerError> {
    if cells.len() == expected {
        return Ok(cells);
    }

    if cells.len() < expected {
        let mut values = cells;
        let tail = values.pop().unwrap_or_default();
        values.extend(tail.split_whitespace().map(str::to_string));

        if values.len() != expected {
            return Err(RunnerError::MalformedRow {
                row,
                expected,
                actual: values.len(),
            });
        }
        return Ok(values);
    }

    let mut values = cells;
    let surplus = values.split_off(expected - 1);
    values.push(surplus.join(",").trim().to_string());
    Ok(values)
}

pub fn write_json_records(path: &Path, records: &[JobRecord]) -> Result<(), RunnerError> {
    let write_err = |e: String| RunnerError::BaselineWrite(path.to_path_buf(), e);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let mut body = serde_json::to_string_pretty(records).map_err(|e| write_err(e.to_string()))?;
    body.push('\n');
    fs::write(path, body).map_err(|e| write_err(e.to_string()))
}

pub fn load_json_records(path: &Path) -> Result<Vec<JobRecord>, RunnerError> {
    if !path.exists() {
        return Err(RunnerError::SourceNotFound(path.to_path_buf()));
    }
    let body = fs::read_to_string(path)
        .map_err(|e| RunnerError::SourceUnreadable(path.to_path_buf(), e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| RunnerError::BaselineParse(path.to_path_buf(), e.to_string()))
}

/// Regenerates the JSON baseline from the CSV table and loads it back.
pub fn refresh_baseline(csv_path: &Path, json_path: &Path) -> Result<Vec<JobRecord>, RunnerError> {
    let (_, records) = read_csv_records(csv_path)?;
    write_json_records(json_path, &records)?;
    load_json_records(json_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cells(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_normalize_short_row() {
        let values = normalize_row(cells(&["qa", "sales_01.sql 20251223 DW.SALES"]), 4, 2)
            .expect("short row should be re-split");
        assert_eq!(values, cells(&["qa", "sales_01.sql", "20251223", "DW.SALES"]));
    }

    #[test]
    fn test_normalize_short_row_still_short() {
        let err = normalize_row(cells(&["qa", "sales_01.sql"]), 4, 3).expect_err("still short");
        assert_eq!(
            err,
            RunnerError::MalformedRow {
                row: 3,
                expected: 4,
                actual: 2,
            }
        );
    }

    #[test]
    fn test_normalize_wide_row() {
        let values = normalize_row(cells(&["qa", "a.sql", "x", "y", "z"]), 3, 2)
            .expect("wide rows always normalize");
        assert_eq!(values, cells(&["qa", "a.sql", "x,y,z"]));
    }

    #[test]
    fn test_parse_csv_records() {
        let text = "mid, vs_pgm_id ,vs_job_dt,vs_tbl_id,\n\
                    # disabled for now\n\
                    qa,a.sql,20240101,T.A\n\
                    \n\
                    ,,,\n\
                    qa,b.sql 20240102 T.B\n";
        let (headers, records) =
            parse_csv_records(text, Path::new("bq.csv")).expect("table should parse");

        assert_eq!(headers, cells(&["mid", "vs_pgm_id", "vs_job_dt", "vs_tbl_id"]));
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get("vs_pgm_id"), Some("b.sql"));
        assert_eq!(records[1].get("vs_tbl_id"), Some("T.B"));
    }

    #[test]
    fn test_parse_csv_empty_header() {
        let err = parse_csv_records(" , \nqa,a.sql\n", Path::new("bq.csv"))
            .expect_err("blank header");
        assert!(matches!(err, RunnerError::EmptyHeader(_)));
    }

    #[test]
    fn test_parse_csv_malformed_row_aborts() {
        let err = parse_csv_records("a,b,c,d\nx,y\n", Path::new("bq.csv"))
            .expect_err("row cannot be reconciled");
        assert!(matches!(err, RunnerError::MalformedRow { row: 2, .. }));
    }

    #[test]
    fn test_parse_csv_malformed_row_reports_source_line() {
        let err = parse_csv_records("a,b,c,d\n\n\nw,x,y,z\nx,y\n", Path::new("bq.csv"))
            .expect_err("row cannot be reconciled");
        assert!(matches!(err, RunnerError::MalformedRow { row: 5, .. }));
    }

    #[test]
    fn test_refresh_baseline() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("bq.csv");
        let json_path = dir.path().join("nested").join("bq.json");
        fs::write(&csv_path, "\u{feff}mid,vs_pgm_id,use_yn\nqa,a.sql,Y\n").expect("write csv");

        let records = refresh_baseline(&csv_path, &json_path).expect("baseline should refresh");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("mid"), Some("qa"));

        let body = fs::read_to_string(&json_path).expect("baseline written");
        assert!(body.ends_with('\n'));
        assert!(body.contains("\"vs_pgm_id\": \"a.sql\""));
    }

    #[test]
    fn test_refresh_baseline_missing_csv() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = refresh_baseline(&dir.path().join("nope.csv"), &dir.path().join("bq.json"))
            .expect_err("missing csv");
        assert!(matches!(err, RunnerError::SourceNotFound(_)));
    }
}
