//! CSV ingest for the three MSOA input files.
//!
//! - IMD file: col 0 = area code, col 7 = IMD score. Creates the regions.
//! - Population file: col 2 = area code, col 4 = population (`"8,123"` style).
//! - Case file: col 2 = area code, col 10 = daily new cases (`NA` = 0).
//!
//! Columns are positional; each file's header row is skipped. Bad rows are
//! skipped and reported, missing files are fatal (exit code 2).

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;

use crate::domain::{DataPaths, RegionRecord};
use crate::error::AppError;

const IMD_CODE_COL: usize = 0;
const IMD_SCORE_COL: usize = 7;
const POP_CODE_COL: usize = 2;
const POP_VALUE_COL: usize = 4;
const CASE_CODE_COL: usize = 2;
const CASE_VALUE_COL: usize = 10;

/// Which input file a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFile {
    Imd,
    Population,
    Cases,
}

impl fmt::Display for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InputFile::Imd => "imd",
            InputFile::Population => "population",
            InputFile::Cases => "cases",
        };
        f.write_str(name)
    }
}

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub file: InputFile,
    pub line: usize,
    pub message: String,
}

/// Counters describing what ingest kept and dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub imd_rows: usize,
    pub population_rows: usize,
    pub population_matched: usize,
    pub case_rows: usize,
    pub case_matched: usize,
    pub dropped_no_population: usize,
    pub dropped_wrong_length: usize,
    pub regions: usize,
}

/// Ingest output: complete regions (IMD-file order) + stats + row errors.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub regions: Vec<RegionRecord>,
    pub stats: IngestStats,
    pub row_errors: Vec<RowError>,
}

#[derive(Debug)]
struct Pending {
    code: String,
    imd: f64,
    population: Option<u64>,
    new_cases: Vec<u32>,
}

/// Regions keyed by code, kept in first-seen order.
#[derive(Debug, Default)]
struct RegionTable {
    rows: Vec<Pending>,
    index: HashMap<String, usize>,
}

impl RegionTable {
    fn upsert(&mut self, code: &str, imd: f64) {
        let fresh = Pending {
            code: code.to_string(),
            imd,
            population: None,
            new_cases: Vec::new(),
        };
        match self.index.get(code) {
            Some(&i) => self.rows[i] = fresh,
            None => {
                self.index.insert(code.to_string(), self.rows.len());
                self.rows.push(fresh);
            }
        }
    }

    fn get_mut(&mut self, code: &str) -> Option<&mut Pending> {
        self.index.get(code).map(|&i| &mut self.rows[i])
    }

    fn retain(&mut self, keep: impl FnMut(&Pending) -> bool) {
        self.rows.retain(keep);
        self.index = self
            .rows
            .iter()
            .enumerate()
            .map(|(i, p)| (p.code.clone(), i))
            .collect();
    }
}

/// Load the three CSVs and assemble complete `days`-long regions.
pub fn load_regions(paths: &DataPaths, days: usize) -> Result<IngestedData, AppError> {
    let mut table = RegionTable::default();
    let mut stats = IngestStats::default();
    let mut row_errors = Vec::new();

    for_each_row(&paths.imd, InputFile::Imd, &mut row_errors, |record| {
        stats.imd_rows += 1;
        let code = field(record, IMD_CODE_COL)?;
        let imd = parse_imd(field(record, IMD_SCORE_COL)?)?;
        table.upsert(code, imd);
        Ok(())
    })?;
    tracing::info!("Loaded IMD rows: {}", table.rows.len());

    for_each_row(&paths.population, InputFile::Population, &mut row_errors, |record| {
        stats.population_rows += 1;
        let code = field(record, POP_CODE_COL)?;
        let Some(region) = table.get_mut(code) else {
            return Ok(());
        };
        region.population = Some(parse_population(field(record, POP_VALUE_COL)?)?);
        stats.population_matched += 1;
        Ok(())
    })?;
    tracing::info!("Matched population rows: {}", stats.population_matched);

    let before = table.rows.len();
    table.retain(|p| p.population.is_some());
    stats.dropped_no_population = before - table.rows.len();

    for_each_row(&paths.cases, InputFile::Cases, &mut row_errors, |record| {
        stats.case_rows += 1;
        let code = field(record, CASE_CODE_COL)?;
        let Some(region) = table.get_mut(code) else {
            return Ok(());
        };
        region.new_cases.push(parse_cases(field(record, CASE_VALUE_COL)?)?);
        stats.case_matched += 1;
        Ok(())
    })?;
    tracing::info!("Matched case rows: {}", stats.case_matched);

    let before = table.rows.len();
    table.retain(|p| p.new_cases.len() == days);
    stats.dropped_wrong_length = before - table.rows.len();

    let regions: Vec<RegionRecord> = table
        .rows
        .into_iter()
        .filter_map(|p| {
            let population = p.population?;
            let (active_cases, recovered_cases) = derive_series(&p.new_cases);
            Some(RegionRecord {
                code: p.code,
                imd: p.imd,
                population,
                new_cases: p.new_cases,
                active_cases,
                recovered_cases,
            })
        })
        .collect();
    stats.regions = regions.len();

    if !row_errors.is_empty() {
        tracing::warn!("Skipped {} malformed rows during ingest", row_errors.len());
    }

    Ok(IngestedData {
        regions,
        stats,
        row_errors,
    })
}

/// Active and recovered series derived from daily new cases.
///
/// - `active[0] = new[0]`, `active[k] = new[k] + new[k-1]`
/// - `recovered[0] = recovered[1] = 0`, `recovered[k] = recovered[k-1] + new[k-1]`
pub fn derive_series(new_cases: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let mut active: Vec<u32> = Vec::with_capacity(new_cases.len());
    let mut recovered: Vec<u32> = Vec::with_capacity(new_cases.len());
    for (k, &n) in new_cases.iter().enumerate() {
        let prev = if k > 0 { new_cases[k - 1] } else { 0 };
        active.push(n.saturating_add(prev));
        let r = if k < 2 {
            0
        } else {
            recovered[k - 1].saturating_add(new_cases[k - 1])
        };
        recovered.push(r);
    }
    (active, recovered)
}

fn open_reader(path: &Path, file: InputFile) -> Result<csv::Reader<File>, AppError> {
    let handle = File::open(path)
        .map_err(|e| AppError::input(format!("Failed to open {file} CSV '{}': {e}", path.display())))?;

    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(handle);

    let headers = reader
        .headers()
        .map_err(|e| AppError::input(format!("Failed to read {file} CSV header: {e}")))?;
    if headers.is_empty() {
        return Err(AppError::input(format!(
            "{file} CSV '{}' has no header row.",
            path.display()
        )));
    }
    Ok(reader)
}

fn for_each_row<F>(path: &Path, file: InputFile, row_errors: &mut Vec<RowError>, mut handle: F) -> Result<(), AppError>
where
    F: FnMut(&StringRecord) -> Result<(), String>,
{
    let mut reader = open_reader(path, file)?;
    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; lines are 1-based.
        let line = idx + 2;
        let outcome = match result {
            Ok(record) => handle(&record),
            Err(e) => Err(format!("CSV parse error: {e}")),
        };
        if let Err(message) = outcome {
            tracing::debug!(%file, line, "skipping row: {message}");
            row_errors.push(RowError { file, line, message });
        }
    }
    Ok(())
}

fn field(record: &StringRecord, col: usize) -> Result<&str, String> {
    record
        .get(col)
        .ok_or_else(|| format!("Missing column {col} (row has {} fields).", record.len()))
}

fn parse_imd(s: &str) -> Result<f64, String> {
    s.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("Invalid IMD score '{s}'."))
}

fn parse_population(s: &str) -> Result<u64, String> {
    s.replace(',', "")
        .parse::<u64>()
        .map_err(|_| format!("Invalid population '{s}'."))
}

fn parse_cases(s: &str) -> Result<u32, String> {
    if s == "NA" {
        return Ok(0);
    }
    s.parse::<u32>().map_err(|_| format!("Invalid case count '{s}'."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn imd_row(code: &str, score: &str) -> String {
        format!("{code},name,lad,ladname,x,y,z,{score}\n")
    }

    fn pop_row(code: &str, population: &str) -> String {
        format!("r,ons,{code},name,\"{population}\"\n")
    }

    fn case_row(code: &str, count: &str) -> String {
        format!("r,ons,{code},name,lad,ladname,region,rname,metric,2020-10-01,{count}\n")
    }

    fn write_inputs(dir: &Path, imd: &str, pop: &str, cases: &str) -> DataPaths {
        let paths = DataPaths::in_dir(dir);
        fs::write(&paths.imd, format!("code,a,b,c,d,e,f,imd\n{imd}")).unwrap();
        fs::write(&paths.population, format!("a,b,code,d,population\n{pop}")).unwrap();
        fs::write(&paths.cases, format!("a,b,code,d,e,f,g,h,i,date,new\n{cases}")).unwrap();
        paths
    }

    #[test]
    fn derives_active_and_recovered() {
        let (active, recovered) = derive_series(&[3, 5, 2, 0, 4]);
        assert_eq!(active, vec![3, 8, 7, 2, 4]);
        assert_eq!(recovered, vec![0, 0, 5, 7, 7]);
    }

    #[test]
    fn loads_complete_regions_in_imd_order() {
        let dir = tempfile::tempdir().unwrap();
        let imd = [
            imd_row("E02000002", "30.5"),
            imd_row("E02000001", "12.25"),
            imd_row("E02000003", "8.0"),
            imd_row("E02000004", "9.0"),
        ]
        .concat();
        let pop = [
            pop_row("E02000001", "7,512"),
            pop_row("E02000002", "10,001"),
            pop_row("E02000004", "6000"),
            pop_row("E99999999", "100"),
        ]
        .concat();
        let mut cases = String::new();
        for day in 0..3 {
            cases.push_str(&case_row("E02000001", &day.to_string()));
            cases.push_str(&case_row("E02000002", if day == 1 { "NA" } else { "2" }));
            cases.push_str(&case_row("E02000003", "1"));
        }
        cases.push_str(&case_row("E02000004", "1"));

        let paths = write_inputs(dir.path(), &imd, &pop, &cases);
        let data = load_regions(&paths, 3).unwrap();

        let codes: Vec<&str> = data.regions.iter().map(|r| r.code.as_str()).collect();
        assert_eq!(codes, vec!["E02000002", "E02000001"]);

        let first = &data.regions[0];
        assert_eq!(first.population, 10_001);
        assert_eq!(first.imd, 30.5);
        assert_eq!(first.new_cases, vec![2, 0, 2]);
        assert_eq!(first.active_cases, vec![2, 2, 2]);

        assert_eq!(data.regions[1].population, 7_512);
        assert_eq!(data.stats.dropped_no_population, 1);
        assert_eq!(data.stats.dropped_wrong_length, 1);
        assert_eq!(data.stats.population_matched, 3);
        assert_eq!(data.stats.regions, 2);
        assert!(data.row_errors.is_empty());
    }

    #[test]
    fn repeated_imd_code_overwrites_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let imd = [
            imd_row("E02000001", "1.0"),
            imd_row("E02000002", "2.0"),
            imd_row("E02000001", "5.5"),
        ]
        .concat();
        let pop = [pop_row("E02000001", "100"), pop_row("E02000002", "200")].concat();
        let cases = [case_row("E02000001", "1"), case_row("E02000002", "1")].concat();

        let paths = write_inputs(dir.path(), &imd, &pop, &cases);
        let data = load_regions(&paths, 1).unwrap();
        assert_eq!(data.regions.len(), 2);
        assert_eq!(data.regions[0].code, "E02000001");
        assert_eq!(data.regions[0].imd, 5.5);
    }

    #[test]
    fn bad_rows_are_reported_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let imd = [imd_row("E02000001", "4.0"), imd_row("E02000002", "n/a"), "E02000003,short\n".to_string()]
            .concat();
        let pop = [pop_row("E02000001", "1,000")].concat();
        let cases = [case_row("E02000001", "2"), case_row("E02000001", "-1"), case_row("E02000001", "3")].concat();

        let paths = write_inputs(dir.path(), &imd, &pop, &cases);
        let data = load_regions(&paths, 2).unwrap();

        assert_eq!(data.regions.len(), 1);
        assert_eq!(data.regions[0].new_cases, vec![2, 3]);
        assert_eq!(data.row_errors.len(), 3);
        assert_eq!(data.row_errors[0].file, InputFile::Imd);
        assert_eq!(data.row_errors[0].line, 3);
        assert_eq!(data.row_errors[2].file, InputFile::Cases);
        assert_eq!(data.row_errors[2].line, 3);
    }

    #[test]
    fn missing_file_is_input_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_regions(&DataPaths::in_dir(dir.path()), 30).unwrap_err();
        assert_eq!(err.exit_code(), crate::error::EXIT_INPUT);
        assert!(err.message().contains("imd"));
    }
}
