use crate::error::{Diagnostic, LoadError};
use crate::types::{AbsenceEvent, RawRow};
use crate::util::parse_timestamp_safe;
use calamine::{open_workbook_auto, Data, Reader};
use csv::{ReaderBuilder, Trim};
use std::path::Path;

const START_COLUMNS: &[&str] = &["Inicio"];
const END_COLUMNS: &[&str] = &["Fin"];
const GEOGRAPHY_COLUMNS: &[&str] = &["Geografía", "Geografia"];
const FUNCTION_COLUMNS: &[&str] = &["Función", "Funcion"];
const CODE_COLUMNS: &[&str] = &["Codigo", "Código"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub total_rows: usize,
    pub loaded_rows: usize,
    pub parse_errors: usize,
    pub has_end_column: bool,
    pub has_function_column: bool,
    /// Loaded events that carry no usable end timestamp.
    pub missing_end: usize,
    /// Of those, events whose end precedes their start.
    pub end_before_start: usize,
}

impl LoadReport {
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut out = Vec::new();
        if self.parse_errors > 0 {
            out.push(Diagnostic::SkippedRows {
                count: self.parse_errors,
            });
        }
        if self.end_before_start > 0 {
            out.push(Diagnostic::EndBeforeStart {
                count: self.end_before_start,
            });
        }
        out
    }
}

/// Which of the known columns a source carries, by position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Columns {
    start: usize,
    end: Option<usize>,
    geography: Option<usize>,
    function: Option<usize>,
    code: Option<usize>,
}

impl Columns {
    fn detect(headers: &[String]) -> Result<Self, LoadError> {
        let start = find_column(headers, START_COLUMNS).ok_or(LoadError::MissingColumn("Inicio"))?;
        Ok(Self {
            start,
            end: find_column(headers, END_COLUMNS),
            geography: find_column(headers, GEOGRAPHY_COLUMNS),
            function: find_column(headers, FUNCTION_COLUMNS),
            code: find_column(headers, CODE_COLUMNS),
        })
    }
}

fn find_column(headers: &[String], candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.iter().any(|c| h.trim() == *c))
}

/// Load an absence file (CSV or Excel workbook) and normalize its rows.
///
/// Rows whose start timestamp cannot be read are skipped and counted; a
/// source without an `Inicio` column is rejected outright.
pub fn load_and_clean(path: &str) -> Result<(Vec<AbsenceEvent>, LoadReport), LoadError> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();
    let (columns, rows) = match ext.as_str() {
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => read_workbook(path)?,
        _ => read_csv(path)?,
    };
    let (events, mut report) = normalize(rows);
    report.has_end_column = columns.end.is_some();
    report.has_function_column = columns.function.is_some();
    log::info!(
        "loaded {} of {} rows from {} ({} skipped)",
        report.loaded_rows,
        report.total_rows,
        path,
        report.parse_errors
    );
    Ok((events, report))
}

fn read_csv(path: &str) -> Result<(Columns, Vec<Option<RawRow>>), LoadError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.to_string()).collect();
    let columns = Columns::detect(&headers)?;
    let rows = rdr
        .deserialize::<RawRow>()
        .map(|result| match result {
            Ok(r) => Some(r),
            Err(e) => {
                log::debug!("unreadable CSV row: {}", e);
                None
            }
        })
        .collect();
    Ok((columns, rows))
}

fn read_workbook(path: &str) -> Result<(Columns, Vec<Option<RawRow>>), LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(LoadError::NoSheets)?;
    let range = workbook.worksheet_range(&sheet_name)?;
    let mut iter = range.rows();
    let headers: Vec<String> = iter
        .next()
        .map(|row| row.iter().map(|c| cell_text(c).unwrap_or_default()).collect())
        .unwrap_or_default();
    let columns = Columns::detect(&headers)?;
    let rows = iter.map(|row| Some(raw_row_from_cells(row, &columns))).collect();
    Ok((columns, rows))
}

fn raw_row_from_cells(cells: &[Data], columns: &Columns) -> RawRow {
    let at = |idx: Option<usize>| idx.and_then(|i| cells.get(i)).and_then(cell_text);
    RawRow {
        start: at(Some(columns.start)),
        end: at(columns.end),
        geography: at(columns.geography),
        function: at(columns.function),
        code: at(columns.code),
    }
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => Some(s.trim().to_string()),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
    }
}

/// Turn raw rows into events. `None` entries stand for rows the reader
/// could not decode at all and count as parse errors.
pub fn normalize<I>(rows: I) -> (Vec<AbsenceEvent>, LoadReport)
where
    I: IntoIterator<Item = Option<RawRow>>,
{
    let mut report = LoadReport::default();
    let mut events = Vec::new();
    for row in rows {
        report.total_rows += 1;
        let Some(row) = row else {
            report.parse_errors += 1;
            continue;
        };
        let Some(start) = parse_timestamp_safe(row.start.as_deref()) else {
            log::debug!("row {}: unreadable start {:?}", report.total_rows, row.start);
            report.parse_errors += 1;
            continue;
        };
        let end = match parse_timestamp_safe(row.end.as_deref()) {
            Some(end) if end < start => {
                log::debug!("row {}: end {} precedes start {}", report.total_rows, end, start);
                report.end_before_start += 1;
                None
            }
            end => end,
        };
        if end.is_none() {
            report.missing_end += 1;
        }
        events.push(AbsenceEvent::new(
            start,
            end,
            clean(row.geography),
            clean(row.function),
            clean(row.code),
        ));
    }
    report.loaded_rows = events.len();
    (events, report)
}

fn clean(value: Option<String>) -> String {
    value.map(|v| v.trim().to_string()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use calamine::{ExcelDateTime, ExcelDateTimeType};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn raw(start: &str, end: Option<&str>, geo: &str, code: &str) -> Option<RawRow> {
        Some(RawRow {
            start: Some(start.to_string()),
            end: end.map(|e| e.to_string()),
            geography: Some(geo.to_string()),
            function: None,
            code: Some(code.to_string()),
        })
    }

    #[test]
    fn normalize_skips_and_counts_unreadable_starts() {
        let rows = vec![
            raw("2023-01-05 00:00:00", Some("2023-01-06 00:00:00"), "Madrid", "X"),
            raw("not a date", None, "Madrid", "X"),
            None,
            raw("2023-02-01", Some("garbage"), " Sevilla ", "Y"),
        ];
        let (events, report) = normalize(rows);
        assert_eq!(report.total_rows, 4);
        assert_eq!(report.loaded_rows, 2);
        assert_eq!(report.parse_errors, 2);
        assert_eq!(report.missing_end, 1);
        assert_eq!(events[0].duration_hours, Some(24.0));
        assert_eq!(events[1].geography, "Sevilla");
        assert_eq!(events[1].end, None);
        assert_eq!(report.diagnostics(), vec![Diagnostic::SkippedRows { count: 2 }]);
    }

    #[test]
    fn normalize_drops_ends_that_precede_the_start() {
        let rows = vec![
            raw("2023-01-06 00:00:00", Some("2023-01-05 00:00:00"), "Madrid", "X"),
            raw("2023-01-07 08:00:00", Some("2023-01-07 08:00:00"), "Madrid", "X"),
        ];
        let (events, report) = normalize(rows);
        assert_eq!(report.loaded_rows, 2);
        assert_eq!(report.end_before_start, 1);
        assert_eq!(report.missing_end, 1);
        assert_eq!(events[0].end, None);
        assert_eq!(events[0].duration_hours, None);
        assert_eq!(events[1].duration_hours, Some(0.0));
        assert_eq!(report.diagnostics(), vec![Diagnostic::EndBeforeStart { count: 1 }]);
    }

    #[test]
    fn load_csv_with_accented_headers() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Inicio,Fin,Geografía,Codigo,Función").unwrap();
        writeln!(file, "2023-01-05 00:00:00,2023-01-06 00:00:00,Madrid,X,Ventas").unwrap();
        writeln!(file, "bad,,Madrid,X,Ventas").unwrap();
        writeln!(file, "2023-01-07 08:00:00,2023-01-07 12:00:00,Sevilla,Y,").unwrap();
        file.flush().unwrap();

        let (events, report) = load_and_clean(file.path().to_str().unwrap()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded_rows, 2);
        assert!(report.has_end_column);
        assert!(report.has_function_column);
        assert_eq!(events[0].function, "Ventas");
        assert_eq!(events[1].function, "");
        assert_eq!(events[1].duration_hours, Some(4.0));
    }

    #[test]
    fn load_csv_without_end_column() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Inicio,Geografia,Codigo").unwrap();
        writeln!(file, "2023-02-01,Madrid,X").unwrap();
        file.flush().unwrap();

        let (events, report) = load_and_clean(file.path().to_str().unwrap()).unwrap();
        assert!(!report.has_end_column);
        assert!(!report.has_function_column);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].geography, "Madrid");
    }

    #[test]
    fn load_csv_without_start_column_is_fatal() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "Fin,Geografía,Codigo").unwrap();
        writeln!(file, "2023-02-01,Madrid,X").unwrap();
        file.flush().unwrap();

        let err = load_and_clean(file.path().to_str().unwrap()).unwrap_err();
        assert!(matches!(err, LoadError::MissingColumn("Inicio")));
    }

    #[test]
    fn workbook_rows_map_cells_by_detected_column() {
        let headers: Vec<String> = ["Codigo", "Inicio", "Geografía"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let columns = Columns::detect(&headers).unwrap();
        let cells = vec![
            Data::Float(12.0),
            Data::String("2023-03-01 09:00:00".to_string()),
            Data::String("Bilbao".to_string()),
        ];
        let row = raw_row_from_cells(&cells, &columns);
        assert_eq!(row.code.as_deref(), Some("12"));
        assert_eq!(row.start.as_deref(), Some("2023-03-01 09:00:00"));
        assert_eq!(row.geography.as_deref(), Some("Bilbao"));
        assert_eq!(row.end, None);
    }

    #[test]
    fn date_cells_become_timestamps() {
        let start = Data::DateTime(ExcelDateTime::new(44931.0, ExcelDateTimeType::DateTime, false));
        let end = Data::DateTime(ExcelDateTime::new(44932.25, ExcelDateTimeType::DateTime, false));
        assert_eq!(cell_text(&start).as_deref(), Some("2023-01-05 00:00:00"));
        assert_eq!(cell_text(&end).as_deref(), Some("2023-01-06 06:00:00"));
        assert_eq!(
            cell_text(&Data::DateTimeIso("2023-01-05T08:30:00 ".to_string())).as_deref(),
            Some("2023-01-05T08:30:00")
        );
        assert_eq!(cell_text(&Data::Empty), None);

        let headers: Vec<String> = ["Inicio", "Fin"].iter().map(|s| s.to_string()).collect();
        let columns = Columns::detect(&headers).unwrap();
        let (events, report) = normalize(vec![Some(raw_row_from_cells(&[start, end], &columns))]);
        assert_eq!(report.parse_errors, 0);
        assert_eq!(events[0].duration_hours, Some(30.0));
    }

    #[test]
    fn load_xlsx_reads_the_first_sheet() {
        let file = tempfile::Builder::new().suffix(".xlsx").tempfile().unwrap();
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let stamp = rust_xlsxwriter::Format::new().set_num_format("yyyy-mm-dd hh:mm:ss");
        let ws = workbook.add_worksheet();
        for (col, header) in ["Inicio", "Fin", "Geografía", "Codigo"].iter().enumerate() {
            ws.write_string(0, col as u16, *header).unwrap();
        }
        let start = rust_xlsxwriter::ExcelDateTime::from_ymd(2023, 1, 5).unwrap();
        let end = rust_xlsxwriter::ExcelDateTime::from_ymd(2023, 1, 6)
            .unwrap()
            .and_hms(12, 0, 0)
            .unwrap();
        ws.write_datetime_with_format(1, 0, &start, &stamp).unwrap();
        ws.write_datetime_with_format(1, 1, &end, &stamp).unwrap();
        ws.write_string(1, 2, "Madrid").unwrap();
        ws.write_number(1, 3, 7).unwrap();
        ws.write_string(2, 0, "2023-02-01 09:00:00").unwrap();
        ws.write_string(2, 2, "Sevilla").unwrap();
        ws.write_string(3, 0, "sin fecha").unwrap();
        workbook.save(file.path()).unwrap();

        let (events, report) = load_and_clean(file.path().to_str().unwrap()).unwrap();
        assert_eq!(report.total_rows, 3);
        assert_eq!(report.loaded_rows, 2);
        assert_eq!(report.parse_errors, 1);
        assert_eq!(report.missing_end, 1);
        assert!(report.has_end_column);
        assert!(!report.has_function_column);
        assert_eq!(events[0].geography, "Madrid");
        assert_eq!(events[0].code, "7");
        assert_eq!(events[0].duration_hours, Some(36.0));
        assert_eq!((events[1].year, events[1].month), (2023, 2));
        assert_eq!(events[1].end, None);
    }
}
