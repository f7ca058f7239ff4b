use crate::analysis::Analysis;
use crate::types::{yes_no, MetricsExportRow, MetricsPreviewRow, MetricsRow, EXPORT_HEADERS};
use rust_xlsxwriter::{Format, Workbook};
use serde::Serialize;
use std::error::Error;
use std::path::{Path, PathBuf};
use tabled::{settings::Style, Table, Tabled};

/// Name of the exported worksheet, which also prefixes the file names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sheet {
    Resumen,
    Comparativo,
    Absentismo,
}

impl Sheet {
    pub fn for_analysis(analysis: &Analysis) -> Self {
        if analysis.by_year {
            Sheet::Absentismo
        } else if analysis.ranges.len() > 1 {
            Sheet::Comparativo
        } else {
            Sheet::Resumen
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Sheet::Resumen => "Resumen",
            Sheet::Comparativo => "Comparativo",
            Sheet::Absentismo => "Absentismo",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}_absentismo.xlsx", self.name().to_lowercase())
    }
}

/// Write metrics rows to a workbook with a single worksheet named after
/// `sheet`. Figures are stored as numbers rounded to two decimals.
pub fn write_xlsx(path: &Path, sheet: Sheet, rows: &[MetricsRow]) -> Result<(), Box<dyn Error>> {
    let mut workbook = Workbook::new();
    let bold = Format::new().set_bold();
    let decimal = Format::new().set_num_format("0.00");
    let ws = workbook.add_worksheet();
    ws.set_name(sheet.name())?;
    for (col, header) in EXPORT_HEADERS.iter().enumerate() {
        ws.write_string_with_format(0, col as u16, *header, &bold)?;
    }
    for (i, row) in rows.iter().enumerate() {
        let r = i as u32 + 1;
        ws.write_string(r, 0, &row.range)?;
        ws.write_string(r, 1, &row.geography)?;
        if let Some(year) = row.year {
            ws.write_number(r, 2, year)?;
        }
        ws.write_number(r, 3, row.month)?;
        ws.write_string(r, 4, &row.month_name)?;
        ws.write_number(r, 5, row.absence_count as f64)?;
        ws.write_number_with_format(r, 6, row.absence_hours, &decimal)?;
        ws.write_number_with_format(r, 7, row.theoretical_hours, &decimal)?;
        ws.write_number_with_format(r, 8, row.absenteeism_percent, &decimal)?;
        ws.write_string(r, 9, yes_no(row.above_threshold))?;
        ws.write_string(r, 10, yes_no(row.degenerate))?;
    }
    ws.autofit();
    workbook.save(path)?;
    Ok(())
}

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), Box<dyn Error>> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), Box<dyn Error>> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Write the metrics workbook, a CSV copy of the same table and the JSON
/// summary into `dir`, returning the workbook's path.
pub fn export_analysis(dir: &Path, analysis: &Analysis) -> Result<PathBuf, Box<dyn Error>> {
    let sheet = Sheet::for_analysis(analysis);
    let sheet_path = dir.join(sheet.file_name());
    write_xlsx(&sheet_path, sheet, &analysis.rows)?;
    let rows: Vec<MetricsExportRow> = analysis.rows.iter().map(MetricsExportRow::from).collect();
    write_csv(&sheet_path.with_extension("csv"), &rows)?;
    write_json(&dir.join("resumen_absentismo.json"), &analysis.summary())?;
    log::info!("exported {} rows to {}", rows.len(), sheet_path.display());
    Ok(sheet_path)
}

pub fn preview_metrics(analysis: &Analysis, max_rows: usize) {
    let rows: Vec<MetricsPreviewRow> = analysis.rows.iter().map(MetricsPreviewRow::from).collect();
    preview_table_rows(&rows, max_rows);
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().cloned().take(max_rows).collect();
    if slice.is_empty() {
        println!("(no rows)\n");
        return;
    }
    let table_str = Table::new(slice).with(Style::markdown()).to_string();
    println!("{}\n", table_str);
}
