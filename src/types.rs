use crate::error::RangeError;
use crate::util::{format_number, hours_between, month_name};
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tabled::Tabled;

/// One row of the uploaded absence sheet, kept as text until normalized.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RawRow {
    #[serde(rename = "Inicio", default)]
    pub start: Option<String>,
    #[serde(rename = "Fin", default)]
    pub end: Option<String>,
    #[serde(rename = "Geografía", alias = "Geografia", default)]
    pub geography: Option<String>,
    #[serde(rename = "Función", alias = "Funcion", default)]
    pub function: Option<String>,
    #[serde(rename = "Codigo", alias = "Código", default)]
    pub code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AbsenceEvent {
    pub start: NaiveDateTime,
    pub end: Option<NaiveDateTime>,
    pub geography: String,
    pub function: String,
    pub code: String,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub duration_hours: Option<f64>,
}

impl AbsenceEvent {
    /// Build an event, deriving the calendar fields from `start` only. An end
    /// that precedes the start is dropped, leaving the event without duration.
    pub fn new(
        start: NaiveDateTime,
        end: Option<NaiveDateTime>,
        geography: impl Into<String>,
        function: impl Into<String>,
        code: impl Into<String>,
    ) -> Self {
        let end = end.filter(|e| *e >= start);
        Self {
            start,
            end,
            geography: geography.into(),
            function: function.into(),
            code: code.into(),
            year: start.year(),
            month: start.month(),
            month_name: month_name(start.month()),
            duration_hours: end.map(|e| hours_between(start, e)),
        }
    }
}

/// A named, inclusive interval of calendar days.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateRange {
    pub name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(name: impl Into<String>, start: NaiveDate, end: NaiveDate) -> Result<Self, RangeError> {
        let name = name.into();
        if start > end {
            return Err(RangeError::StartAfterEnd { name, start, end });
        }
        Ok(Self { name, start, end })
    }

    /// Build a range from whatever endpoints a picker produced; anything
    /// other than exactly two dates is incomplete.
    pub fn from_endpoints(name: impl Into<String>, endpoints: &[NaiveDate]) -> Result<Self, RangeError> {
        let name = name.into();
        match endpoints {
            [start, end] => Self::new(name, *start, *end),
            _ => Err(RangeError::Incomplete {
                name,
                supplied: endpoints.len(),
            }),
        }
    }

    pub fn contains(&self, ts: &NaiveDateTime) -> bool {
        let day = ts.date();
        self.start <= day && day <= self.end
    }

    /// Every (year, month) the range touches, ascending.
    pub fn months(&self) -> Vec<(i32, u32)> {
        let mut out = Vec::new();
        let (mut y, mut m) = (self.start.year(), self.start.month());
        let last = (self.end.year(), self.end.month());
        while (y, m) <= last {
            out.push((y, m));
            if m == 12 {
                y += 1;
                m = 1;
            } else {
                m += 1;
            }
        }
        out
    }
}

/// One aggregated (range, geography, [year,] month) group.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub range: String,
    pub geography: String,
    pub year: Option<i32>,
    pub month: u32,
    pub month_name: String,
    pub absence_count: usize,
    pub absence_hours: f64,
    pub theoretical_hours: f64,
    pub absenteeism_percent: f64,
    /// Theoretical hours were zero, so the percentage was forced to 0.
    pub degenerate: bool,
    pub above_threshold: bool,
}

#[derive(Debug, Serialize, Tabled, Clone)]
pub struct MetricsExportRow {
    #[serde(rename = "Rango")]
    #[tabled(rename = "Rango")]
    pub range: String,
    #[serde(rename = "Geografía")]
    #[tabled(rename = "Geografía")]
    pub geography: String,
    #[serde(rename = "Año")]
    #[tabled(rename = "Año")]
    pub year: String,
    #[serde(rename = "Mes")]
    #[tabled(rename = "Mes")]
    pub month: u32,
    #[serde(rename = "Mes_nombre")]
    #[tabled(rename = "Mes_nombre")]
    pub month_name: String,
    #[serde(rename = "Ausencias")]
    #[tabled(rename = "Ausencias")]
    pub absence_count: usize,
    #[serde(rename = "Horas de ausencia")]
    #[tabled(rename = "Horas de ausencia")]
    pub absence_hours: String,
    #[serde(rename = "Horas teóricas")]
    #[tabled(rename = "Horas teóricas")]
    pub theoretical_hours: String,
    #[serde(rename = "Absentismo (%)")]
    #[tabled(rename = "Absentismo (%)")]
    pub absenteeism_percent: String,
    #[serde(rename = "Sobre umbral")]
    #[tabled(rename = "Sobre umbral")]
    pub above_threshold: String,
    #[serde(rename = "Sin capacidad")]
    #[tabled(rename = "Sin capacidad")]
    pub without_capacity: String,
}

/// Column headers of the exported sheet, in order.
pub const EXPORT_HEADERS: [&str; 11] = [
    "Rango",
    "Geografía",
    "Año",
    "Mes",
    "Mes_nombre",
    "Ausencias",
    "Horas de ausencia",
    "Horas teóricas",
    "Absentismo (%)",
    "Sobre umbral",
    "Sin capacidad",
];

pub fn yes_no(flag: bool) -> &'static str {
    if flag {
        "Sí"
    } else {
        "No"
    }
}

impl From<&MetricsRow> for MetricsExportRow {
    fn from(row: &MetricsRow) -> Self {
        Self {
            range: row.range.clone(),
            geography: row.geography.clone(),
            year: row.year.map(|y| y.to_string()).unwrap_or_default(),
            month: row.month,
            month_name: row.month_name.clone(),
            absence_count: row.absence_count,
            absence_hours: format!("{:.2}", row.absence_hours),
            theoretical_hours: format!("{:.2}", row.theoretical_hours),
            absenteeism_percent: format!("{:.2}", row.absenteeism_percent),
            above_threshold: yes_no(row.above_threshold).to_string(),
            without_capacity: yes_no(row.degenerate).to_string(),
        }
    }
}

/// Console flavour of the export row with thousands separators.
#[derive(Debug, Tabled, Clone)]
pub struct MetricsPreviewRow {
    #[tabled(rename = "Rango")]
    pub range: String,
    #[tabled(rename = "Geografía")]
    pub geography: String,
    #[tabled(rename = "Año")]
    pub year: String,
    #[tabled(rename = "Mes_nombre")]
    pub month_name: String,
    #[tabled(rename = "Horas de ausencia")]
    pub absence_hours: String,
    #[tabled(rename = "Horas teóricas")]
    pub theoretical_hours: String,
    #[tabled(rename = "Absentismo (%)")]
    pub absenteeism_percent: String,
    #[tabled(rename = "Sin capacidad")]
    pub without_capacity: String,
}

impl From<&MetricsRow> for MetricsPreviewRow {
    fn from(row: &MetricsRow) -> Self {
        Self {
            range: row.range.clone(),
            geography: row.geography.clone(),
            year: row.year.map(|y| y.to_string()).unwrap_or_default(),
            month_name: row.month_name.clone(),
            absence_hours: format_number(row.absence_hours, 2),
            theoretical_hours: format_number(row.theoretical_hours, 2),
            absenteeism_percent: format_number(row.absenteeism_percent, 2),
            without_capacity: yes_no(row.degenerate).to_string(),
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct RangeSummary {
    pub range: String,
    pub absence_hours: f64,
    pub theoretical_hours: f64,
    pub absenteeism_percent: f64,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SummaryStats {
    pub mode: String,
    pub total_rows: usize,
    pub total_absence_hours: f64,
    pub total_theoretical_hours: f64,
    pub overall_absenteeism: f64,
    pub ranges: Vec<RangeSummary>,
    pub diagnostics: usize,
}
