// The whole computation as one pure function: events, selectors, ranges and
// capacity in, metrics out. Nothing here touches session state or files.
use crate::aggregate::{aggregate, overall_absenteeism, range_summaries, AggregationOptions, Mode};
use crate::capacity::CapacityModel;
use crate::error::{Diagnostic, RangeError};
use crate::filter::{filter_events, Selection};
use crate::types::{AbsenceEvent, DateRange, MetricsRow, RangeSummary, SummaryStats};

#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub mode: Mode,
    pub by_year: bool,
    pub ranges: Vec<DateRange>,
    pub rows: Vec<MetricsRow>,
    pub overall: f64,
    pub per_range: Vec<RangeSummary>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn summary(&self) -> SummaryStats {
        SummaryStats {
            mode: self.mode.label().to_string(),
            total_rows: self.rows.len(),
            total_absence_hours: self.rows.iter().map(|r| r.absence_hours).sum(),
            total_theoretical_hours: self.rows.iter().map(|r| r.theoretical_hours).sum(),
            overall_absenteeism: self.overall,
            ranges: self.per_range.clone(),
            diagnostics: self.diagnostics.len(),
        }
    }
}

/// Run filter and aggregation for every valid range. Invalid ranges are
/// reported and skipped; they never stop the others.
pub fn analyze(
    events: &[AbsenceEvent],
    selection: &Selection,
    ranges: &[Result<DateRange, RangeError>],
    capacity: &CapacityModel,
    options: &AggregationOptions,
) -> Analysis {
    let mut diagnostics = Vec::new();
    let mut valid = Vec::new();
    for range in ranges {
        match range {
            Ok(r) => valid.push(r.clone()),
            Err(e) => diagnostics.push(Diagnostic::InvalidRange {
                name: range_name(e).to_string(),
                reason: e.to_string(),
            }),
        }
    }

    if options.mode == Mode::Duration {
        let missing_end = events
            .iter()
            .filter(|e| e.duration_hours.is_none())
            .filter(|e| selection.matches(e) && valid.iter().any(|r| r.contains(&e.start)))
            .count();
        if missing_end > 0 {
            diagnostics.push(Diagnostic::MissingEnd { count: missing_end });
        }
    }

    let subsets = filter_events(events, selection, &valid);
    let metrics = aggregate(&subsets, &selection.geographies, capacity, options);
    diagnostics.extend(metrics.diagnostics);

    for d in &diagnostics {
        log::warn!("{}", d);
    }

    let names: Vec<String> = valid.iter().map(|r| r.name.clone()).collect();
    Analysis {
        mode: options.mode,
        by_year: capacity.splits_by_year(),
        overall: overall_absenteeism(&metrics.rows),
        per_range: range_summaries(&metrics.rows, &names),
        ranges: valid,
        rows: metrics.rows,
        diagnostics,
    }
}

fn range_name(e: &RangeError) -> &str {
    match e {
        RangeError::Incomplete { name, .. }
        | RangeError::StartAfterEnd { name, .. }
        | RangeError::UnreadableDate { name, .. } => name.as_str(),
    }
}
