use crate::capacity::CapacityModel;
use crate::error::Diagnostic;
use crate::filter::RangeSubset;
use crate::types::{AbsenceEvent, MetricsRow, RangeSummary};
use crate::util::{month_name, percent, round2};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// How absence hours are obtained for a group of events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Sum of the measured start-to-end hours.
    #[serde(rename = "duracion")]
    Duration,
    /// Every event is charged a flat share of the monthly working hours.
    #[serde(rename = "recuento")]
    Count,
}

impl Mode {
    /// Duration mode needs an end column; without one we can only count.
    pub fn for_columns(has_end_column: bool) -> Self {
        if has_end_column {
            Mode::Duration
        } else {
            Mode::Count
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Mode::Duration => "duration",
            Mode::Count => "count",
        }
    }

    pub fn absence_hours(
        &self,
        events: &[&AbsenceEvent],
        capacity: &CapacityModel,
        geography: &str,
        year: Option<i32>,
    ) -> f64 {
        match self {
            Mode::Duration => events.iter().filter_map(|e| e.duration_hours).sum(),
            Mode::Count => events.len() as f64 * capacity.hours_per_absence_event(geography, year),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregationOptions {
    pub mode: Mode,
    /// Emit zero-rows for selected geographies in months without events.
    pub emit_zero_months: bool,
    /// Alert threshold in percent; `None` disables flagging.
    pub threshold: Option<f64>,
}

impl AggregationOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            emit_zero_months: false,
            threshold: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metrics {
    pub rows: Vec<MetricsRow>,
    pub diagnostics: Vec<Diagnostic>,
}

type GroupKey = (String, Option<i32>, u32);

/// Group each range's events by (geography, [year,] month) and compute the
/// absenteeism of every group.
///
/// Rows come out ordered by range position, then geography, year and
/// calendar month. `geographies` is only consulted when zero months are
/// emitted.
pub fn aggregate(
    subsets: &[RangeSubset<'_>],
    geographies: &BTreeSet<String>,
    capacity: &CapacityModel,
    options: &AggregationOptions,
) -> Metrics {
    let by_year = capacity.splits_by_year();
    let mut metrics = Metrics::default();

    for subset in subsets {
        let mut groups: BTreeMap<GroupKey, Vec<&AbsenceEvent>> = BTreeMap::new();
        if options.emit_zero_months {
            for geo in geographies {
                for (year, month) in subset.range.months() {
                    groups
                        .entry((geo.clone(), by_year.then_some(year), month))
                        .or_default();
                }
            }
        }
        for e in &subset.events {
            groups
                .entry((e.geography.clone(), by_year.then_some(e.year), e.month))
                .or_default()
                .push(*e);
        }

        for ((geography, year, month), events) in groups {
            let row = build_row(&subset.range.name, geography, year, month, &events, capacity, options);
            if row.degenerate && row.absence_count > 0 {
                metrics.diagnostics.push(Diagnostic::MissingCapacity {
                    range: row.range.clone(),
                    geography: row.geography.clone(),
                    year: row.year,
                    month: row.month,
                });
            }
            if row.above_threshold {
                metrics.diagnostics.push(Diagnostic::AboveThreshold {
                    range: row.range.clone(),
                    geography: row.geography.clone(),
                    year: row.year,
                    month: row.month,
                    percent: row.absenteeism_percent,
                });
            }
            metrics.rows.push(row);
        }
    }
    metrics
}

fn build_row(
    range: &str,
    geography: String,
    year: Option<i32>,
    month: u32,
    events: &[&AbsenceEvent],
    capacity: &CapacityModel,
    options: &AggregationOptions,
) -> MetricsRow {
    let absence_hours = options.mode.absence_hours(events, capacity, &geography, year);
    let theoretical_hours = capacity.theoretical_hours(&geography, year, month);
    let absenteeism_percent = round2(percent(absence_hours, theoretical_hours));
    MetricsRow {
        range: range.to_string(),
        geography,
        year,
        month,
        month_name: month_name(month),
        absence_count: events.len(),
        absence_hours,
        theoretical_hours,
        absenteeism_percent,
        degenerate: theoretical_hours == 0.0,
        above_threshold: options
            .threshold
            .map_or(false, |t| t > 0.0 && absenteeism_percent > t),
    }
}

/// Hours are summed before dividing so small groups do not skew the figure.
pub fn overall_absenteeism(rows: &[MetricsRow]) -> f64 {
    let absence: f64 = rows.iter().map(|r| r.absence_hours).sum();
    let theoretical: f64 = rows.iter().map(|r| r.theoretical_hours).sum();
    round2(percent(absence, theoretical))
}

/// One overall figure per range, in range order.
pub fn range_summaries(rows: &[MetricsRow], ranges: &[String]) -> Vec<RangeSummary> {
    ranges
        .iter()
        .map(|name| {
            let (absence_hours, theoretical_hours) = rows
                .iter()
                .filter(|r| &r.range == name)
                .fold((0.0, 0.0), |(a, t), r| (a + r.absence_hours, t + r.theoretical_hours));
            RangeSummary {
                range: name.clone(),
                absence_hours,
                theoretical_hours,
                absenteeism_percent: round2(percent(absence_hours, theoretical_hours)),
            }
        })
        .collect()
}
