use crate::types::{AbsenceEvent, DateRange};
use std::collections::BTreeSet;

/// The inclusion sets chosen by the user.
///
/// `functions` is `None` when the source has no function column; the
/// dimension is then not filtered at all.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub geographies: BTreeSet<String>,
    pub codes: BTreeSet<String>,
    pub functions: Option<BTreeSet<String>>,
}

impl Selection {
    /// Select every non-empty value present in the data.
    pub fn all(events: &[AbsenceEvent], filter_functions: bool) -> Self {
        Self {
            geographies: distinct_values(events, |e| &e.geography).into_iter().collect(),
            codes: distinct_values(events, |e| &e.code).into_iter().collect(),
            functions: filter_functions
                .then(|| distinct_values(events, |e| &e.function).into_iter().collect()),
        }
    }

    pub fn matches(&self, event: &AbsenceEvent) -> bool {
        selected(&self.geographies, &event.geography)
            && selected(&self.codes, &event.code)
            && self
                .functions
                .as_ref()
                .map_or(true, |f| selected(f, &event.function))
    }
}

fn selected(set: &BTreeSet<String>, value: &str) -> bool {
    !value.is_empty() && set.contains(value)
}

/// Sorted distinct non-empty values of one dimension.
pub fn distinct_values<F>(events: &[AbsenceEvent], field: F) -> Vec<String>
where
    F: Fn(&AbsenceEvent) -> &String,
{
    events
        .iter()
        .map(|e| field(e))
        .filter(|v| !v.is_empty())
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// The events that fall in one range after the selectors were applied.
#[derive(Debug, Clone)]
pub struct RangeSubset<'a> {
    pub range: DateRange,
    pub events: Vec<&'a AbsenceEvent>,
}

/// Apply the selectors once, then split per range. Ranges are independent,
/// so an event may land in several subsets when ranges overlap.
pub fn filter_events<'a>(
    events: &'a [AbsenceEvent],
    selection: &Selection,
    ranges: &[DateRange],
) -> Vec<RangeSubset<'a>> {
    let kept: Vec<&AbsenceEvent> = events.iter().filter(|e| selection.matches(e)).collect();
    ranges
        .iter()
        .map(|range| RangeSubset {
            range: range.clone(),
            events: kept
                .iter()
                .copied()
                .filter(|e| range.contains(&e.start))
                .collect(),
        })
        .collect()
}

/// Earliest start to latest start or end date in the data, used as the
/// default range.
pub fn span(events: &[AbsenceEvent]) -> Option<DateRange> {
    let min = events.iter().map(|e| e.start.date()).min()?;
    let max = events
        .iter()
        .map(|e| e.end.unwrap_or(e.start).date())
        .max()?;
    DateRange::new("Periodo", min, max).ok()
}
