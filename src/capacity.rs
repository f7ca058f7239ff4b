// Staffing model used to turn a (geography, [year,] month) into the hours
// the workforce could theoretically have worked.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Average duty-eligible days per month. Count mode charges each absence
/// event `monthly_working_hours / WORKING_DAYS_PER_MONTH` hours regardless
/// of how long the month actually is.
pub const WORKING_DAYS_PER_MONTH: f64 = 28.0;

pub const DEFAULT_MONTHLY_HOURS: f64 = 140.0;
pub const DEFAULT_EMPLOYEES: u32 = 100;

/// How capacity entries are addressed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Keying {
    /// One entry per geography, reused for every year.
    #[default]
    #[serde(rename = "geografia")]
    Geography,
    /// Independent entries per (geography, year).
    #[serde(rename = "geografia_anio")]
    GeographyYear,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CapacityKey {
    pub geography: String,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CapacityEntry {
    pub monthly_working_hours: f64,
    pub employees_by_month: BTreeMap<u32, u32>,
}

impl CapacityEntry {
    pub fn new(monthly_working_hours: f64) -> Self {
        Self {
            monthly_working_hours,
            employees_by_month: BTreeMap::new(),
        }
    }

    /// Same head count for all twelve months.
    pub fn uniform(monthly_working_hours: f64, employees: u32) -> Self {
        Self {
            monthly_working_hours,
            employees_by_month: (1..=12).map(|m| (m, employees)).collect(),
        }
    }

    pub fn with_employees(mut self, month: u32, employees: u32) -> Self {
        self.employees_by_month.insert(month, employees);
        self
    }

    pub fn employees(&self, month: u32) -> u32 {
        self.employees_by_month.get(&month).copied().unwrap_or(0)
    }

    pub fn theoretical_hours(&self, month: u32) -> f64 {
        self.employees(month) as f64 * self.monthly_working_hours
    }

    pub fn hours_per_absence_event(&self) -> f64 {
        self.monthly_working_hours / WORKING_DAYS_PER_MONTH
    }
}

/// Immutable once built. Every lookup is total: an unknown key yields zero
/// staffing and zero hours instead of an error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CapacityModel {
    keying: Keying,
    entries: BTreeMap<CapacityKey, CapacityEntry>,
}

impl CapacityModel {
    pub fn new(keying: Keying) -> Self {
        Self {
            keying,
            entries: BTreeMap::new(),
        }
    }

    /// The form defaults: every geography gets the standard working day and
    /// head count for all months.
    pub fn with_defaults<I, S>(geographies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        geographies.into_iter().fold(Self::new(Keying::Geography), |model, geo| {
            model.with_entry(
                geo,
                None,
                CapacityEntry::uniform(DEFAULT_MONTHLY_HOURS, DEFAULT_EMPLOYEES),
            )
        })
    }

    /// Add or replace an entry. The year is ignored under geography-only
    /// addressing.
    pub fn with_entry(mut self, geography: impl Into<String>, year: Option<i32>, entry: CapacityEntry) -> Self {
        let key = self.key(geography.into(), year);
        self.entries.insert(key, entry);
        self
    }

    pub fn keying(&self) -> Keying {
        self.keying
    }

    pub fn splits_by_year(&self) -> bool {
        self.keying == Keying::GeographyYear
    }

    pub fn entries(&self) -> impl Iterator<Item = (&CapacityKey, &CapacityEntry)> {
        self.entries.iter()
    }

    fn key(&self, geography: String, year: Option<i32>) -> CapacityKey {
        CapacityKey {
            geography,
            year: match self.keying {
                Keying::Geography => None,
                Keying::GeographyYear => year,
            },
        }
    }

    pub fn entry(&self, geography: &str, year: Option<i32>) -> Option<&CapacityEntry> {
        self.entries.get(&self.key(geography.to_string(), year))
    }

    pub fn theoretical_hours(&self, geography: &str, year: Option<i32>, month: u32) -> f64 {
        self.entry(geography, year)
            .map_or(0.0, |e| e.theoretical_hours(month))
    }

    pub fn hours_per_absence_event(&self, geography: &str, year: Option<i32>) -> f64 {
        self.entry(geography, year)
            .map_or(0.0, |e| e.hours_per_absence_event())
    }
}
