// JSON snapshot of the capacity form.
//
// The file keeps the historical field names (`geografias`, `jornada`,
// `empleados`, ...) and the "<geo>,<year>" key spelling. That spelling only
// exists here: it is parsed into a `CapacityKey` on import and rebuilt on
// export.
use crate::aggregate::{AggregationOptions, Mode};
use crate::capacity::{CapacityEntry, CapacityKey, CapacityModel, Keying};
use crate::error::{ConfigError, RangeError};
use crate::filter::Selection;
use crate::types::{AbsenceEvent, DateRange};
use crate::util::parse_date_safe;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapacityConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geografias: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funciones: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codigos: Option<Vec<String>>,
    #[serde(default)]
    pub umbral: f64,
    #[serde(default)]
    pub config: BTreeMap<String, EntryConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rangos: Vec<RangeConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modo: Option<Keying>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calculo: Option<Mode>,
    #[serde(default)]
    pub meses_sin_datos: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryConfig {
    pub jornada: f64,
    #[serde(default)]
    pub empleados: BTreeMap<u32, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeConfig {
    pub nombre: String,
    #[serde(default)]
    pub inicio: Option<String>,
    #[serde(default)]
    pub fin: Option<String>,
}

pub fn load_config(path: &str) -> Result<CapacityConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&text)?;
    Ok(cfg)
}

pub fn save_config(path: &str, cfg: &CapacityConfig) -> Result<(), ConfigError> {
    let s = serde_json::to_string_pretty(cfg)?;
    std::fs::write(path, s)?;
    Ok(())
}

fn format_key(key: &CapacityKey) -> String {
    match key.year {
        Some(year) => format!("{},{}", key.geography, year),
        None => key.geography.clone(),
    }
}

/// Split a "<geo>,<year>" key at its last comma so geography names may
/// contain commas themselves.
fn parse_key(raw: &str, keying: Keying) -> Result<(String, Option<i32>), ConfigError> {
    match keying {
        Keying::Geography => Ok((raw.to_string(), None)),
        Keying::GeographyYear => raw
            .rsplit_once(',')
            .and_then(|(geo, year)| year.trim().parse::<i32>().ok().map(|y| (geo.to_string(), Some(y))))
            .ok_or_else(|| ConfigError::InvalidKey(raw.to_string())),
    }
}

fn looks_per_year(raw: &str) -> bool {
    raw.rsplit_once(',')
        .map_or(false, |(_, year)| year.trim().parse::<i32>().is_ok())
}

impl CapacityConfig {
    /// Explicit `modo`, otherwise per-year when every key carries a year.
    pub fn keying(&self) -> Keying {
        if let Some(k) = self.modo {
            return k;
        }
        if !self.config.is_empty() && self.config.keys().all(|k| looks_per_year(k)) {
            Keying::GeographyYear
        } else {
            Keying::Geography
        }
    }

    pub fn capacity_model(&self) -> Result<CapacityModel, ConfigError> {
        let keying = self.keying();
        let mut model = CapacityModel::new(keying);
        for (raw, entry) in &self.config {
            if !(entry.jornada > 0.0) {
                return Err(ConfigError::NonPositiveHours(raw.clone()));
            }
            if let Some(bad) = entry.empleados.keys().find(|m| !(1..=12).contains(*m)) {
                return Err(ConfigError::InvalidMonth {
                    key: raw.clone(),
                    month: bad.to_string(),
                });
            }
            let (geography, year) = parse_key(raw, keying)?;
            model = model.with_entry(
                geography,
                year,
                entry
                    .empleados
                    .iter()
                    .fold(CapacityEntry::new(entry.jornada), |e, (month, n)| e.with_employees(*month, *n)),
            );
        }
        Ok(model)
    }

    /// Configured selectors, falling back to everything in the data for
    /// any list the snapshot leaves out.
    pub fn selection(&self, events: &[AbsenceEvent], has_function_column: bool) -> Selection {
        let all = Selection::all(events, has_function_column);
        let pick = |configured: &Option<Vec<String>>, default: BTreeSet<String>| {
            configured
                .as_ref()
                .map(|v| v.iter().cloned().collect())
                .unwrap_or(default)
        };
        Selection {
            geographies: pick(&self.geografias, all.geographies),
            codes: pick(&self.codigos, all.codes),
            functions: all.functions.map(|f| pick(&self.funciones, f)),
        }
    }

    /// Every configured range, each validated on its own.
    pub fn ranges(&self) -> Vec<Result<DateRange, RangeError>> {
        self.rangos.iter().map(RangeConfig::to_range).collect()
    }

    pub fn aggregation_options(&self, detected: Mode) -> AggregationOptions {
        AggregationOptions {
            mode: self.calculo.unwrap_or(detected),
            emit_zero_months: self.meses_sin_datos,
            threshold: (self.umbral > 0.0).then_some(self.umbral),
        }
    }

    /// Snapshot the current session so it can be re-imported later.
    pub fn from_session(
        model: &CapacityModel,
        selection: &Selection,
        ranges: &[DateRange],
        options: &AggregationOptions,
    ) -> Self {
        Self {
            geografias: Some(selection.geographies.iter().cloned().collect()),
            funciones: selection.functions.as_ref().map(|f| f.iter().cloned().collect()),
            codigos: Some(selection.codes.iter().cloned().collect()),
            umbral: options.threshold.unwrap_or(0.0),
            config: model
                .entries()
                .map(|(key, entry)| {
                    (
                        format_key(key),
                        EntryConfig {
                            jornada: entry.monthly_working_hours,
                            empleados: entry.employees_by_month.clone(),
                        },
                    )
                })
                .collect(),
            rangos: ranges
                .iter()
                .map(|r| RangeConfig {
                    nombre: r.name.clone(),
                    inicio: Some(r.start.format("%Y-%m-%d").to_string()),
                    fin: Some(r.end.format("%Y-%m-%d").to_string()),
                })
                .collect(),
            modo: Some(model.keying()),
            calculo: Some(options.mode),
            meses_sin_datos: options.emit_zero_months,
        }
    }
}

impl RangeConfig {
    fn to_range(&self) -> Result<DateRange, RangeError> {
        let mut endpoints = Vec::new();
        for value in [&self.inicio, &self.fin].into_iter().flatten() {
            if value.trim().is_empty() {
                continue;
            }
            let day = parse_date_safe(Some(value.as_str())).ok_or_else(|| RangeError::UnreadableDate {
                name: self.nombre.clone(),
                value: value.clone(),
            })?;
            endpoints.push(day);
        }
        DateRange::from_endpoints(self.nombre.clone(), &endpoints)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    const SNAPSHOT: &str = r#"{
        "geografias": ["Madrid"],
        "codigos": ["X", "Y"],
        "umbral": 3.5,
        "config": {
            "Madrid": {"jornada": 140, "empleados": {"1": 100, "2": 50}},
            "Sevilla": {"jornada": 160, "empleados": {"1": 20}}
        }
    }"#;

    #[test]
    fn parses_the_documented_snapshot() {
        let cfg: CapacityConfig = serde_json::from_str(SNAPSHOT).unwrap();
        assert_eq!(cfg.keying(), Keying::Geography);
        let model = cfg.capacity_model().unwrap();
        assert_eq!(model.theoretical_hours("Madrid", None, 1), 14000.0);
        assert_eq!(model.theoretical_hours("Madrid", None, 2), 7000.0);
        assert_eq!(model.theoretical_hours("Sevilla", None, 1), 3200.0);
        assert_eq!(model.theoretical_hours("Sevilla", None, 2), 0.0);
        let options = cfg.aggregation_options(Mode::Count);
        assert_eq!(options.threshold, Some(3.5));
        assert_eq!(options.mode, Mode::Count);
    }

    #[test]
    fn per_year_keys_split_at_the_last_comma() {
        let cfg: CapacityConfig = serde_json::from_str(
            r#"{"config": {
                "Norte, Sur,2023": {"jornada": 140, "empleados": {"1": 10}},
                "Madrid,2024": {"jornada": 150, "empleados": {"1": 10}}
            }}"#,
        )
        .unwrap();
        assert_eq!(cfg.keying(), Keying::GeographyYear);
        let model = cfg.capacity_model().unwrap();
        assert_eq!(model.theoretical_hours("Norte, Sur", Some(2023), 1), 1400.0);
        assert_eq!(model.theoretical_hours("Madrid", Some(2024), 1), 1500.0);
        assert_eq!(model.theoretical_hours("Madrid", Some(2023), 1), 0.0);
    }

    #[test]
    fn explicit_per_year_mode_rejects_keys_without_year() {
        let cfg: CapacityConfig = serde_json::from_str(
            r#"{"modo": "geografia_anio", "config": {"Madrid": {"jornada": 140}}}"#,
        )
        .unwrap();
        assert!(matches!(cfg.capacity_model(), Err(ConfigError::InvalidKey(k)) if k == "Madrid"));
    }

    #[test]
    fn rejects_non_positive_hours_and_bad_months() {
        let cfg: CapacityConfig =
            serde_json::from_str(r#"{"config": {"Madrid": {"jornada": 0}}}"#).unwrap();
        assert!(matches!(cfg.capacity_model(), Err(ConfigError::NonPositiveHours(_))));

        let cfg: CapacityConfig = serde_json::from_str(
            r#"{"config": {"Madrid": {"jornada": 140, "empleados": {"13": 1}}}}"#,
        )
        .unwrap();
        assert!(matches!(cfg.capacity_model(), Err(ConfigError::InvalidMonth { .. })));
    }

    #[test]
    fn ranges_are_validated_one_by_one() {
        let cfg: CapacityConfig = serde_json::from_str(
            r#"{"rangos": [
                {"nombre": "Q1", "inicio": "2023-01-01", "fin": "2023-03-31"},
                {"nombre": "Roto", "inicio": "2023-05-01", "fin": "2023-04-01"},
                {"nombre": "Medio", "inicio": "2023-05-01"},
                {"nombre": "Raro", "inicio": "ayer", "fin": "2023-04-01"}
            ]}"#,
        )
        .unwrap();
        let ranges = cfg.ranges();
        assert_eq!(ranges[0].as_ref().unwrap().end, NaiveDate::from_ymd_opt(2023, 3, 31).unwrap());
        assert!(matches!(ranges[1], Err(RangeError::StartAfterEnd { .. })));
        assert!(matches!(ranges[2], Err(RangeError::Incomplete { supplied: 1, .. })));
        assert!(matches!(ranges[3], Err(RangeError::UnreadableDate { .. })));
    }

    #[test]
    fn selection_defaults_to_everything_in_the_data() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap().and_hms_opt(0, 0, 0).unwrap();
        let events = vec![
            AbsenceEvent::new(start, None, "Madrid", "Ventas", "X"),
            AbsenceEvent::new(start, None, "Sevilla", "Almacén", "Z"),
        ];
        let cfg: CapacityConfig = serde_json::from_str(SNAPSHOT).unwrap();
        let selection = cfg.selection(&events, true);
        assert_eq!(selection.geographies.len(), 1);
        assert!(selection.codes.contains("Y"));
        assert_eq!(selection.functions.map(|f| f.len()), Some(2));
        assert_eq!(cfg.selection(&events, false).functions, None);
    }

    #[test]
    fn export_then_import_preserves_every_lookup() {
        let model = CapacityModel::new(Keying::GeographyYear)
            .with_entry("Norte,Sur", Some(2023), CapacityEntry::new(140.0).with_employees(1, 100))
            .with_entry("Madrid", Some(2024), CapacityEntry::uniform(152.5, 7));
        let selection = Selection {
            geographies: ["Madrid".to_string()].into_iter().collect(),
            codes: ["X".to_string()].into_iter().collect(),
            functions: None,
        };
        let ranges = vec![DateRange::new(
            "Q1",
            NaiveDate::from_ymd_opt(2023, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2023, 3, 31).unwrap(),
        )
        .unwrap()];
        let mut options = AggregationOptions::new(Mode::Duration);
        options.threshold = Some(4.0);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let path = path.to_str().unwrap();
        save_config(path, &CapacityConfig::from_session(&model, &selection, &ranges, &options)).unwrap();
        let restored = load_config(path).unwrap();

        assert_eq!(restored.capacity_model().unwrap(), model);
        assert_eq!(restored.ranges(), vec![Ok(ranges[0].clone())]);
        assert_eq!(restored.aggregation_options(Mode::Count), options);
        for year in [2023, 2024] {
            for month in 1..=12 {
                for geo in ["Norte,Sur", "Madrid"] {
                    assert_eq!(
                        restored.capacity_model().unwrap().theoretical_hours(geo, Some(year), month),
                        model.theoretical_hours(geo, Some(year), month)
                    );
                }
            }
        }
    }
}
