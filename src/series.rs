//! История наблюдений: постоянная копия, уплотнённый рабочий ряд и загрузка из CSV.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::error::Error;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::constants::DATE_FORMAT;
use crate::dates::parse_date_with_hint;
use crate::error::{ForecastError, Result};

type DailyBuckets = BTreeMap<NaiveDate, DailyAccumulator>;

/// Строка CSV с историей. Названия колонок принимаются в нескольких вариантах.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(alias = "ds", alias = "time_index", alias = "time")]
    date: String,
    #[serde(alias = "y", alias = "area")]
    value: f64,
}

/// Аккумулятор для усреднения значений внутри одного дня.
#[derive(Default, Clone, Copy)]
struct DailyAccumulator {
    sum: f64,
    count: u32,
}

impl DailyAccumulator {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / f64::from(self.count))
    }
}

/// Отсортированный ряд «дата -> значение» без пропусков-маркеров.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct History {
    points: BTreeMap<NaiveDate, f64>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Строит историю из пар; повтор даты даёт ошибку конфигурации.
    /// Нечисловое значение считается пропуском: дата остаётся отсутствующей.
    pub fn from_points<I>(points: I) -> Result<Self>
    where
        I: IntoIterator<Item = (NaiveDate, f64)>,
    {
        let mut map = BTreeMap::new();
        let mut skipped = 0usize;
        for (date, value) in points {
            if !value.is_finite() {
                skipped += 1;
                continue;
            }
            match map.entry(date) {
                Entry::Vacant(slot) => {
                    slot.insert(value);
                }
                Entry::Occupied(_) => {
                    return Err(ForecastError::Configuration(format!(
                        "duplicate history date {}",
                        date.format(DATE_FORMAT)
                    )));
                }
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "Skipped non-finite history values");
        }
        Ok(Self { points: map })
    }

    /// То же для текстовых ключей; если ключ не читается как дата, история не индексирована датами.
    pub fn from_records<I, K>(records: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut hint = None;
        let mut points = Vec::new();
        for (key, value) in records {
            let key = key.as_ref();
            let date = parse_date_with_hint(key, &mut hint).map_err(|err| {
                ForecastError::Configuration(format!(
                    "history must be indexed by dates, got '{key}': {err}"
                ))
            })?;
            points.push((date, value));
        }
        Self::from_points(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.points.keys().next().copied()
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.points.keys().next_back().copied()
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        self.points.get(&date).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.points.iter().map(|(date, value)| (*date, *value))
    }

    /// Число дней внутри диапазона, для которых нет наблюдения.
    pub fn gap_days(&self) -> usize {
        match (self.first_date(), self.last_date()) {
            (Some(first), Some(last)) => {
                let span = usize::try_from((last - first).num_days()).unwrap_or_default() + 1;
                span - self.points.len()
            }
            _ => 0,
        }
    }
}

/// Непрерывный дневной ряд для одного вызова прогноза: пропуски заполнены вперёд,
/// в конец дописываются спрогнозированные значения.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorkingHistory {
    start: Option<NaiveDate>,
    values: Vec<f64>,
}

impl WorkingHistory {
    /// Заполняет каждый день между первой и последней датой последним известным значением.
    pub fn densify(history: &History) -> Self {
        let (Some(first), Some(last)) = (history.first_date(), history.last_date()) else {
            return Self::default();
        };

        let span_days = usize::try_from((last - first).num_days()).unwrap_or_default();
        let mut values = Vec::with_capacity(span_days + 1);
        let mut last_known = None;
        for date in first.iter_days().take(span_days + 1) {
            if let Some(value) = history.get(date) {
                last_known = Some(value);
            }
            // Первый день всегда известен, так что last_known уже есть.
            if let Some(value) = last_known {
                values.push(value);
            }
        }

        Self {
            start: Some(first),
            values,
        }
    }

    pub const fn len(&self) -> usize {
        self.values.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub const fn first_date(&self) -> Option<NaiveDate> {
        self.start
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        let start = self.start?;
        let offset = u64::try_from(self.values.len().checked_sub(1)?).ok()?;
        start.checked_add_days(chrono::Days::new(offset))
    }

    pub fn get(&self, date: NaiveDate) -> Option<f64> {
        let offset = usize::try_from((date - self.start?).num_days()).ok()?;
        self.values.get(offset).copied()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.get(date).is_some()
    }

    /// Дописывает значение на следующий день после последнего.
    pub fn push_next(&mut self, date: NaiveDate, value: f64) -> Result<()> {
        match self.last_date() {
            Some(last) if last.succ_opt() == Some(date) => {
                self.values.push(value);
                Ok(())
            }
            None => {
                self.start = Some(date);
                self.values.push(value);
                Ok(())
            }
            Some(last) => Err(ForecastError::InvalidDate(format!(
                "{} does not follow {}",
                date.format(DATE_FORMAT),
                last.format(DATE_FORMAT)
            ))),
        }
    }
}

/// Читает CSV и усредняет наблюдения внутри каждого дня.
pub fn load_history(csv_path: &Path) -> std::result::Result<History, Box<dyn Error>> {
    let mut reader = csv::Reader::from_path(csv_path)?;
    let mut hint = None;
    let buckets = reader
        .deserialize::<CsvRow>()
        .try_fold(DailyBuckets::new(), |mut acc, row| {
            let row = row?;
            let date = parse_date_with_hint(&row.date, &mut hint)
                .map_err(|err| format!("failed to parse date '{}': {err}", row.date))?;
            acc.entry(date).or_default().add(row.value);
            Ok::<_, Box<dyn Error>>(acc)
        })?;

    let history = History::from_points(
        buckets
            .into_iter()
            .filter_map(|(date, acc)| acc.mean().map(|mean| (date, mean))),
    )?;
    tracing::debug!(
        points = history.len(),
        gap_days = history.gap_days(),
        path = %csv_path.display(),
        "Loaded history"
    );
    Ok(history)
}
