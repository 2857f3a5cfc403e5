//! Авторегрессионный движок прогноза: прогноз на произвольную дату с пошаговым
//! заполнением разрыва после последнего известного дня.
//!
//! Каждый вызов работает на своей копии уплотнённой истории, поэтому сама история
//! движка не меняется и его можно разделять между потоками без блокировок.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use itertools::Itertools;
use tracing::{debug, trace};

use crate::constants::{DATE_FORMAT, DEFAULT_LAGS};
use crate::dates::TargetDate;
use crate::error::{ForecastError, Result};
use crate::features::{Feature, FeatureVector, resolve_features};
use crate::model::Regressor;
use crate::series::{History, WorkingHistory};

/// Результат `predict`: одно число для одной даты, иначе упорядоченная карта.
#[derive(Clone, Debug, PartialEq)]
pub enum Prediction {
    Single { date: NaiveDate, value: f64 },
    Batch(BTreeMap<NaiveDate, f64>),
}

impl Prediction {
    pub const fn as_single(&self) -> Option<f64> {
        match self {
            Self::Single { value, .. } => Some(*value),
            Self::Batch(_) => None,
        }
    }

    pub fn into_map(self) -> BTreeMap<NaiveDate, f64> {
        match self {
            Self::Single { date, value } => BTreeMap::from([(date, value)]),
            Self::Batch(values) => values,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ForecastEngine<M> {
    model: M,
    features: Vec<Feature>,
    history: History,
    lags: Vec<u32>,
}

impl<M: Regressor> ForecastEngine<M> {
    /// Движок с лагами по умолчанию (364, 728, 1092).
    pub fn new<S: AsRef<str>>(model: M, features: &[S], history: History) -> Result<Self> {
        Self::with_lags(model, features, history, &DEFAULT_LAGS)
    }

    pub fn with_lags<S: AsRef<str>>(
        model: M,
        features: &[S],
        history: History,
        lags: &[u32],
    ) -> Result<Self> {
        if lags.is_empty() {
            return Err(ForecastError::Configuration(
                "at least one lag offset is required".to_string(),
            ));
        }
        if lags.contains(&0) {
            return Err(ForecastError::Configuration(
                "lag offsets must be positive".to_string(),
            ));
        }
        let features = resolve_features(features, lags.len())?;
        Ok(Self {
            model,
            features,
            history,
            lags: lags.to_vec(),
        })
    }

    /// Тот же движок с другой моделью; история, лаги и признаки сохраняются.
    pub fn with_model<N: Regressor>(self, model: N) -> ForecastEngine<N> {
        ForecastEngine {
            model,
            features: self.features,
            history: self.history,
            lags: self.lags,
        }
    }

    pub const fn model(&self) -> &M {
        &self.model
    }

    pub const fn history(&self) -> &History {
        &self.history
    }

    pub fn lags(&self) -> &[u32] {
        &self.lags
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    /// Прогноз на одну или несколько дат. Любая ошибка прерывает весь вызов.
    pub fn predict<I>(&self, dates: I) -> Result<Prediction>
    where
        I: IntoIterator,
        I::Item: TargetDate,
    {
        let requested = dates
            .into_iter()
            .map(|date| date.to_target_date())
            .collect::<Result<Vec<_>>>()?;
        let mut values = self.predict_dates(&requested)?;

        if let [date] = requested.as_slice() {
            let value = values.remove(date).ok_or(ForecastError::NoTargetDates)?;
            return Ok(Prediction::Single { date: *date, value });
        }
        Ok(Prediction::Batch(values))
    }

    pub fn predict_one<D: TargetDate>(&self, date: D) -> Result<f64> {
        let date = date.to_target_date()?;
        let mut values = self.predict_dates(&[date])?;
        values.remove(&date).ok_or(ForecastError::NoTargetDates)
    }

    pub fn predict_many<I>(&self, dates: I) -> Result<BTreeMap<NaiveDate, f64>>
    where
        I: IntoIterator,
        I::Item: TargetDate,
    {
        let requested = dates
            .into_iter()
            .map(|date| date.to_target_date())
            .collect::<Result<Vec<_>>>()?;
        self.predict_dates(&requested)
    }

    fn predict_dates(&self, requested: &[NaiveDate]) -> Result<BTreeMap<NaiveDate, f64>> {
        if requested.is_empty() {
            return Err(ForecastError::NoTargetDates);
        }

        let mut working = WorkingHistory::densify(&self.history);
        let mut out = BTreeMap::new();
        for date in requested.iter().copied().sorted().dedup() {
            if let Some(last) = working.last_date() {
                if date > last {
                    self.roll_forward(&mut working, last, date)?;
                }
            }
            let value = self.predict_day(&working, date)?;
            out.insert(date, value);
        }
        Ok(out)
    }

    /// Прогнозирует каждый день после `last` до `target` включительно и дописывает его в историю.
    fn roll_forward(
        &self,
        working: &mut WorkingHistory,
        last: NaiveDate,
        target: NaiveDate,
    ) -> Result<()> {
        debug!(
            from = %last.format(DATE_FORMAT),
            to = %target.format(DATE_FORMAT),
            steps = (target - last).num_days(),
            "Rolling forecast forward"
        );
        let mut step = last;
        while step < target {
            step = step.succ_opt().ok_or_else(|| {
                ForecastError::InvalidDate(format!(
                    "no day after {}",
                    step.format(DATE_FORMAT)
                ))
            })?;
            let value = self.predict_day(working, step)?;
            trace!(date = %step.format(DATE_FORMAT), value, "Rolled forward");
            working.push_next(step, value)?;
        }
        Ok(())
    }

    fn predict_day(&self, working: &WorkingHistory, date: NaiveDate) -> Result<f64> {
        let vector = FeatureVector::build(date, &self.lags, working)?;
        let input = vector.select(&self.features)?;
        let value = self
            .model
            .predict(&input)
            .map_err(|source| ForecastError::Model { date, source })?;
        if !value.is_finite() {
            return Err(ForecastError::Model {
                date,
                source: format!("model returned non-finite value {value}").into(),
            });
        }
        Ok(value)
    }
}
