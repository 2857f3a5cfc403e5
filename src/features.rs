//! Календарные и лаговые признаки для одной целевой даты.

use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, Days, NaiveDate};

use crate::constants::DATE_FORMAT;
use crate::error::{ForecastError, Result};
use crate::series::WorkingHistory;

const FEATURE_DAY: &str = "day";
const FEATURE_MONTH: &str = "month";
const FEATURE_YEAR: &str = "year";
const FEATURE_DAY_OF_WEEK: &str = "day_of_week";
const FEATURE_DAY_OF_WEEK_ALIAS: &str = "dayofweek";
const LAG_PREFIX: &str = "lag";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Feature {
    Day,
    Month,
    Year,
    /// 0 = понедельник.
    DayOfWeek,
    /// Номер лага с единицы, в порядке заданных смещений.
    Lag(usize),
}

impl FromStr for Feature {
    type Err = ForecastError;

    fn from_str(raw: &str) -> Result<Self> {
        let name = raw.trim().to_lowercase();
        match name.as_str() {
            FEATURE_DAY => Ok(Self::Day),
            FEATURE_MONTH => Ok(Self::Month),
            FEATURE_YEAR => Ok(Self::Year),
            FEATURE_DAY_OF_WEEK | FEATURE_DAY_OF_WEEK_ALIAS => Ok(Self::DayOfWeek),
            _ => name
                .strip_prefix(LAG_PREFIX)
                .and_then(|index| index.parse::<usize>().ok())
                .filter(|index| *index > 0)
                .map(Self::Lag)
                .ok_or_else(|| ForecastError::Configuration(format!("unknown feature '{raw}'"))),
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Day => f.write_str(FEATURE_DAY),
            Self::Month => f.write_str(FEATURE_MONTH),
            Self::Year => f.write_str(FEATURE_YEAR),
            Self::DayOfWeek => f.write_str(FEATURE_DAY_OF_WEEK),
            Self::Lag(index) => write!(f, "{LAG_PREFIX}{index}"),
        }
    }
}

/// Полный набор признаков: календарь и затем все лаги.
pub fn all_features(lag_count: usize) -> Vec<Feature> {
    [Feature::Day, Feature::Month, Feature::Year, Feature::DayOfWeek]
        .into_iter()
        .chain((1..=lag_count).map(Feature::Lag))
        .collect()
}

/// Разбирает имена признаков модели и проверяет, что лаги существуют.
pub fn resolve_features<S: AsRef<str>>(names: &[S], lag_count: usize) -> Result<Vec<Feature>> {
    if names.is_empty() {
        return Err(ForecastError::Configuration(
            "feature list must not be empty".to_string(),
        ));
    }
    names
        .iter()
        .map(|name| -> Result<Feature> {
            let feature = name.as_ref().parse::<Feature>()?;
            if let Feature::Lag(index) = feature {
                if index > lag_count {
                    return Err(ForecastError::Configuration(format!(
                        "feature '{feature}' refers to a lag that is not configured ({lag_count} lags)"
                    )));
                }
            }
            Ok(feature)
        })
        .collect()
}

/// Значение на одном лаге; `value == None`, если дата назад отсутствует в истории.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LagValue {
    pub offset: u32,
    pub lookback: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub date: NaiveDate,
    pub day: u32,
    pub month: u32,
    pub year: i32,
    pub day_of_week: u32,
    pub lags: Vec<LagValue>,
}

impl FeatureVector {
    pub fn build(date: NaiveDate, offsets: &[u32], history: &WorkingHistory) -> Result<Self> {
        let lags = offsets
            .iter()
            .map(|&offset| -> Result<LagValue> {
                let lookback = date
                    .checked_sub_days(Days::new(u64::from(offset)))
                    .ok_or_else(|| {
                        ForecastError::InvalidDate(format!(
                            "{} minus {offset} days is out of range",
                            date.format(DATE_FORMAT)
                        ))
                    })?;
                Ok(LagValue {
                    offset,
                    lookback,
                    value: history.get(lookback),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            date,
            day: date.day(),
            month: date.month(),
            year: date.year(),
            day_of_week: date.weekday().num_days_from_monday(),
            lags,
        })
    }

    /// Даты назад, которых нет в истории, в порядке смещений.
    pub fn missing_lookbacks(&self) -> Vec<NaiveDate> {
        self.lags
            .iter()
            .filter(|lag| lag.value.is_none())
            .map(|lag| lag.lookback)
            .collect()
    }

    pub fn get(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::Day => Some(f64::from(self.day)),
            Feature::Month => Some(f64::from(self.month)),
            Feature::Year => Some(f64::from(self.year)),
            Feature::DayOfWeek => Some(f64::from(self.day_of_week)),
            Feature::Lag(index) => self
                .lags
                .get(index.checked_sub(1)?)
                .and_then(|lag| lag.value),
        }
    }

    /// Вектор для модели. Проверяются все лаги, даже те, что модель не использует.
    pub fn select(&self, features: &[Feature]) -> Result<Vec<f64>> {
        let missing = self.missing_lookbacks();
        if !missing.is_empty() {
            return Err(ForecastError::DataAvailability {
                target: self.date,
                missing,
            });
        }
        features
            .iter()
            .map(|&feature| {
                self.get(feature).ok_or_else(|| {
                    ForecastError::Configuration(format!("feature '{feature}' is not available"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::series::History;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn working(points: &[(NaiveDate, f64)]) -> WorkingHistory {
        let history = History::from_points(points.iter().copied()).unwrap();
        WorkingHistory::densify(&history)
    }

    #[test]
    fn parses_and_prints_feature_names() {
        assert_eq!("day".parse::<Feature>().unwrap(), Feature::Day);
        assert_eq!("DayOfWeek".parse::<Feature>().unwrap(), Feature::DayOfWeek);
        assert_eq!("lag3".parse::<Feature>().unwrap(), Feature::Lag(3));
        assert_eq!(Feature::Lag(2).to_string(), "lag2");
        assert_eq!(Feature::DayOfWeek.to_string(), "day_of_week");
        assert!("lag0".parse::<Feature>().is_err());
        assert!("weekday".parse::<Feature>().is_err());
    }

    #[test]
    fn all_features_lists_calendar_then_lags() {
        let names: Vec<String> = all_features(3).iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            ["day", "month", "year", "day_of_week", "lag1", "lag2", "lag3"]
        );
    }

    #[test]
    fn resolve_rejects_unknown_lags_and_empty_lists() {
        assert_eq!(
            resolve_features(&["lag2", "month"], 3).unwrap(),
            vec![Feature::Lag(2), Feature::Month]
        );
        assert!(matches!(
            resolve_features(&["lag4"], 3),
            Err(ForecastError::Configuration(_))
        ));
        assert!(matches!(
            resolve_features::<&str>(&[], 3),
            Err(ForecastError::Configuration(_))
        ));
    }

    #[test]
    fn builds_calendar_fields_and_lags() {
        let history = working(&[(ymd(2024, 1, 1), 10.0), (ymd(2024, 1, 3), 30.0)]);
        // 2024-01-05: пятница.
        let vector = FeatureVector::build(ymd(2024, 1, 5), &[2, 4, 10], &history).unwrap();
        assert_eq!(
            (vector.day, vector.month, vector.year, vector.day_of_week),
            (5, 1, 2024, 4)
        );
        assert_eq!(vector.get(Feature::Lag(1)), Some(30.0));
        assert_eq!(vector.get(Feature::Lag(2)), Some(10.0));
        assert_eq!(vector.get(Feature::Lag(3)), None);
        assert_eq!(vector.missing_lookbacks(), vec![ymd(2023, 12, 26)]);
    }

    #[test]
    fn select_orders_features_and_reports_missing() {
        let history = working(&[(ymd(2024, 1, 1), 10.0), (ymd(2024, 1, 2), 20.0)]);
        let vector = FeatureVector::build(ymd(2024, 1, 3), &[1, 2], &history).unwrap();
        let selected = vector
            .select(&[Feature::Lag(2), Feature::Day, Feature::Lag(1)])
            .unwrap();
        assert_eq!(selected, vec![10.0, 3.0, 20.0]);

        let vector = FeatureVector::build(ymd(2024, 1, 3), &[1, 5], &history).unwrap();
        let err = vector.select(&[Feature::Lag(1)]).unwrap_err();
        assert_eq!(err.missing_dates(), Some(&[ymd(2023, 12, 29)][..]));
    }
}
