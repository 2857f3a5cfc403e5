//! Типы ошибок движка прогноза.

use chrono::NaiveDate;
use itertools::Itertools;
use thiserror::Error;

use crate::constants::DATE_FORMAT;
use crate::model::ModelError;

pub type Result<T> = std::result::Result<T, ForecastError>;

#[derive(Debug, Error)]
pub enum ForecastError {
    /// Некорректная история, лаги или список признаков при построении движка.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Для целевой даты не хватает значений на нужных лагах.
    #[error(
        "cannot predict {}: missing lags [{}]",
        .target.format(DATE_FORMAT),
        format_dates(.missing)
    )]
    DataAvailability {
        target: NaiveDate,
        missing: Vec<NaiveDate>,
    },

    /// Модель отвергла вектор признаков или вернула нечисловой результат.
    #[error("model failed for {}: {source}", .date.format(DATE_FORMAT))]
    Model {
        date: NaiveDate,
        #[source]
        source: ModelError,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("no target dates requested")]
    NoTargetDates,
}

impl ForecastError {
    /// Пропущенные даты, если ошибка связана с нехваткой истории.
    pub fn missing_dates(&self) -> Option<&[NaiveDate]> {
        match self {
            Self::DataAvailability { missing, .. } => Some(missing),
            _ => None,
        }
    }
}

fn format_dates(dates: &[NaiveDate]) -> String {
    dates
        .iter()
        .map(|date| date.format(DATE_FORMAT))
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn data_availability_lists_plain_dates() {
        let err = ForecastError::DataAvailability {
            target: ymd(2021, 6, 1),
            missing: vec![ymd(2020, 6, 2), ymd(2019, 6, 4)],
        };
        assert_eq!(
            err.to_string(),
            "cannot predict 2021-06-01: missing lags [2020-06-02, 2019-06-04]"
        );
        assert_eq!(err.missing_dates().map(<[NaiveDate]>::len), Some(2));
    }

    #[test]
    fn model_error_keeps_source() {
        let err = ForecastError::Model {
            date: ymd(2024, 1, 5),
            source: "expected 3 features, got 2".into(),
        };
        assert_eq!(
            err.to_string(),
            "model failed for 2024-01-05: expected 3 features, got 2"
        );
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("expected 3 features, got 2"));
        assert!(err.missing_dates().is_none());
    }
}
