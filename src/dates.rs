//! Нормализация дат: нативные типы chrono и текст в разных форматах с приоритетом «день-месяц».

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};

use crate::error::{ForecastError, Result};

const UTC_SUFFIX: &str = " UTC";
const TIME_FORMAT_OFFSET: &str = "%Y-%m-%d %H:%M:%S %z";
const TIME_FORMAT_NAIVE: &str = "%Y-%m-%d %H:%M:%S%.f";
const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Шаблоны в порядке попыток. Год впереди пробуется раньше, затем день впереди,
/// и только потом месяц впереди как запасной вариант.
const PATTERNS: &[DatePattern] = &[
    DatePattern::Rfc3339,
    DatePattern::Offset,
    DatePattern::UtcSuffix,
    DatePattern::DateTime("%Y-%m-%dT%H:%M:%S%.f"),
    DatePattern::DateTime(TIME_FORMAT_NAIVE),
    DatePattern::DateTime("%Y-%m-%dT%H:%M"),
    DatePattern::DateTime("%Y-%m-%d %H:%M"),
    DatePattern::Date("%Y-%m-%d"),
    DatePattern::Date("%Y/%m/%d"),
    DatePattern::Date("%Y.%m.%d"),
    DatePattern::Date(COMPACT_DATE_FORMAT),
    DatePattern::DateTime("%d-%m-%Y %H:%M:%S%.f"),
    DatePattern::DateTime("%d/%m/%Y %H:%M:%S%.f"),
    DatePattern::DateTime("%d.%m.%Y %H:%M:%S%.f"),
    DatePattern::DateTime("%d-%m-%Y %H:%M"),
    DatePattern::DateTime("%d/%m/%Y %H:%M"),
    DatePattern::DateTime("%d.%m.%Y %H:%M"),
    DatePattern::Date("%d-%m-%y"),
    DatePattern::Date("%d-%m-%Y"),
    DatePattern::Date("%d/%m/%y"),
    DatePattern::Date("%d/%m/%Y"),
    DatePattern::Date("%d.%m.%y"),
    DatePattern::Date("%d.%m.%Y"),
    DatePattern::Date("%d %B %Y"),
    DatePattern::Date("%d-%b-%Y"),
    DatePattern::Date("%m-%d-%y"),
    DatePattern::Date("%m-%d-%Y"),
    DatePattern::Date("%m/%d/%y"),
    DatePattern::Date("%m/%d/%Y"),
    DatePattern::Date("%m.%d.%y"),
    DatePattern::Date("%m.%d.%Y"),
    DatePattern::Date("%B %d %Y"),
    DatePattern::Date("%B %d, %Y"),
];

/// Распознанный формат даты; запоминается как подсказка для следующих строк.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DatePattern {
    Rfc3339,
    Offset,
    UtcSuffix,
    DateTime(&'static str),
    Date(&'static str),
}

impl DatePattern {
    fn parse(self, raw: &str) -> Option<NaiveDate> {
        match self {
            Self::Rfc3339 => DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.date_naive()),
            Self::Offset => DateTime::parse_from_str(raw, TIME_FORMAT_OFFSET)
                .ok()
                .map(|dt| dt.date_naive()),
            Self::UtcSuffix => raw
                .strip_suffix(UTC_SUFFIX)
                .and_then(|stripped| {
                    NaiveDateTime::parse_from_str(stripped.trim_end(), TIME_FORMAT_NAIVE).ok()
                })
                .map(|naive| naive.date()),
            Self::DateTime(format) => {
                if !year_first_allowed(format, raw) {
                    return None;
                }
                NaiveDateTime::parse_from_str(raw, format)
                    .ok()
                    .map(|naive| naive.date())
            }
            Self::Date(format) => {
                if !year_first_allowed(format, raw) {
                    return None;
                }
                NaiveDate::parse_from_str(raw, format).ok()
            }
        }
    }
}

/// `%Y` в начале шаблона принимает и короткий год, поэтому «23-06-21»
/// не должно читаться как 0023 год. Слитный формат требует ровно восемь цифр.
fn year_first_allowed(format: &str, raw: &str) -> bool {
    if !format.starts_with("%Y") {
        return true;
    }
    let bytes = raw.as_bytes();
    if format == COMPACT_DATE_FORMAT {
        return bytes.len() == 8 && bytes.iter().all(u8::is_ascii_digit);
    }
    bytes.len() > 4
        && bytes[..4].iter().all(u8::is_ascii_digit)
        && !bytes[4].is_ascii_digit()
}

/// Разбирает дату, сначала пробуя формат из подсказки.
pub fn parse_date_with_hint(raw: &str, hint: &mut Option<DatePattern>) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ForecastError::InvalidDate("empty date".to_string()));
    }

    if let Some(pattern) = *hint {
        if let Some(date) = pattern.parse(trimmed) {
            return Ok(date);
        }
    }

    for &pattern in PATTERNS {
        if let Some(date) = pattern.parse(trimmed) {
            *hint = Some(pattern);
            return Ok(date);
        }
    }

    Err(ForecastError::InvalidDate(format!(
        "unrecognized date format '{trimmed}'"
    )))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate> {
    parse_date_with_hint(raw, &mut None)
}

/// Всё, что можно привести к дате без времени суток.
pub trait TargetDate {
    fn to_target_date(&self) -> Result<NaiveDate>;
}

impl TargetDate for NaiveDate {
    fn to_target_date(&self) -> Result<NaiveDate> {
        Ok(*self)
    }
}

impl TargetDate for NaiveDateTime {
    fn to_target_date(&self) -> Result<NaiveDate> {
        Ok(self.date())
    }
}

impl<Tz: TimeZone> TargetDate for DateTime<Tz> {
    fn to_target_date(&self) -> Result<NaiveDate> {
        Ok(self.date_naive())
    }
}

impl TargetDate for str {
    fn to_target_date(&self) -> Result<NaiveDate> {
        parse_date(self)
    }
}

impl TargetDate for String {
    fn to_target_date(&self) -> Result<NaiveDate> {
        parse_date(self)
    }
}

impl<T: TargetDate + ?Sized> TargetDate for &T {
    fn to_target_date(&self) -> Result<NaiveDate> {
        (**self).to_target_date()
    }
}
