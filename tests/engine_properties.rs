use std::cell::Cell;
use std::collections::BTreeMap;

use chrono::{Days, NaiveDate};
use lagcast::dates::parse_date;
use lagcast::model::{ModelError, Regressor};
use lagcast::{ForecastEngine, ForecastError, History, LagMean, LinearModel, Prediction};

const LAG_FEATURES: [&str; 3] = ["lag1", "lag2", "lag3"];
const LAGS: [u32; 3] = [364, 728, 1092];

fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

fn minus(date: NaiveDate, days: u32) -> NaiveDate {
    date.checked_sub_days(Days::new(u64::from(days))).unwrap()
}

fn synthetic(idx: usize) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let idx = idx as f64;
    100.0 + (idx * 0.37).sin() * 25.0 + idx * 0.01
}

/// Ежедневная история без пропусков за 2018–2023 годы.
fn full_history() -> BTreeMap<NaiveDate, f64> {
    ymd(2018, 1, 1)
        .iter_days()
        .take_while(|date| *date <= ymd(2023, 12, 31))
        .enumerate()
        .map(|(idx, date)| (date, synthetic(idx)))
        .collect()
}

fn mean_of_lags(series: &BTreeMap<NaiveDate, f64>, date: NaiveDate) -> f64 {
    LAGS.iter().map(|lag| series[&minus(date, *lag)]).sum::<f64>() / 3.0
}

/// Среднее лагов со счётчиком вызовов.
#[derive(Default)]
struct CountingMean {
    calls: Cell<usize>,
}

impl Regressor for CountingMean {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        self.calls.set(self.calls.get() + 1);
        LagMean.predict(features)
    }
}

fn full_engine() -> ForecastEngine<CountingMean> {
    let history = History::from_points(full_history()).unwrap();
    ForecastEngine::new(CountingMean::default(), &LAG_FEATURES, history).unwrap()
}

#[test]
fn predicts_inside_known_range_without_rollout() {
    let engine = full_engine();
    let value = engine.predict_one("2024-01-05").unwrap();

    let expected = mean_of_lags(&full_history(), ymd(2024, 1, 5));
    assert!((value - expected).abs() < 1e-9);
    assert_eq!(engine.model().calls.get(), 1);
}

#[test]
fn long_rollout_matches_recursive_application() {
    let engine = full_engine();
    let target = ymd(2025, 6, 15);
    let value = engine.predict_one(target).unwrap();

    let mut series = full_history();
    let mut day = ymd(2024, 1, 1);
    let mut steps = 0;
    while day <= target {
        let next = mean_of_lags(&series, day);
        series.insert(day, next);
        day = day.succ_opt().unwrap();
        steps += 1;
    }
    assert_eq!(steps, 532);
    assert!((value - series[&target]).abs() < 1e-9);
    // Каждый день разрыва плюс финальный прогноз цели.
    assert_eq!(engine.model().calls.get(), steps + 1);
}

#[test]
fn single_date_matches_batch_with_earlier_dates() {
    let engine = full_engine();
    let target = ymd(2024, 9, 1);
    let single = engine.predict_one(target).unwrap();

    let batch = engine
        .predict(["2024-03-01", "01-09-2024", "2024-01-10"])
        .unwrap()
        .into_map();
    assert_eq!(batch.len(), 3);
    assert!((batch[&target] - single).abs() < 1e-12);
}

#[test]
fn repeated_calls_do_not_mutate_history() {
    let engine = full_engine();
    let before = engine.history().clone();

    let first = engine.predict(["2024-06-01", "2024-12-31"]).unwrap();
    let second = engine.predict(["2024-06-01", "2024-12-31"]).unwrap();
    assert_eq!(first, second);
    assert_eq!(engine.history(), &before);
    assert_eq!(engine.history().last_date(), Some(ymd(2023, 12, 31)));
}

#[test]
fn lookups_on_gap_days_use_previous_known_value() {
    let history = History::from_points([
        (ymd(2023, 1, 1), 1.0),
        (ymd(2023, 1, 2), 2.0),
        (ymd(2023, 1, 5), 5.0),
        (ymd(2023, 1, 6), 6.0),
    ])
    .unwrap();
    let engine =
        ForecastEngine::with_lags(LinearModel::new(0.0, vec![1.0]), &["lag1"], history, &[3])
            .unwrap();

    // 2023-01-03 и 2023-01-04 пропущены и заполнены значением за 2023-01-02.
    assert!((engine.predict_one("2023-01-06").unwrap() - 2.0).abs() < 1e-12);
    assert!((engine.predict_one("2023-01-07").unwrap() - 2.0).abs() < 1e-12);
    assert!((engine.predict_one("2023-01-08").unwrap() - 5.0).abs() < 1e-12);
}

#[test]
fn empty_history_reports_every_lookback() {
    let engine =
        ForecastEngine::new(CountingMean::default(), &LAG_FEATURES, History::new()).unwrap();
    let target = ymd(2024, 1, 5);
    let err = engine.predict_one(target).unwrap_err();
    assert_eq!(engine.model().calls.get(), 0);

    match err {
        ForecastError::DataAvailability { target: day, missing } => {
            assert_eq!(day, target);
            assert_eq!(
                missing,
                vec![ymd(2023, 1, 6), ymd(2022, 1, 7), ymd(2021, 1, 8)]
            );
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn short_history_reports_only_absent_lookbacks() {
    let history: BTreeMap<_, _> = full_history()
        .into_iter()
        .filter(|(date, _)| *date >= ymd(2022, 1, 1))
        .collect();
    let engine =
        ForecastEngine::new(LagMean, &LAG_FEATURES, History::from_points(history).unwrap())
            .unwrap();

    let err = engine.predict_one("2024-01-05").unwrap_err();
    assert_eq!(err.missing_dates(), Some(&[ymd(2021, 1, 8)][..]));
    assert_eq!(
        err.to_string(),
        "cannot predict 2024-01-05: missing lags [2021-01-08]"
    );
}

#[test]
fn ten_day_history_fails_on_first_rollout_step() {
    let history = History::from_points(
        ymd(2020, 1, 1)
            .iter_days()
            .take(10)
            .map(|date| (date, 1.0)),
    )
    .unwrap();
    let engine = ForecastEngine::new(CountingMean::default(), &LAG_FEATURES, history).unwrap();

    let err = engine.predict_one("2021-06-01").unwrap_err();
    // Модель не вызывается, если хотя бы один лаг отсутствует.
    assert_eq!(engine.model().calls.get(), 0);
    let ForecastError::DataAvailability { target, missing } = err else {
        panic!("expected a data availability error");
    };
    assert_eq!(target, ymd(2020, 1, 11));
    let expected: Vec<_> = LAGS.iter().map(|lag| minus(target, *lag)).collect();
    assert_eq!(missing, expected);
}

#[test]
fn batch_fails_as_a_whole() {
    let history = History::from_points(
        ymd(2023, 1, 1)
            .iter_days()
            .take(30)
            .map(|date| (date, 1.0)),
    )
    .unwrap();
    let engine = ForecastEngine::with_lags(LagMean, &["lag1"], history, &[10]).unwrap();

    assert!(engine.predict(["2023-01-20"]).is_ok());
    // 2022-12-25 смотрит назад за пределы истории.
    let result = engine.predict(["2023-01-20", "2022-12-25"]);
    assert!(matches!(
        result,
        Err(ForecastError::DataAvailability { .. })
    ));
}

#[test]
fn ambiguous_text_dates_are_day_first() {
    assert_eq!(parse_date("23-06-2021").unwrap(), ymd(2021, 6, 23));
    assert_eq!(parse_date("13-05-2021").unwrap(), ymd(2021, 5, 13));

    let engine = full_engine();
    let prediction = engine.predict(["05-01-2024"]).unwrap();
    assert!(matches!(
        prediction,
        Prediction::Single { date, .. } if date == ymd(2024, 1, 5)
    ));
}

#[test]
fn engine_is_shared_across_threads() {
    let history = History::from_points(full_history()).unwrap();
    let engine = ForecastEngine::new(LagMean, &LAG_FEATURES, history).unwrap();
    let expected = engine.predict_one("2024-02-01").unwrap();

    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| scope.spawn(|| engine.predict_one("2024-02-01").unwrap()))
            .collect();
        for handle in handles {
            let value = handle.join().unwrap();
            assert!((value - expected).abs() < 1e-12);
        }
    });
}
