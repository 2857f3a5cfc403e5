//! Интерфейс регрессора и встроенные простые модели.

use std::error::Error;
use std::sync::Arc;

pub type ModelError = Box<dyn Error + Send + Sync>;

/// Непрозрачная обученная модель: вектор признаков в заданном порядке -> одно число.
pub trait Regressor {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError>;
}

impl<R: Regressor + ?Sized> Regressor for &R {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        (**self).predict(features)
    }
}

impl<R: Regressor + ?Sized> Regressor for Box<R> {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        (**self).predict(features)
    }
}

impl<R: Regressor + ?Sized> Regressor for Arc<R> {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        (**self).predict(features)
    }
}

/// Линейная модель: свободный член плюс веса в порядке признаков.
#[derive(Clone, Debug, PartialEq)]
pub struct LinearModel {
    pub intercept: f64,
    pub weights: Vec<f64>,
}

impl LinearModel {
    pub const fn new(intercept: f64, weights: Vec<f64>) -> Self {
        Self { intercept, weights }
    }
}

impl Regressor for LinearModel {
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.len() != self.weights.len() {
            return Err(format!(
                "expected {} features, got {}",
                self.weights.len(),
                features.len()
            )
            .into());
        }
        Ok(features
            .iter()
            .zip(&self.weights)
            .fold(self.intercept, |acc, (x, w)| x.mul_add(*w, acc)))
    }
}

/// Среднее входных признаков; с признаками `lag1..lagN` это сезонная наивная модель.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LagMean;

impl Regressor for LagMean {
    #[allow(clippy::cast_precision_loss)]
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        if features.is_empty() {
            return Err("lag-mean needs at least one feature".into());
        }
        Ok(features.iter().sum::<f64>() / features.len() as f64)
    }
}

/// Обёртка над замыканием.
pub struct FnRegressor<F>(F);

impl<F> FnRegressor<F>
where
    F: Fn(&[f64]) -> Result<f64, ModelError>,
{
    pub const fn new(func: F) -> Self {
        Self(func)
    }
}

impl<F> Regressor for FnRegressor<F>
where
    F: Fn(&[f64]) -> Result<f64, ModelError>,
{
    fn predict(&self, features: &[f64]) -> Result<f64, ModelError> {
        (self.0)(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_model_applies_weights_in_order() {
        let model = LinearModel::new(1.0, vec![2.0, 0.5, -1.0]);
        let y = model.predict(&[3.0, 4.0, 5.0]).unwrap();
        assert!((y - (1.0 + 6.0 + 2.0 - 5.0)).abs() < 1e-12);
    }

    #[test]
    fn linear_model_rejects_wrong_width() {
        let model = LinearModel::new(0.0, vec![1.0, 1.0]);
        let err = model.predict(&[1.0]).unwrap_err();
        assert_eq!(err.to_string(), "expected 2 features, got 1");
    }

    #[test]
    fn lag_mean_averages_inputs() {
        assert!((LagMean.predict(&[3.0, 6.0, 9.0]).unwrap() - 6.0).abs() < 1e-12);
        assert!(LagMean.predict(&[]).is_err());
    }

    #[test]
    fn wrappers_forward_to_inner_model() {
        let boxed: Box<dyn Regressor + Send + Sync> = Box::new(LagMean);
        assert!((boxed.predict(&[1.0, 3.0]).unwrap() - 2.0).abs() < 1e-12);

        let shared = Arc::new(LinearModel::new(0.0, vec![1.0]));
        assert!((shared.predict(&[7.0]).unwrap() - 7.0).abs() < 1e-12);
        let borrowed: &dyn Regressor = &*shared;
        assert!((borrowed.predict(&[8.0]).unwrap() - 8.0).abs() < 1e-12);

        let doubled = FnRegressor::new(|x: &[f64]| Ok(x[0] * 2.0));
        assert!((doubled.predict(&[21.0]).unwrap() - 42.0).abs() < 1e-12);
    }
}
