//! Прогноз дневного ряда на произвольную дату по сезонным лагам и непрозрачной регрессионной модели.

pub mod config;
pub mod constants;
pub mod data;
pub mod dates;
pub mod engine;
pub mod error;
pub mod features;
pub mod model;
pub mod series;

pub use engine::{ForecastEngine, Prediction};
pub use error::{ForecastError, Result};
pub use model::{LagMean, LinearModel, Regressor};
pub use series::History;
