//! TOML-конфигурация модели: имя встроенного регрессора, лаги, признаки и коэффициенты.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::constants::DEFAULT_LAGS;
use crate::engine::ForecastEngine;
use crate::error::ForecastError;
use crate::features::{Feature, all_features, resolve_features};
use crate::model::{LagMean, LinearModel, Regressor};
use crate::series::History;

pub const DEFAULT_MODEL_CONFIG: &str = "config/model.toml";
pub const DEFAULT_MODEL_NAME: &str = "lag-mean";
const DEFAULT_MODEL_ALIAS: &str = "lag_mean";
const LINEAR_MODEL_NAME: &str = "linear";

pub type BoxedRegressor = Box<dyn Regressor + Send + Sync>;

#[derive(Debug, Deserialize)]
struct ModelConfigFile {
    model: Option<String>,
    lags: Option<Vec<u32>>,
    features: Option<Vec<String>>,
    linear: Option<LinearFile>,
}

#[derive(Debug, Deserialize)]
struct LinearFile {
    intercept: Option<f64>,
    #[serde(default)]
    weights: BTreeMap<String, f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ModelKind {
    LagMean,
    Linear(LinearModel),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedModelConfig {
    pub name: String,
    pub lags: Vec<u32>,
    pub features: Vec<String>,
    pub kind: ModelKind,
    /// `false`, если файл не найден и взяты встроенные значения.
    pub loaded_from_file: bool,
}

impl ResolvedModelConfig {
    pub fn regressor(&self) -> BoxedRegressor {
        match &self.kind {
            ModelKind::LagMean => Box::new(LagMean),
            ModelKind::Linear(model) => Box::new(model.clone()),
        }
    }

    pub fn build_engine(
        &self,
        history: History,
    ) -> Result<ForecastEngine<BoxedRegressor>, ForecastError> {
        ForecastEngine::with_lags(self.regressor(), &self.features, history, &self.lags)
    }
}

fn lag_features(lag_count: usize) -> Vec<String> {
    (1..=lag_count)
        .map(|index| Feature::Lag(index).to_string())
        .collect()
}

pub fn default_resolved_config() -> ResolvedModelConfig {
    ResolvedModelConfig {
        name: DEFAULT_MODEL_NAME.to_string(),
        lags: DEFAULT_LAGS.to_vec(),
        features: lag_features(DEFAULT_LAGS.len()),
        kind: ModelKind::LagMean,
        loaded_from_file: false,
    }
}

fn validate_lags(lags: &[u32]) -> Result<(), String> {
    if lags.is_empty() {
        return Err("lags must not be empty".to_string());
    }
    if lags.contains(&0) {
        return Err("lags must be > 0".to_string());
    }
    Ok(())
}

/// Веса задаются по имени признака; отсутствующие считаются нулевыми.
fn resolve_linear(
    overrides: Option<LinearFile>,
    features: &[Feature],
) -> Result<LinearModel, String> {
    let overrides = overrides.unwrap_or(LinearFile {
        intercept: None,
        weights: BTreeMap::new(),
    });
    let intercept = overrides.intercept.unwrap_or_default();
    if !intercept.is_finite() {
        return Err("linear.intercept must be finite".to_string());
    }

    let mut weights = vec![0.0; features.len()];
    for (name, weight) in overrides.weights {
        let feature = name.parse::<Feature>().map_err(|err| err.to_string())?;
        if !weight.is_finite() {
            return Err(format!("linear.weights.{name} must be finite"));
        }
        let mut matched = false;
        for (slot, candidate) in weights.iter_mut().zip(features) {
            if *candidate == feature {
                *slot = weight;
                matched = true;
            }
        }
        if !matched {
            return Err(format!("linear.weights.{name} is not in the feature list"));
        }
    }
    Ok(LinearModel::new(intercept, weights))
}

/// Разбирает текст конфигурации и подставляет значения по умолчанию.
pub fn parse_model_config(raw: &str) -> Result<ResolvedModelConfig, String> {
    let config: ModelConfigFile = toml::from_str(raw).map_err(|err| err.to_string())?;

    let mut model_name = config
        .model
        .unwrap_or_else(|| DEFAULT_MODEL_NAME.to_string())
        .to_lowercase();
    if model_name == DEFAULT_MODEL_ALIAS {
        model_name = DEFAULT_MODEL_NAME.to_string();
    }

    let lags = config.lags.unwrap_or_else(|| DEFAULT_LAGS.to_vec());
    validate_lags(&lags)?;

    match model_name.as_str() {
        DEFAULT_MODEL_NAME => {
            if config.linear.is_some() {
                tracing::warn!("linear section ignored for lag-mean model");
            }
            let features = config
                .features
                .unwrap_or_else(|| lag_features(lags.len()));
            resolve_features(&features, lags.len()).map_err(|err| err.to_string())?;
            Ok(ResolvedModelConfig {
                name: model_name,
                lags,
                features,
                kind: ModelKind::LagMean,
                loaded_from_file: true,
            })
        }
        LINEAR_MODEL_NAME => {
            let features = config.features.unwrap_or_else(|| {
                all_features(lags.len())
                    .iter()
                    .map(ToString::to_string)
                    .collect()
            });
            let resolved =
                resolve_features(&features, lags.len()).map_err(|err| err.to_string())?;
            let linear = resolve_linear(config.linear, &resolved)?;
            Ok(ResolvedModelConfig {
                name: model_name,
                lags,
                features,
                kind: ModelKind::Linear(linear),
                loaded_from_file: true,
            })
        }
        _ => Err(format!("Unknown model name: {model_name}")),
    }
}

pub fn load_model_config(path: &Path) -> Result<ResolvedModelConfig, String> {
    if !path.exists() {
        if path == Path::new(DEFAULT_MODEL_CONFIG) {
            tracing::info!(
                "Model config {} not found, using built-in defaults",
                path.display()
            );
            return Ok(default_resolved_config());
        }
        return Err(format!("Model config {} does not exist", path.display()));
    }

    let raw = fs::read_to_string(path)
        .map_err(|err| format!("Failed to read model config {}: {err}", path.display()))?;
    parse_model_config(&raw)
        .map_err(|err| format!("Invalid model config {}: {err}", path.display()))
}
