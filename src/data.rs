//! Запись прогноза в CSV и архивация в gzip.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Serialize;

use crate::constants::DATE_FORMAT;

const CSV_ARCHIVE_EXTENSION: &str = "gz";

/// Одна точка прогноза в CSV и JSON.
#[derive(Debug, Serialize)]
pub struct PredictionRow {
    pub date: String,
    pub prediction: f64,
}

impl PredictionRow {
    pub fn new(date: NaiveDate, prediction: f64) -> Self {
        Self {
            date: date.format(DATE_FORMAT).to_string(),
            prediction,
        }
    }
}

pub fn prediction_rows(predictions: &BTreeMap<NaiveDate, f64>) -> Vec<PredictionRow> {
    predictions
        .iter()
        .map(|(date, value)| PredictionRow::new(*date, *value))
        .collect()
}

fn ensure_parent(path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
        }
    }
    Ok(())
}

/// Записывает прогноз в CSV, создавая директорию при необходимости.
pub fn write_forecast_csv(
    predictions: &BTreeMap<NaiveDate, f64>,
    file_path: &Path,
) -> Result<(), String> {
    ensure_parent(file_path)?;
    let file = File::create(file_path)
        .map_err(|err| format!("Failed to create CSV {}: {err}", file_path.display()))?;
    let mut writer = csv::Writer::from_writer(BufWriter::new(file));
    for row in prediction_rows(predictions) {
        writer
            .serialize(row)
            .map_err(|err| format!("Failed to write CSV row to {}: {err}", file_path.display()))?;
    }
    writer
        .flush()
        .map_err(|err| format!("Failed to flush CSV {}: {err}", file_path.display()))?;
    Ok(())
}

fn file_name_for(path: &Path) -> Result<String, String> {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .ok_or_else(|| format!("Path {} has no file name", path.display()))
}

pub fn archive_path_for(csv_path: &Path) -> Result<PathBuf, String> {
    let file_name = file_name_for(csv_path)?;
    let archive_name = format!("{file_name}.{CSV_ARCHIVE_EXTENSION}");
    let mut archive_path = csv_path.to_path_buf();
    archive_path.set_file_name(archive_name);
    Ok(archive_path)
}

/// Сжимает CSV рядом с исходным файлом и удаляет исходник.
pub fn archive_csv_file(csv_path: &Path) -> Result<PathBuf, String> {
    let archive_path = archive_path_for(csv_path)?;
    ensure_parent(&archive_path)?;
    let mut input = File::open(csv_path)
        .map_err(|err| format!("Failed to open CSV {}: {err}", csv_path.display()))?;
    let output = File::create(&archive_path)
        .map_err(|err| format!("Failed to create archive {}: {err}", archive_path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::default());
    std::io::copy(&mut input, &mut encoder)
        .map_err(|err| format!("Failed to write archive {}: {err}", archive_path.display()))?;
    encoder.finish().map_err(|err| {
        format!(
            "Failed to finalize archive {}: {err}",
            archive_path.display()
        )
    })?;
    fs::remove_file(csv_path)
        .map_err(|err| format!("Failed to remove CSV {}: {err}", csv_path.display()))?;
    Ok(archive_path)
}
