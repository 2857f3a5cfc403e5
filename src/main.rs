use std::fs::{self, File};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{Days, NaiveDate};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use lagcast::config::{DEFAULT_MODEL_CONFIG, ResolvedModelConfig, load_model_config};
use lagcast::constants::DATE_FORMAT;
use lagcast::data::{PredictionRow, archive_csv_file, prediction_rows, write_forecast_csv};
use lagcast::dates::parse_date;
use lagcast::series::load_history;
use lagcast::{ForecastEngine, Prediction, Regressor};

const APP_ABOUT: &str = "lagcast - day-by-day forecast from seasonal lags";
const DEFAULT_HISTORY_CSV: &str = "data/history.csv";
const DEFAULT_FORECAST_CSV: &str = "dist/forecast.csv";
const DEFAULT_FORECAST_HORIZON_DAYS: u64 = 365;

#[derive(Parser, Debug)]
#[command(name = "lagcast", about = APP_ABOUT)]
struct Args {
    /// Архивировать записанные CSV в .csv.gz.
    /// Исходные CSV удаляются после успешной архивации.
    #[arg(long = "archive-csv", global = true)]
    archive_csv: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Прогноз на одну или несколько дат (при неоднозначности день идёт первым, например 23-06-2021).
    Predict {
        /// CSV с историческими данными (date,value).
        #[arg(
            short = 'c',
            long = "csv",
            value_name = "PATH",
            default_value = DEFAULT_HISTORY_CSV
        )]
        csv: PathBuf,
        /// TOML-файл с параметрами модели.
        #[arg(
            long = "model-config",
            value_name = "PATH",
            default_value = DEFAULT_MODEL_CONFIG
        )]
        model_config: PathBuf,
        /// Вывести JSON вместо строк CSV.
        #[arg(long = "json")]
        json: bool,
        /// Целевые даты.
        #[arg(value_name = "DATE", required = true)]
        dates: Vec<String>,
    },
    /// Прогноз на каждый день после последнего известного с сохранением в CSV.
    Forecast {
        /// CSV с историческими данными (date,value).
        #[arg(
            short = 'c',
            long = "csv",
            value_name = "PATH",
            default_value = DEFAULT_HISTORY_CSV
        )]
        csv: PathBuf,
        /// Куда сохранить CSV с прогнозом.
        #[arg(
            long = "output-csv",
            value_name = "PATH",
            default_value = DEFAULT_FORECAST_CSV
        )]
        output_csv: PathBuf,
        /// Горизонт прогноза (в днях после последней известной даты).
        #[arg(
            long = "horizon-days",
            value_name = "DAYS",
            default_value_t = DEFAULT_FORECAST_HORIZON_DAYS,
            conflicts_with = "until"
        )]
        horizon_days: u64,
        /// Последняя дата прогноза вместо горизонта.
        #[arg(long = "until", value_name = "DATE")]
        until: Option<String>,
        /// TOML-файл с параметрами модели.
        #[arg(
            long = "model-config",
            value_name = "PATH",
            default_value = DEFAULT_MODEL_CONFIG
        )]
        model_config: PathBuf,
    },
    /// Показать загруженную модель, лаги и покрытие истории.
    Inspect {
        /// CSV с историческими данными (date,value).
        #[arg(
            short = 'c',
            long = "csv",
            value_name = "PATH",
            default_value = DEFAULT_HISTORY_CSV
        )]
        csv: PathBuf,
        /// TOML-файл с параметрами модели.
        #[arg(
            long = "model-config",
            value_name = "PATH",
            default_value = DEFAULT_MODEL_CONFIG
        )]
        model_config: PathBuf,
    },
    /// Сгенерировать файлы автодополнения для shell.
    Completions {
        /// Целевой shell.
        #[arg(value_enum)]
        shell: Shell,
        /// Куда сохранить файл (если не указано, то stdout).
        #[arg(short = 'o', long = "output", value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

type Engine = ForecastEngine<Box<dyn Regressor + Send + Sync>>;

fn init_logging() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lagcast=info"));
    let ansi = std::io::stderr().is_terminal();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(ansi)
        .compact()
        .init();
}

fn headline(message: &str) {
    tracing::info!(status = "start", "{message}");
}

fn info(message: &str) {
    tracing::info!(status = "info", "{message}");
}

fn success(message: &str) {
    tracing::info!(status = "ok", "{message}");
}

fn error(message: &str) {
    tracing::error!(status = "err", "{message}");
}

fn generate_completions(shell: Shell, output: Option<PathBuf>) -> Result<(), String> {
    let mut cmd = Args::command();
    let bin_name = cmd.get_name().to_string();
    if let Some(path) = output {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|err| format!("Failed to create {}: {err}", parent.display()))?;
            }
        }
        let mut file = File::create(&path)
            .map_err(|err| format!("Failed to create {}: {err}", path.display()))?;
        generate(shell, &mut cmd, bin_name, &mut file);
    } else {
        let mut stdout = std::io::stdout();
        generate(shell, &mut cmd, bin_name, &mut stdout);
    }
    Ok(())
}

fn build_engine(
    csv: &Path,
    model_config_path: &Path,
) -> Result<(Engine, ResolvedModelConfig), String> {
    let model_config = load_model_config(model_config_path)?;
    let history = load_history(csv)
        .map_err(|err| format!("Failed to read history CSV {}: {err}", csv.display()))?;
    let engine = model_config
        .build_engine(history)
        .map_err(|err| format!("Failed to build forecast engine: {err}"))?;
    Ok((engine, model_config))
}

fn run_predict(
    csv: &Path,
    model_config: &Path,
    json: bool,
    dates: &[String],
) -> Result<(), String> {
    let (engine, config) = build_engine(csv, model_config)?;
    tracing::info!(
        mode = "predict",
        model = %config.name,
        targets = dates.len(),
        input_csv = %csv.display(),
        "Predicting dates"
    );
    let prediction = engine
        .predict(dates)
        .map_err(|err| format!("Prediction failed: {err}"))?;

    if json {
        let rendered = match prediction {
            Prediction::Single { date, value } => {
                serde_json::to_string(&PredictionRow::new(date, value))
            }
            Prediction::Batch(values) => serde_json::to_string(&prediction_rows(&values)),
        }
        .map_err(|err| format!("Failed to render JSON: {err}"))?;
        println!("{rendered}");
    } else {
        for (date, value) in prediction.into_map() {
            println!("{},{value}", date.format(DATE_FORMAT));
        }
    }
    Ok(())
}

fn forecast_dates(
    last: NaiveDate,
    until: Option<&str>,
    horizon_days: u64,
) -> Result<Vec<NaiveDate>, String> {
    let end = match until {
        Some(raw) => parse_date(raw).map_err(|err| err.to_string())?,
        None => last
            .checked_add_days(Days::new(horizon_days))
            .ok_or_else(|| format!("Horizon of {horizon_days} days is out of range"))?,
    };
    if end <= last {
        return Err(format!(
            "Forecast end {} must be after the last known date {}",
            end.format(DATE_FORMAT),
            last.format(DATE_FORMAT)
        ));
    }
    Ok(last
        .iter_days()
        .skip(1)
        .take_while(|date| *date <= end)
        .collect())
}

fn run_forecast(
    csv: &Path,
    output_csv: &Path,
    horizon_days: u64,
    until: Option<&str>,
    model_config: &Path,
    archive_csv: bool,
) -> Result<(), String> {
    let (engine, config) = build_engine(csv, model_config)?;
    let last = engine
        .history()
        .last_date()
        .ok_or_else(|| "History CSV has no observations".to_string())?;
    let dates = forecast_dates(last, until, horizon_days)?;
    tracing::info!(
        mode = "forecast",
        model = %config.name,
        archive_csv,
        days = dates.len(),
        input_csv = %csv.display(),
        output_csv = %output_csv.display(),
        "Forecasting after {}",
        last.format(DATE_FORMAT)
    );

    let predictions = engine
        .predict_many(&dates)
        .map_err(|err| format!("Forecast failed: {err}"))?;
    write_forecast_csv(&predictions, output_csv)
        .map_err(|err| format!("Failed to write forecast CSV: {err}"))?;

    if archive_csv {
        let path = archive_csv_file(output_csv)?;
        success(&format!("Saved forecast to {}", path.display()));
    } else {
        success(&format!("Saved forecast to {}", output_csv.display()));
    }
    Ok(())
}

fn run_inspect(csv: &Path, model_config: &Path) -> Result<(), String> {
    let (engine, config) = build_engine(csv, model_config)?;
    let history = engine.history();
    let lags = engine
        .lags()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    let features = engine
        .features()
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(",");
    tracing::info!(
        model = %config.name,
        model_loaded = true,
        config_from_file = config.loaded_from_file,
        lags = %lags,
        features = %features,
        "Model ready"
    );
    match (history.first_date(), history.last_date()) {
        (Some(first), Some(last)) => tracing::info!(
            first = %first.format(DATE_FORMAT),
            last = %last.format(DATE_FORMAT),
            points = history.len(),
            gap_days = history.gap_days(),
            "History loaded"
        ),
        _ => info("History is empty"),
    }
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    let archive_csv = args.archive_csv;
    let result = match args.command {
        Command::Completions { shell, output } => {
            if let Err(err) = generate_completions(shell, output) {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
            return ExitCode::SUCCESS;
        }
        Command::Predict {
            csv,
            model_config,
            json,
            dates,
        } => {
            init_logging();
            headline(APP_ABOUT);
            run_predict(&csv, &model_config, json, &dates)
        }
        Command::Forecast {
            csv,
            output_csv,
            horizon_days,
            until,
            model_config,
        } => {
            init_logging();
            headline(APP_ABOUT);
            run_forecast(
                &csv,
                &output_csv,
                horizon_days,
                until.as_deref(),
                &model_config,
                archive_csv,
            )
        }
        Command::Inspect { csv, model_config } => {
            init_logging();
            headline(APP_ABOUT);
            run_inspect(&csv, &model_config)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error(&err);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn forecast_dates_cover_horizon_or_until() {
        let last = ymd(2024, 12, 30);
        let by_horizon = forecast_dates(last, None, 3).unwrap();
        assert_eq!(
            by_horizon,
            vec![ymd(2024, 12, 31), ymd(2025, 1, 1), ymd(2025, 1, 2)]
        );
        let by_until = forecast_dates(last, Some("01-01-2025"), 0).unwrap();
        assert_eq!(by_until, vec![ymd(2024, 12, 31), ymd(2025, 1, 1)]);
        assert!(forecast_dates(last, Some("2024-12-30"), 0).is_err());
    }
}
