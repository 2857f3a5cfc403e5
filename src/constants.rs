//! Общие константы форматирования и значения по умолчанию для лагов.

pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Лаги по умолчанию: примерно 1, 2 и 3 года, кратные неделе, чтобы не уезжать на високосных годах.
pub const DEFAULT_LAGS: [u32; 3] = [364, 728, 1092];
