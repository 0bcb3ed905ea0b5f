//! Formatter Module
//!
//! セル値を表示用文字列に変換するモジュール。
//! エスケープは出力構文に依存するため、ここでは行わずレンダラーに任せます。

use chrono::{Duration, NaiveDate};

use crate::api::{DateFormat, FormulaMode};
use crate::builder::ConversionConfig;
use crate::error::XlsxRagError;
use crate::grid::Cell;
use crate::types::CellValue;

/// セルフォーマッター
///
/// セル値のフォーマット処理のファサードとして機能します。
#[derive(Debug, Default)]
pub(crate) struct CellFormatter {
    /// 日付フォーマッター
    date_formatter: DateFormatter,
}

impl CellFormatter {
    /// 新しいCellFormatterインスタンスを生成
    pub fn new() -> Self {
        Self {
            date_formatter: DateFormatter,
        }
    }

    /// グリッドのセルを表示用文字列に変換
    ///
    /// # 引数
    ///
    /// * `cell` - グリッド上のセル
    /// * `config` - 変換設定（数式モード、日付形式）
    /// * `is_1904` - 1904年エポックを使用するかどうか
    ///
    /// # 戻り値
    ///
    /// * `Ok(String)` - 前後の空白を除いた表示文字列
    ///
    /// 日付として範囲外のシリアル値は数値として表示します。
    pub fn format_cell(
        &self,
        cell: &Cell,
        config: &ConversionConfig,
        is_1904: bool,
    ) -> Result<String, XlsxRagError> {
        self.format_value(&cell.value, cell.is_date, config, is_1904)
    }

    fn format_value(
        &self,
        value: &CellValue,
        is_date: bool,
        config: &ConversionConfig,
        is_1904: bool,
    ) -> Result<String, XlsxRagError> {
        let formatted = match value {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if is_date => {
                match self.date_formatter.format(*n, &config.date_format, is_1904) {
                    Ok(date) => date,
                    Err(e) => {
                        // 日付として表せないシリアル値は数値のまま出力する
                        tracing::debug!("Date out of range, keeping serial value: {}", e);
                        format_number(*n)
                    }
                }
            }
            CellValue::Number(n) => format_number(*n),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Formula { text, cached } => match config.formula_mode {
                FormulaMode::Formula => formula_display(text),
                FormulaMode::CachedValue => {
                    // キャッシュ値がない数式は数式文字列で代用する
                    if cached.is_empty() {
                        formula_display(text)
                    } else {
                        self.format_value(cached, is_date, config, is_1904)?
                    }
                }
            },
        };
        Ok(formatted)
    }
}

/// 数式文字列を `=` 付きで表示
fn formula_display(text: &str) -> String {
    let trimmed = text.trim();
    if trimmed.starts_with('=') {
        trimmed.to_string()
    } else {
        format!("={}", trimmed)
    }
}

/// 数値を表示用文字列に変換
///
/// 整数値は小数点なしで出力し、浮動小数の丸め誤差（0.1+0.2など）は15桁で丸めます。
fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let rounded: f64 = format!("{:.15}", n).parse().unwrap_or(n);
    rounded.to_string()
}

/// 日付フォーマッター
///
/// Excelのシリアル日付値を文字列に変換します。
#[derive(Debug, Default)]
pub(crate) struct DateFormatter;

impl DateFormatter {
    /// 日付値をフォーマット
    ///
    /// # エポックシステム
    ///
    /// - 1900年システム（デフォルト）: シリアル値1 = 1900-01-01。
    ///   Excelは存在しない1900-02-29（シリアル値60）を数えるため、
    ///   60以下は1899-12-31起算、61以上は1899-12-30起算で計算する
    /// - 1904年システム: シリアル値0 = 1904-01-01
    pub fn format(
        &self,
        serial_value: f64,
        date_format: &DateFormat,
        is_1904: bool,
    ) -> Result<String, XlsxRagError> {
        if !serial_value.is_finite() || serial_value.abs() > i64::MAX as f64 {
            return Err(date_overflow(serial_value, is_1904));
        }
        let days = serial_value.floor() as i64;
        let epoch = if is_1904 {
            NaiveDate::from_ymd_opt(1904, 1, 1)
        } else if days < 61 {
            NaiveDate::from_ymd_opt(1899, 12, 31)
        } else {
            NaiveDate::from_ymd_opt(1899, 12, 30)
        }
        .ok_or_else(|| XlsxRagError::Config("Invalid epoch date".to_string()))?;

        // シリアル値60（1900-02-29）は直前の日付に寄せる
        let days = if !is_1904 && days == 60 { 59 } else { days };

        let date = Duration::try_days(days)
            .and_then(|offset| epoch.checked_add_signed(offset))
            .ok_or_else(|| date_overflow(serial_value, is_1904))?;

        let formatted = match date_format {
            DateFormat::Iso8601 => date.format("%Y-%m-%d").to_string(),
            DateFormat::Custom(format_str) => date.format(format_str).to_string(),
        };

        Ok(formatted)
    }
}

fn date_overflow(serial_value: f64, is_1904: bool) -> XlsxRagError {
    XlsxRagError::InvalidInput(format!(
        "Date calculation overflow: serial_value={}, is_1904={}",
        serial_value, is_1904
    ))
}
