//! Turns the rendered performance table into a [`PerformanceReport`].
//!
//! Cell text is normalised (unicode spaces and dashes, thousand separators,
//! currency suffixes) before numbers are extracted. A cell holding both an
//! absolute value and a percentage on two lines yields two metrics. Cells that
//! look numeric but cannot be parsed are stored as [`MetricValue::Error`] so one
//! bad cell never aborts the whole parse.

use crate::domain::errors::{HostError, ParseError};
use crate::domain::optimization::report::{MetricValue, PerformanceReport};
use crate::domain::ports::{RawRow, ReportSource};
use crate::domain::session::{HostSession, UiVariant};
use crate::infrastructure::core::retry::{RetryPolicy, retry_with_backoff};
use tracing::{debug, info, warn};

/// Rows that only ever carry one value, whatever the column layout.
const SINGLE_VALUE_ROWS: [&str; 6] = [
    "buy & hold return",
    "max equity run-up",
    "max equity drawdown",
    "open p&l",
    "sharpe ratio",
    "sortino ratio",
];

/// Rows the host renders without a sign although they are losses.
const NEGATIVE_ROWS: [&str; 8] = [
    "gross loss",
    "commission paid",
    "max equity drawdown",
    "max drawdown",
    "avg losing trade",
    "largest losing trade",
    "largest losing trade percent",
    "margin calls",
];

const CRITICAL_FIELDS: [&str; 4] = [
    "Net profit: All",
    "Net profit %: All",
    "Gross profit: All",
    "Gross loss: All",
];

/// Row names used by the legacy report layout.
const LEGACY_ROW_NAMES: [(&str, &str); 25] = [
    ("Net Profit", "Net profit"),
    ("Gross Profit", "Gross profit"),
    ("Gross Loss", "Gross loss"),
    ("Max Drawdown", "Max equity drawdown"),
    ("Buy & Hold Return", "Buy & hold return"),
    ("Sharpe Ratio", "Sharpe ratio"),
    ("Sortino Ratio", "Sortino ratio"),
    ("Max Contracts Held", "Max contracts held"),
    ("Open PL", "Open P&L"),
    ("Commission Paid", "Commission paid"),
    ("Total Closed Trades", "Total trades"),
    ("Total Open Trades", "Total open trades"),
    ("Number Winning Trades", "Winning trades"),
    ("Number Losing Trades", "Losing trades"),
    ("Avg Trade", "Avg P&L"),
    ("Avg Winning Trade", "Avg winning trade"),
    ("Avg Losing Trade", "Avg losing trade"),
    ("Ratio Avg Win / Avg Loss", "Ratio avg win / avg loss"),
    ("Largest Winning Trade", "Largest winning trade"),
    ("Percent Profitable", "Percent profitable"),
    ("Largest Losing Trade", "Largest losing trade"),
    ("Avg # Bars in Trades", "Avg # bars in trades"),
    ("Avg # Bars in Winning Trades", "Avg # bars in winning trades"),
    ("Avg # Bars in Losing Trades", "Avg # bars in losing trades"),
    ("Margin Calls", "Margin calls"),
];

/// Below this share of numeric fields the alternative scans are attempted.
const MIN_NUMERIC_RATIO: f64 = 0.3;

pub struct ReportParser {
    retry: RetryPolicy,
}

impl ReportParser {
    pub fn new(retry: RetryPolicy) -> Self {
        Self { retry }
    }

    /// Reads and parses the whole report.
    ///
    /// Missing headers or rows are fatal only until the first successful parse
    /// of the session; afterwards an empty report is returned instead.
    pub async fn parse<S>(
        &self,
        source: &S,
        session: &HostSession,
        target_metric: &str,
    ) -> Result<PerformanceReport, ParseError>
    where
        S: ReportSource + ?Sized,
    {
        let headers = match retry_with_backoff(
            &self.retry,
            "performance headers",
            HostError::is_retryable,
            || async {
                let headers = source.headers().await?;
                if headers.len() < 2 {
                    return Err(HostError::ElementNotFound {
                        what: "performance headers".to_string(),
                    });
                }
                Ok(headers)
            },
        )
        .await
        {
            Ok(headers) => headers,
            Err(err) if session.has_parsed() => {
                warn!("ReportParser: {}, returning an empty report", err);
                return Ok(PerformanceReport::new());
            }
            Err(err) => {
                return Err(ParseError::HeadersUnavailable {
                    attempts: err.attempts,
                    reason: err.last_error.to_string(),
                });
            }
        };

        let rows = match retry_with_backoff(
            &self.retry,
            "performance rows",
            HostError::is_retryable,
            || async {
                let rows = source.rows().await?;
                if rows.is_empty() {
                    return Err(HostError::ElementNotFound {
                        what: "performance rows".to_string(),
                    });
                }
                Ok(rows)
            },
        )
        .await
        {
            Ok(rows) => {
                session.mark_parsed();
                rows
            }
            Err(err) if session.has_parsed() => {
                warn!("ReportParser: {}, returning an empty report", err);
                return Ok(PerformanceReport::new());
            }
            Err(err) => {
                return Err(ParseError::RowsUnavailable {
                    attempts: err.attempts,
                    reason: err.last_error.to_string(),
                });
            }
        };

        let legacy = session.ui_variant() == Some(UiVariant::Legacy);
        let mut report = PerformanceReport::new();
        parse_rows(&headers, &rows, legacy, &mut report);

        let field_count = report.len();
        let ratio = report.numeric_ratio();
        if ratio < MIN_NUMERIC_RATIO || field_count == 0 {
            info!(
                "ReportParser: low numeric ratio ({:.0}% of {} fields), trying the two-column scan",
                ratio * 100.0,
                field_count
            );
            let alternative = parse_two_columns(&rows, legacy);
            if alternative.len() > field_count {
                report.merge_recovered(alternative);
            }
        }

        match source.extra_tables().await {
            Ok(tables) => {
                for table in tables {
                    debug!("ReportParser: parsing \"{}\" table", table.name);
                    parse_rows(&table.headers, &table.rows, legacy, &mut report);
                }
            }
            Err(err) => warn!("ReportParser: additional tables unavailable: {}", err),
        }

        resolve_critical_aliases(&mut report);

        if report.number(target_metric).is_none() {
            match source.text().await {
                Ok(text) => {
                    if let Some((name, value)) = scan_text_for_metric(&text, target_metric) {
                        info!("ReportParser: recovered \"{}\" from report text: {}", name, value);
                        report.assign(&name, MetricValue::Number(value));
                    }
                }
                Err(err) => warn!("ReportParser: report text unavailable: {}", err),
            }
        }

        let errors = report.error_count();
        if errors > 0 {
            warn!(
                "ReportParser: {} of {} fields failed to parse",
                errors,
                report.len()
            );
        }
        Ok(report)
    }
}

impl Default for ReportParser {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

fn canonical_row_name(raw: &str, legacy: bool) -> String {
    let name = raw.trim();
    if legacy {
        if let Some((_, current)) = LEGACY_ROW_NAMES.iter().find(|(old, _)| *old == name) {
            return (*current).to_string();
        }
    }
    name.to_string()
}

fn is_negative_row(name: &str) -> bool {
    let lowered = name.to_lowercase();
    NEGATIVE_ROWS.contains(&lowered.as_str())
}

fn is_single_value_row(row: &RawRow, name: &str) -> bool {
    row.cells.len() == 3 || SINGLE_VALUE_ROWS.contains(&name.to_lowercase().as_str())
}

/// Replaces unicode spaces and dashes with their ASCII forms, keeping line breaks.
fn normalize_cell(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\u{00A0}' | '\u{2000}'..='\u{200B}' | '\u{202F}' => ' ',
            '\u{2212}' | '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// First `-?\d+\.?\d*` run of the cleaned text.
fn leading_number(cleaned: &str) -> Option<&str> {
    let bytes = cleaned.as_bytes();
    let mut start = None;
    for (i, b) in bytes.iter().enumerate() {
        if b.is_ascii_digit() {
            start = Some(if i > 0 && bytes[i - 1] == b'-' { i - 1 } else { i });
            break;
        }
    }
    let start = start?;
    let mut end = start;
    if bytes[end] == b'-' {
        end += 1;
    }
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    if end < bytes.len() && bytes[end] == b'.' {
        end += 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
    }
    Some(&cleaned[start..end])
}

/// Parses a numeric cell. Counts (trades, contracts) are truncated to integers.
pub fn parse_number(row_name: &str, text: &str) -> MetricValue {
    let cleaned: String = normalize_cell(text)
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '-' || *c == '.')
        .collect();
    let Some(number) = leading_number(&cleaned) else {
        return MetricValue::Error;
    };
    let lowered = row_name.to_lowercase();
    let integral = lowered.contains("trades") || lowered.contains("contracts held");
    let parsed = if integral {
        number
            .split('.')
            .next()
            .and_then(|whole| whole.parse::<i64>().ok())
            .map(|v| v as f64)
    } else {
        number.trim_end_matches('.').parse::<f64>().ok()
    };
    match parsed {
        Some(v) if v.is_finite() => MetricValue::Number(v),
        _ => MetricValue::Error,
    }
}

fn signed(value: MetricValue, negative: bool) -> MetricValue {
    match value {
        MetricValue::Number(v) if negative && v > 0.0 => MetricValue::Number(-v),
        other => other,
    }
}

/// Parses a cell's text into one or two named metrics.
fn parse_cell(report: &mut PerformanceReport, value_name: &str, percent_name: &str, raw: &str, negative: bool) {
    let text = normalize_cell(raw);
    if text.is_empty() {
        return;
    }

    if text.contains('\n') && text.ends_with('%') {
        let parts: Vec<&str> = text.split('\n').collect();
        let first = parts.first().map(|s| s.trim()).unwrap_or_default();
        let last = parts.last().map(|s| s.trim()).unwrap_or_default();
        if parts.len() >= 2 {
            if !first.is_empty() {
                report.assign(value_name, signed(parse_number(value_name, first), negative));
            }
            if !last.is_empty() {
                report.assign(percent_name, signed(parse_number(percent_name, last), negative));
            }
        }
        return;
    }

    if text.chars().any(|c| c.is_ascii_digit()) {
        report.assign(value_name, signed(parse_number(value_name, &text), negative));
    } else {
        report.assign(value_name, MetricValue::Text(text));
    }
}

/// Parses table rows into `report`, keeping values that are already there.
///
/// Multi-column rows produce `"<row>: <header>"` and `"<row> %: <header>"`;
/// single-value rows produce `"<row>"` and `"<row> %"`.
pub fn parse_rows(headers: &[String], rows: &[RawRow], legacy: bool, report: &mut PerformanceReport) {
    for row in rows {
        if row.cells.len() < 2 {
            continue;
        }
        let Some(raw_name) = row.name() else {
            continue;
        };
        let name = canonical_row_name(raw_name, legacy);
        if name.is_empty() {
            continue;
        }
        let single = is_single_value_row(row, &name);
        let negative = is_negative_row(&name);

        for (i, cell) in row.cells.iter().enumerate().skip(1) {
            if single && i >= 2 {
                break;
            }
            let (value_name, percent_name) = if single {
                (name.clone(), format!("{} %", name))
            } else {
                let Some(header) = headers.get(i).map(|h| h.trim()).filter(|h| !h.is_empty()) else {
                    continue;
                };
                (format!("{}: {}", name, header), format!("{} %: {}", name, header))
            };
            parse_cell(report, &value_name, &percent_name, cell, negative);
        }
    }
}

/// Reads only the first two cells of every row, naming metrics after the row.
fn parse_two_columns(rows: &[RawRow], legacy: bool) -> PerformanceReport {
    let mut report = PerformanceReport::new();
    for row in rows {
        let (Some(name), Some(value)) = (row.cells.first(), row.cells.get(1)) else {
            continue;
        };
        let name = canonical_row_name(name, legacy);
        if name.is_empty() {
            continue;
        }
        let negative = is_negative_row(&name);
        parse_cell(&mut report, &name, &format!("{} %", name), value, negative);
    }
    report
}

/// Looks for `<metric> <number>` in free report text.
fn scan_text_for_metric(text: &str, target_metric: &str) -> Option<(String, f64)> {
    let row_name = target_metric.split(':').next().unwrap_or(target_metric).trim();
    if row_name.is_empty() {
        return None;
    }
    let haystack = normalize_cell(text);
    let lowered = haystack.to_lowercase();
    let needle = row_name.to_lowercase();
    let start = lowered.find(&needle)? + needle.len();
    let rest = haystack.get(start..)?;
    let token: String = rest
        .trim_start_matches(|c: char| c == ':' || c.is_whitespace())
        .chars()
        .take_while(|c| c.is_ascii_digit() || matches!(c, ' ' | ',' | '.' | '-'))
        .collect();
    let value = parse_number(row_name, &token).as_f64()?;
    Some((target_metric.to_string(), if is_negative_row(row_name) && value > 0.0 { -value } else { value }))
}

fn letters_key(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphabetic() || *c == '%')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Fills critical fields from differently formatted names of the same metric.
fn resolve_critical_aliases(report: &mut PerformanceReport) {
    for field in CRITICAL_FIELDS {
        if report.number(field).is_some() {
            continue;
        }
        let key = letters_key(field);
        let alias = report
            .metrics
            .iter()
            .find(|(name, value)| name.as_str() != field && letters_key(name) == key && value.as_f64().is_some())
            .map(|(_, value)| value.clone());
        if let Some(value) = alias {
            debug!("ReportParser: resolved \"{}\" from an alias", field);
            report.insert(field, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::RawTable;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn headers() -> Vec<String> {
        vec!["Title".into(), "All".into(), "Long".into(), "Short".into()]
    }

    #[test]
    fn test_losses_are_negative() {
        let rows = vec![RawRow::new(["Gross loss", "500.00 USD", "300.00 USD", "200.00 USD"])];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, false, &mut report);
        assert_eq!(report.number("Gross loss: All"), Some(-500.0));
        assert_eq!(report.number("Gross loss: Short"), Some(-200.0));
    }

    #[test]
    fn test_value_and_percent_pair() {
        let rows = vec![RawRow::new([
            "Net profit",
            "1\u{00A0}234.50 USD\n12.35%",
            "\u{2212}100 USD\n\u{2212}1.00%",
            "",
        ])];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, false, &mut report);
        assert_eq!(report.number("Net profit: All"), Some(1234.5));
        assert_eq!(report.number("Net profit %: All"), Some(12.35));
        assert_eq!(report.number("Net profit: Long"), Some(-100.0));
        assert_eq!(report.number("Net profit %: Long"), Some(-1.0));
        assert!(!report.contains("Net profit: Short"));
    }

    #[test]
    fn test_single_value_rows_use_bare_names() {
        let rows = vec![
            RawRow::new(["Sharpe ratio", "1.234", "", ""]),
            RawRow::new(["Max equity drawdown", "250.00 USD\n2.50%", "", ""]),
        ];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, false, &mut report);
        assert_eq!(report.number("Sharpe ratio"), Some(1.234));
        assert_eq!(report.number("Max equity drawdown"), Some(-250.0));
        assert_eq!(report.number("Max equity drawdown %"), Some(-2.5));
    }

    #[test]
    fn test_trade_counts_are_integers() {
        let rows = vec![RawRow::new(["Total trades", "1,204", "600", "604"])];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, false, &mut report);
        assert_eq!(report.number("Total trades: All"), Some(1204.0));
    }

    #[test]
    fn test_non_numeric_and_broken_cells() {
        let rows = vec![
            RawRow::new(["Profit factor", "N/A", "-", "1.5"]),
            RawRow::new(["Avg P&L", "12.5.3 USD", "", ""]),
        ];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, false, &mut report);
        assert_eq!(report.get("Profit factor: All"), Some(&MetricValue::Text("N/A".into())));
        assert_eq!(report.number("Profit factor: Short"), Some(1.5));
        assert_eq!(report.number("Avg P&L: All"), Some(12.5));
    }

    #[test]
    fn test_legacy_row_names() {
        let rows = vec![RawRow::new(["Net Profit", "10", "5", "5"])];
        let mut report = PerformanceReport::new();
        parse_rows(&headers(), &rows, true, &mut report);
        assert_eq!(report.number("Net profit: All"), Some(10.0));
    }

    #[test]
    fn test_critical_alias_resolution() {
        let mut report = PerformanceReport::new();
        report.insert("Net Profit:  All", MetricValue::Number(42.0));
        report.insert("Net profit %: All", MetricValue::Error);
        resolve_critical_aliases(&mut report);
        assert_eq!(report.number("Net profit: All"), Some(42.0));
        assert_eq!(report.get("Net profit %: All"), Some(&MetricValue::Error));
        assert!(!report.contains("Gross profit: All"));
    }

    #[test]
    fn test_text_scan() {
        let text = "Overview\nNet profit: 1 500.25 USD 15%\nTotal trades 10";
        assert_eq!(
            scan_text_for_metric(text, "Net profit: All"),
            Some(("Net profit: All".to_string(), 1500.25))
        );
        assert_eq!(scan_text_for_metric(text, "Sharpe ratio"), None);
    }

    struct FlakySource {
        header_failures: AtomicU32,
        labels: Vec<String>,
        rows: Vec<RawRow>,
        extra: Vec<RawTable>,
    }

    #[async_trait]
    impl ReportSource for FlakySource {
        async fn headers(&self) -> Result<Vec<String>, HostError> {
            if self.header_failures.load(Ordering::SeqCst) > 0 {
                self.header_failures.fetch_sub(1, Ordering::SeqCst);
                return Err(HostError::ElementNotFound {
                    what: "headers".into(),
                });
            }
            Ok(self.labels.clone())
        }

        async fn rows(&self) -> Result<Vec<RawRow>, HostError> {
            Ok(self.rows.clone())
        }

        async fn text(&self) -> Result<String, HostError> {
            Ok(String::new())
        }

        async fn extra_tables(&self) -> Result<Vec<RawTable>, HostError> {
            Ok(self.extra.clone())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parse_recovers_from_transient_header_failures() {
        let source = FlakySource {
            header_failures: AtomicU32::new(2),
            labels: headers(),
            rows: vec![RawRow::new(["Net profit", "100\n1%", "50\n0.5%", "50\n0.5%"])],
            extra: vec![RawTable {
                name: "Ratios".into(),
                headers: headers(),
                rows: vec![RawRow::new(["Profit factor", "1.8", "1.9", "1.7"])],
            }],
        };
        let session = HostSession::new();
        let report = ReportParser::default()
            .parse(&source, &session, "Net profit: All")
            .await
            .unwrap();
        assert_eq!(report.number("Net profit: All"), Some(100.0));
        assert_eq!(report.number("Profit factor: All"), Some(1.8));
        assert!(session.has_parsed());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlabelled_columns_fall_back_to_two_column_scan() {
        // The "All" header is missing, so only one text field survives the
        // multi-column pass.
        let source = FlakySource {
            header_failures: AtomicU32::new(0),
            labels: vec!["Title".into(), "".into(), "Long".into(), "Short".into()],
            rows: vec![
                RawRow::new(["Net profit", "1 200 USD\n12%", "", ""]),
                RawRow::new(["Total trades", "42", "", ""]),
                RawRow::new(["Gross loss", "300 USD", "", ""]),
                RawRow::new(["Strategy", "", "Demo Crossover", ""]),
            ],
            extra: vec![],
        };
        let report = ReportParser::default()
            .parse(&source, &HostSession::new(), "Net profit: All")
            .await
            .unwrap();
        assert_eq!(report.number("Net profit"), Some(1200.0));
        assert_eq!(report.number("Net profit %"), Some(12.0));
        assert_eq!(report.number("Total trades"), Some(42.0));
        assert_eq!(report.number("Gross loss"), Some(-300.0));
        assert!(report.get("Strategy: Long").is_some());
        assert_eq!(report.number("Net profit: All"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_headers_fatal_only_before_first_parse() {
        let source = FlakySource {
            header_failures: AtomicU32::new(100),
            labels: headers(),
            rows: vec![],
            extra: vec![],
        };
        let session = HostSession::new();
        let parser = ReportParser::default();
        let err = parser.parse(&source, &session, "Net profit: All").await.unwrap_err();
        assert!(matches!(err, ParseError::HeadersUnavailable { attempts: 3, .. }));

        session.mark_parsed();
        let report = parser.parse(&source, &session, "Net profit: All").await.unwrap();
        assert!(report.is_empty());
    }
}
