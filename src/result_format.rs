/// Human-readable and JSON rendering of query outcomes
use crate::engine::{Answer, Comparison, QueryOutcome};
use crate::execution::{ApproximationStatus, EstimationResult, GroupedEstimationResult};
use crate::query::SamplingMethod;
use std::fmt;
use std::fmt::Display;
use std::time::Duration;

const RULE_WIDTH: usize = 60;

/// `12.3ms` below a second, `1.23s` above
pub fn format_time(duration: Duration) -> String {
    let millis = duration.as_secs_f64() * 1000.0;
    if millis < 1000.0 {
        format!("{:.1}ms", millis)
    } else {
        format!("{:.2}s", millis / 1000.0)
    }
}

pub fn format_status(status: ApproximationStatus) -> String {
    let marker = match status {
        ApproximationStatus::Stable => "[ok]",
        ApproximationStatus::Drifting => "[!]",
        ApproximationStatus::InsufficientData | ApproximationStatus::Error => "[x]",
    };
    format!("{} {}", marker, status)
}

/// Digits grouped in thousands with a fixed number of decimals
pub fn format_number(value: f64, decimals: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    let text = format!("{:.*}", decimals, value.abs());
    let (int_part, frac_part) = match text.split_once('.') {
        Some((int_part, frac_part)) => (int_part, Some(frac_part)),
        None => (text.as_str(), None),
    };

    let mut grouped = String::with_capacity(text.len() + int_part.len() / 3 + 1);
    if value < 0.0 {
        grouped.push('-');
    }
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    if let Some(frac_part) = frac_part {
        grouped.push('.');
        grouped.push_str(frac_part);
    }
    grouped
}

fn format_margin(error_margin: f64) -> String {
    if error_margin.is_finite() {
        format!("±{:.1}%", error_margin * 100.0)
    } else {
        "unbounded".to_string()
    }
}

/// Result block of a scalar answer
pub struct EstimationReport<'a> {
    pub result: &'a EstimationResult,
    pub show_ci: bool,
}

impl fmt::Display for EstimationReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        writeln!(f, "{} Results:", result.method_name)?;
        match result.value() {
            Some(value) => writeln!(f, "   Value: {}", format_number(value, 4))?,
            None => writeln!(f, "   Value: (none)")?,
        }
        match result.ci {
            Some(ci) => writeln!(
                f,
                "   Confidence Interval: ({} - {})",
                format_number(ci.lower, 4),
                format_number(ci.upper, 4)
            )?,
            None if self.show_ci => writeln!(f, "   Confidence Interval: not available")?,
            None => {}
        }
        writeln!(f, "   Status: {}", format_status(result.status()))?;
        writeln!(f, "   Confidence: {:.1}%", result.confidence_level * 100.0)?;
        writeln!(f, "   Error margin: {}", format_margin(result.error_margin))?;
        if let Some(target) = result.error_threshold {
            writeln!(f, "   Target error: {:.2}%", target * 100.0)?;
        }
        writeln!(
            f,
            "   Samples used: {} ({:.2}%)",
            format_number(result.samples_used.count as f64, 0),
            result.samples_used.percent
        )?;
        if let Some(percent) = result.suggested_sample_percent {
            writeln!(f, "   Suggested sample: {}%", percent)?;
        }
        writeln!(f, "   Execution time: {}", format_time(result.execution_time))
    }
}

pub fn render_estimation(result: &EstimationResult, show_ci: bool) -> String {
    EstimationReport { result, show_ci }.to_string()
}

/// Table of per-group results
pub struct GroupedReport<'a> {
    pub result: &'a GroupedEstimationResult,
    pub show_ci: bool,
}

impl fmt::Display for GroupedReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = self.result;
        writeln!(f, "{} Results (GROUP BY {}):", result.method_name, result.group_by)?;
        writeln!(
            f,
            "   {:<12} {:>20} {:>45} {:<20}",
            result.group_by.name(),
            "Value",
            if self.show_ci { "Confidence Interval" } else { "" },
            "Status"
        )?;
        for (key, group) in &result.groups {
            let value = group
                .value()
                .map(|v| format_number(v, 4))
                .unwrap_or_else(|| "(none)".to_string());
            let ci = match (self.show_ci, group.ci) {
                (true, Some(ci)) => format!(
                    "({} - {})",
                    format_number(ci.lower, 4),
                    format_number(ci.upper, 4)
                ),
                (true, None) => "n/a".to_string(),
                (false, _) => String::new(),
            };
            writeln!(
                f,
                "   {:<12} {:>20} {:>45} {:<20}",
                key,
                value,
                ci,
                format_status(group.status())
            )?;
        }
        writeln!(f, "   Groups: {}", result.len())?;
        writeln!(
            f,
            "   Samples used: {} ({:.2}%)",
            format_number(result.samples_used.count as f64, 0),
            result.samples_used.percent
        )?;
        writeln!(f, "   Execution time: {}", format_time(result.execution_time))
    }
}

pub fn render_grouped(result: &GroupedEstimationResult, show_ci: bool) -> String {
    GroupedReport { result, show_ci }.to_string()
}

fn write_answer(f: &mut fmt::Formatter<'_>, answer: &Answer, show_ci: bool) -> fmt::Result {
    match answer {
        Answer::Scalar(result) => EstimationReport { result, show_ci }.fmt(f),
        Answer::Grouped(result) => GroupedReport { result, show_ci }.fmt(f),
    }
}

fn write_comparison(
    f: &mut fmt::Formatter<'_>,
    answer: &Answer,
    comparison: &Comparison,
) -> fmt::Result {
    writeln!(f, "Comparison:")?;
    match (answer, &comparison.exact) {
        (Answer::Scalar(approx), Answer::Scalar(exact)) => {
            let show =
                |v: Option<f64>| v.map(|v| format_number(v, 4)).unwrap_or_else(|| "(none)".into());
            writeln!(f, "   Approximate: {}", show(approx.value()))?;
            writeln!(f, "   Exact:       {}", show(exact.value()))?;
        }
        (_, Answer::Grouped(exact)) => {
            writeln!(f, "   Exact answer computed over {} groups", exact.len())?;
        }
        (_, Answer::Scalar(exact)) => {
            writeln!(f, "   Exact: {}", exact.value().map(|v| format_number(v, 4)).unwrap_or_default())?;
        }
    }
    match comparison.actual_error_percent {
        Some(error) => writeln!(f, "   Actual error: {:.2}%", error)?,
        None => writeln!(f, "   Actual error: undefined (exact value is zero)")?,
    }
    if let Some(speedup) = comparison.speedup {
        writeln!(f, "   Speedup: {:.1}x faster", speedup)?;
    }
    Ok(())
}

/// Full report of one query: analysis, result, comparison and recommendation
pub struct OutcomeReport<'a> {
    pub outcome: &'a QueryOutcome,
    pub show_ci: bool,
}

impl fmt::Display for OutcomeReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = self.outcome;
        writeln!(f, "Query Analysis:")?;
        writeln!(f, "   Query: {}", outcome.query_text)?;
        writeln!(f, "   Database: {}", outcome.db_path.display())?;
        writeln!(f, "   Type: {}", outcome.classification.query_type)?;
        writeln!(
            f,
            "   Dataset size: {} records",
            format_number(outcome.dataset_size as f64, 0)
        )?;
        writeln!(f, "{}", "-".repeat(RULE_WIDTH))?;
        writeln!(f)?;
        write_answer(f, &outcome.answer, self.show_ci)?;

        if let Some(comparison) = &outcome.comparison {
            writeln!(f)?;
            write_comparison(f, &outcome.answer, comparison)?;
        }

        if outcome.recommendation_differs() {
            writeln!(
                f,
                "\nRecommendation: Try --method {} for potentially better results",
                outcome.recommendation
            )?;
        }
        writeln!(f, "\n{}", "=".repeat(RULE_WIDTH))
    }
}

pub fn render_outcome(outcome: &QueryOutcome, show_ci: bool) -> String {
    OutcomeReport { outcome, show_ci }.to_string()
}

/// Catalogue printed by `--explain`
pub struct MethodCatalogue;

impl fmt::Display for MethodCatalogue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Available Approximation Methods:")?;
        writeln!(f, "{}", "=".repeat(100))?;
        writeln!(
            f,
            "{:<14} {:<50} {:<45} {:<10} {:<15}",
            "Method", "Description", "Best For", "Accuracy", "Speed"
        )?;
        writeln!(f, "{}", "-".repeat(100))?;
        for method in SamplingMethod::ALL {
            let info = method.info();
            writeln!(
                f,
                "{:<14} {:<50} {:<45} {:<10} {:<15}",
                info.key, info.description, info.best_for, info.accuracy, info.speed
            )?;
        }
        writeln!(f, "\nMethod Selection Guide:")?;
        writeln!(f, "   - Use -s <percent> for quick random sampling")?;
        writeln!(f, "   - Use -e <error> for statistical CLT approximation")?;
        writeln!(f, "   - Use --block <size> for block sampling")?;
        writeln!(f, "   - Use APPROX() in SQL for embedded approximation")?;
        writeln!(f, "   - Use --method <type> to override automatic selection")
    }
}

pub fn render_method_catalogue() -> String {
    MethodCatalogue.to_string()
}

/// Outcome as pretty JSON
pub fn to_json(outcome: &QueryOutcome) -> serde_json::Result<String> {
    serde_json::to_string_pretty(outcome)
}
