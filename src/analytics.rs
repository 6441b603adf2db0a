//! Reporting for walk-forward evaluations and label distributions.

use crate::scoring::AucScore;
use crate::types::Label;
use crate::walkforward::{EvaluationReport, FoldResult};
use colored::Colorize;
use std::collections::BTreeMap;
use tabled::{builder::Builder, settings::Style};

fn format_option(value: Option<f64>) -> String {
    value.map(|v| format!("{:.3}", v)).unwrap_or_else(|| "-".to_string())
}

fn csv_option(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Formats evaluation results for display and export.
pub struct ResultFormatter;

impl ResultFormatter {
    /// Print the summary and the fold table to stdout.
    pub fn print_report(report: &EvaluationReport) {
        println!();
        println!("{}", "═".repeat(60).blue());
        println!("{}", " WALK-FORWARD EVALUATION ".bold().blue());
        println!("{}", "═".repeat(60).blue());
        println!();

        println!("{}", "Overview".bold().underline());
        println!("  Model:           {}", report.model);
        println!("  Fold width:      {}", report.config.fold_width);
        println!(
            "  Eval start:      {}",
            report.config.eval_start.format("%Y-%m-%d %H:%M")
        );
        println!("  Positive class:  {}", report.config.positive_class);
        println!(
            "  Min precision:   {:.2}",
            report.config.precision_threshold
        );
        println!();

        println!("{}", "Results".bold().underline());
        println!("  Folds evaluated: {:>8}", report.results.len());
        println!("  Folds skipped:   {:>8}", report.skipped.len());
        println!(
            "  Mean AUC:        {:>8}",
            match report.mean_auc() {
                Some(v) => Self::format_auc(AucScore::Value(v)),
                None => Self::format_auc(AucScore::Undefined),
            }
        );
        println!("  Undefined AUC:   {:>8}", report.undefined_auc_count());
        println!(
            "  Operating points:{:>8}",
            report.operating_point_count()
        );
        println!();

        if !report.results.is_empty() {
            println!("{}", Self::fold_table(&report.results));
        }

        println!("{}", "═".repeat(60).blue());
    }

    /// AUC colored by quality.
    fn format_auc(auc: AucScore) -> String {
        match auc {
            AucScore::Value(v) if v >= 0.7 => format!("{:.3}", v).green().to_string(),
            AucScore::Value(v) if v < 0.5 => format!("{:.3}", v).red().to_string(),
            AucScore::Value(v) => format!("{:.3}", v),
            AucScore::Undefined => "undefined".yellow().to_string(),
        }
    }

    /// Per-fold results as a rounded table.
    pub fn fold_table(results: &[FoldResult]) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Fold", "Train", "Test", "AUC", "Precision", "Recall", "Threshold",
        ]);

        for result in results {
            builder.push_record([
                result.fold.clone(),
                result.train_rows.to_string(),
                result.test_rows.to_string(),
                result.auc.to_string(),
                format_option(result.precision),
                format_option(result.recall),
                format_option(result.threshold),
            ]);
        }

        builder.build().with(Style::rounded()).to_string()
    }

    /// Print results as a table.
    pub fn print_table(results: &[FoldResult]) {
        println!("{}", Self::fold_table(results));
    }

    /// Counts and shares of each label as a rounded table.
    pub fn label_table(counts: &BTreeMap<Label, usize>) -> String {
        let total: usize = counts.values().sum();
        let mut builder = Builder::new();
        builder.push_record(["Label", "Rows", "Share"]);
        for (label, count) in counts {
            let share = if total > 0 {
                *count as f64 / total as f64 * 100.0
            } else {
                0.0
            };
            builder.push_record([
                label.to_string(),
                count.to_string(),
                format!("{:.1}%", share),
            ]);
        }
        builder.build().with(Style::rounded()).to_string()
    }

    /// Export the report to JSON.
    pub fn to_json(report: &EvaluationReport) -> String {
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string())
    }

    /// Export one fold result as a CSV line.
    pub fn to_csv_line(result: &FoldResult) -> String {
        format!(
            "{},{},{},{},{},{},{},{}",
            result.fold,
            result.start.to_rfc3339(),
            result.train_rows,
            result.test_rows,
            csv_option(result.auc.value()),
            csv_option(result.precision),
            csv_option(result.recall),
            csv_option(result.threshold)
        )
    }

    /// Export every fold result as CSV (header included).
    pub fn to_csv(report: &EvaluationReport) -> String {
        let mut lines = vec![Self::csv_header().to_string()];
        lines.extend(report.results.iter().map(Self::to_csv_line));
        lines.join("\n")
    }

    /// Get CSV header.
    pub fn csv_header() -> &'static str {
        "fold,start,train_rows,test_rows,auc,precision,recall,threshold"
    }
}
