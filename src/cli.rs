//! Command-line interface for labeling and walk-forward evaluation.

use heron::analytics::ResultFormatter;
use heron::config::{DataSettings, EvaluationFileConfig, TargetSettings};
use heron::error::Result;
use heron::labeling::construct_target_with;
use heron::types::label_counts;
use heron::walkforward::EvaluationReport;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

/// Heron - forecasting labels and walk-forward classifier evaluation.
#[derive(Parser)]
#[command(name = "heron")]
#[command(version)]
#[command(about = "Build price-move labels and evaluate classifiers with walk-forward folds")]
#[command(long_about = None)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Label a price series and write the labelled rows to CSV
    Label {
        #[command(flatten)]
        data: DataArgs,

        #[command(flatten)]
        target: TargetArgs,

        /// Where to write the labelled CSV
        #[arg(short = 'O', long)]
        out: Option<PathBuf>,
    },

    /// Label, build features and run a walk-forward evaluation
    Evaluate(EvaluateArgs),

    /// Run an evaluation from a configuration file
    RunConfig {
        /// Path to TOML configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Show a progress bar over folds
        #[arg(long)]
        progress: bool,
    },

    /// Generate an example configuration file
    Init {
        /// Output path for config file
        #[arg(short = 'O', long, default_value = "heron.toml")]
        out: PathBuf,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Where the price data comes from.
#[derive(Debug, Clone, Args)]
pub struct DataArgs {
    /// Path to the CSV data file
    #[arg(short, long)]
    pub data: PathBuf,

    /// Treat the data file as a system price export
    #[arg(long)]
    pub system_prices: bool,

    /// Day-ahead price CSV joined onto system prices by nearest prior time
    #[arg(long, requires = "system_prices")]
    pub day_ahead: Option<PathBuf>,

    /// Name of the time column
    #[arg(long, default_value = "datetime")]
    pub time_column: String,
}

impl DataArgs {
    fn to_settings(&self) -> DataSettings {
        let path = self.data.display().to_string();
        DataSettings {
            path: (!self.system_prices).then(|| path.clone()),
            system_prices: self.system_prices.then_some(path),
            day_ahead_prices: self.day_ahead.as_ref().map(|p| p.display().to_string()),
            time_column: self.time_column.clone(),
            date_format: None,
        }
    }
}

/// Label construction parameters.
#[derive(Debug, Clone, Args)]
pub struct TargetArgs {
    /// Price column to label
    #[arg(short, long, default_value = "system_price")]
    pub price_column: String,

    /// Number of rows scanned ahead of each row
    #[arg(short = 'H', long, default_value = "24")]
    pub horizon: usize,

    /// Rise that counts as a positive move (e.g. 0.03 for +3%)
    #[arg(long, default_value = "0.03")]
    pub positive_threshold: f64,

    /// Fall that counts as a negative move (e.g. -0.03 for -3%)
    #[arg(long, default_value = "-0.03", allow_negative_numbers = true)]
    pub negative_threshold: f64,

    /// Name of the label column
    #[arg(long, default_value = "forecast")]
    pub label_column: String,
}

impl TargetArgs {
    fn to_settings(&self) -> TargetSettings {
        TargetSettings {
            price_column: self.price_column.clone(),
            horizon_periods: self.horizon,
            positive_threshold: self.positive_threshold,
            negative_threshold: self.negative_threshold,
            label_column: self.label_column.clone(),
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct EvaluateArgs {
    #[command(flatten)]
    pub data: DataArgs,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Numeric feature columns (repeat or comma-separate)
    #[arg(short, long = "feature", value_delimiter = ',')]
    pub features: Vec<String>,

    /// Skip the hour/month/dayofweek features
    #[arg(long)]
    pub no_calendar: bool,

    /// Fold width: month, week, day or <n>h
    #[arg(long, default_value = "month")]
    pub fold_width: String,

    /// Folds starting before this date are skipped
    #[arg(long, default_value = "2018-02-01")]
    pub eval_start: String,

    /// Minimum precision for the reported operating point
    #[arg(long, default_value = "0.7")]
    pub precision_threshold: f64,

    /// Class whose precision/recall is reported
    #[arg(long, default_value = "positive")]
    pub positive_class: String,

    /// Number of trees in the random forest
    #[arg(long, default_value = "200")]
    pub trees: usize,

    /// Maximum tree depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Random seed
    #[arg(long, default_value = "42")]
    pub seed: u64,

    /// Evaluate folds in parallel
    #[arg(long)]
    pub parallel: bool,

    /// Show a progress bar over folds
    #[arg(long)]
    pub progress: bool,
}

impl EvaluateArgs {
    /// Equivalent file configuration.
    pub fn to_file_config(&self) -> EvaluationFileConfig {
        let mut config = EvaluationFileConfig {
            data: self.data.to_settings(),
            target: self.target.to_settings(),
            ..Default::default()
        };
        config.features.columns = self.features.clone();
        config.features.calendar = !self.no_calendar;
        config.evaluation.fold_width = self.fold_width.clone();
        config.evaluation.eval_start = self.eval_start.clone();
        config.evaluation.precision_threshold = self.precision_threshold;
        config.evaluation.positive_class = self.positive_class.clone();
        config.evaluation.parallel = self.parallel;
        config.model.n_trees = self.trees;
        config.model.max_depth = self.max_depth;
        config.model.seed = self.seed;
        config
    }
}

impl Cli {
    /// Initialize logging based on verbosity level.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("Failed to set tracing subscriber");
    }
}

/// Run the CLI application.
pub fn run() -> Result<()> {
    let cli = Cli::parse();
    cli.init_logging();

    match &cli.command {
        Commands::Label { data, target, out } => run_label(data, target, out.as_ref(), cli.output),
        Commands::Evaluate(args) => {
            let config = args.to_file_config();
            let report = config.run(args.progress)?;
            print_report(&report, cli.output);
            Ok(())
        }
        Commands::RunConfig { config, progress } => run_from_config(config, *progress, cli.output),
        Commands::Init { out } => init_config(out),
    }
}

fn print_report(report: &EvaluationReport, output: OutputFormat) {
    match output {
        OutputFormat::Text => ResultFormatter::print_report(report),
        OutputFormat::Json => println!("{}", ResultFormatter::to_json(report)),
        OutputFormat::Csv => println!("{}", ResultFormatter::to_csv(report)),
    }
}

fn run_label(
    data: &DataArgs,
    target: &TargetArgs,
    out: Option<&PathBuf>,
    output: OutputFormat,
) -> Result<()> {
    let config = EvaluationFileConfig {
        data: data.to_settings(),
        target: target.to_settings(),
        ..Default::default()
    };
    let target_config = config.to_target_config()?;
    let dataset = config.load_data()?;
    let labelled = construct_target_with(&dataset, dataset.time_column(), &target_config)?;

    if let Some(path) = out {
        labelled.write_csv(path)?;
        info!("Wrote {} labelled rows to {}", labelled.len(), path.display());
    }

    let counts = label_counts(labelled.label_column(&target_config.label_column)?);
    match output {
        OutputFormat::Text => {
            println!("Labelled {} of {} rows", labelled.len(), dataset.len());
            println!("{}", ResultFormatter::label_table(&counts));
        }
        OutputFormat::Json => {
            let named: BTreeMap<&str, usize> =
                counts.iter().map(|(l, c)| (l.as_str(), *c)).collect();
            println!("{}", serde_json::to_string_pretty(&named)?);
        }
        OutputFormat::Csv => {
            println!("label,rows");
            for (label, count) in &counts {
                println!("{},{}", label, count);
            }
        }
    }
    Ok(())
}

fn init_config(out: &PathBuf) -> Result<()> {
    let example = EvaluationFileConfig::example();
    fs::write(out, example)?;
    println!("Created example configuration file: {}", out.display());
    println!("\nEdit this file to point at your data, then run:");
    println!("  heron run-config -c {}", out.display());
    Ok(())
}

fn run_from_config(config_path: &PathBuf, progress: bool, output: OutputFormat) -> Result<()> {
    let file_config = EvaluationFileConfig::load(config_path)?;
    let report = file_config.run(progress)?;
    print_report(&report, output);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron::walkforward::FoldWidth;

    #[test]
    fn test_cli_parse_label() {
        let cli = Cli::try_parse_from([
            "heron",
            "label",
            "-d",
            "prices.csv",
            "-p",
            "price",
            "-H",
            "4",
            "--negative-threshold",
            "-0.05",
        ]);
        assert!(cli.is_ok());
        if let Ok(Cli {
            command: Commands::Label { target, .. },
            ..
        }) = cli
        {
            assert_eq!(target.horizon, 4);
            assert_eq!(target.negative_threshold, -0.05);
        }
    }

    #[test]
    fn test_evaluate_args_to_config() {
        let cli = Cli::try_parse_from([
            "heron",
            "-o",
            "json",
            "evaluate",
            "-d",
            "system.csv",
            "--system-prices",
            "--day-ahead",
            "n2ex.csv",
            "-f",
            "net_imbalance_volume,n2ex_price",
            "--fold-width",
            "week",
            "--trees",
            "50",
        ])
        .unwrap();
        assert_eq!(cli.output, OutputFormat::Json);

        let Commands::Evaluate(args) = cli.command else {
            panic!("expected evaluate");
        };
        let config = args.to_file_config();
        assert_eq!(config.data.path, None);
        assert_eq!(config.data.system_prices.as_deref(), Some("system.csv"));
        assert_eq!(config.data.day_ahead_prices.as_deref(), Some("n2ex.csv"));
        assert_eq!(
            config.features.columns,
            vec!["net_imbalance_volume", "n2ex_price"]
        );
        assert_eq!(config.model.n_trees, 50);
        assert_eq!(
            config.to_walkforward_config().unwrap().fold_width,
            FoldWidth::Week
        );
    }

    #[test]
    fn test_day_ahead_requires_system_prices() {
        let cli = Cli::try_parse_from([
            "heron", "evaluate", "-d", "prices.csv", "--day-ahead", "n2ex.csv",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_init_command() {
        let cli = Cli::try_parse_from(["heron", "init"]);
        assert!(cli.is_ok());
    }
}
