use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use crate::logging;
use crate::services::{
    Aggregator, ApiClient, Config, ConfigOverrides, PollingCoordinator, RefreshOutcome,
    WindowPolicy,
};
use crate::types::{ContractKind, ContractSummary, NovaError, Snapshot, YearlyMetric};

/// Nova Power & Gas account poller: bills and meter index history
#[derive(Parser)]
#[command(name = "novapg")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// Config file (default: ~/.novapg/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Account email
    #[arg(long, global = true, env = "NOVAPG_EMAIL")]
    email: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "NOVAPG_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Poll interval in minutes
    #[arg(long, global = true, env = "NOVAPG_INTERVAL", value_name = "MINUTES")]
    interval: Option<u64>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Log in once and validate the token
    Check,

    /// Fetch all account data once
    Fetch {
        /// Output the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Fetch once and print contract summaries and yearly metrics
    Metrics {
        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Years before the current one to include
        #[arg(long, value_name = "N")]
        history_years: Option<u32>,
    },

    /// Poll on the configured interval until Ctrl-C
    Watch,
}

impl GlobalArgs {
    fn overrides(&self, history_years: Option<u32>) -> ConfigOverrides {
        ConfigOverrides {
            email: self.email.clone(),
            password: self.password.clone(),
            update_interval_minutes: self.interval,
            history_years,
        }
    }
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        logging::init_logging(logging::level_for(self.global.verbose));

        let history_years = match &self.command {
            Commands::Metrics { history_years, .. } => *history_years,
            _ => None,
        };
        let config = Config::resolve(
            self.global.config.as_deref(),
            self.global.overrides(history_years),
        )?;
        tracing::debug!("Using {:?}", config);

        match self.command {
            Commands::Check => check(&config),
            Commands::Fetch { json } => fetch(&config, json),
            Commands::Metrics { json, .. } => metrics(&config, json),
            Commands::Watch => watch(&config),
        }
    }
}

fn check(config: &Config) -> anyhow::Result<()> {
    let mut client = ApiClient::from_config(config)?;
    if !client.session_mut().check_credentials() {
        return Err(NovaError::Auth(format!("credentials rejected for {}", config.email)).into());
    }
    println!("Credentials OK for {}", config.email);
    Ok(())
}

fn fetch(config: &Config, json: bool) -> anyhow::Result<()> {
    let snapshot = ApiClient::from_config(config)?.fetch_all();
    if json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        print!("{}", render_sizes(&snapshot));
    }
    Ok(())
}

/// Consumption point id and the address its metrics are listed under
#[derive(Debug, Serialize)]
struct PointLabel {
    id: String,
    address: String,
}

/// Contract summaries plus every catalogue metric of one refresh
#[derive(Debug, Serialize)]
struct MetricsReport {
    points: Vec<PointLabel>,
    contracts: Vec<ContractSummary>,
    metrics: Vec<YearlyMetric>,
}

impl MetricsReport {
    fn from_snapshot(snapshot: &Snapshot, metrics: Vec<YearlyMetric>) -> Self {
        Self {
            points: snapshot
                .points()
                .iter()
                .filter_map(|p| {
                    Some(PointLabel {
                        id: p.id()?.to_string(),
                        address: p.display_address().to_string(),
                    })
                })
                .collect(),
            contracts: ContractKind::ALL
                .into_iter()
                .map(|kind| Aggregator::contract_summary(snapshot, kind))
                .collect(),
            metrics,
        }
    }
}

fn metrics(config: &Config, json: bool) -> anyhow::Result<()> {
    let client = ApiClient::from_config(config)?;
    let coordinator = PollingCoordinator::new(client, WindowPolicy::Trailing(config.history_years));

    coordinator.refresh();
    let Some(snapshot) = coordinator.current_snapshot() else {
        anyhow::bail!("no data could be fetched for {}", config.email);
    };
    let metrics = coordinator.catalogue().metrics(&snapshot);
    let report = MetricsReport::from_snapshot(&snapshot, metrics);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render_report(&report));
    }
    Ok(())
}

fn watch(config: &Config) -> anyhow::Result<()> {
    let client = ApiClient::from_config(config)?;
    let coordinator = Arc::new(PollingCoordinator::new(
        client,
        WindowPolicy::Trailing(config.history_years),
    ));

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    tracing::info!(
        "Polling every {} minute(s), Ctrl-C to stop",
        config.update_interval_minutes
    );
    // Keep a handle so the blocking HTTP client is dropped outside the runtime
    runtime.block_on(Arc::clone(&coordinator).run(
        config.update_interval(),
        async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
            }
        },
        report_refresh,
    ));
    Ok(())
}

fn report_refresh(outcome: &RefreshOutcome) {
    if outcome.joined {
        tracing::debug!("Tick shared a refresh already in flight");
    }
    if outcome.diff.is_empty() {
        tracing::debug!("Metric catalogue unchanged");
    }
    for key in &outcome.diff.added {
        tracing::info!("New metric {} ({})", key.slug(), key.display_name());
    }
    for key in &outcome.diff.removed {
        tracing::info!("Retired metric {}", key.slug());
    }
    print!("{}", render_sizes(&outcome.snapshot));
}

fn render_sizes(snapshot: &Snapshot) -> String {
    let size = |len: Option<usize>| len.map_or_else(|| "unavailable".to_string(), |n| n.to_string());

    let mut out = String::new();
    let _ = writeln!(
        out,
        "Consumption points:   {}",
        size(snapshot.consumption_points.as_ref().map(Vec::len))
    );
    let _ = writeln!(out, "Bills:                {}", size(snapshot.bills.as_ref().map(Vec::len)));
    let _ = writeln!(
        out,
        "Electricity readings: {}",
        size(snapshot.electricity_readings.as_ref().map(Vec::len))
    );
    let _ = writeln!(
        out,
        "Gas readings:         {}",
        size(snapshot.gas_readings.as_ref().map(Vec::len))
    );
    out
}

fn render_report(report: &MetricsReport) -> String {
    let mut out = String::new();

    for summary in &report.contracts {
        let _ = writeln!(out, "Contracts {}: {}", summary.kind.abbrev(), summary.count());
        for holder in &summary.holders {
            let _ = writeln!(
                out,
                "  {} | {} | {}",
                holder.point_id.as_deref().unwrap_or("-"),
                holder.customer_name.as_deref().unwrap_or("-"),
                holder.consumption_address.as_deref().unwrap_or("-"),
            );
        }
    }

    // Catalogue order groups metrics by point id
    let mut current_point: Option<&str> = None;
    for metric in &report.metrics {
        if current_point != Some(metric.key.point_id.as_str()) {
            current_point = Some(metric.key.point_id.as_str());
            let address = report
                .points
                .iter()
                .find(|p| p.id == metric.key.point_id)
                .map_or("-", |p| p.address.as_str());
            let _ = writeln!(out, "\n{} ({})", address, metric.key.point_id);
        }
        let _ = writeln!(
            out,
            "  {} [{}]: {}",
            metric.key.display_name(),
            metric.key.slug(),
            metric.count
        );
        for item in &metric.items {
            let _ = writeln!(out, "    {}: {}", item.month, item.value);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        ConsumptionPoint, ContractHolder, ItemValue, LineItem, MetricKey, MetricKind,
    };

    #[test]
    fn test_cli_parse_requires_command() {
        assert!(Cli::try_parse_from(["novapg"]).is_err());
    }

    #[test]
    fn test_cli_parse_check() {
        let cli = Cli::try_parse_from(["novapg", "check"]).unwrap();
        assert!(matches!(cli.command, Commands::Check));
    }

    #[test]
    fn test_cli_parse_fetch_json() {
        let cli = Cli::try_parse_from(["novapg", "fetch", "--json"]).unwrap();
        assert!(matches!(cli.command, Commands::Fetch { json: true }));
    }

    #[test]
    fn test_cli_parse_metrics_history() {
        let cli = Cli::try_parse_from(["novapg", "metrics", "--history-years", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Metrics {
                json: false,
                history_years: Some(3)
            }
        ));
    }

    #[test]
    fn test_cli_parse_global_flags_after_command() {
        let cli = Cli::try_parse_from([
            "novapg",
            "watch",
            "--email",
            "ana@example.ro",
            "--interval",
            "15",
            "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Watch));
        assert_eq!(cli.global.email.as_deref(), Some("ana@example.ro"));
        assert_eq!(cli.global.interval, Some(15));
        assert_eq!(cli.global.verbose, 2);
    }

    #[test]
    fn test_overrides_carry_history_years() {
        let cli = Cli::try_parse_from(["novapg", "--interval", "5", "check"]).unwrap();
        let overrides = cli.global.overrides(Some(2));
        assert_eq!(overrides.update_interval_minutes, Some(5));
        assert_eq!(overrides.history_years, Some(2));
    }

    #[test]
    fn test_render_sizes_marks_unavailable() {
        let snapshot = Snapshot {
            consumption_points: Some(Vec::new()),
            bills: None,
            electricity_readings: Some(Vec::new()),
            gas_readings: None,
        };
        let out = render_sizes(&snapshot);
        assert!(out.contains("Consumption points:   0"));
        assert!(out.contains("Bills:                unavailable"));
    }

    #[test]
    fn test_report_labels_points_by_address() {
        let snapshot = Snapshot {
            consumption_points: Some(vec![
                ConsumptionPoint {
                    id: Some("1001".into()),
                    address: Some("  Str. Lunga 5 ".into()),
                    has_electricity_contract: true,
                    ..Default::default()
                },
                ConsumptionPoint::default(),
            ]),
            ..Default::default()
        };

        let report = MetricsReport::from_snapshot(&snapshot, Vec::new());

        assert_eq!(report.points.len(), 1);
        assert_eq!(report.points[0].address, "Str. Lunga 5");
        assert_eq!(report.contracts[0].count(), 1);
        assert_eq!(report.contracts[1].count(), 0);
    }

    #[test]
    fn test_render_report() {
        let report = MetricsReport {
            points: vec![PointLabel {
                id: "1001".into(),
                address: "Str. Lunga 5".into(),
            }],
            contracts: vec![ContractSummary {
                kind: ContractKind::Electricity,
                holders: vec![ContractHolder {
                    point_id: Some("1001".into()),
                    customer_name: Some("Ion Popescu".into()),
                    consumption_address: Some("Str. Lalelelor 3".into()),
                    pod_code: None,
                    distributor_code: None,
                    customer_type: None,
                }],
            }],
            metrics: vec![YearlyMetric {
                key: MetricKey::new("1001", MetricKind::BillCount(ContractKind::Electricity), 2024),
                count: 1,
                items: vec![LineItem {
                    month: "ianuarie 2024".into(),
                    value: ItemValue::Amount(120.5),
                }],
            }],
        };

        let out = render_report(&report);

        assert!(out.contains("Contracts EE: 1"));
        assert!(out.contains("1001 | Ion Popescu | Str. Lalelelor 3"));
        assert!(out.contains("Str. Lunga 5 (1001)"));
        assert!(out.contains("Arhivă facturi - 2024 [arhiva_facturi_electricitate_1001_2024]: 1"));
        assert!(out.contains("ianuarie 2024: 120.50 lei"));
    }
}
