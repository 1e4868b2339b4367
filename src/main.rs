use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod adapter;
mod cache;
mod config;
mod controller;
mod error;
mod export;
mod filter;
mod finance;
mod import;
mod models;
mod remote;
mod report;
mod settings;
mod store;
#[cfg(test)]
mod test_support;

use cache::{DurableCache, KeyValueStore};
use config::Config;
use controller::ProspectController;
use filter::ProspectFilter;
use models::{Prospect, ProspectDraft, ProspectPatch, ProspectStatus, ProspectType};
use remote::PgStore;
use settings::{SettingsController, SettingsStore};
use store::RecordStore;

#[derive(Parser)]
#[command(name = "simpler-crm")]
#[command(about = "Prospect pipeline and client financials tracker", long_about = None)]
struct Cli {
    /// Directory for the local cache (overrides CRM_DATA_DIR)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the remote database schema
    InitDb,
    #[command(flatten)]
    Prospects(ProspectCommand),
}

#[derive(Subcommand)]
enum ProspectCommand {
    /// Add a new prospect
    Add {
        #[arg(long)]
        company: String,
        #[command(flatten)]
        fields: ProspectArgs,
    },
    /// Edit fields of an existing prospect
    Edit {
        id: String,
        #[arg(long)]
        company: Option<String>,
        #[command(flatten)]
        fields: ProspectArgs,
        /// Remove the integration start date
        #[arg(long, conflicts_with = "start_date")]
        clear_start_date: bool,
    },
    /// Move a prospect to another pipeline stage
    Status { id: String, status: ProspectStatus },
    /// Record a new monthly cost for a prospect
    Cost { id: String, amount: f64 },
    /// Record a new monthly fee for a prospect
    Fee { id: String, amount: f64 },
    /// Delete a prospect
    Delete { id: String },
    /// Show one prospect as JSON
    Show { id: String },
    /// List prospects
    List {
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        status: Option<ProspectStatus>,
        #[arg(long = "type")]
        kind: Option<ProspectType>,
        #[arg(long)]
        country: Option<String>,
    },
    /// Print the financial summary
    Summary,
    /// Generate a markdown financial report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write every prospect to a dated JSON file
    Export {
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Import prospects from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show or change global settings
    Settings {
        #[arg(long)]
        profit_share: Option<f64>,
    },
}

#[derive(Args)]
struct ProspectArgs {
    #[arg(long)]
    contact: Option<String>,
    #[arg(long)]
    email: Option<String>,
    #[arg(long)]
    phone: Option<String>,
    #[arg(long = "type")]
    kind: Option<ProspectType>,
    #[arg(long)]
    country: Option<String>,
    #[arg(long)]
    monthly_fee: Option<f64>,
    #[arg(long)]
    integration_fee: Option<f64>,
    #[arg(long)]
    monthly_cost: Option<f64>,
    #[arg(long)]
    logo_url: Option<String>,
    #[arg(long)]
    notes: Option<String>,
    #[arg(long)]
    start_date: Option<NaiveDate>,
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=31))]
    payment_day: Option<u8>,
    #[arg(long)]
    payment_delayed: Option<bool>,
    #[arg(long)]
    delay_notes: Option<String>,
}

impl ProspectArgs {
    fn into_patch(self, company: Option<String>, clear_start_date: bool) -> ProspectPatch {
        ProspectPatch {
            company_name: company,
            contact_name: self.contact,
            email: self.email,
            phone: self.phone,
            kind: self.kind,
            country: self.country,
            monthly_fee: self.monthly_fee,
            integration_fee: self.integration_fee,
            monthly_cost: self.monthly_cost,
            logo_url: self.logo_url,
            notes: self.notes,
            integration_start_date: if clear_start_date {
                Some(None)
            } else {
                self.start_date.map(Some)
            },
            payment_day_of_month: self.payment_day,
            payment_delayed: self.payment_delayed,
            payment_delay_notes: self.delay_notes,
            ..ProspectPatch::default()
        }
    }

    fn into_draft(self, company: String) -> ProspectDraft {
        let defaults = ProspectDraft::default();
        ProspectDraft {
            company_name: company,
            contact_name: self.contact.unwrap_or_default(),
            email: self.email.unwrap_or_default(),
            phone: self.phone.unwrap_or_default(),
            kind: self.kind.unwrap_or(defaults.kind),
            country: self.country.unwrap_or(defaults.country),
            monthly_fee: self.monthly_fee.unwrap_or_default(),
            integration_fee: self.integration_fee.unwrap_or_default(),
            monthly_cost: self.monthly_cost.unwrap_or_default(),
            logo_url: self.logo_url.unwrap_or_default(),
            notes: self.notes.unwrap_or_default(),
            integration_start_date: self.start_date,
            payment_day_of_month: self.payment_day.unwrap_or(defaults.payment_day_of_month),
            payment_delayed: self.payment_delayed.unwrap_or_default(),
            payment_delay_notes: self.delay_notes.unwrap_or_default(),
            ..defaults
        }
    }
}

fn check_country(country: Option<&str>) -> anyhow::Result<()> {
    if let Some(code) = country {
        if !models::is_known_country(code) {
            let known: Vec<&str> = models::COUNTRIES.iter().map(|(code, _)| *code).collect();
            bail!("unknown country '{}', expected one of {}", code, known.join(", "));
        }
    }
    Ok(())
}

fn print_prospect(prospect: &Prospect) {
    println!(
        "- {} [{}] {} ({}, {}) fee {:.2}/mo, cost {:.2}/mo",
        prospect.id,
        prospect.status,
        prospect.company_name,
        prospect.kind,
        prospect.country,
        prospect.monthly_fee,
        prospect.monthly_cost
    );
}

fn print_outcome(outcome: Option<Prospect>, id: &str) {
    match outcome {
        Some(prospect) => print_prospect(&prospect),
        None => println!("No prospect with id {id}."),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "simpler_crm=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?.with_data_dir(cli.data_dir.as_deref());

    let pg = match &config.remote {
        Some(remote) => Some(Arc::new(
            PgStore::connect_lazy(remote).context("invalid remote store configuration")?,
        )),
        None => None,
    };

    let command = match cli.command {
        Commands::InitDb => {
            let Some(pg) = pg else {
                bail!("CRM_REMOTE_URL and CRM_REMOTE_KEY must be set to initialise the remote store");
            };
            pg.init_schema().await.context("failed to run migrations")?;
            println!("Schema ready.");
            return Ok(());
        }
        Commands::Prospects(command) => command,
    };

    let storage = KeyValueStore::new(&config.data_dir);
    let record_remote = pg.clone().map(|pg| pg as Arc<dyn RecordStore>);
    let settings_remote = pg.map(|pg| pg as Arc<dyn SettingsStore>);

    let mut settings = SettingsController::load(storage.clone(), settings_remote).await;
    let mut prospects = ProspectController::new(DurableCache::new(storage), record_remote);
    prospects.load().await;

    run(command, prospects, &mut settings).await
}

/// Runs `command`, then lets queued remote writes finish whether or not it failed.
async fn run(
    command: ProspectCommand,
    mut prospects: ProspectController,
    settings: &mut SettingsController,
) -> anyhow::Result<()> {
    let result = dispatch(command, &mut prospects, settings).await;
    prospects.shutdown().await;
    result
}

async fn dispatch(
    command: ProspectCommand,
    prospects: &mut ProspectController,
    settings: &mut SettingsController,
) -> anyhow::Result<()> {
    match command {
        ProspectCommand::Add { company, fields } => {
            check_country(fields.country.as_deref())?;
            let created = prospects.create(fields.into_draft(company))?;
            println!("Created prospect {}.", created.id);
        }
        ProspectCommand::Edit {
            id,
            company,
            fields,
            clear_start_date,
        } => {
            check_country(fields.country.as_deref())?;
            let patch = fields.into_patch(company, clear_start_date);
            if patch.is_empty() {
                println!("Nothing to change.");
            } else {
                print_outcome(prospects.update(&id, &patch)?, &id);
            }
        }
        ProspectCommand::Status { id, status } => {
            print_outcome(prospects.update_status(&id, status)?, &id);
        }
        ProspectCommand::Cost { id, amount } => {
            print_outcome(prospects.change_cost(&id, amount)?, &id);
        }
        ProspectCommand::Fee { id, amount } => {
            print_outcome(prospects.change_fee(&id, amount)?, &id);
        }
        ProspectCommand::Delete { id } => {
            if prospects.delete(&id)? {
                println!("Deleted prospect {id}.");
            } else {
                println!("No prospect with id {id}.");
            }
        }
        ProspectCommand::Show { id } => match prospects.find_by_id(&id) {
            Some(prospect) => println!("{}", serde_json::to_string_pretty(prospect)?),
            None => println!("No prospect with id {id}."),
        },
        ProspectCommand::List {
            search,
            status,
            kind,
            country,
        } => {
            let filter = ProspectFilter {
                query: search,
                status,
                kind,
                country,
            };
            let matched = filter.apply(prospects.records());
            if matched.is_empty() {
                if prospects.records().is_empty() {
                    println!("No prospects yet.");
                } else {
                    println!("No prospects match the filters.");
                }
            } else {
                for prospect in matched {
                    print_prospect(prospect);
                }
                let countries = filter::countries_in_use(prospects.records());
                println!("Countries in use: {}", countries.join(", "));
            }
        }
        ProspectCommand::Summary => {
            let summary = finance::summarize(
                prospects.records(),
                settings.current().profit_share_percent,
                Utc::now(),
            );
            println!(
                "{} prospects ({} active, {} won)",
                summary.total_count, summary.active_count, summary.won_count
            );
            println!("MRR {:.2} | ARR {:.2}", summary.mrr, summary.arr);
            println!(
                "Pipeline MRR {:.2} | Pipeline ARR {:.2} + {:.2} integration",
                summary.pipeline_mrr, summary.pipeline_arr, summary.pipeline_integration
            );
            println!(
                "Collected {:.2} | Costs {:.2} | Net profit {:.2} | Share {:.2}",
                summary.total_collected,
                summary.total_costs,
                summary.net_profit,
                summary.profit_share
            );
            println!("Delayed payments: {}", summary.delayed_payments);
        }
        ProspectCommand::Report { out } => {
            let report = report::build_report(prospects.records(), settings.current(), Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        ProspectCommand::Export { out_dir } => {
            let (file_name, body) =
                export::export_document(prospects.records(), Utc::now().date_naive())?;
            let path = out_dir.join(file_name);
            std::fs::write(&path, body)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Exported {} prospects to {}.", prospects.records().len(), path.display());
        }
        ProspectCommand::Import { csv } => {
            let inserted = import::import_csv(prospects, &csv)?;
            println!("Imported {inserted} prospects from {}.", csv.display());
        }
        ProspectCommand::Settings { profit_share } => {
            if let Some(percent) = profit_share {
                settings.set_profit_share(percent).await?;
            }
            println!(
                "Profit share: {:.1}%",
                settings.current().profit_share_percent
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MemoryStore;

    #[tokio::test]
    async fn queued_remote_writes_finish_when_a_command_fails() {
        let dir = tempfile::tempdir().unwrap();
        let storage = KeyValueStore::new(dir.path());
        let remote = Arc::new(MemoryStore::default());
        let record_remote: Arc<dyn RecordStore> = remote.clone();

        let mut settings = SettingsController::load(storage.clone(), None).await;
        let mut prospects = ProspectController::new(DurableCache::new(storage), Some(record_remote));
        prospects.load().await;
        prospects
            .create(ProspectDraft {
                company_name: "Batumi Port".to_string(),
                ..ProspectDraft::default()
            })
            .unwrap();

        let command = ProspectCommand::Import {
            csv: dir.path().join("missing.csv"),
        };
        assert!(run(command, prospects, &mut settings).await.is_err());
        assert_eq!(remote.snapshot().len(), 1);
    }
}
