use clap::{Args, Parser, Subcommand};

use adsyncdw::{
    AdSyncDW, AppConfig, DateRange, EnrichmentScope, HierarchyFilter, InsightQuery, Period,
    PeriodTotals, SyncCursor, SyncOptions, SyncReport, SyncTarget,
};

#[derive(Parser)]
#[command(name = "adsyncdw", about = "Ad platform and lead tracker warehouse")]
struct Cli {
    /// Database path (default: $ADSYNC_DB_PATH or ~/.adsyncdw/adsyncdw.db)
    #[arg(long)]
    db: Option<String>,

    /// Increase logging verbosity
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Page size for upstream requests (overrides SYNC_PAGE_SIZE)
    #[arg(long)]
    page_size: Option<u32>,

    /// Time budget per sync run in milliseconds (overrides SYNC_BUDGET_MS)
    #[arg(long)]
    budget_ms: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Progress reporter that writes to stderr.
struct StderrProgress;

impl adsyncdw::SyncProgress for StderrProgress {
    fn on_parents_resolved(&self, entity: &str, count: usize) {
        eprintln!("Syncing {entity}: {count} parents");
    }

    fn on_parent_done(&self, _entity: &str, parent_id: &str, index: usize, total: usize) {
        if index == total {
            eprint!("\r  {index}/{total} ({parent_id})          \n");
        } else {
            eprint!("\r  {index}/{total} ({parent_id})          ");
        }
    }

    fn on_budget_exhausted(&self, entity: &str, resume_from: &str) {
        eprintln!("\n  Time budget spent for {entity}; resume from {resume_from}");
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the sync and metrics HTTP endpoints
    Serve {
        /// Listen address (overrides ADSYNC_BIND_ADDR)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Sync one entity type into the local warehouse
    Sync {
        #[command(subcommand)]
        target: SyncCommand,
    },
    /// Dashboard KPIs for a period, compared with the previous one
    Metrics {
        #[command(flatten)]
        range: RangeArgs,
        #[command(flatten)]
        filter: FilterArgs,
        /// Print the daily series as well
        #[arg(long)]
        daily: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print stored insight rows
    Query {
        #[command(flatten)]
        range: RangeArgs,
        /// Restrict to these campaigns
        #[arg(long, value_delimiter = ',')]
        campaign: Vec<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// Output as CSV instead of JSON
        #[arg(long)]
        csv: bool,
    },
    /// Manage customers and their campaigns
    Customer {
        #[command(subcommand)]
        action: CustomerAction,
    },
    /// Show warehouse status
    Status,
}

#[derive(Args, Clone, Default)]
struct SyncArgs {
    /// Only sync under parents whose status is ACTIVE
    #[arg(long)]
    active: bool,
    /// Restrict to these ad accounts (`act_` prefix optional)
    #[arg(long = "account", value_delimiter = ',')]
    accounts: Vec<String>,
    /// Restrict lead sync to these customers' lead campaigns
    #[arg(long = "customer", value_delimiter = ',')]
    customers: Vec<String>,
    /// Correlates runs; a partial run under the same id is continued
    #[arg(long)]
    job_id: Option<String>,
    /// Parent id to resume from
    #[arg(long)]
    resume_from: Option<String>,
    /// Child id to resume from (insights: the ad)
    #[arg(long, requires = "resume_from")]
    resume_child: Option<String>,
    /// First date chunk of the child to fetch (insights, YYYY-MM-DD)
    #[arg(long, requires = "resume_child")]
    resume_date: Option<String>,
    /// Output the report as JSON
    #[arg(long)]
    json: bool,
}

impl SyncArgs {
    fn options(&self) -> anyhow::Result<SyncOptions> {
        let account_ids = self
            .accounts
            .iter()
            .map(|a| adsyncdw::ids::normalize_account_id(a))
            .collect::<Result<Vec<_>, _>>()?;
        let chunk_from = self
            .resume_date
            .as_deref()
            .map(|d| adsyncdw::date_util::parse_ymd(d, "--resume-date"))
            .transpose()?;
        Ok(SyncOptions {
            job_id: self.job_id.clone().unwrap_or_default(),
            active_only: self.active,
            account_ids,
            customer_ids: self.customers.clone(),
            resume: self.resume_from.as_ref().map(|parent_id| SyncCursor {
                parent_id: parent_id.clone(),
                child_id: self.resume_child.clone(),
                chunk_from,
            }),
        })
    }
}

#[derive(Args, Clone, Default)]
struct RangeArgs {
    /// Period (e.g. 7d, 30d, mtd, last-month, 2024-03, 2024-01-01..2024-01-31)
    #[arg(long, default_value = "30d", conflicts_with_all = ["start", "end"])]
    period: String,
    /// Start date (YYYY-MM-DD), together with --end
    #[arg(long, requires = "end")]
    start: Option<String>,
    /// End date (YYYY-MM-DD), together with --start
    #[arg(long, requires = "start")]
    end: Option<String>,
}

impl RangeArgs {
    fn range(&self) -> anyhow::Result<DateRange> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => Ok(DateRange::parse(start, end)?),
            _ => Ok(Period::parse(&self.period)?.date_range()?),
        }
    }
}

#[derive(Args, Clone, Default)]
struct FilterArgs {
    #[arg(long)]
    customer: Option<String>,
    #[arg(long, value_delimiter = ',')]
    campaign: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    adset: Vec<String>,
    #[arg(long, value_delimiter = ',')]
    ad: Vec<String>,
}

impl From<FilterArgs> for HierarchyFilter {
    fn from(args: FilterArgs) -> Self {
        HierarchyFilter {
            customer_id: args.customer,
            campaign_ids: args.campaign,
            adset_ids: args.adset,
            ad_ids: args.ad,
        }
    }
}

#[derive(Subcommand)]
enum SyncCommand {
    /// Ad accounts visible to the access token
    Accounts {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Campaigns of each ad account
    Campaigns {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Ad sets of each campaign
    AdSets {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Ads of each ad set
    Ads {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Creatives of each ad account
    Creatives {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Daily insights per ad
    Insights {
        /// Start date (YYYY-MM-DD)
        #[arg(long)]
        start: String,
        /// End date (YYYY-MM-DD)
        #[arg(long)]
        end: String,
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Fill missing creative image URLs from their image hashes
    CreativeImages {
        /// Only creatives with these ids
        #[arg(long = "creative", value_delimiter = ',')]
        creatives: Vec<String>,
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Campaigns of the lead tracker
    LeadCampaigns {
        #[command(flatten)]
        args: SyncArgs,
    },
    /// Lead records of each lead campaign
    Leads {
        #[command(flatten)]
        args: SyncArgs,
    },
}

impl SyncCommand {
    fn into_target(self) -> anyhow::Result<(SyncTarget, SyncArgs)> {
        let entity = |name: &str, args: SyncArgs| -> anyhow::Result<(SyncTarget, SyncArgs)> {
            Ok((SyncTarget::Entity(name.to_string()), args))
        };
        match self {
            SyncCommand::Accounts { args } => entity("ad-accounts", args),
            SyncCommand::Campaigns { args } => entity("campaigns", args),
            SyncCommand::AdSets { args } => entity("ad-sets", args),
            SyncCommand::Ads { args } => entity("ads", args),
            SyncCommand::Creatives { args } => entity("creatives", args),
            SyncCommand::LeadCampaigns { args } => entity("lead-campaigns", args),
            SyncCommand::Leads { args } => entity("leads", args),
            SyncCommand::Insights { start, end, args } => {
                Ok((SyncTarget::Insights(DateRange::parse(&start, &end)?), args))
            }
            SyncCommand::CreativeImages { creatives, args } => {
                let account_id = match args.accounts.as_slice() {
                    [] => None,
                    [one] => Some(adsyncdw::ids::normalize_account_id(one)?),
                    _ => anyhow::bail!("creative-images takes at most one --account"),
                };
                let scope = EnrichmentScope {
                    account_id,
                    creative_ids: creatives,
                };
                Ok((SyncTarget::CreativeImages(scope), args))
            }
        }
    }
}

#[derive(Subcommand)]
enum CustomerAction {
    /// Create or rename a customer
    Add { id: String, name: String },
    /// Make a customer the owner of a campaign
    Assign { campaign_id: String, customer_id: String },
    /// Clear a campaign's owner
    Unassign { campaign_id: String },
    /// Map a lead-tracker campaign to a customer
    MapLeads {
        customer_id: String,
        lead_campaign_id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let mut config = AppConfig::from_env()?;
    if let Some(ps) = cli.page_size {
        config.page_size = ps;
    }
    if let Some(ms) = cli.budget_ms {
        config.budget_ms = ms;
    }
    log::debug!("Configuration: {config:?}");

    let db_path = cli.db.map(std::path::PathBuf::from).or_else(|| config.db_path.clone());
    let db = match db_path {
        Some(path) => adsyncdw::Database::open_at(path).await?,
        None => adsyncdw::Database::open().await?,
    };
    let dw = AdSyncDW::new(db, config);

    match cli.command {
        Commands::Serve { bind } => {
            let addr = bind.unwrap_or_else(|| dw.config().bind_addr.clone());
            adsyncdw::server::serve(dw, &addr).await?;
        }
        Commands::Sync { target } => {
            let (target, args) = target.into_target()?;
            let report = dw.sync(&target, args.options()?, &StderrProgress).await?;
            print_report(&report, args.json)?;
        }
        Commands::Metrics {
            range,
            filter,
            daily,
            json,
        } => {
            let overview = dw.overview(range.range()?, &filter.into()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                println!("Overview {} (previous {})", overview.range, overview.previous_range);
                print_totals("Current", &overview.current);
                print_totals("Previous", &overview.previous);
                print_change("Clicks", overview.change.clicks);
                print_change("Impressions", overview.change.impressions);
                print_change("Spend", overview.change.spend);
                print_change("Conversions", overview.change.conversions);
                if daily {
                    println!("  Daily:");
                    for point in &overview.daily {
                        println!(
                            "    {}  impr {:>8}  clicks {:>6}  spend {:>10.2}",
                            point.date, point.totals.impressions, point.totals.clicks, point.totals.spend
                        );
                    }
                }
            }
        }
        Commands::Query {
            range,
            campaign,
            limit,
            csv,
        } => {
            let mut query = InsightQuery::new().range(range.range()?).campaigns(campaign);
            if let Some(n) = limit {
                query = query.limit(n);
            }
            if csv {
                print!("{}", query.to_csv(dw.db()).await?);
            } else {
                println!("{}", serde_json::to_string_pretty(&query.rows(dw.db()).await?)?);
            }
        }
        Commands::Customer { action } => handle_customer(&dw, action).await?,
        Commands::Status => print_status(&dw).await?,
    }

    Ok(())
}

fn print_report(report: &SyncReport, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    println!(
        "{} ({}): {}, {} seen, {} written, {} errors, {} ms",
        report.entity,
        report.job_id,
        report.status.as_str(),
        report.total_count,
        report.processed,
        report.errors.len(),
        report.elapsed_ms
    );
    for error in &report.errors {
        println!("  {}: {}", error.id, error.error);
    }
    if let Some(timeout) = &report.timeout {
        println!(
            "  Stopped on time budget: {} remaining. Continue with --job-id {} or --resume-from {}{}{}",
            timeout.units_remaining,
            report.job_id,
            timeout.resume_from,
            timeout
                .resume_child
                .as_ref()
                .map(|c| format!(" --resume-child {c}"))
                .unwrap_or_default(),
            timeout
                .resume_chunk_from
                .map(|d| format!(" --resume-date {d}"))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn print_totals(label: &str, totals: &PeriodTotals) {
    println!("  {label}:");
    println!("    Impressions: {}", totals.impressions);
    println!("    Clicks:      {}", totals.clicks);
    println!("    Spend:       {:.2}", totals.spend);
    println!("    Reach:       {}", totals.reach);
    println!("    Conversions: {:.1}", totals.conversions);
    println!("    CTR:         {:.2}", totals.ctr);
    println!("    CPM:         {:.2}", totals.cpm);
    println!("    CPC:         {:.2}", totals.cpc);
    println!("    Frequency:   {:.2}", totals.frequency);
}

fn print_change(label: &str, change: Option<f64>) {
    match change {
        Some(pct) => println!("  {label} change: {pct:+.1}%"),
        None => println!("  {label} change: n/a"),
    }
}

async fn handle_customer(dw: &AdSyncDW, action: CustomerAction) -> anyhow::Result<()> {
    match action {
        CustomerAction::Add { id, name } => {
            dw.add_customer(&id, &name).await?;
            println!("Saved customer {id}");
        }
        CustomerAction::Assign {
            campaign_id,
            customer_id,
        } => {
            if dw.assign_campaign(&campaign_id, Some(&customer_id)).await? {
                println!("Campaign {campaign_id} now belongs to {customer_id}");
            } else {
                anyhow::bail!("campaign {campaign_id} has not been synced");
            }
        }
        CustomerAction::Unassign { campaign_id } => {
            if dw.assign_campaign(&campaign_id, None).await? {
                println!("Campaign {campaign_id} has no customer");
            } else {
                anyhow::bail!("campaign {campaign_id} has not been synced");
            }
        }
        CustomerAction::MapLeads {
            customer_id,
            lead_campaign_id,
        } => {
            dw.map_lead_campaign(&customer_id, &lead_campaign_id).await?;
            println!("Lead campaign {lead_campaign_id} mapped to {customer_id}");
        }
    }
    Ok(())
}

async fn print_status(dw: &AdSyncDW) -> anyhow::Result<()> {
    let status = dw.status().await?;
    println!("Warehouse Status");
    for (table, count) in &status.tables {
        println!("  {table:<16} {count}");
    }
    if status.runs.is_empty() {
        println!("  No sync runs yet");
        return Ok(());
    }
    println!("Latest runs");
    for run in &status.runs {
        println!(
            "  {:<16} {:<10} {} written, {} failed, started {} ({})",
            run.entity,
            run.status,
            run.processed,
            run.failed,
            run.started_at,
            run.job_id
        );
    }
    Ok(())
}
