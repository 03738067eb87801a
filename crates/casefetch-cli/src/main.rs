//! `casefetch` — fetch district-court case status through the official
//! lookup portal, behind a local human check.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use casefetch_client::{CaseQueryClient, PortalConfig};
use casefetch_core::{CaseQuery, ChallengeGate, RecordExtractor, RetrievalOutcome};
use casefetch_pipeline::RetrievalPipeline;
use casefetch_store::SqliteStore;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "casefetch", version, about = "Court case-status fetcher")]
struct Cli {
    /// SQLite database path (created if absent).
    #[arg(long, env = "CASEFETCH_DB", default_value = "casefetch.db", global = true)]
    db: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Look up one case. Asks a small arithmetic question first.
    Fetch {
        #[arg(long)]
        court_id: String,
        #[arg(long)]
        case_type: String,
        #[arg(long)]
        case_number: String,
        #[arg(long)]
        year: i32,
        /// Print the outcome as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Show a stored case record.
    Record { id: i64 },
    /// Show a stored audit artifact.
    Audit { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("casefetch v{}", env!("CARGO_PKG_VERSION"));
    let cli = Cli::parse();
    let store = SqliteStore::open_persistent(&cli.db)?;

    match cli.command {
        Command::Fetch {
            court_id,
            case_type,
            case_number,
            year,
            json,
        } => {
            let query = CaseQuery::new(&court_id, &case_type, &case_number, year)?;

            let gate = Arc::new(ChallengeGate::new());
            let prompt = gate.issue();
            println!("Human check: what is {}?", prompt.question());
            let answer = read_answer()?;

            let config = PortalConfig::default();
            let extractor = RecordExtractor::with_base_url(config.origin());
            let client = CaseQueryClient::new(config)?;
            let pipeline = RetrievalPipeline::new(Arc::clone(&gate), client, store)
                .with_extractor(extractor);

            let outcome = pipeline.run(prompt.id, answer, &query).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Command::Record { id } => {
            let stored = store.get_record(id)?;
            println!("record {} (saved {})", stored.id, stored.saved_at);
            let r = &stored.record;
            println!("  title         {}", r.case_title);
            println!("  petitioner    {}", r.petitioner);
            println!("  respondent    {}", r.respondent);
            println!("  filed         {}", r.filing_date);
            println!("  next hearing  {}", r.next_hearing_date);
            println!("  status        {}", r.case_status);
            for link in &r.order_links {
                println!("  order         {} ({})", link.url, link.label);
            }
        }
        Command::Audit { id } => {
            let artifact = store.get_audit(id)?;
            println!("audit {} ({}): {}", artifact.id, artifact.created_at, artifact.reason);
            match artifact.raw_body {
                Some(body) => println!("{body}"),
                None => println!("(no body captured)"),
            }
        }
    }
    Ok(())
}

fn read_answer() -> anyhow::Result<i64> {
    print!("> ");
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    line.trim()
        .parse::<i64>()
        .context("answer must be a number")
}

fn print_outcome(outcome: &RetrievalOutcome) {
    match outcome {
        RetrievalOutcome::Success { record_id, record } => {
            println!("case found (record {record_id})");
            println!("  title         {}", record.case_title);
            println!("  status        {}", record.case_status);
            println!("  next hearing  {}", record.next_hearing_date);
            for link in &record.order_links {
                println!("  order         {}", link.url);
            }
        }
        RetrievalOutcome::NotAuthorized { reason } => {
            println!("challenge failed ({reason}); run again to get a new one");
        }
        RetrievalOutcome::BlockedByPortalCaptcha { audit_ref } => {
            println!("the court portal is asking for its own CAPTCHA; we never solve or bypass it");
            println!("please use the official portal directly for this lookup");
            if let Some(id) = audit_ref {
                println!("raw response saved as audit {id}");
            }
        }
        RetrievalOutcome::ExtractionFailed { reason, audit_ref } => {
            println!("could not read the portal's response ({reason})");
            if let Some(id) = audit_ref {
                println!("raw response saved as audit {id} for maintenance");
            }
        }
        RetrievalOutcome::TransportFailed { reason, .. } => {
            println!("could not reach the portal ({reason}); try again later");
        }
    }
}
