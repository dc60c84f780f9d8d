//! Fundtrail CLI - Main entry point

use clap::{Parser, Subcommand};
use fundtrail_ledger::HoldBucket;
use fundtrail_requests::{NewRequest, Priority, RequestState};
use fundtrail_rpc::{commands, AppConfig, AppContext, CommandError};
use rust_decimal::Decimal;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fundtrail")]
#[command(about = "Fundtrail - budget requests and vendor wallet ledger", long_about = None)]
struct Cli {
    /// Data directory path
    #[arg(short, long, default_value = "./data")]
    data: PathBuf,

    /// JSON config file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a vendor wallet
    Onboard {
        /// Vendor ID
        vendor: String,
        /// Display name
        name: String,
    },

    /// Submit a budget request
    Submit {
        /// Requested amount
        amount: Decimal,
        #[arg(long)]
        department: String,
        #[arg(long)]
        project: String,
        #[arg(long)]
        category: String,
        /// low, medium, high or urgent
        #[arg(long, default_value = "medium")]
        priority: Priority,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        requester: String,
    },

    /// Approve a pending request
    Approve {
        request: String,
        #[arg(long)]
        approver: String,
    },

    /// Reject a pending request
    Reject {
        request: String,
        #[arg(long)]
        approver: String,
        #[arg(long)]
        reason: String,
    },

    /// Allocate funds for an approved request
    Allocate {
        request: String,
        /// Vendor receiving the allocation
        vendor: String,
        amount: Decimal,
    },

    /// Mark an allocated request as in progress
    Start { request: String },

    /// Complete a request and release its allocation
    Complete {
        request: String,
        #[arg(long)]
        actor: String,
    },

    /// Withdraw from a vendor's available balance
    Withdraw {
        vendor: String,
        amount: Decimal,
        #[arg(long)]
        actor: String,
    },

    /// Place a compliance hold
    Freeze {
        vendor: String,
        amount: Decimal,
        /// Bucket to hold from: available or pending
        #[arg(long, default_value = "available")]
        from: HoldBucket,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        actor: String,
    },

    /// Lift a compliance hold
    Unfreeze {
        vendor: String,
        amount: Decimal,
        /// Bucket to return funds to: available or pending
        #[arg(long, default_value = "available")]
        to: HoldBucket,
        #[arg(long)]
        actor: String,
    },

    /// Verify one ledger record
    Verify { record: String },

    /// Verify every ledger record
    Audit,

    /// Show wallet balances
    Wallet {
        /// Single vendor (all vendors when omitted)
        vendor: Option<String>,
    },

    /// List budget requests
    Requests {
        /// Filter by state
        #[arg(long)]
        state: Option<RequestState>,
    },
}

async fn run(ctx: &AppContext, command: Commands) -> Result<(), CommandError> {
    match command {
        Commands::Onboard { vendor, name } => {
            commands::onboard_vendor(ctx, &vendor, &name).await?;
        }

        Commands::Submit {
            amount,
            department,
            project,
            category,
            priority,
            description,
            requester,
        } => {
            let input = NewRequest {
                amount,
                department,
                project,
                category,
                priority,
                description,
                requester,
            };
            commands::submit_request(ctx, input).await?;
        }

        Commands::Approve { request, approver } => {
            commands::approve_request(ctx, &request, &approver).await?;
        }

        Commands::Reject {
            request,
            approver,
            reason,
        } => {
            commands::reject_request(ctx, &request, &approver, &reason).await?;
        }

        Commands::Allocate {
            request,
            vendor,
            amount,
        } => {
            commands::allocate_funds(ctx, &request, &vendor, amount).await?;
        }

        Commands::Start { request } => {
            commands::start_request(ctx, &request).await?;
        }

        Commands::Complete { request, actor } => {
            commands::complete_request(ctx, &request, &actor).await?;
        }

        Commands::Withdraw {
            vendor,
            amount,
            actor,
        } => {
            commands::withdraw(ctx, &vendor, amount, &actor).await?;
        }

        Commands::Freeze {
            vendor,
            amount,
            from,
            reason,
            actor,
        } => {
            commands::freeze(ctx, &vendor, amount, from, &reason, &actor).await?;
        }

        Commands::Unfreeze {
            vendor,
            amount,
            to,
            actor,
        } => {
            commands::unfreeze(ctx, &vendor, amount, to, &actor).await?;
        }

        Commands::Verify { record } => {
            commands::verify_record(ctx, &record).await?;
        }

        Commands::Audit => {
            commands::audit(ctx).await?;
        }

        Commands::Wallet { vendor } => {
            commands::wallet(ctx, vendor.as_deref()).await?;
        }

        Commands::Requests { state } => {
            commands::requests(ctx, state)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::default(),
    }
    .with_env()?;

    // Create application context
    let ctx = AppContext::new(&cli.data, config)?;

    if let Err(err) = run(&ctx, cli.command).await {
        if err.is_fatal() {
            tracing::error!(error = %err, "Internal error");
            anyhow::bail!("internal error: {err}");
        }
        eprintln!("❌ {err}");
        std::process::exit(1);
    }

    Ok(())
}
