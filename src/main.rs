//! Floorgrid CLI
//!
//! Admin surface for the floor grid allocation engine. Every mutating command
//! runs as one database transaction and records who did it in the audit trail.
//!
//! ## Usage
//!
//! ```bash
//! # Create the database and seed the configured floor layout
//! floorgrid init
//!
//! # Occupancy and counter overview, or one rectangle in detail
//! floorgrid status
//! floorgrid status --rectangle B
//!
//! # Manual cell surgery (flags the counters for reconciliation)
//! floorgrid --user-id 7 allocate B0505-0010 --donor "Jane Doe" --amount 100 --pledge-id 77
//! floorgrid --user-id 7 unallocate B0505-0010
//!
//! # Donation workflow corrections
//! floorgrid --user-id 7 undo-pledge 77
//! floorgrid --user-id 7 edit-amount pledge 77 150.0
//!
//! # Rebuild the counters from the donation tables
//! floorgrid reconcile
//!
//! # Audit trail, newest first, or one entity's full history
//! floorgrid audit --limit 50
//! floorgrid audit --entity-type grid_cell --entity-id B0505-0010
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use floorgrid::db::cells::CellQuery;
use floorgrid::db::models::cell_status;
use floorgrid::db::{audit, cells, counters};
use floorgrid::engine::{DonationKind, Engine};
use floorgrid::{AdminContext, AllocateCellInput, Config, GridDb, GridError};

#[derive(Parser)]
#[command(name = "floorgrid")]
#[command(about = "Floor grid allocation engine for donation campaigns")]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Data directory (overrides config file)
    #[arg(long, env = "FLOORGRID_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Admin user id recorded in the audit trail
    #[arg(long, env = "FLOORGRID_USER_ID", default_value = "0")]
    user_id: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Create the database and seed the configured floor layout
    Init,

    /// Show grid occupancy and counter totals
    Status {
        /// List cells of this rectangle
        #[arg(short, long)]
        rectangle: Option<String>,

        /// Cell status filter for the listing (default: any occupied)
        #[arg(short, long)]
        status: Option<String>,

        /// Maximum cells to list
        #[arg(long, default_value = "200")]
        limit: i64,
    },

    /// Allocate one available atomic cell to a donation
    Allocate {
        /// Cell id, e.g. B0505-0010
        cell_id: String,

        /// Donor display name
        #[arg(long)]
        donor: String,

        /// Donation amount shown on the cell
        #[arg(long)]
        amount: f64,

        /// Cell status to set (pledged, paid or blocked)
        #[arg(long, default_value = "pledged")]
        status: String,

        /// Backing pledge id (exactly one of --pledge-id/--payment-id)
        #[arg(long)]
        pledge_id: Option<i64>,

        /// Backing payment id
        #[arg(long)]
        payment_id: Option<i64>,
    },

    /// Free one allocated cell
    Unallocate {
        /// Cell id, e.g. B0505-0010
        cell_id: String,
    },

    /// Revert an approved pledge to pending and free its cells
    UndoPledge {
        pledge_id: i64,
    },

    /// Revert an approved payment to pending and free its cells
    UndoPayment {
        payment_id: i64,
    },

    /// Change the amount of an approved donation (cells stay untouched)
    EditAmount {
        /// Donation kind (pledge or payment)
        kind: String,
        id: i64,
        new_amount: f64,
    },

    /// Recompute the counters from the donation tables
    Reconcile,

    /// Show the audit trail
    Audit {
        /// Number of entries to show, newest first
        #[arg(short, long, default_value = "20")]
        limit: i64,

        /// Filter by entity type (grid_cell, allocation_batch, pledge, payment, counters)
        #[arg(long)]
        entity_type: Option<String>,

        /// Filter by entity id; requires --entity-type
        #[arg(long)]
        entity_id: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("floorgrid=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    // Load or create default config
    let mut config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        let default_path = Config::default().config_path();
        if default_path.exists() {
            Config::load(&default_path)?
        } else {
            Config::default()
        }
    };

    // Apply CLI overrides
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let ctx = AdminContext::cli(cli.user_id);

    match run(&config, &ctx, cli.command) {
        Ok(output) => {
            println!("{}", output);
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Execute one CLI command against the engine
fn run(config: &Config, ctx: &AdminContext, command: Commands) -> Result<String, GridError> {
    let db = GridDb::open(&config.db_path(), config.busy_timeout_ms)?;
    let engine = Engine::new(db.clone());

    match command {
        Commands::Init => {
            let config_path = config.config_path();
            if !config_path.exists() {
                config.save(&config_path)?;
                info!(path = %config_path.display(), "Created default config");
            }

            let mut conn = db.conn()?;
            let report = cells::bulk_seed_cells(&mut conn, &config.layout)?;
            Ok(format!(
                "Seeded floor grid: {} cells inserted, {} already present\nDatabase: {}",
                report.inserted,
                report.skipped,
                config.db_path().display()
            ))
        }

        Commands::Status { rectangle, status, limit } => {
            let stats = db.stats()?;
            let mut conn = db.conn()?;
            let snapshot = counters::get_counters(&mut conn)?;

            let mut output = String::new();
            output.push_str("Floor Grid Status\n");
            output.push_str("=================\n\n");
            output.push_str(&format!("Cells:    {} total\n", stats.total_cells));
            output.push_str(&format!("  available: {}\n", stats.available_cells));
            output.push_str(&format!("  pledged:   {}\n", stats.pledged_cells));
            output.push_str(&format!("  paid:      {}\n", stats.paid_cells));
            output.push_str(&format!("  blocked:   {}\n", stats.blocked_cells));
            output.push_str(&format!("Batches:  {}\n", stats.batch_count));
            output.push_str(&format!("Audit:    {} entries\n", stats.audit_entries));

            match snapshot {
                Some(c) => {
                    output.push_str(&format!("\nCounters (version {}):\n", c.version));
                    output.push_str(&format!("  paid_total:    {:.2}\n", c.paid_total));
                    output.push_str(&format!("  pledged_total: {:.2}\n", c.pledged_total));
                    output.push_str(&format!("  grand_total:   {:.2}\n", c.grand_total));
                    if c.recalc_needed != 0 {
                        output.push_str("  recalc needed: yes (run `floorgrid reconcile`)\n");
                    }
                }
                None => output.push_str("\nCounters: not initialized\n"),
            }

            if let Some(rectangle) = rectangle {
                let listed = cells::list_cells(
                    &mut conn,
                    &CellQuery {
                        rectangle: Some(rectangle.clone()),
                        status: status.clone(),
                        limit,
                        offset: 0,
                    },
                )?;

                output.push_str(&format!("\nCells in rectangle {}:\n", rectangle));
                let mut shown = 0;
                for cell in &listed {
                    if status.is_none() && cell.status == cell_status::AVAILABLE {
                        continue;
                    }
                    output.push_str(&format!(
                        "  {}  {:<8}  {:<20}  {}\n",
                        cell.cell_id,
                        cell.status,
                        cell.donor_name.as_deref().unwrap_or("-"),
                        cell.amount
                            .map(|a| format!("{:.2}", a))
                            .unwrap_or_else(|| "-".to_string())
                    ));
                    shown += 1;
                }
                if shown == 0 {
                    output.push_str("  (none)\n");
                }
            }

            Ok(output)
        }

        Commands::Allocate { cell_id, donor, amount, status, pledge_id, payment_id } => {
            let cell = engine.manual.allocate_cell(
                ctx,
                &AllocateCellInput {
                    cell_id,
                    donor_name: donor,
                    amount,
                    status,
                    pledge_id,
                    payment_id,
                },
            )?;
            Ok(serde_json::to_string_pretty(&cell)?)
        }

        Commands::Unallocate { cell_id } => {
            let cell = engine.manual.unallocate_cell(ctx, &cell_id)?;
            Ok(serde_json::to_string_pretty(&cell)?)
        }

        Commands::UndoPledge { pledge_id } => {
            let result = engine.workflows.undo_pledge_approval(ctx, pledge_id)?;
            Ok(serde_json::to_string_pretty(&result)?)
        }

        Commands::UndoPayment { payment_id } => {
            let result = engine.workflows.undo_payment_approval(ctx, payment_id)?;
            Ok(serde_json::to_string_pretty(&result)?)
        }

        Commands::EditAmount { kind, id, new_amount } => {
            let kind = match kind.as_str() {
                "pledge" => DonationKind::Pledge,
                "payment" => DonationKind::Payment,
                other => {
                    return Err(GridError::InvalidInput(format!(
                        "Unknown donation kind: {} (expected pledge or payment)",
                        other
                    )))
                }
            };
            let updated = engine.workflows.edit_approved_amount(ctx, kind, id, new_amount)?;
            Ok(serde_json::to_string_pretty(&updated)?)
        }

        Commands::Reconcile => {
            let report = engine.reconciler.reconcile(ctx)?;

            let mut output = String::new();
            output.push_str("Reconciliation\n");
            output.push_str("==============\n\n");
            output.push_str(&format!(
                "paid_total:    {:.2} (drift {:+.2})\n",
                report.current.paid_total, report.paid_drift
            ));
            output.push_str(&format!(
                "pledged_total: {:.2} (drift {:+.2})\n",
                report.current.pledged_total, report.pledged_drift
            ));
            output.push_str(&format!(
                "grand_total:   {:.2} (drift {:+.2})\n",
                report.current.grand_total, report.grand_drift
            ));
            output.push_str(if report.in_sync() {
                "\nCounters were already in sync\n"
            } else {
                "\nCounters repaired\n"
            });
            Ok(output)
        }

        Commands::Audit { limit, entity_type, entity_id } => {
            let mut conn = db.conn()?;
            let entries = match (entity_type, entity_id) {
                (Some(etype), Some(eid)) => audit::list_for_entity(&mut conn, &etype, &eid)?,
                (None, None) => audit::recent(&mut conn, limit)?,
                _ => {
                    return Err(GridError::InvalidInput(
                        "--entity-type and --entity-id must be given together".to_string(),
                    ))
                }
            };

            if entries.is_empty() {
                return Ok("No audit entries".to_string());
            }

            let mut output = String::new();
            for entry in &entries {
                output.push_str(&format!(
                    "[{:>5}] {}  user {:<4} {:<14} {}:{} ({})\n",
                    entry.id,
                    entry.created_at,
                    entry.user_id,
                    entry.action,
                    entry.entity_type,
                    entry.entity_id,
                    entry.source
                ));
            }
            Ok(output)
        }
    }
}
