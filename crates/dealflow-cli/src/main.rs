//! Dealflow CLI — submit deal-flow queries and inspect advisory runs.
//!
//! Reuses the dealflow-core engine and SQLite store directly; there is no
//! server in between.

use clap::{Parser, Subcommand};
use dealflow_cli::commands;
use dealflow_core::models::CompanyContext;

/// Dealflow CLI — route deal queries to advisory workflows
#[derive(Parser)]
#[command(name = "dealflow", version, about = "Dealflow CLI — route deal queries to advisory workflows")]
pub struct Cli {
    /// Path to the SQLite database file
    #[arg(long, global = true, env = "DEALFLOW_DB_PATH", default_value = "dealflow.db")]
    db: String,

    /// Workflow catalog YAML file (defaults to the built-in catalog)
    #[arg(long, global = true, env = "DEALFLOW_CATALOG")]
    catalog: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a query, run its workflow and print the result
    Run {
        /// The deal query, e.g. "Find fintech acquisition targets"
        query: String,
        /// Company the deal is about
        #[arg(long)]
        company: Option<String>,
        /// Industry of the company
        #[arg(long)]
        industry: Option<String>,
        /// Indicative deal size, e.g. "$10-50M"
        #[arg(long)]
        deal_size: Option<String>,
        /// Link the run to an existing deal
        #[arg(long)]
        deal_id: Option<String>,
        /// Directory of `*.md` instruction templates overriding the built-ins
        #[arg(long, env = "DEALFLOW_PROMPTS_DIR")]
        prompts: Option<String>,
    },

    /// Show a run with its step results and messages
    Show {
        /// Run ID
        run_id: String,
        /// Print the raw snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recent runs
    List {
        /// Maximum number of runs to show
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Print the workflow catalog (validates `--catalog` when given)
    Catalog {
        /// Print as YAML, suitable as a starting point for a custom catalog
        #[arg(long)]
        yaml: bool,
        /// Directory of `*.md` instruction templates the catalog may refer to
        #[arg(long, env = "DEALFLOW_PROMPTS_DIR")]
        prompts: Option<String>,
    },

    /// Classify a query without running any steps
    Classify {
        /// The deal query
        query: String,
        /// Directory of `*.md` instruction templates overriding the built-ins
        #[arg(long, env = "DEALFLOW_PROMPTS_DIR")]
        prompts: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // API keys and DEALFLOW_* settings may live in .env
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dealflow_core=warn,dealflow_cli=info".into()),
        )
        .init();

    let result = if let Some(command) = cli.command {
        match command {
            Commands::Run {
                query,
                company,
                industry,
                deal_size,
                deal_id,
                prompts,
            } => {
                let state = commands::init_state(&cli.db, cli.catalog.as_deref());
                let company = CompanyContext {
                    company_name: company,
                    industry,
                    deal_size,
                    deal_id,
                };
                commands::run::run(&state, &query, company, prompts.as_deref()).await
            }

            Commands::Show { run_id, json } => {
                let state = commands::init_state(&cli.db, cli.catalog.as_deref());
                commands::show::show(&state, &run_id, json).await
            }

            Commands::List { limit } => {
                let state = commands::init_state(&cli.db, cli.catalog.as_deref());
                commands::list::list(&state, limit).await
            }

            Commands::Catalog { yaml, prompts } => {
                let state = commands::init_state(&cli.db, cli.catalog.as_deref());
                commands::catalog::show(&state.catalog, prompts.as_deref(), yaml)
            }

            Commands::Classify { query, prompts } => {
                commands::classify::classify(&query, prompts.as_deref()).await
            }
        }
    } else {
        // No subcommand: show help
        use clap::CommandFactory;
        Cli::command().print_help().ok();
        println!();
        Ok(())
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
