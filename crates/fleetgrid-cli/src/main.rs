use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "fleetgrid",
    about = "FleetGrid — multi-cluster workload placement",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Place a workload onto cluster targets.
    ///
    /// The request is a JSON file of the form
    /// `{"workload": {...}, "targets": [...]}`.
    Schedule {
        /// Path to the placement request
        #[arg(short, long)]
        request: String,
        /// Path to fleetgrid.toml (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<String>,
        /// Scoring strategy (default: scheduler.default_strategy)
        #[arg(short, long)]
        strategy: Option<String>,
        /// Print every eligible target's score and reason
        #[arg(long)]
        explain: bool,
    },
    /// List the registered scheduling strategies
    Algorithms {
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Compile and evaluate placement expressions
    Expr {
        #[command(subcommand)]
        action: ExprAction,
    },
    /// Evaluate placement policies
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand)]
enum ExprAction {
    /// Type-check an expression and list the variables it reads
    Validate {
        expression: String,
        #[arg(short, long)]
        config: Option<String>,
    },
    /// Evaluate an expression
    Eval {
        expression: String,
        /// Variables as inline JSON or a path to a JSON file
        #[arg(long)]
        vars: Option<String>,
        #[arg(short, long)]
        config: Option<String>,
    },
}

#[derive(Subcommand)]
enum PolicyAction {
    /// Evaluate a policy or policy set file against variables
    Eval {
        /// Path to a policy (or policy set) JSON file
        #[arg(short, long)]
        policy: String,
        /// Variables as inline JSON or a path to a JSON file
        #[arg(long)]
        vars: Option<String>,
        #[arg(short, long)]
        config: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetgrid=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Schedule {
            request,
            config,
            strategy,
            explain,
        } => commands::schedule::schedule(
            &request,
            config.as_deref(),
            strategy.as_deref(),
            explain,
        ),
        Commands::Algorithms { config } => commands::schedule::algorithms(config.as_deref()),
        Commands::Expr { action } => match action {
            ExprAction::Validate { expression, config } => {
                commands::expr::validate(&expression, config.as_deref())
            }
            ExprAction::Eval {
                expression,
                vars,
                config,
            } => commands::expr::eval(&expression, vars.as_deref(), config.as_deref()),
        },
        Commands::Policy { action } => match action {
            PolicyAction::Eval {
                policy,
                vars,
                config,
            } => commands::policy::eval(&policy, vars.as_deref(), config.as_deref()),
        },
    }
}
