mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{
    company::CompanySubcommand, config::ConfigSubcommand, deliveryman::DeliverymanSubcommand,
    user::UserSubcommand,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "fleetdesk",
    about = "Multi-tenant delivery management API and admin tools",
    version,
    propagate_version = true
)]
struct Cli {
    /// Config file (YAML); defaults apply when it does not exist
    #[arg(long, global = true, env = "FLEETDESK_CONFIG", default_value = "fleetdesk.yaml")]
    config: PathBuf,

    /// SQLite database path (overrides `database.path`)
    #[arg(long, global = true, env = "FLEETDESK_DB")]
    db: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the REST API server
    Serve {
        /// Address to bind (overrides `server.host`)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides `server.port`, 0 = OS-assigned)
        #[arg(long, env = "FLEETDESK_PORT")]
        port: Option<u16>,

        /// Token signing secret (overrides `auth.jwt_secret`)
        #[arg(long, env = "FLEETDESK_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
    },

    /// Create the database and apply the schema
    Migrate,

    /// Manage tenant companies
    Company {
        #[command(subcommand)]
        subcommand: CompanySubcommand,
    },

    /// Manage company users
    User {
        #[command(subcommand)]
        subcommand: UserSubcommand,
    },

    /// Manage delivery man accounts
    Deliveryman {
        #[command(subcommand)]
        subcommand: DeliverymanSubcommand,
    },

    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let mut overrides = settings::Overrides {
        db: cli.db.clone(),
        ..settings::Overrides::default()
    };

    let result = match cli.command {
        Commands::Serve {
            host,
            port,
            jwt_secret,
        } => {
            overrides.host = host;
            overrides.port = port;
            overrides.jwt_secret = jwt_secret;
            settings::load(&cli.config, &overrides).and_then(cmd::serve::run)
        }
        Commands::Migrate => {
            settings::load(&cli.config, &overrides).and_then(|c| cmd::migrate::run(&c, cli.json))
        }
        Commands::Company { subcommand } => settings::load(&cli.config, &overrides)
            .and_then(|c| cmd::company::run(&c, subcommand, cli.json)),
        Commands::User { subcommand } => settings::load(&cli.config, &overrides)
            .and_then(|c| cmd::user::run(&c, subcommand, cli.json)),
        Commands::Deliveryman { subcommand } => settings::load(&cli.config, &overrides)
            .and_then(|c| cmd::deliveryman::run(&c, subcommand, cli.json)),
        Commands::Config { subcommand } => settings::load(&cli.config, &overrides)
            .and_then(|c| cmd::config::run(&c, subcommand, cli.json)),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
