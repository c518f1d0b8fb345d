use crate::output::{print_json, print_table};
use crate::settings;
use clap::Subcommand;
use fleetdesk_core::company::{Company, NewCompany};
use fleetdesk_core::config::Config;

#[derive(Subcommand)]
pub enum CompanySubcommand {
    /// Register a new company
    Create {
        /// Company name
        name: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        mobile_no: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },

    /// List all companies
    List,

    /// Allow the company's users to log in again
    Activate { id: i64 },

    /// Block the company's users from the API
    Deactivate { id: i64 },
}

pub fn run(config: &Config, subcmd: CompanySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        CompanySubcommand::Create {
            name,
            email,
            mobile_no,
            address,
        } => create(
            config,
            NewCompany {
                name,
                email,
                mobile_no,
                address,
            },
            json,
        ),
        CompanySubcommand::List => list(config, json),
        CompanySubcommand::Activate { id } => set_active(config, id, true, json),
        CompanySubcommand::Deactivate { id } => set_active(config, id, false, json),
    }
}

fn create(config: &Config, input: NewCompany, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let company = store.write(|tx| Company::create(tx, &input))?;
    if json {
        print_json(&company)?;
    } else {
        println!("Created company #{}: {}", company.id, company.name);
    }
    Ok(())
}

fn list(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let companies = store.read(Company::list)?;

    if json {
        print_json(&companies)?;
        return Ok(());
    }
    if companies.is_empty() {
        println!("No companies.");
        return Ok(());
    }
    let rows = companies
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.name.clone(),
                c.email.clone().unwrap_or_else(|| "-".to_string()),
                if c.is_active { "yes" } else { "no" }.to_string(),
                c.created_at.format("%Y-%m-%d").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "EMAIL", "ACTIVE", "CREATED"], rows);
    Ok(())
}

fn set_active(config: &Config, id: i64, active: bool, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let company = store.write(|tx| {
        Company::set_active(tx, id, active)?;
        Company::get(tx, id)
    })?;
    if json {
        print_json(&company)?;
    } else {
        let state = if active { "activated" } else { "deactivated" };
        println!("Company #{} {state}.", company.id);
    }
    Ok(())
}
