use crate::output::{print_json, print_table};
use crate::settings;
use clap::Subcommand;
use fleetdesk_core::company::{CompanyUser, NewCompanyUser};
use fleetdesk_core::config::Config;

#[derive(Subcommand)]
pub enum UserSubcommand {
    /// Create a login for a company's dashboard
    Create {
        /// Owning company id
        #[arg(long)]
        company: i64,
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        /// At least 8 characters
        #[arg(long, env = "FLEETDESK_USER_PASSWORD", hide_env_values = true)]
        password: String,
        /// Defaults to `admin`
        #[arg(long)]
        role: Option<String>,
    },

    /// List a company's users
    List {
        #[arg(long)]
        company: i64,
    },
}

pub fn run(config: &Config, subcmd: UserSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        UserSubcommand::Create {
            company,
            name,
            email,
            password,
            role,
        } => create(
            config,
            NewCompanyUser {
                company_id: company,
                name,
                email,
                password,
                role,
            },
            json,
        ),
        UserSubcommand::List { company } => list(config, company, json),
    }
}

fn create(config: &Config, input: NewCompanyUser, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let user = store.write(|tx| CompanyUser::create(tx, &input))?;
    if json {
        print_json(&user)?;
    } else {
        println!(
            "Created user #{} <{}> for company #{}",
            user.id, user.email, user.company_id
        );
    }
    Ok(())
}

fn list(config: &Config, company_id: i64, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let users = store.read(|conn| CompanyUser::list_for_company(conn, company_id))?;

    if json {
        print_json(&users)?;
        return Ok(());
    }
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }
    let rows = users
        .iter()
        .map(|u| {
            vec![
                u.id.to_string(),
                u.name.clone(),
                u.email.clone(),
                u.role.clone(),
                if u.has_device_token() { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "EMAIL", "ROLE", "PUSH"], rows);
    Ok(())
}
