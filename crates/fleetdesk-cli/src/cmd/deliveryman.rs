use crate::output::print_json;
use crate::settings;
use clap::Subcommand;
use fleetdesk_core::config::Config;
use fleetdesk_core::delivery_man::DeliveryMan;

#[derive(Subcommand)]
pub enum DeliverymanSubcommand {
    /// Set the password used by the delivery app
    SetPassword {
        /// Delivery man id
        id: i64,
        /// At least 8 characters
        #[arg(long, env = "FLEETDESK_DELIVERYMAN_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Show a delivery man and the companies they work for
    Show { id: i64 },
}

pub fn run(config: &Config, subcmd: DeliverymanSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        DeliverymanSubcommand::SetPassword { id, password } => {
            set_password(config, id, &password, json)
        }
        DeliverymanSubcommand::Show { id } => show(config, id, json),
    }
}

fn set_password(config: &Config, id: i64, password: &str, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    store.write(|tx| DeliveryMan::set_password(tx, id, password))?;
    if json {
        print_json(&serde_json::json!({ "id": id, "password_set": true }))?;
    } else {
        println!("Password set for delivery man #{id}.");
    }
    Ok(())
}

fn show(config: &Config, id: i64, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let (man, companies) = store.read(|conn| {
        let man = DeliveryMan::get(conn, id)?;
        let companies = DeliveryMan::company_ids(conn, id)?;
        Ok((man, companies))
    })?;

    if json {
        print_json(&serde_json::json!({ "delivery_man": man, "company_ids": companies }))?;
    } else {
        println!("#{} {} ({})", man.id, man.name, man.mobile_no);
        if let Some(email) = &man.email {
            println!("email: {email}");
        }
        println!(
            "can log in: {}",
            if man.password_hash.is_some() { "yes" } else { "no" }
        );
        let ids: Vec<String> = companies.iter().map(i64::to_string).collect();
        println!("companies: {}", if ids.is_empty() { "-".to_string() } else { ids.join(", ") });
    }
    Ok(())
}
