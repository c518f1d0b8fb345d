use crate::output::print_json;
use crate::settings;
use fleetdesk_core::config::Config;

pub fn run(config: &Config, json: bool) -> anyhow::Result<()> {
    let store = settings::open_store(config)?;
    let version = store.schema_version()?;
    let path = config.database.path.display().to_string();

    if json {
        print_json(&serde_json::json!({ "database": path, "schema_version": version }))?;
    } else {
        println!("Database {path} is at schema version {version}.");
    }
    Ok(())
}
