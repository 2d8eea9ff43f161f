use clap::Parser;
use edge_config::AppConfig;
use edge_gateway::cli::{ActivationRequest, Cli, Command, version_string};
use edge_gateway::lock;
use edge_telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Version => {
            println!("[*] Version: {}", version_string());
        }
        Command::Active {
            host,
            user,
            password,
            sn,
            iface,
            mac,
        } => {
            let request = ActivationRequest::new(
                &host,
                &sn,
                iface.as_deref(),
                mac.as_deref(),
                &user,
                &password,
            )?;
            println!("{}", serde_json::to_string_pretty(&request)?);
        }
        Command::Upgrade { upgrade, config } => {
            let app_config = AppConfig::from_env()?;
            let resources = config.or(app_config.resources_file);
            lock::upgrade(&app_config.lock_dir, resources.as_deref(), upgrade)?;
        }
        Command::Recover { recover, config } => {
            let app_config = AppConfig::from_env()?;
            let resources = config.or(app_config.resources_file);
            lock::recover(&app_config.lock_dir, resources.as_deref(), recover)?;
        }
        Command::Run { config, db } => {
            let mut app_config = AppConfig::from_env()?;
            if let Some(path) = config {
                app_config.resources_file = Some(path);
            }
            if let Some(url) = db {
                app_config.database_url = Some(url);
            }
            edge_gateway::run(app_config).await?;
        }
    }
    Ok(())
}
