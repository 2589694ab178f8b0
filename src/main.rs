use clap::{Parser, Subcommand};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use addr_validator::app::ports::{GeocodingPort, TextExtractionPort};
use addr_validator::app::validate_use_case::ValidateAddressUseCase;
use addr_validator::config::Config;
use addr_validator::domain::{AddressInput, ValidateAddressBody};
use addr_validator::engine::gazetteer::Gazetteer;
use addr_validator::infra::geocoding::NominatimClient;
use addr_validator::infra::text_model::ChatCompletionsClient;
use addr_validator::{logging, server};

#[derive(Parser)]
#[command(name = "addr_validator")]
#[command(about = "Shipping-address validation and normalization service")]
#[command(version = "0.1.0")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP validation service
    Serve {
        /// Port to listen on (overrides config.toml)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Validate a single address from the command line and print the result
    Validate {
        /// Postal code (CAP)
        #[arg(long)]
        cap: Option<String>,
        /// City name
        #[arg(long)]
        city: Option<String>,
        /// Province code or name
        #[arg(long)]
        province: Option<String>,
        /// Country code (defaults to config)
        #[arg(long)]
        country: Option<String>,
        /// Freeform address (selects the AI extraction path)
        #[arg(long)]
        raw: Option<String>,
    },
}

fn build_use_case(config: &Config) -> anyhow::Result<ValidateAddressUseCase> {
    let gazetteer = match &config.engine.gazetteer_path {
        Some(path) => Gazetteer::from_path(Path::new(path))?,
        None => Gazetteer::builtin()?,
    };

    let geocoder: Arc<dyn GeocodingPort> = Arc::new(NominatimClient::new(&config.geocoding)?);

    let extractor: Option<Arc<dyn TextExtractionPort>> =
        match ChatCompletionsClient::from_env(&config.extraction) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!(error = %e, "AI extraction disabled");
                None
            }
        };

    Ok(ValidateAddressUseCase::new(
        geocoder,
        extractor,
        Arc::new(gazetteer),
        &config.engine,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Commands::Serve { port } => {
            let use_case = Arc::new(build_use_case(&config)?);
            let port = port.unwrap_or(config.server.port);
            info!(port, "starting validation service");
            server::start_server(use_case, port)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?;
        }
        Commands::Validate {
            cap,
            city,
            province,
            country,
            raw,
        } => {
            let use_case = build_use_case(&config)?;
            let body = ValidateAddressBody {
                cap,
                city,
                province,
                country,
                full_address: None,
                raw_address: raw,
            };
            match AddressInput::from_body(&body, use_case.default_country()) {
                Ok(input) => {
                    let result = use_case.validate(input).await;
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                Err(e) => {
                    eprintln!("❌ {e}");
                    std::process::exit(2);
                }
            }
        }
    }
    Ok(())
}
