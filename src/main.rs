use std::process::ExitCode;
use std::sync::Arc;

use tracing::error;

use atm_acquirer_gateway::app::config::settings::Settings;
use atm_acquirer_gateway::app::charges::ChargeEngine;
use atm_acquirer_gateway::app::esb::client::{EsbClient, EsbGateway};
use atm_acquirer_gateway::app::iso::MessageDictionary;
use atm_acquirer_gateway::app::processor::Processor;
use atm_acquirer_gateway::app::server::TcpServer;
use atm_acquirer_gateway::app::utils::logging::setup_tracing;

#[tokio::main]
async fn main() -> ExitCode {
    let _guard = match setup_tracing() {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let dictionary = Arc::new(MessageDictionary::standard());

    let esb: Arc<dyn EsbGateway> = match EsbClient::new(settings.esb) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to construct ESB client");
            return ExitCode::FAILURE;
        }
    };
    let charges = ChargeEngine::new(settings.charges);
    let processor = Arc::new(Processor::new(esb, charges, dictionary.clone()));

    let server = TcpServer::new(&settings.server, dictionary, processor);
    if let Err(e) = server.run().await {
        error!(error = %e, "gateway exited with an error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
