use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{error, info, warn};

use crate::app::config::settings::ServerSettings;
use crate::app::error::GatewayError;
use crate::app::iso::{MessageDictionary, WireCodec};
use crate::app::processor::Processor;

/// Accepts TCP connections and hands each to a worker bounded by a
/// semaphore of size `threads`. Each connection is handled fully serially:
/// read-frame, dispatch, write-frame, repeat until EOF or idle timeout.
pub struct TcpServer {
    address: String,
    socket_timeout: Duration,
    codec: WireCodec,
    processor: Arc<Processor>,
    pool: Arc<Semaphore>,
}

impl TcpServer {
    pub fn new(settings: &ServerSettings, dictionary: Arc<MessageDictionary>, processor: Arc<Processor>) -> Self {
        Self {
            address: format!("0.0.0.0:{}", settings.port),
            socket_timeout: Duration::from_millis(settings.socket_timeout_ms),
            codec: WireCodec::new(dictionary),
            processor,
            pool: Arc::new(Semaphore::new(settings.threads)),
        }
    }

    pub async fn run(self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(&self.address).await?;
        info!(address = %self.address, "gateway listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;
                    let permit = self.pool.clone().acquire_owned().await.expect("semaphore never closes");
                    let codec = self.codec.clone();
                    let processor = self.processor.clone();
                    let socket_timeout = self.socket_timeout;

                    tokio::spawn(async move {
                        let _permit = permit;
                        info!(%peer, "connection accepted");
                        if let Err(e) = handle_connection(stream, &codec, &processor, socket_timeout).await {
                            warn!(%peer, error = %e, "connection closed with an error");
                        } else {
                            info!(%peer, "connection closed");
                        }
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received, closing listener");
                    return Ok(());
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: tokio::net::TcpStream,
    codec: &WireCodec,
    processor: &Processor,
    socket_timeout: Duration,
) -> Result<(), GatewayError> {
    loop {
        let payload = match timeout(socket_timeout, codec.read_frame(&mut stream)).await {
            Ok(Ok(payload)) => payload,
            Ok(Err(GatewayError::FrameIncomplete)) => return Ok(()),
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                warn!("socket idle timeout; closing connection");
                return Ok(());
            }
        };

        let response_bytes = match codec.decode(&payload) {
            Ok(request) => {
                let response = processor.handle(&request).await;
                match codec.encode(&response) {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        error!(error = %e, "failed to encode response; dropping connection");
                        return Err(e);
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "frame failed to parse; emitting minimal error response");
                minimal_parse_error_response(codec)?
            }
        };

        codec.write_frame(&mut stream, &response_bytes).await?;
    }
}

/// The response a parse failure gets: MTI 0210, field 39 = "30", nothing
/// else — there is no request to draw fields from.
fn minimal_parse_error_response(codec: &WireCodec) -> Result<Vec<u8>, GatewayError> {
    use crate::app::iso::{FieldValue, IsoMessage, IsoType};
    let mut resp = IsoMessage::new(0210);
    resp.set(39, FieldValue::text(IsoType::Alpha(2), 2, "30"));
    codec.encode(&resp)
}
