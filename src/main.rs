//! Socket server - Entry Point
//!
//! Runs the asynchronous server from `config.toml`, logs every datagram and
//! acknowledges each `<EOF>`-terminated message.

use log::{info, warn};
use std::error::Error;

use socket_async::event::NetErrorReason;
use socket_async::utils::logging;
use socket_async::{AppConfig, AsyncServer};

const END_MARKER: &[u8] = b"<EOF>";
const ACK: &str = "2<EOF>";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    logging::init();

    let config = AppConfig::load("config")?;
    let server = AsyncServer::new(config.server);

    let replier = server.clone();
    server.events().data_received.subscribe(move |event| {
        let encoding = replier.config().encoding;
        info!(
            "Read {} bytes from {}: {}",
            event.data.len(),
            event.session.peer_addr(),
            encoding.decode(&event.data)
        );
        while let Some(message) = event.session.take_datagram_until(END_MARKER) {
            info!("Complete message from {}: {}", event.session.id(), encoding.decode(&message));
            if let Err(e) = replier.send_text(&event.session, ACK) {
                warn!("Could not acknowledge {}: {}", event.session.id(), e);
            }
        }
    });
    server.events().net_error.subscribe(|event| {
        if let NetErrorReason::Io(e) = &event.reason {
            warn!("Network error on {}: {}", event.session.id(), e);
        }
    });
    server.events().server_exception.subscribe(|event| {
        warn!("Server exception: {}", event.error);
    });

    info!("Launching socket server...");
    server.start()?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    server.stop().await;
    Ok(())
}
