//! One controller pings one unit over a mutually authenticated QUIC
//! connection, then opens a payload stream on the same connection.

use ferry_pki::{Identity, TrustAnchor, client_tls_config, server_tls_config};
use ferry_transport_quic::{Purpose, QuicConfig, QuicListener, dial};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let anchor = TrustAnchor::generate()?;
    let unit = anchor.issue_for_role(&Identity::unit("unit-1"))?;
    let controller = anchor.issue_for_role(&Identity::controller("controller"))?;

    let config = QuicConfig::default();
    let listener = QuicListener::bind(
        "127.0.0.1:0".parse()?,
        &server_tls_config(&unit, &anchor)?,
        &config,
    )?;
    let address = listener.local_addr().to_string();

    let server = tokio::spawn(async move {
        let mut connection = listener.accept().await?;
        info!("unit accepted {}", connection.peer_identity()?);

        let mut ping = [0u8; 4];
        connection.read_exact(&mut ping).await?;
        connection.write_all(b"PONG").await?;

        let mux = connection.multiplexer();
        let (mut stream, purpose) = mux.accept_stream().await?;
        let mut body = String::new();
        stream.read_to_string(&mut body).await?;
        info!("unit received {purpose} stream: {body}");
        stream.write_all(b"ack").await?;
        stream.close()?;

        connection.connection().closed().await;
        Ok::<_, Box<dyn std::error::Error + Send + Sync>>(())
    });

    let client_tls = client_tls_config(&controller, &anchor, "localhost")?;
    let mut connection = dial(&address, &client_tls, &config).await?;
    info!("controller connected to {}", connection.peer_identity()?);

    connection.write_all(b"PING").await?;
    let mut pong = [0u8; 4];
    connection.read_exact(&mut pong).await?;
    info!("controller received {}", String::from_utf8_lossy(&pong));

    let mut stream = connection.multiplexer().open_stream(Purpose::Payload).await?;
    stream.write_all(b"hello over payload").await?;
    stream.close()?;
    let mut ack = String::new();
    stream.read_to_string(&mut ack).await?;
    info!("controller received {ack}");

    connection.close().await?;
    server.await?.map_err(|e| e.to_string())?;

    Ok(())
}
