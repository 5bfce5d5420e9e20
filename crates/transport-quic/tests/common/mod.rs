//! Shared setup for the QUIC integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use ferry_pki::{
    ClientTlsConfig, Identity, LeafCertificate, ServerTlsConfig, TrustAnchor, client_tls_config,
    server_tls_config,
};
use ferry_transport_quic::{QuicConfig, QuicConnection, QuicListener, dial};

/// Upper bound for any single step of a test.
pub const STEP: Duration = Duration::from_secs(10);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// A trust anchor with one unit (server) and one controller (client) leaf.
pub struct Pki {
    pub anchor: TrustAnchor,
    pub unit: LeafCertificate,
    pub controller: LeafCertificate,
}

impl Pki {
    pub fn new() -> Self {
        let anchor = TrustAnchor::generate().unwrap();
        let unit = anchor.issue_for_role(&Identity::unit("u1")).unwrap();
        let controller = anchor
            .issue_for_role(&Identity::controller("main"))
            .unwrap();

        Self {
            anchor,
            unit,
            controller,
        }
    }

    pub fn server_tls(&self) -> ServerTlsConfig {
        server_tls_config(&self.unit, &self.anchor).unwrap()
    }

    pub fn client_tls(&self) -> ClientTlsConfig {
        client_tls_config(&self.controller, &self.anchor, "localhost").unwrap()
    }
}

pub fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

pub fn listen(tls: &ServerTlsConfig, config: &QuicConfig) -> QuicListener {
    QuicListener::bind(loopback(), tls, config).unwrap()
}

/// Dials `listener` and accepts the connection on the other side.
pub async fn connect(
    listener: &QuicListener,
    tls: &ClientTlsConfig,
    config: &QuicConfig,
) -> (QuicConnection, QuicConnection) {
    let address = listener.local_addr().to_string();
    let (client, server) = tokio::time::timeout(STEP, async {
        tokio::join!(dial(&address, tls, config), listener.accept())
    })
    .await
    .expect("connection setup timed out");

    (client.unwrap(), server.unwrap())
}

/// A connected client/server pair under the default configuration.
pub async fn connected_pair() -> (QuicConnection, QuicConnection, QuicListener, Pki) {
    let pki = Pki::new();
    let config = QuicConfig::default();
    let listener = listen(&pki.server_tls(), &config);
    let (client, server) = connect(&listener, &pki.client_tls(), &config).await;

    (client, server, listener, pki)
}
