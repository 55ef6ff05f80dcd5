mod common;

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use common::{Capture, Store, manifest};
use pkgserve::config::ServerConfig;
use pkgserve::logging::ServerLog;
use pkgserve::service::PackageServer;

async fn raw_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn config_for(store: &Store) -> ServerConfig {
    ServerConfig {
        bind: "127.0.0.1:0".parse().unwrap(),
        store_dir: store.path().to_path_buf(),
        ..ServerConfig::default()
    }
}

#[tokio::test]
async fn serves_over_tcp_and_shuts_down() {
    let store = Store::with_manifest(&manifest(&[("1.0.0", "a.bin"), ("2.0.0", "b.bin")]));
    store.write_file("b.bin", b"second package");

    let server = PackageServer::start(&config_for(&store), ServerLog::new(Capture::default()))
        .await
        .unwrap();
    let addr = server.local_addr();
    assert_ne!(addr.port(), 0);

    let latest = raw_get(addr, "/latest_version").await;
    assert!(latest.starts_with("HTTP/1.1 200 OK"), "{latest}");
    assert!(latest.ends_with("2.0.0"), "{latest}");

    let download = raw_get(addr, "/download/2.0.0").await;
    assert!(download.starts_with("HTTP/1.1 200 OK"), "{download}");
    assert!(
        download
            .to_ascii_lowercase()
            .contains("content-disposition: attachment; filename=\"b.bin\"")
    );
    assert!(download.ends_with("second package"));

    let missing = raw_get(addr, "/download/3.0.0").await;
    assert!(missing.starts_with("HTTP/1.1 404"), "{missing}");

    assert!(!server.has_exited());
    server.shutdown(Duration::from_secs(5)).await.unwrap();
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn bind_conflict_is_reported() {
    let store = Store::with_manifest(&manifest(&[("1.0.0", "a.bin")]));
    let first = PackageServer::start(&config_for(&store), ServerLog::new(Capture::default()))
        .await
        .unwrap();

    let taken = ServerConfig {
        bind: first.local_addr(),
        ..config_for(&store)
    };
    let err = PackageServer::start(&taken, ServerLog::new(Capture::default()))
        .await
        .err()
        .expect("second bind must fail");
    assert!(format!("{err:#}").contains("Failed to bind"));

    first.shutdown(Duration::from_secs(5)).await.unwrap();
}
