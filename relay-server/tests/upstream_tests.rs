use bytes::Bytes;
use relay_server::{ConnectPolicy, UpstreamClient, UpstreamError};
use std::time::{Duration, Instant};

fn client(policy: ConnectPolicy) -> UpstreamClient {
    UpstreamClient::new(policy, Duration::from_secs(2)).unwrap()
}

/// A local port with nothing listening on it.
async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn unresolvable_host_fails_without_retrying() {
    let policy = ConnectPolicy::default().with_retry_delay(Duration::from_secs(5));
    let started = Instant::now();

    let result = client(policy).connect("http://runner.invalid:8001/", Bytes::from_static(b"{}")).await;

    assert!(matches!(result, Err(UpstreamError::NameResolution(_))), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn refused_connection_is_retried_then_reported() {
    let port = closed_port().await;
    let policy = ConnectPolicy::default().with_retry_delay(Duration::from_millis(200));
    let started = Instant::now();

    let result = client(policy)
        .connect(&format!("http://127.0.0.1:{port}/"), Bytes::from_static(b"{}"))
        .await;

    assert!(matches!(result, Err(UpstreamError::Unavailable { attempts: 2 })), "got {result:?}");
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn single_attempt_policy_does_not_wait() {
    let port = closed_port().await;
    let policy =
        ConnectPolicy::default().with_max_attempts(1).with_retry_delay(Duration::from_secs(5));
    let started = Instant::now();

    let result = client(policy)
        .connect(&format!("http://127.0.0.1:{port}/"), Bytes::from_static(b"{}"))
        .await;

    assert!(matches!(result, Err(UpstreamError::Unavailable { attempts: 1 })), "got {result:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn slow_headers_hit_the_header_timeout() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    // Accept and hold the connection without ever answering.
    let holder = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
    });

    let policy = ConnectPolicy::default().with_header_timeout(Duration::from_millis(100));
    let result = client(policy)
        .connect(&format!("http://127.0.0.1:{port}/"), Bytes::from_static(b"{}"))
        .await;

    assert!(matches!(result, Err(UpstreamError::HeaderTimeout(_))), "got {result:?}");
    holder.abort();
}
