use forktake::{
    limits::{ConnLimits, ServerLimits},
    BackEndConfig, FbStatus, FkRegex, Request, Response, Running, Server, State, StatusCode,
    TkFallback, TkFn, TkFork, TkHtml, TkText,
};
use std::{
    net::SocketAddr,
    time::{Duration, Instant},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};

fn start(server: Result<Server, forktake::Error>) -> Running {
    server.unwrap().start().unwrap()
}

fn site() -> Result<Server, forktake::Error> {
    let take = TkFallback::new(
        TkFork::new()
            .fork(FkRegex::new("/f", TkHtml::new("<html>f</html>"))?)
            .fork(FkRegex::new(
                "/echo",
                TkFn::new(|req: Request| async move {
                    let body = req.into_body().into_bytes().await?;
                    Ok(Response::ok().with_body(body))
                }),
            )?)
            .fork(FkRegex::new(
                "/panic",
                TkFn::new(|req: Request| async move {
                    if req.method() == forktake::Method::Get {
                        panic!("take exploded");
                    }
                    Ok(Response::new(StatusCode::NoContent))
                }),
            )?),
        FbStatus::text(StatusCode::NotFound),
    );

    Server::builder().take(take).build()
}

/// Sends `raw` and reads until the server closes the connection.
async fn exchange(addr: SocketAddr, raw: &str) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();
    response
}

#[tokio::test]
async fn get_html() {
    let mut running = start(site());

    let response = exchange(
        running.local_addr(),
        "GET /f HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\n<html>f</html>"), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn fallback_not_found() {
    let mut running = start(site());

    let response = exchange(
        running.local_addr(),
        "GET /nothing HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 404 Not Found\r\n"), "{response}");
    assert!(response.ends_with("Not Found\n"), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn malformed_is_rejected() {
    let mut running = start(site());

    #[rustfmt::skip]
    let cases = [
        ("GARBAGE\r\n\r\n",                             "HTTP/1.1 400 Bad Request\r\n"),
        ("GET f HTTP/1.1\r\n\r\n",                      "HTTP/1.1 400 Bad Request\r\n"),
        ("GET /f HTTP/1.1\r\nNo-Colon\r\n\r\n",         "HTTP/1.1 400 Bad Request\r\n"),
        ("GET /f HTTP/3\r\n\r\n",                       "HTTP/1.1 505 HTTP Version Not Supported\r\n"),
    ];

    for (raw, status_line) in cases {
        let response = exchange(running.local_addr(), raw).await;

        assert!(response.starts_with(status_line), "{raw:?}: {response}");
        assert!(response.contains("\r\nConnection: close\r\n"), "{raw:?}: {response}");
    }

    running.stop().await.unwrap();
}

#[tokio::test]
async fn panic_is_500() {
    let mut running = start(site());

    let response = exchange(running.local_addr(), "GET /panic HTTP/1.1\r\n\r\n").await;
    assert!(
        response.starts_with("HTTP/1.1 500 Internal Server Error\r\n"),
        "{response}"
    );

    let response = exchange(
        running.local_addr(),
        "GET /f HTTP/1.1\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn keep_alive_serves_two_requests() {
    let mut running = start(site());
    let mut stream = TcpStream::connect(running.local_addr()).await.unwrap();

    let first = "POST /echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nfirst";
    stream.write_all(first.as_bytes()).await.unwrap();

    let expected = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\nfirst";
    let mut buf = vec![0u8; expected.len()];
    stream.read_exact(&mut buf).await.unwrap();
    assert_eq!(String::from_utf8(buf).unwrap(), expected);

    let second = "POST /echo HTTP/1.1\r\nConnection: close\r\nContent-Length: 6\r\n\r\nsecond";
    stream.write_all(second.as_bytes()).await.unwrap();

    let mut rest = String::new();
    stream.read_to_string(&mut rest).await.unwrap();
    assert_eq!(
        rest,
        "HTTP/1.1 200 OK\r\nContent-Length: 6\r\nConnection: close\r\n\r\nsecond"
    );

    running.stop().await.unwrap();
}

#[tokio::test]
async fn chunked_request_body() {
    let mut running = start(site());

    let response = exchange(
        running.local_addr(),
        concat!(
            "POST /echo HTTP/1.1\r\n",
            "Transfer-Encoding: chunked\r\n",
            "Connection: close\r\n\r\n",
            "4\r\nWiki\r\n",
            "5;ext=1\r\npedia\r\n",
            "0\r\n",
            "Trailer: x\r\n\r\n",
        ),
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nWikipedia"), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn http_10_closes_by_default() {
    let mut running = start(site());

    let response = exchange(running.local_addr(), "GET /f HTTP/1.0\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.0 200 OK\r\n"), "{response}");
    assert!(response.contains("\r\nConnection: close\r\n"), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn stop_twice_releases_the_port() {
    let mut running = start(site());
    let addr = running.local_addr();

    running.stop().await.unwrap();
    running.stop().await.unwrap();
    assert_eq!(running.state(), State::Stopped);

    assert!(TcpStream::connect(addr).await.is_err());

    let mut again = Server::builder()
        .config(BackEndConfig {
            port: addr.port(),
            ..BackEndConfig::default()
        })
        .take(TkText::new("again"))
        .build()
        .unwrap()
        .start()
        .unwrap();

    let response = exchange(addr, "GET / HTTP/1.1\r\nConnection: close\r\n\r\n").await;
    assert!(response.ends_with("again"), "{response}");

    again.stop().await.unwrap();
}

#[tokio::test]
async fn overflow_gets_503() {
    let mut running = start(
        Server::builder()
            .take(TkText::new("never"))
            .server_limits(ServerLimits {
                max_connections: 1,
                max_pending_connections: 0,
                ..ServerLimits::default()
            })
            .build(),
    );
    // Nothing is written: the 503 is sent without reading the request.
    let mut stream = TcpStream::connect(running.local_addr()).await.unwrap();
    let mut response = String::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_string(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(
        response.starts_with("HTTP/1.1 503 Service Unavailable\r\n"),
        "{response}"
    );
    assert!(response.ends_with(r#""code":"SERVICE_UNAVAILABLE"}"#), "{response}");

    running.stop().await.unwrap();
}

#[tokio::test]
async fn idle_connections_time_out() {
    let mut running = start(
        Server::builder()
            .config(BackEndConfig {
                idle_timeout: Duration::from_millis(100),
                ..BackEndConfig::default()
            })
            .connection_limits(ConnLimits {
                socket_read_timeout: Duration::from_millis(100),
                ..ConnLimits::default()
            })
            .take(TkText::new("x"))
            .build(),
    );

    let mut stream = TcpStream::connect(running.local_addr()).await.unwrap();
    let mut buf = Vec::new();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buf))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(read, 0);
    running.stop().await.unwrap();
}

/// Takes `delay` to answer `slow`.
fn sleeper(delay: Duration, shutdown_timeout: Option<Duration>) -> Running {
    start(
        Server::builder()
            .take(TkFn::new(move |_: Request| async move {
                tokio::time::sleep(delay).await;
                Ok(Response::ok().text("slow"))
            }))
            .server_limits(ServerLimits {
                shutdown_timeout,
                ..ServerLimits::default()
            })
            .build(),
    )
}

#[tokio::test]
async fn stop_lets_the_exchange_in_flight_finish() {
    let mut running = sleeper(Duration::from_millis(300), Some(Duration::from_secs(10)));

    let client = tokio::spawn(exchange(
        running.local_addr(),
        "GET / HTTP/1.1\r\nHost: test\r\n\r\n",
    ));
    tokio::time::sleep(Duration::from_millis(100)).await;

    running.stop().await.unwrap();
    let response = client.await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"), "{response}");
    assert!(response.ends_with("\r\n\r\nslow"), "{response}");
}

#[tokio::test]
async fn shutdown_timeout_aborts_busy_workers() {
    let mut running = sleeper(Duration::from_secs(30), Some(Duration::from_millis(200)));

    let mut stream = TcpStream::connect(running.local_addr()).await.unwrap();
    stream
        .write_all(b"GET / HTTP/1.1\r\nHost: test\r\n\r\n")
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = Instant::now();
    running.stop().await.unwrap();
    let took = started.elapsed();

    assert!(took >= Duration::from_millis(150), "{took:?}");
    assert!(took < Duration::from_secs(2), "{took:?}");
}
