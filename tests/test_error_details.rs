use instantview::{
    FetcherConfig, PreviewError, PreviewService, PreviewServiceConfig, UrlValidationConfig,
};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT: &str = "bot@example.org";

fn local_service() -> PreviewService {
    PreviewService::new_with_config(
        PreviewServiceConfig::new().with_url_validation(UrlValidationConfig::permissive()),
    )
    .unwrap()
}

async fn server_with_status(status: u16) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(status))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn test_http_404_error() {
    let server = server_with_status(404).await;
    let url = format!("{}/status", server.uri());

    let result = local_service().generate_preview(&url, BOT).await;

    match result.unwrap_err() {
        PreviewError::NotFound(msg) => {
            println!("404 Not Found detected: {}", msg);
            assert!(msg.contains("not found"));
            assert!(msg.contains(&url));
        }
        e => panic!("Expected NotFound error, got: {:?}", e),
    }
}

#[tokio::test]
async fn test_http_403_error() {
    let server = server_with_status(403).await;
    let url = format!("{}/status", server.uri());

    match local_service().generate_preview(&url, BOT).await.unwrap_err() {
        PreviewError::ClientError { status, message } => {
            println!("Client Error detected: {} - {}", status, message);
            assert_eq!(status, 403);
        }
        e => panic!("Expected ClientError, got: {:?}", e),
    }
}

#[tokio::test]
async fn test_http_500_error() {
    let server = server_with_status(500).await;
    let url = format!("{}/status", server.uri());

    match local_service().generate_preview(&url, BOT).await.unwrap_err() {
        PreviewError::ServerError { status, message } => {
            println!("Server Error detected: {} - {}", status, message);
            assert_eq!(status, 500);
        }
        e => panic!("Expected ServerError, got: {:?}", e),
    }
}

#[tokio::test]
async fn test_http_error_yields_no_reply() {
    let server = server_with_status(503).await;
    let text = format!("broken: {}/status", server.uri());

    assert!(local_service()
        .extract_and_preview(&text, BOT)
        .await
        .is_none());
}

#[tokio::test]
async fn test_connection_refused() {
    // grab a free port, then close it again so nothing listens there
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let url = format!("http://127.0.0.1:{port}/");

    match local_service().generate_preview(&url, BOT).await.unwrap_err() {
        PreviewError::ConnectionRefused(msg) => {
            println!("Connection refused detected: {}", msg);
        }
        PreviewError::ConnectionError(msg) => {
            // some platforms only surface a generic connect failure
            println!("Connection Error detected: {}", msg);
        }
        e => panic!("Expected ConnectionRefused or ConnectionError, got: {:?}", e),
    }
}

#[tokio::test]
async fn test_timeout_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html></html>")
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let service = PreviewService::new_with_config(
        PreviewServiceConfig::new().with_fetcher_config(FetcherConfig {
            timeout: Duration::from_millis(200),
            url_validation: UrlValidationConfig::permissive(),
            ..Default::default()
        }),
    )
    .unwrap();

    let url = format!("{}/slow", server.uri());
    match service.generate_preview(&url, BOT).await.unwrap_err() {
        PreviewError::TimeoutError(msg) => {
            println!("Timeout detected: {}", msg);
        }
        e => panic!("Expected TimeoutError, got: {:?}", e),
    }
}

#[tokio::test]
async fn test_error_messages_are_readable() {
    let error = PreviewError::ServerError {
        status: 502,
        message: "Bad Gateway".to_string(),
    };
    assert_eq!(error.to_string(), "Server error (502): Bad Gateway");

    let error = PreviewError::InvalidUrlScheme("ftp".to_string());
    assert_eq!(error.to_string(), "Invalid URL scheme: ftp");
}
