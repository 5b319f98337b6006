//! Skips wiremock tests where localhost sockets cannot be bound.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "COLLECTOR_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` when the sandbox forbids binding.
///
/// With `COLLECTOR_REQUIRE_SOCKET_TESTS=1` a bind failure panics instead.
#[track_caller]
pub fn start_mock_server_or_skip() -> impl std::future::Future<Output = Option<MockServer>> {
    let bindable = TcpListener::bind("127.0.0.1:0").is_ok();
    if !bindable {
        let caller = std::panic::Location::caller();
        let required = std::env::var(REQUIRE_ENV)
            .is_ok_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
        assert!(
            !required,
            "cannot bind a localhost socket ({caller}) and {REQUIRE_ENV} is set"
        );
        eprintln!("skipping socket-bound test at {caller}: cannot bind localhost");
    }
    async move {
        if bindable {
            Some(MockServer::start().await)
        } else {
            None
        }
    }
}
