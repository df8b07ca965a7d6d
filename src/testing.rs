//! Helpers for driving the blocking HTTP clients against a `wiremock` server.

/// Runs blocking client code off the async runtime that serves the mocks.
pub(crate) async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .expect("blocking task panicked")
}
