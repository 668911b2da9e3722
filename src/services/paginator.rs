use std::time::Duration;

use futures::stream::{self, Stream, StreamExt};
use serde_json::Value;
use tokio::time::sleep;

use super::client::{ApiClient, RetryPolicy, SourceError};

const MAX_PAGES: u32 = 10_000;

/// How the source says whether another page follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageSignal {
    NextFlag(bool),
    TotalPages(u32),
    Unknown,
}

#[derive(Debug, Clone)]
pub struct Page {
    pub number: u32,
    pub items: Vec<Value>,
    pub signal: PageSignal,
}

/// Everything collected for one window, including whether it finished.
#[derive(Debug)]
pub struct WindowFetch {
    pub items: Vec<Value>,
    pub pages: u32,
    pub error: Option<SourceError>,
}

impl WindowFetch {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub fn parse_page(body: Value) -> Result<(Vec<Value>, PageSignal), SourceError> {
    let Value::Object(mut body) = body else {
        return Err(SourceError::Decode("page body is not an object".to_string()));
    };

    let items = match body.remove("data") {
        Some(Value::Array(items)) => items,
        Some(Value::Null) | None => Vec::new(),
        Some(other) => {
            return Err(SourceError::Decode(format!("data is not an array: {}", other)));
        }
    };

    let signal = match body.get("pagination") {
        Some(Value::Object(p)) => match (p.get("next_page"), p.get("total_pages")) {
            (Some(next), _) => PageSignal::NextFlag(match next {
                Value::Null => false,
                Value::Bool(b) => *b,
                _ => true,
            }),
            (None, Some(total)) => total
                .as_u64()
                .map(|t| PageSignal::TotalPages(t.min(u32::MAX as u64) as u32))
                .unwrap_or(PageSignal::Unknown),
            (None, None) => PageSignal::Unknown,
        },
        _ => PageSignal::Unknown,
    };

    Ok((items, signal))
}

fn next_page(current: u32, signal: PageSignal) -> Option<u32> {
    match signal {
        PageSignal::NextFlag(false) => None,
        PageSignal::TotalPages(total) if current >= total => None,
        _ => Some(current + 1),
    }
}

struct Cursor {
    page: Option<u32>,
    endpoint: String,
    params: Vec<(&'static str, String)>,
}

/// Drives page-numbered requests against one endpoint.
pub struct Paginator<'a> {
    client: &'a ApiClient,
    retry: RetryPolicy,
    guard: Duration,
    page_size: u32,
}

impl<'a> Paginator<'a> {
    pub fn new(client: &'a ApiClient, retry: RetryPolicy, guard: Duration, page_size: u32) -> Self {
        Self { client, retry, guard, page_size }
    }

    /// Lazy page sequence starting at page 1.
    ///
    /// Ends after an empty page, after the source signals the last page, or
    /// after the first error (which is yielded).
    pub fn pages(
        &self,
        endpoint: &str,
        params: Vec<(&'static str, String)>,
    ) -> impl Stream<Item = Result<Page, SourceError>> + '_ {
        let cursor = Cursor {
            page: Some(1),
            endpoint: endpoint.to_string(),
            params,
        };

        stream::unfold(cursor, move |mut cursor| async move {
            let page = cursor.page?;
            if page > MAX_PAGES {
                cursor.page = None;
                return Some((Err(SourceError::PageLimit(MAX_PAGES)), cursor));
            }
            if page > 1 && !self.guard.is_zero() {
                sleep(self.guard).await;
            }

            let mut query = cursor.params.clone();
            query.push(("page", page.to_string()));
            query.push(("limit", self.page_size.to_string()));

            let fetched = self
                .client
                .call_with_retry(&cursor.endpoint, &query, &self.retry)
                .await
                .and_then(parse_page);

            match fetched {
                Ok((items, signal)) => {
                    tracing::debug!("{} page {}: {} items ({:?})", cursor.endpoint, page, items.len(), signal);
                    cursor.page = if items.is_empty() { None } else { next_page(page, signal) };
                    Some((Ok(Page { number: page, items, signal }), cursor))
                }
                Err(e) => {
                    cursor.page = None;
                    Some((Err(e), cursor))
                }
            }
        })
    }

    /// Collects a whole window, keeping what arrived before any failure.
    pub async fn collect(&self, endpoint: &str, params: Vec<(&'static str, String)>) -> WindowFetch {
        let mut fetch = WindowFetch {
            items: Vec::new(),
            pages: 0,
            error: None,
        };

        let pages = self.pages(endpoint, params);
        futures::pin_mut!(pages);
        while let Some(result) = pages.next().await {
            match result {
                Ok(page) => {
                    fetch.pages += 1;
                    fetch.items.extend(page.items);
                }
                Err(e) => {
                    tracing::warn!(
                        "pagination of {} aborted after {} pages ({} items kept): {}",
                        endpoint,
                        fetch.pages,
                        fetch.items.len(),
                        e
                    );
                    fetch.error = Some(e);
                }
            }
        }

        fetch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nonzero_ext::nonzero;
    use serde_json::json;
    use wiremock::matchers::{path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::services::client::Auth;

    fn no_retry() -> RetryPolicy {
        RetryPolicy {
            max_retries: 0,
            delay: Duration::from_millis(1),
            incrementing: false,
        }
    }

    async fn mount_page(server: &MockServer, page: u32, body: Value) {
        Mock::given(path("/items"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(server)
            .await;
    }

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(&server.uri(), Auth::None, nonzero!(60_000u32)).unwrap()
    }

    #[test]
    fn test_parse_page_signals() {
        let (items, signal) = parse_page(json!({"data": [1], "pagination": {"next_page": 2}})).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(signal, PageSignal::NextFlag(true));

        let (_, signal) =
            parse_page(json!({"data": [], "pagination": {"next_page": null, "total_pages": 9}})).unwrap();
        assert_eq!(signal, PageSignal::NextFlag(false));

        let (_, signal) = parse_page(json!({"data": [], "pagination": {"total_pages": 3}})).unwrap();
        assert_eq!(signal, PageSignal::TotalPages(3));

        let (items, signal) = parse_page(json!({"status": "OK"})).unwrap();
        assert!(items.is_empty());
        assert_eq!(signal, PageSignal::Unknown);

        assert!(parse_page(json!([1, 2])).is_err());
    }

    #[tokio::test]
    async fn test_stops_after_empty_page() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!({"data": [{"uid": 1}, {"uid": 2}]})).await;
        mount_page(&server, 2, json!({"data": [{"uid": 3}, {"uid": 4}]})).await;
        mount_page(&server, 3, json!({"data": []})).await;

        let client = client(&server);
        let paginator = Paginator::new(&client, no_retry(), Duration::ZERO, 2);
        let fetch = paginator.collect("/items", vec![]).await;

        assert!(fetch.is_complete());
        assert_eq!(fetch.items.len(), 4);
        assert_eq!(fetch.pages, 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_respects_next_page_flag() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!({"data": [1, 2], "pagination": {"next_page": 2}})).await;
        mount_page(&server, 2, json!({"data": [3], "pagination": {"next_page": null}})).await;

        let client = client(&server);
        let paginator = Paginator::new(&client, no_retry(), Duration::ZERO, 2);
        let fetch = paginator.collect("/items", vec![("netuid", "1".to_string())]).await;

        assert!(fetch.is_complete());
        assert_eq!(fetch.items.len(), 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_respects_total_pages() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!({"data": [1], "pagination": {"total_pages": 2}})).await;
        mount_page(&server, 2, json!({"data": [2], "pagination": {"total_pages": 2}})).await;

        let client = client(&server);
        let paginator = Paginator::new(&client, no_retry(), Duration::ZERO, 1);
        let fetch = paginator.collect("/items", vec![]).await;

        assert_eq!(fetch.items.len(), 2);
        assert_eq!(fetch.pages, 2);
    }

    #[tokio::test]
    async fn test_error_keeps_partial_results() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!({"data": [1, 2]})).await;
        Mock::given(path("/items"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client(&server);
        let paginator = Paginator::new(&client, no_retry(), Duration::ZERO, 2);
        let fetch = paginator.collect("/items", vec![]).await;

        assert!(!fetch.is_complete());
        assert_eq!(fetch.items.len(), 2);
        assert_eq!(fetch.pages, 1);
        assert!(matches!(fetch.error, Some(SourceError::Transient { status: 500, .. })));
    }

    #[tokio::test]
    async fn test_pages_stream_is_lazy() {
        let server = MockServer::start().await;
        mount_page(&server, 1, json!({"data": [1]})).await;
        mount_page(&server, 2, json!({"data": [2]})).await;

        let client = client(&server);
        let paginator = Paginator::new(&client, no_retry(), Duration::ZERO, 1);
        let pages = paginator.pages("/items", vec![]);
        futures::pin_mut!(pages);
        let first = pages.next().await.unwrap().unwrap();

        assert_eq!(first.number, 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }
}
