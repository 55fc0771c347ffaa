//! Load testing for the hedging proxy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use hedging_proxy::config::ProxyConfig;

mod common;
use common::{MockReply, ReceivedRequest};

#[tokio::test]
async fn test_concurrent_identical_requests_all_succeed() {
    let hits = Arc::new(AtomicUsize::new(0));
    let backend_hits = hits.clone();
    let backend = common::start_programmable_backend(move |_| {
        backend_hits.fetch_add(1, Ordering::SeqCst);
        async { MockReply::ok("Hello from backend").after(Duration::from_millis(50)) }
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;

    let concurrency = 50;
    let client = common::client();
    let target = format!("http://{backend}/");
    let start = Instant::now();

    let requests = (0..concurrency).map(|_| {
        let client = client.clone();
        let url = format!("http://{proxy}/");
        let target = target.clone();
        async move {
            let res = client
                .get(&url)
                .header("X-Target-Url", target)
                .send()
                .await
                .unwrap();
            (res.status(), res.text().await.unwrap())
        }
    });

    for (status, body) in join_all(requests).await {
        assert!(status.is_success());
        assert_eq!(body, "Hello from backend");
    }

    let elapsed = start.elapsed();
    println!("{concurrency} hedged requests in {elapsed:?}");

    // Every caller dispatches exactly one attempt, whether or not it wins.
    assert_eq!(hits.load(Ordering::SeqCst), concurrency);

    shutdown.trigger();
}

#[tokio::test]
async fn test_many_distinct_targets() {
    let backend = common::start_programmable_backend(|req: ReceivedRequest| async move {
        let path = req.head.split_whitespace().nth(1).unwrap_or("/").to_string();
        MockReply::ok(path)
    })
    .await;
    let (proxy, shutdown) = common::start_proxy(ProxyConfig::default()).await;

    let client = common::client();
    let mut tasks = Vec::new();
    for i in 0..40 {
        let client = client.clone();
        let url = format!("http://{proxy}/");
        let target = format!("http://{backend}/item/{i}");
        tasks.push(tokio::spawn(async move {
            let res = client
                .get(&url)
                .header("X-Target-Url", target)
                .send()
                .await
                .unwrap();
            (i, res.text().await.unwrap())
        }));
    }

    for task in tasks {
        let (i, body) = task.await.unwrap();
        assert_eq!(body, format!("/item/{i}"));
    }

    shutdown.trigger();
}
