use crawlkit::prelude::*;
use crawlkit::{ReqwestTransport, WireRequest};
use mockito::{Matcher, Server};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn quick_settings() -> Settings {
    Settings {
        poll_interval: Duration::from_millis(5),
        request_timeout: Duration::from_secs(5),
        ..Settings::default()
    }
}

#[tokio::test]
async fn reqwest_transport_does_not_follow_redirects() {
    let mut server = Server::new_async().await;
    let moved = server
        .mock("GET", "/old")
        .with_status(302)
        .with_header("location", "/new")
        .create_async()
        .await;
    let target = server.mock("GET", "/new").expect(0).create_async().await;

    let settings = Settings::default();
    let transport = ReqwestTransport::new(&settings).unwrap();
    let request = Request::get(format!("{}/old", server.url()));
    let (wire, options) = WireRequest::build(&request, &settings).unwrap();
    let response = transport.exchange(wire, &options).await.unwrap();

    assert_eq!(response.status, 302);
    assert_eq!(response.headers.get("Location"), Some("/new"));
    moved.assert_async().await;
    target.assert_async().await;
}

#[tokio::test]
async fn reqwest_transport_sends_cookies_host_and_user_agent() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/whoami")
        .match_header("cookie", "lang=en; theme=dark")
        .match_header("host", "internal.example")
        .match_header("user-agent", "crawlkit-tests/1.0")
        .match_header("x-trace", "42")
        .with_status(200)
        .with_body("ok")
        .create_async()
        .await;

    let settings = Settings {
        user_agent: Some("crawlkit-tests/1.0".into()),
        ..Settings::default()
    };
    let transport = ReqwestTransport::new(&settings).unwrap();
    let request = Request::get(format!("{}/whoami", server.url()))
        .with_cookie("theme", "dark")
        .with_cookie("lang", "en")
        .with_host("internal.example")
        .with_header("X-Trace", "42");
    let (wire, options) = WireRequest::build(&request, &settings).unwrap();
    let response = transport.exchange(wire, &options).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(&response.body[..], b"ok");
    mock.assert_async().await;
}

#[tokio::test]
async fn query_arguments_and_form_bodies_reach_the_server() {
    let mut server = Server::new_async().await;
    let search = server
        .mock("GET", "/search")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("q".into(), "rust lang".into()),
            Matcher::UrlEncoded("page".into(), "2".into()),
        ]))
        .with_status(200)
        .create_async()
        .await;
    let login = server
        .mock("POST", "/login")
        .match_header("content-type", "application/x-www-form-urlencoded")
        .match_body(Matcher::UrlEncoded("user".into(), "me".into()))
        .with_status(204)
        .create_async()
        .await;

    let crawler = CrawlerBuilder::new()
        .settings(quick_settings())
        .start_requests([
            Request::get_with_args(
                format!("{}/search", server.url()),
                [("q", "rust lang"), ("page", "2")],
            ),
            Request::form(format!("{}/login", server.url()), [("user", "me")]),
        ])
        .build()
        .unwrap();
    crawler.run().await.unwrap();

    search.assert_async().await;
    login.assert_async().await;
    assert_eq!(crawler.stats().requests_succeeded(), 2);
    assert_eq!(crawler.stats().status_count(204), 1);
}

#[tokio::test]
async fn crawl_follows_a_redirect_and_reads_cookies() {
    let mut server = Server::new_async().await;
    let base = server.url();
    server
        .mock("GET", "/start")
        .with_status(301)
        .with_header("location", "/landing")
        .create_async()
        .await;
    server
        .mock("GET", "/landing")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_header("set-cookie", "session=abc123; Path=/; HttpOnly")
        .with_body(r#"<html><body><a href="/next">next</a><h1>Landing</h1></body></html>"#)
        .create_async()
        .await;
    let next = server
        .mock("GET", "/next")
        .match_header("referer", Matcher::Regex("/landing$".into()))
        .with_status(200)
        .with_body("<html><body><h1>Next</h1></body></html>")
        .create_async()
        .await;

    let seen: Arc<Mutex<Vec<(String, Option<String>, usize, Vec<String>)>>> = Arc::default();
    let record = Arc::clone(&seen);
    let crawler = CrawlerBuilder::new()
        .settings(quick_settings())
        .on_response(move |response, ctx| {
            let headings = response.css("h1").map(|s| s.texts()).unwrap_or_default();
            record.lock().push((
                response.url().to_string(),
                response.cookie("session").map(str::to_string),
                response.history().len(),
                headings,
            ));
            if let Ok(links) = response.css("a[href]") {
                for href in links.attrs("href") {
                    if let Ok(url) = url_join(response.url(), &href) {
                        ctx.add_request(Request::get(url));
                    }
                }
            }
        })
        .start_url(format!("{base}/start"))
        .build()
        .unwrap();
    crawler.run().await.unwrap();

    let mut seen = seen.lock().clone();
    seen.sort();
    assert_eq!(seen.len(), 2);
    assert_eq!(
        seen[0],
        (
            format!("{base}/landing"),
            Some("abc123".to_string()),
            1,
            vec!["Landing".to_string()]
        )
    );
    assert_eq!(seen[1].0, format!("{base}/next"));
    assert_eq!(seen[1].3, ["Next"]);
    next.assert_async().await;
    assert_eq!(crawler.stats().requests_redirected(), 1);
    assert_eq!(crawler.stats().status_count(301), 1);
}

#[tokio::test]
async fn refused_connections_are_retried_then_reported_once() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::default();
    let sink = Arc::clone(&errors);
    let crawler = CrawlerBuilder::new()
        .settings(Settings {
            max_retry_times: 2,
            ..quick_settings()
        })
        .on_error(move |request, err, _ctx| {
            sink.lock()
                .push(format!("{} {} {}", request.url, request.retry_times, err))
        })
        .start_url("http://127.0.0.1:1/")
        .build()
        .unwrap();
    crawler.run().await.unwrap();

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].starts_with("http://127.0.0.1:1/ 2 "));
    assert_eq!(crawler.stats().requests_sent(), 3);
    assert_eq!(crawler.stats().requests_retried(), 2);
    assert_eq!(crawler.stats().requests_failed(), 1);
    assert_eq!(crawler.stats().responses_received(), 0);
}
