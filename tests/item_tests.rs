use crawlkit::prelude::*;
use crawlkit::{ExchangeOptions, FnPipeline, WireRequest, WireResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn settings() -> Settings {
    Settings {
        poll_interval: Duration::from_millis(5),
        ..Settings::default()
    }
}

/// Collects every item that reaches it as a string.
#[derive(Default)]
struct Collect {
    seen: Mutex<Vec<String>>,
}

impl Collect {
    fn pipeline(self: &Arc<Self>, name: &str) -> impl Pipeline {
        let this = Arc::clone(self);
        FnPipeline::new(name, move |item: &Item, _ctx: &Context| {
            let text = if let Some(s) = item.downcast_ref::<String>() {
                s.clone()
            } else if let Some(n) = item.downcast_ref::<u64>() {
                n.to_string()
            } else {
                format!("<{}>", item.type_name())
            };
            this.seen.lock().push(text);
            Ok(None)
        })
    }

    fn sorted(&self) -> Vec<String> {
        let mut seen = self.seen.lock().clone();
        seen.sort();
        seen
    }
}

async fn feed(crawler: &Crawler, items: impl IntoIterator<Item = Item>) {
    crawler.start().unwrap();
    let ctx = crawler.context();
    for item in items {
        ctx.emit(item);
    }
    assert!(crawler.wait_timeout(Duration::from_secs(5)).await);
    crawler.close().await;
}

#[tokio::test]
async fn type_functions_replace_or_drop_items() {
    let collect = Arc::new(Collect::default());
    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .on_item_type::<u32, _>(|n, _ctx| Some(Item::new(u64::from(n) * 2)))
        .on_item_type::<&'static str, _>(|_, _ctx| None)
        .add_pipeline(collect.pipeline("collect"))
        .build()
        .unwrap();

    feed(
        &crawler,
        [
            Item::new(1u32),
            Item::new(20u32),
            Item::new("ignored"),
            Item::new(String::from("kept")),
        ],
    )
    .await;

    assert_eq!(collect.sorted(), ["2", "40", "kept"]);
    let stats = crawler.stats();
    assert_eq!(stats.items_scraped(), 4);
    assert_eq!(stats.items_dropped(), 1);
    assert_eq!(stats.items_processed(), 3);
}

#[tokio::test]
async fn catch_all_runs_after_the_type_function() {
    let order = Arc::new(Mutex::new(Vec::new()));
    let typed = Arc::clone(&order);
    let any = Arc::clone(&order);
    let collect = Arc::new(Collect::default());
    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .on_item_type::<String, _>(move |s, _ctx| {
            typed.lock().push("typed");
            Some(Item::new(format!("{s}!")))
        })
        .on_item(move |item, _ctx| {
            any.lock().push("catch-all");
            if item.is::<u64>() {
                None
            } else {
                Some(item)
            }
        })
        .add_pipeline(collect.pipeline("collect"))
        .build()
        .unwrap();

    feed(&crawler, [Item::new(String::from("hi"))]).await;
    assert_eq!(*order.lock(), ["typed", "catch-all"]);
    assert_eq!(collect.sorted(), ["hi!"]);

    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .on_item(|item, _ctx| if item.is::<u64>() { None } else { Some(item) })
        .add_pipeline(collect.pipeline("collect"))
        .build()
        .unwrap();
    feed(&crawler, [Item::new(7u64)]).await;
    assert_eq!(collect.sorted(), ["hi!"]);
    assert_eq!(crawler.stats().items_dropped(), 1);
}

#[tokio::test]
async fn pipelines_run_in_order_and_none_keeps_the_item() {
    let collect = Arc::new(Collect::default());
    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .add_pipeline_fn("append", |item, _ctx| {
            let s = item.downcast_ref::<String>().cloned().unwrap_or_default();
            Ok(Some(Item::new(format!("{s}-a"))))
        })
        .add_pipeline_fn("observe", |_item, _ctx| Ok(None))
        .add_pipeline_fn("append-again", |item, _ctx| {
            let s = item.downcast_ref::<String>().cloned().unwrap_or_default();
            Ok(Some(Item::new(format!("{s}-c"))))
        })
        .add_pipeline(collect.pipeline("collect"))
        .build()
        .unwrap();

    feed(&crawler, [Item::new(String::from("x"))]).await;
    assert_eq!(collect.sorted(), ["x-a-c"]);
    assert_eq!(crawler.stats().items_processed(), 1);
}

#[tokio::test]
async fn failing_items_do_not_take_down_the_worker() {
    let collect = Arc::new(Collect::default());
    let crawler = CrawlerBuilder::new()
        .settings(Settings {
            item_workers: 1,
            max_concurrent_process_items: 1,
            ..settings()
        })
        .add_pipeline_fn("guard", |item, _ctx| {
            match item.downcast_ref::<String>().map(String::as_str) {
                Some("bad") => Err(PipelineError::Rejected {
                    pipeline: "guard".into(),
                    reason: "bad item".into(),
                }),
                Some("boom") => panic!("pipeline exploded"),
                _ => Ok(None),
            }
        })
        .add_pipeline(collect.pipeline("collect"))
        .build()
        .unwrap();

    feed(
        &crawler,
        ["one", "bad", "boom", "two"].map(|s| Item::new(s.to_string())),
    )
    .await;

    assert_eq!(collect.sorted(), ["one", "two"]);
    let stats = crawler.stats();
    assert_eq!(stats.items_dropped(), 2);
    assert_eq!(stats.items_processed(), 2);
    assert!(crawler.engine().is_idle());
}

struct Closing {
    closed: AtomicBool,
    fail: bool,
}

#[async_trait]
impl Pipeline for Closing {
    fn name(&self) -> &str {
        if self.fail {
            "failing"
        } else {
            "closing"
        }
    }

    async fn process_item(
        &self,
        _item: &Item,
        _ctx: &Context,
    ) -> Result<Option<Item>, PipelineError> {
        Ok(None)
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.closed.store(true, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::Rejected {
                pipeline: "failing".into(),
                reason: "disk full".into(),
            });
        }
        Ok(())
    }
}

struct Shared(Arc<Closing>);

#[async_trait]
impl Pipeline for Shared {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn process_item(
        &self,
        item: &Item,
        ctx: &Context,
    ) -> Result<Option<Item>, PipelineError> {
        self.0.process_item(item, ctx).await
    }

    async fn close(&self) -> Result<(), PipelineError> {
        self.0.close().await
    }
}

#[tokio::test]
async fn every_pipeline_is_closed_even_if_one_fails() {
    let failing = Arc::new(Closing {
        closed: AtomicBool::new(false),
        fail: true,
    });
    let closing = Arc::new(Closing {
        closed: AtomicBool::new(false),
        fail: false,
    });
    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .add_pipeline(Shared(Arc::clone(&failing)))
        .add_pipeline(Shared(Arc::clone(&closing)))
        .build()
        .unwrap();

    crawler.run().await.unwrap();
    assert!(failing.closed.load(Ordering::SeqCst));
    assert!(closing.closed.load(Ordering::SeqCst));
}

#[derive(Default)]
struct Slow {
    active: AtomicUsize,
    peak: AtomicUsize,
}

struct SlowPipeline(Arc<Slow>);

#[async_trait]
impl Pipeline for SlowPipeline {
    fn name(&self) -> &str {
        "slow"
    }

    async fn process_item(
        &self,
        _item: &Item,
        _ctx: &Context,
    ) -> Result<Option<Item>, PipelineError> {
        let slow = &self.0;
        let now = slow.active.fetch_add(1, Ordering::SeqCst) + 1;
        slow.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        slow.active.fetch_sub(1, Ordering::SeqCst);
        Ok(None)
    }
}

#[tokio::test]
async fn item_processing_respects_its_own_limit() {
    let slow = Arc::new(Slow::default());
    let crawler = CrawlerBuilder::new()
        .settings(Settings {
            item_workers: 6,
            max_concurrent_process_items: 2,
            ..settings()
        })
        .add_pipeline(SlowPipeline(Arc::clone(&slow)))
        .build()
        .unwrap();

    feed(&crawler, (0..12u32).map(Item::new)).await;

    let peak = slow.peak.load(Ordering::SeqCst);
    assert!(peak <= 2, "saw {peak} items processed at once");
    assert_eq!(crawler.stats().items_processed(), 12);
}

struct Pages;

#[async_trait]
impl Transport for Pages {
    async fn exchange(
        &self,
        request: WireRequest,
        _options: &ExchangeOptions,
    ) -> Result<WireResponse, CrawlError> {
        let body = format!("<html><body><h1>{}</h1></body></html>", request.url.path());
        Ok(WireResponse::new(200).with_body(body))
    }
}

#[tokio::test]
async fn items_carry_the_context_that_emitted_them() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let crawler = CrawlerBuilder::new()
        .settings(settings())
        .transport(Pages)
        .on_response(|response, ctx| {
            if let Ok(headings) = response.css("h1") {
                for heading in headings.texts() {
                    ctx.add_item(heading);
                }
            }
        })
        .add_pipeline_fn("lineage", move |item, ctx| {
            sink.lock().push((
                item.downcast_ref::<String>().cloned(),
                ctx.depth(),
                ctx.last_response().map(|r| r.url().to_string()),
            ));
            Ok(None)
        })
        .start_url("http://pages.test/about")
        .build()
        .unwrap();
    crawler.run().await.unwrap();

    assert_eq!(
        *seen.lock(),
        [(
            Some("/about".to_string()),
            1,
            Some("http://pages.test/about".to_string())
        )]
    );
}
