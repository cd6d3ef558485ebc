//! Contains the item processing side of the engine.
//!
//! A fixed pool of `item_workers` workers drains the item queue. Each item
//! takes a permit from a semaphore sized `max_concurrent_process_items`
//! before it runs through the type function, the catch-all function and the
//! pipelines. Processing runs under `catch_unwind` so a panicking function
//! or pipeline costs only the item it was handling.

use super::engine::EngineShared;
use crate::item::ItemEnvelope;
use futures_util::FutureExt;
use kanal::AsyncReceiver;
use log::{debug, error, trace, warn};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) fn spawn_item_dispatcher(
    shared: Arc<EngineShared>,
    item_rx: AsyncReceiver<ItemEnvelope>,
) -> tokio::task::JoinHandle<()> {
    let item_workers = shared.settings.item_workers;
    let max_concurrent_items = shared.settings.max_concurrent_process_items;
    let semaphore = Arc::new(Semaphore::new(max_concurrent_items));

    tokio::spawn(async move {
        trace!(
            "Starting {} item workers with max_concurrent_process_items: {}",
            item_workers,
            max_concurrent_items
        );
        let mut workers = JoinSet::new();
        for worker_id in 0..item_workers {
            let item_rx_clone = item_rx.clone();
            let semaphore_clone = Arc::clone(&semaphore);
            let shared_clone = Arc::clone(&shared);

            workers.spawn(async move {
                while let Ok(envelope) = item_rx_clone.recv().await {
                    let permit = match semaphore_clone.clone().acquire_owned().await {
                        Ok(p) => p,
                        Err(_) => {
                            warn!("Semaphore closed, shutting down item worker {}.", worker_id);
                            break;
                        }
                    };
                    let _guard = shared_clone.state.begin_item();
                    let type_name = envelope.item.type_name();
                    let outcome = AssertUnwindSafe(process_item(&shared_clone, envelope))
                        .catch_unwind()
                        .await;
                    if outcome.is_err() {
                        error!(
                            "Item worker {} panicked while processing {}; item dropped",
                            worker_id, type_name
                        );
                        shared_clone.stats.increment_items_dropped();
                    }
                    drop(permit);
                }
                trace!("Item worker {} finished", worker_id);
            });
        }
        drop(item_rx);

        while let Some(res) = workers.join_next().await {
            if let Err(e) = res {
                error!("An item worker failed: {:?}", e);
            }
        }
        trace!("Item dispatcher finished");
    })
}

async fn process_item(shared: &EngineShared, envelope: ItemEnvelope) {
    let ItemEnvelope { item, context } = envelope;
    let hooks = &shared.hooks;

    let mut item = item;
    if let Some(item_fn) = hooks.item_fns.get(&item.type_id()) {
        let type_name = item.type_name();
        match item_fn(item, &context) {
            Some(next) => item = next,
            None => {
                debug!("Item function dropped {}", type_name);
                shared.stats.increment_items_dropped();
                return;
            }
        }
    }
    if let Some(catch_all) = &hooks.catch_all {
        let type_name = item.type_name();
        match catch_all(item, &context) {
            Some(next) => item = next,
            None => {
                debug!("Catch-all item function dropped {}", type_name);
                shared.stats.increment_items_dropped();
                return;
            }
        }
    }

    for pipeline in &hooks.pipelines {
        match pipeline.process_item(&item, &context).await {
            Ok(Some(next)) => {
                trace!("Pipeline '{}' replaced the item", pipeline.name());
                item = next;
            }
            Ok(None) => trace!("Pipeline '{}' kept the item unchanged", pipeline.name()),
            Err(e) => {
                error!("Pipeline '{}' error: {}", pipeline.name(), e);
                shared.stats.increment_items_dropped();
                return;
            }
        }
    }

    trace!("Item {} passed every pipeline", item.type_name());
    shared.stats.increment_items_processed();
}
