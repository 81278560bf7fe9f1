//! Tributary block sync module for Caryatid
//!
//! Receives blocks from the network layer and keeps them in a
//! [`BlockCollection`]: a canonical queue that extends durable storage plus a
//! pool of competing forks. Queued blocks are proposed to the validator in
//! height order and committed to the [`ChainStore`] once found valid. When a
//! fork overtakes the canonical chain, storage is rolled back and the
//! displaced transactions are published for replay.

pub mod block_collection;
pub mod chain_segment;
pub mod chain_store;
pub mod collection_error;
mod configuration;
pub mod pending_block;
pub mod production;
pub mod sync_handler;

use std::sync::Arc;

use anyhow::{anyhow, Result};
use caryatid_sdk::{async_trait, Context, Module};
use config::Config;
use futures::try_join;
use tokio::sync::Mutex;
use tracing::{error, info, info_span, warn, Instrument};
use tributary_common::messages::Message;

use crate::{
    block_collection::BlockCollection,
    chain_store::ChainStore,
    configuration::BlockSyncConfig,
    production::ProductionSchedule,
    sync_handler::{SyncEvent, SyncHandler},
};

/// Block sync module, generic over its durable storage.
///
/// Register an instance with the process; the store is moved into the engine
/// when the module initialises.
pub struct BlockSync<S: ChainStore> {
    store: Mutex<Option<S>>,
    production: ProductionSchedule,
}

impl<S: ChainStore> BlockSync<S> {
    pub fn new(store: S, production: ProductionSchedule) -> Self {
        Self {
            store: Mutex::new(Some(store)),
            production,
        }
    }
}

async fn publish_events(context: &Context<Message>, cfg: &BlockSyncConfig, events: Vec<SyncEvent>) {
    for event in events {
        let (topic, message) = match event {
            SyncEvent::Proposed(proposed) => (&cfg.proposed_topic, Message::BlockProposed(proposed)),
            SyncEvent::Committed(committed) => {
                (&cfg.committed_topic, Message::BlockCommitted(committed))
            }
            SyncEvent::Rollback(rollback) => (&cfg.rollback_topic, Message::Rollback(rollback)),
        };
        context
            .message_bus
            .publish(topic, Arc::new(message))
            .await
            .unwrap_or_else(|e| error!("Failed to publish on {topic}: {e}"));
    }
}

#[async_trait]
impl<S> Module<Message> for BlockSync<S>
where
    S: ChainStore,
{
    fn get_name(&self) -> &'static str {
        "block-sync"
    }

    fn get_description(&self) -> &'static str {
        "Block sync and fork choice"
    }

    async fn init(&self, context: Arc<Context<Message>>, config: Arc<Config>) -> Result<()> {
        let cfg = BlockSyncConfig::try_load(&config)?;
        info!(
            chain = %cfg.chain_id,
            "Round window {}, receiving blocks on '{}'",
            cfg.round_window, cfg.received_topic
        );

        let store = self.store.lock().await.take().ok_or_else(|| anyhow!("block sync already initialised"))?;
        let collection = BlockCollection::new(
            cfg.collection_config(),
            store,
            Box::new(self.production.clone()),
        )?;
        let handler = Arc::new(Mutex::new(SyncHandler::new(collection)));

        let (mut received_subscription, mut validation_subscription, mut production_subscription) =
            try_join!(
                context.subscribe(&cfg.received_topic),
                context.subscribe(&cfg.validation_topic),
                context.subscribe(&cfg.production_topic),
            )?;

        // Answer status queries
        let query_handler = handler.clone();
        context.handle(&cfg.status_topic, move |message| {
            let handler = query_handler.clone();
            async move {
                let Message::SyncStatusQuery = message.as_ref() else {
                    warn!("Unexpected message on sync status topic");
                    return Arc::new(Message::None(()));
                };
                match handler.lock().await.status() {
                    Ok(status) => Arc::new(Message::SyncStatus(status)),
                    Err(e) => {
                        error!("Sync status unavailable: {e}");
                        Arc::new(Message::None(()))
                    }
                }
            }
        });

        let production = self.production.clone();
        context.clone().run(async move {
            loop {
                tokio::select! {
                    result = received_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Block message read failed");
                            return;
                        };
                        let Message::BlockReceived(received) = message.as_ref() else {
                            warn!("Unexpected message on '{}'", cfg.received_topic);
                            continue;
                        };

                        let header = &received.block.header;
                        let span = info_span!("block-sync", height = header.height, hash = %header.hash);
                        async {
                            let outcome = handler.lock().await.handle_received(received);
                            match outcome {
                                Ok(events) => publish_events(&context, &cfg, events).await,
                                Err(e) => error!("Dropping block: {e}"),
                            }
                        }
                        .instrument(span)
                        .await;
                    }

                    result = validation_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Validation message read failed");
                            return;
                        };
                        let Message::BlockValidation(validation) = message.as_ref() else {
                            warn!("Unexpected message on '{}'", cfg.validation_topic);
                            continue;
                        };

                        let span = info_span!("block-sync-verdict", hash = %validation.hash);
                        async {
                            let outcome = handler.lock().await.handle_validation(validation);
                            match outcome {
                                Ok(events) => publish_events(&context, &cfg, events).await,
                                Err(e) => error!("Dropping verdict: {e}"),
                            }
                        }
                        .instrument(span)
                        .await;
                    }

                    result = production_subscription.read() => {
                        let Ok((_, message)) = result else {
                            error!("Production status read failed");
                            return;
                        };
                        if let Message::ProductionStatus(status) = message.as_ref() {
                            info!("Local block production {}", if status.producing { "started" } else { "stopped" });
                            production.set_producing(status.producing);
                        }
                    }
                }
            }
        });

        Ok(())
    }
}
