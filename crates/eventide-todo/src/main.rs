//! Todo server binary for the Eventide engine.
//!
//! Wires together the store, the command processor, the projection
//! subscriber, the HTTP endpoints, and (optionally) the bus ingress
//! path, then runs them all under one shutdown signal.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Load configuration from `eventide-config.yaml`
//! 3. Register the todo domain types
//! 4. Connect to `PostgreSQL` and run migrations (store + projection)
//! 5. Assemble the command processor and projection subscriber
//! 6. Pick the ingress path (store-backed, or bus + consumer group)
//! 7. Start the HTTP server
//! 8. Run until ctrl-c

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use eventide_bus::{
    AckMode, BusDispatcher, ConsumerConfig, MemoryBus, SaveCommandWorker, Worker,
    run_consumer_group,
};
use eventide_core::{CommandDispatcher, Registry};
use eventide_engine::{CommandProcessor, Publisher, Service};
use eventide_http::{DomainContext, ServerConfig, domain_router};
use eventide_store::{EventStore, PostgresStore, PostgresStoreConfig, StoreCommandDispatcher};
use eventide_todo::{AppConfig, COMMAND_TOPIC, DOMAIN, TodoAggregate, TodoProjection};
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("eventide-todo starting");

    let config = AppConfig::load(Path::new("eventide-config.yaml"))?;
    info!(
        http_port = config.http.port,
        workers = config.processor.workers,
        bus_enabled = config.bus.enabled,
        "configuration loaded"
    );

    let registry = Arc::new(Registry::new());
    eventide_todo::register(&registry);

    let store_config = PostgresStoreConfig::new(&config.database.url)
        .with_max_connections(config.database.max_connections);
    let store = PostgresStore::connect(&store_config).await?;
    store.migrate().await?;

    let projection = TodoProjection::new(store.pool().clone());
    projection.migrate().await?;
    info!("migrations completed");

    let shared_store: Arc<dyn EventStore> = Arc::new(store);

    let processor = CommandProcessor::new(
        config.processor.workers,
        Arc::clone(&shared_store),
        Arc::clone(&registry),
        DOMAIN,
    )
    .with_batch_limit(config.processor.batch_limit)
    .with_tick_interval(Duration::from_millis(config.processor.tick_interval_ms));

    let mut service = Service::new(Arc::clone(&shared_store))
        .with_processor(processor)
        .with_publishers(vec![Arc::new(projection) as Arc<dyn Publisher>]);

    // Ingress: either straight into the store, or through the bus with a
    // consumer group draining the topic into the store.
    let dispatcher: Arc<dyn CommandDispatcher> = if config.bus.enabled {
        let bus = MemoryBus::new(config.bus.partitions);
        let transports: Vec<_> = (0..config.bus.consumers.max(1))
            .map(|_| bus.consumer(COMMAND_TOPIC, &config.bus.group))
            .collect();
        let worker: Arc<dyn Worker> =
            Arc::new(SaveCommandWorker::new(Arc::clone(&shared_store)));
        service = service.with_task("command_bus_listener", move |shutdown| async move {
            run_consumer_group(transports, worker, ConsumerConfig::default(), shutdown).await?;
            Ok(())
        });
        info!(
            partitions = config.bus.partitions,
            consumers = config.bus.consumers,
            group = %config.bus.group,
            "bus ingress enabled"
        );
        Arc::new(BusDispatcher::new(
            Arc::new(bus.producer(COMMAND_TOPIC)),
            DOMAIN,
            AckMode::WaitForAck,
        ))
    } else {
        Arc::new(StoreCommandDispatcher::new(DOMAIN, Arc::clone(&shared_store)))
    };

    let ctx = Arc::new(DomainContext {
        domain: DOMAIN.to_owned(),
        store: Arc::clone(&shared_store),
        registry,
        dispatcher,
        aggregate_factory: Arc::new(|| Box::new(TodoAggregate::new())),
    });
    let router = domain_router(ctx);
    let server_config = ServerConfig {
        host: config.http.host.clone(),
        port: config.http.port,
    };
    service = service.with_task("http_server", move |shutdown| async move {
        eventide_http::serve(&server_config, router, shutdown).await?;
        Ok(())
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, shutting down");
        let _ = shutdown_tx.send(true);
    });

    service.run(shutdown_rx).await?;
    info!("eventide-todo shutdown complete");
    Ok(())
}
