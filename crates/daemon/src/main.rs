//! pullq - Main Entry Point
//! Runs the consume engine against in-process broker nodes fed by a demo producer

mod cli;
mod demo;
mod logging;
mod telemetry;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use cli::Args;
use demo::{DemoProducer, LoggingListener};
use pullq_core::application::{shutdown_channel, ShutdownToken};
use pullq_core::port::SystemTimeProvider;
use pullq_core::{Consumer, ConsumerPorts};
use pullq_infra_memory::{
    BrokerConfig, CachedRouter, MemoryBroker, MemoryCluster, MemoryTransport, TransportConfig,
};

const BROKER_NAME: &str = "pullq-broker";
const BROKER_PORT: u16 = 6000;
const PRODUCER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration and logging
    let args = Args::parse();
    let _log_guard = logging::init(args.log_format, args.log_dir.as_deref())?;

    info!("pullq v{} starting...", pullq_core::VERSION);

    let queues = args.queue_names()?;
    let config = args.consumer_config();
    config.validate()?;

    // 2. Broker store hosting every queue, fronted by `brokers` nodes
    let clock = Arc::new(SystemTimeProvider);
    let broker = Arc::new(MemoryBroker::new(
        BROKER_NAME,
        BrokerConfig {
            visibility_timeout: args.visibility_timeout(),
            ..BrokerConfig::default()
        },
        clock.clone(),
    ));
    for queue in &queues {
        broker.create_queue(queue)?;
    }
    let cluster = Arc::new(MemoryCluster::new());
    for i in 0..args.brokers.max(1) {
        cluster.add_node(format!("broker-{}:{}", i, BROKER_PORT), broker.clone());
    }

    // 3. Ports (DI wiring)
    let router = Arc::new(CachedRouter::new(cluster.clone(), clock.clone()).with_ttl(args.route_ttl()));
    let transport = Arc::new(MemoryTransport::new(cluster.clone(), TransportConfig::default()));
    let consumer = Consumer::new(ConsumerPorts::new(router, transport), config)?;

    // 4. Subscriptions
    let listener = Arc::new(LoggingListener::new(args.nack_every));
    for queue in &queues {
        consumer.subscribe(queue.clone(), listener.clone()).await?;
    }

    // 5. Demo producer and stats
    let (stop_tx, stop) = shutdown_channel();
    let producer = args.produce_interval().map(|interval| {
        let producer = DemoProducer::new(broker.clone(), queues.clone(), interval);
        tokio::spawn(producer.run(stop.clone()))
    });
    let consumer = Arc::new(consumer);
    tokio::spawn(log_stats(
        consumer.clone(),
        broker.clone(),
        args.stats_interval(),
        stop.clone(),
    ));

    info!(queues = ?queues, brokers = args.brokers.max(1), "System ready");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal (or the configured run time)
    match args.run_for_secs {
        Some(secs) => {
            tokio::select! {
                res = tokio::signal::ctrl_c() => res?,
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                    info!(secs, "Run time elapsed");
                }
            }
        }
        None => tokio::signal::ctrl_c().await?,
    }

    info!("Shutdown signal received. Exiting gracefully...");

    // 7. Graceful shutdown: stop producing, then stop pulling
    stop_tx.shutdown();
    if let Some(handle) = producer {
        match tokio::time::timeout(PRODUCER_STOP_TIMEOUT, handle).await {
            Ok(Ok(sent)) => info!(sent, "Producer stopped"),
            Ok(Err(e)) => warn!(error = %e, "Producer task failed"),
            Err(_) => warn!("Producer did not stop in time"),
        }
    }
    consumer.shutdown().await;

    info!(
        seen = listener.seen(),
        acked = listener.acked(),
        "Shutdown complete."
    );
    telemetry::shutdown();

    Ok(())
}

async fn log_stats(
    consumer: Arc<Consumer>,
    broker: Arc<MemoryBroker>,
    every: Duration,
    mut stop: ShutdownToken,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = stop.wait() => break,
            _ = ticker.tick() => {}
        }

        for stats in consumer.stats().await {
            let stored = broker.queue_stats(&stats.queue).unwrap_or_default();
            info!(
                queue = %stats.queue,
                state = %stats.state,
                pulls_in_flight = stats.in_flight,
                task_depth = stats.queue_depth,
                workers = stats.live_workers,
                busy_workers = stats.active_workers,
                broker_visible = stored.visible,
                broker_in_flight = stored.in_flight,
                "Consumer stats"
            );
        }
    }
}
