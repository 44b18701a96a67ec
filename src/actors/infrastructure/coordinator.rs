use actix::prelude::*;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::{
    DlqActor, GetSystemHealth, HealthMonitorActor, UpdateHealth, COMPONENT_DLQ, COMPONENT_INGEST,
};
use crate::actors::core::HealthStatus;
use crate::db::OrderStore;
use crate::ingest::{ConsumerConfig, IngestConsumer, IngestionPipeline};
use crate::metrics::Metrics;
use crate::service::OrderService;

// ============================================================================
// Coordinator Actor - Orchestrates the background side of the service
// ============================================================================
//
// Responsibilities:
// - Starts the DlqActor and the HealthMonitorActor
// - Starts the ingest consumer as a task once warm-up is done
// - Reports system health every 30s
// - Coordinates graceful shutdown (consumer first, then child actors)
//
// Hierarchy:
//   CoordinatorActor
//   ├── HealthMonitorActor
//   ├── DlqActor
//   └── IngestConsumer (task, stopped through a watch channel)
//
// ============================================================================

const STORE_PROBE_INTERVAL: Duration = Duration::from_secs(10);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(30);

pub struct CoordinatorActor {
    pool: PgPool,
    store: Arc<dyn OrderStore>,
    service: Arc<OrderService>,
    metrics: Arc<Metrics>,
    consumer_config: ConsumerConfig,
    health_monitor: Option<Addr<HealthMonitorActor>>,
    dlq_actor: Option<Addr<DlqActor>>,
    consumer_task: Option<JoinHandle<()>>,
    consumer_shutdown: Option<watch::Sender<bool>>,
}

impl CoordinatorActor {
    pub fn new(
        pool: PgPool,
        service: Arc<OrderService>,
        metrics: Arc<Metrics>,
        consumer_config: ConsumerConfig,
    ) -> Self {
        Self {
            pool,
            store: service.store(),
            service,
            metrics,
            consumer_config,
            health_monitor: None,
            dlq_actor: None,
            consumer_task: None,
            consumer_shutdown: None,
        }
    }

    fn start_child_actors(&mut self, _ctx: &mut Context<Self>) {
        tracing::info!("Starting supervised child actors");

        let health_monitor =
            HealthMonitorActor::new(self.store.clone(), STORE_PROBE_INTERVAL).start();
        self.health_monitor = Some(health_monitor.clone());

        let dlq_actor = DlqActor::new(self.pool.clone()).start();
        self.dlq_actor = Some(dlq_actor.clone());

        health_monitor.do_send(UpdateHealth {
            component: COMPONENT_DLQ.to_string(),
            status: HealthStatus::Healthy,
            details: Some("DLQ actor started".to_string()),
        });

        let pipeline =
            IngestionPipeline::new(self.service.clone(), Some(dlq_actor), self.metrics.clone());

        match IngestConsumer::new(
            self.consumer_config.clone(),
            pipeline,
            Some(health_monitor.clone()),
        ) {
            Ok(consumer) => {
                let (shutdown_tx, shutdown_rx) = watch::channel(false);
                self.consumer_task = Some(actix::spawn(consumer.run(shutdown_rx)));
                self.consumer_shutdown = Some(shutdown_tx);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to start ingest consumer");
                health_monitor.do_send(UpdateHealth {
                    component: COMPONENT_INGEST.to_string(),
                    status: HealthStatus::Unhealthy(e.to_string()),
                    details: None,
                });
            }
        }

        tracing::info!("✅ Supervised actors started");
    }

    fn stop_child_actors(&mut self) {
        if let Some(dlq_actor) = self.dlq_actor.take() {
            dlq_actor.do_send(StopActor);
        }

        if let Some(health_monitor) = self.health_monitor.take() {
            health_monitor.do_send(StopActor);
        }
    }
}

impl Actor for CoordinatorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("🎯 CoordinatorActor started");
        self.start_child_actors(ctx);

        ctx.run_interval(HEALTH_LOG_INTERVAL, |act, _ctx| {
            if let Some(ref health_monitor) = act.health_monitor {
                let health_monitor = health_monitor.clone();
                actix::spawn(async move {
                    match health_monitor.send(GetSystemHealth).await {
                        Ok(health) => match health.overall_status {
                            HealthStatus::Healthy => {
                                tracing::debug!("System health check: Healthy");
                            }
                            HealthStatus::Degraded(ref msg) => {
                                tracing::warn!("System health check: Degraded - {}", msg);
                            }
                            HealthStatus::Unhealthy(ref msg) => {
                                tracing::error!("System health check: Unhealthy - {}", msg);
                            }
                        },
                        Err(e) => {
                            tracing::error!("Failed to get system health: {}", e);
                        }
                    }
                });
            }
        });
    }

    fn stopped(&mut self, _: &mut Self::Context) {
        tracing::info!("🛑 CoordinatorActor stopped");
    }
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Message)]
#[rtype(result = "Option<Addr<HealthMonitorActor>>")]
pub struct GetHealthMonitor;

impl Handler<GetHealthMonitor> for CoordinatorActor {
    type Result = Option<Addr<HealthMonitorActor>>;

    fn handle(&mut self, _msg: GetHealthMonitor, _: &mut Self::Context) -> Self::Result {
        self.health_monitor.clone()
    }
}

#[derive(Message)]
#[rtype(result = "Option<Addr<DlqActor>>")]
pub struct GetDlqActor;

impl Handler<GetDlqActor> for CoordinatorActor {
    type Result = Option<Addr<DlqActor>>;

    fn handle(&mut self, _msg: GetDlqActor, _: &mut Self::Context) -> Self::Result {
        self.dlq_actor.clone()
    }
}

/// Stop consuming after the message in flight, then stop every child actor.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Shutdown;

impl Handler<Shutdown> for CoordinatorActor {
    type Result = ResponseActFuture<Self, ()>;

    fn handle(&mut self, _msg: Shutdown, _: &mut Self::Context) -> Self::Result {
        tracing::info!("Received shutdown signal");

        if let Some(shutdown) = self.consumer_shutdown.take() {
            let _ = shutdown.send(true);
        }
        let consumer_task = self.consumer_task.take();

        Box::pin(
            async move {
                if let Some(task) = consumer_task {
                    if let Err(e) = task.await {
                        tracing::error!(error = %e, "Ingest consumer task failed");
                    }
                }
            }
            .into_actor(self)
            .map(|_, act, ctx| {
                act.stop_child_actors();
                ctx.stop();
            }),
        )
    }
}

/// Message to gracefully stop an actor
#[derive(Message)]
#[rtype(result = "()")]
struct StopActor;

impl Handler<StopActor> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor received stop signal");
        ctx.stop();
    }
}

impl Handler<StopActor> for DlqActor {
    type Result = ();

    fn handle(&mut self, _: StopActor, ctx: &mut Self::Context) {
        tracing::info!("DlqActor received stop signal");
        ctx.stop();
    }
}
