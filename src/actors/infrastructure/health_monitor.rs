use actix::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actors::core::{ComponentHealth, HealthStatus};
use crate::db::OrderStore;

// ============================================================================
// Health Monitor Actor - Monitors system health
// ============================================================================
//
// Responsibilities:
// - Track the last reported status of every component
// - Probe PostgreSQL on a fixed interval
// - Aggregate system-wide health for the /health endpoint
//
// Components report themselves via UpdateHealth (the ingest consumer, the DLQ
// actor); the database is probed directly.
//
// ============================================================================

pub const COMPONENT_POSTGRES: &str = "postgres";
pub const COMPONENT_INGEST: &str = "ingest_consumer";
pub const COMPONENT_DLQ: &str = "dlq_actor";

// ============================================================================
// Messages
// ============================================================================

#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct UpdateHealth {
    pub component: String,
    pub status: HealthStatus,
    pub details: Option<String>,
}

#[derive(Message)]
#[rtype(result = "SystemHealth")]
pub struct GetSystemHealth;

#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub overall_status: HealthStatus,
    pub components: HashMap<String, ComponentHealth>,
    pub check_time: chrono::DateTime<Utc>,
}

// ============================================================================
// Health Monitor Actor
// ============================================================================

pub struct HealthMonitorActor {
    components: HashMap<String, ComponentHealth>,
    store: Option<Arc<dyn OrderStore>>,
    probe_interval: Duration,
}

impl HealthMonitorActor {
    pub fn new(store: Arc<dyn OrderStore>, probe_interval: Duration) -> Self {
        Self {
            components: HashMap::new(),
            store: Some(store),
            probe_interval,
        }
    }

    fn compute_overall_status(&self) -> HealthStatus {
        let mut has_degraded = false;
        let mut unhealthy_components = Vec::new();

        for (name, health) in &self.components {
            match &health.status {
                HealthStatus::Unhealthy(msg) => {
                    unhealthy_components.push(format!("{}: {}", name, msg));
                }
                HealthStatus::Degraded(_) => {
                    has_degraded = true;
                }
                HealthStatus::Healthy => {}
            }
        }

        if !unhealthy_components.is_empty() {
            unhealthy_components.sort();
            HealthStatus::Unhealthy(unhealthy_components.join(", "))
        } else if has_degraded {
            HealthStatus::Degraded("Some components degraded".to_string())
        } else {
            HealthStatus::Healthy
        }
    }

    fn probe_store(&self, ctx: &mut Context<Self>) {
        let Some(store) = self.store.clone() else {
            return;
        };
        let addr = ctx.address();

        actix::spawn(async move {
            let status = match store.ping().await {
                Ok(()) => HealthStatus::Healthy,
                Err(e) => HealthStatus::Unhealthy(e.to_string()),
            };

            addr.do_send(UpdateHealth {
                component: COMPONENT_POSTGRES.to_string(),
                status,
                details: None,
            });
        });
    }
}

impl Actor for HealthMonitorActor {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!("HealthMonitorActor started");

        self.probe_store(ctx);
        ctx.run_interval(self.probe_interval, |act, ctx| act.probe_store(ctx));
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Handler<UpdateHealth> for HealthMonitorActor {
    type Result = ();

    fn handle(&mut self, msg: UpdateHealth, _: &mut Self::Context) {
        let previous = self
            .components
            .get(&msg.component)
            .map(|health| health.status.clone());

        if previous.as_ref() != Some(&msg.status) {
            tracing::info!(
                component = %msg.component,
                status = msg.status.label(),
                "Component health changed"
            );
        }

        let health = ComponentHealth::new(msg.component.clone(), msg.status)
            .with_details(msg.details);
        self.components.insert(msg.component, health);
    }
}

impl Handler<GetSystemHealth> for HealthMonitorActor {
    type Result = MessageResult<GetSystemHealth>;

    fn handle(&mut self, _msg: GetSystemHealth, _: &mut Self::Context) -> Self::Result {
        MessageResult(SystemHealth {
            overall_status: self.compute_overall_status(),
            components: self.components.clone(),
            check_time: Utc::now(),
        })
    }
}
