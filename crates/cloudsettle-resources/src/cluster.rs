//! Kubernetes cluster and worker pool zone lifecycle
//!
//! Zone attachments are addressed by the slash-separated
//! `cluster/pool/zone` identifier.

use crate::api::{Cluster, ClusterApi, Worker, ZoneNetwork};
use crate::context::WaitContext;
use crate::error::{ResourceError, Result, tolerate_missing};
use cloudsettle_core::{CompositeId, IdCodec, OperationKind, PollResult, Timing, poll_fn};
use std::sync::Arc;
use std::time::Duration;

pub const PROFILE_CREATE: &str = "cluster_create";
pub const PROFILE_UPDATE: &str = "cluster_update";
pub const PROFILE_DELETE: &str = "cluster_delete";
pub const PROFILE_WORKERS: &str = "cluster_workers";
pub const PROFILE_ZONE: &str = "worker_pool_zone";

const STATE_NORMAL: &str = "normal";
const WORKER_DEPLOYED: &str = "deployed";
const WORKER_DELETED: &str = "deleted";
const WORKER_FAILED: &str = "failed";

/// Cluster deletes take minutes; probing every minute is enough
pub fn delete_timing() -> Timing {
    Timing::new(Duration::from_secs(90 * 60))
        .with_initial_delay(Duration::from_secs(60))
        .with_min_poll_interval(Duration::from_secs(60))
}

/// Parts of a worker pool zone identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneAttachmentId {
    pub cluster: String,
    pub pool: String,
    pub zone: String,
}

impl ZoneAttachmentId {
    pub fn parse(id: &str) -> Result<Self> {
        let [cluster, pool, zone] = IdCodec::SLASH.decode(id)?;
        Ok(Self {
            cluster,
            pool,
            zone,
        })
    }

    pub fn encode(&self) -> Result<CompositeId> {
        Ok(CompositeId::new(
            IdCodec::SLASH,
            [&self.cluster, &self.pool, &self.zone],
        )?)
    }
}

/// Summarise the live workers of one pool zone as a single state
///
/// `pending` while no worker has shown up yet, `deployed` once every worker
/// is, `deploying` otherwise. Deleted workers are ignored.
pub fn zone_workers_state<'a>(workers: impl IntoIterator<Item = &'a Worker>) -> &'static str {
    let mut seen = false;
    let mut all_deployed = true;
    for worker in workers {
        if worker.state == WORKER_DELETED {
            continue;
        }
        seen = true;
        if worker.state == WORKER_FAILED {
            return WORKER_FAILED;
        }
        if worker.state != WORKER_DEPLOYED && worker.state != STATE_NORMAL {
            all_deployed = false;
        }
    }
    match (seen, all_deployed) {
        (false, _) => "pending",
        (true, true) => WORKER_DEPLOYED,
        (true, false) => "deploying",
    }
}

/// Lifecycle handle for clusters
pub struct Clusters<A> {
    api: Arc<A>,
    ctx: WaitContext,
}

impl<A: ClusterApi> Clusters<A> {
    pub fn new(api: Arc<A>, ctx: WaitContext) -> Self {
        Self { api, ctx }
    }

    /// Wait for the cluster master to reach `normal`
    pub async fn wait_available(&self, id: &str) -> Result<Cluster> {
        let subject = format!("cluster {}", id);
        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            PollResult::from_fetch(api.get_cluster(id).await, |c| {
                if c.state == STATE_NORMAL {
                    STATE_NORMAL.to_string()
                } else {
                    "provisioning".to_string()
                }
            })
        });

        let spec = self
            .ctx
            .spec(OperationKind::Create, probe, PROFILE_CREATE, Timing::default())
            .pending(["provisioning"])
            .target([STATE_NORMAL])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .ok_or_else(|| ResourceError::missing_snapshot(&subject))
    }

    /// Wait until no master version change is pending
    pub async fn wait_version_updated(&self, id: &str) -> Result<Cluster> {
        let subject = format!("cluster {} version", id);
        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            PollResult::from_fetch(api.get_cluster(id).await, |c| {
                if c.master_kube_version.contains("pending") {
                    "updating".to_string()
                } else {
                    STATE_NORMAL.to_string()
                }
            })
        });

        let spec = self
            .ctx
            .spec(OperationKind::Update, probe, PROFILE_UPDATE, Timing::default())
            .pending(["updating"])
            .target([STATE_NORMAL])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .ok_or_else(|| ResourceError::missing_snapshot(&subject))
    }

    /// Wait for every live worker in the cluster to be deployed
    pub async fn wait_workers_available(&self, id: &str) -> Result<Vec<Worker>> {
        let subject = format!("workers of cluster {}", id);
        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            match api.list_workers(id).await {
                Ok(workers) => match zone_workers_state(&workers) {
                    WORKER_FAILED => PollResult::failed(workers, WORKER_FAILED, "worker failed"),
                    state => PollResult::state(workers, state),
                },
                Err(e) => PollResult::error(e),
            }
        });

        let spec = self
            .ctx
            .spec(OperationKind::Create, probe, PROFILE_WORKERS, Timing::default())
            .pending(["pending", "deploying"])
            .target([WORKER_DEPLOYED])
            .subject(subject.clone())
            .build()?;
        Ok(spec
            .converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .unwrap_or_default())
    }

    /// Add `zone` to a worker pool and wait for its workers to deploy
    pub async fn attach_zone(
        &self,
        cluster: &str,
        pool: &str,
        zone: &str,
        network: &ZoneNetwork,
    ) -> Result<CompositeId> {
        let id = ZoneAttachmentId {
            cluster: cluster.to_string(),
            pool: pool.to_string(),
            zone: zone.to_string(),
        }
        .encode()?;
        let subject = format!("worker pool zone {}", id);

        self.api
            .add_pool_zone(cluster, pool, zone, network)
            .await
            .map_err(|e| ResourceError::api(&subject, e))?;

        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            match api.list_workers(cluster).await {
                Ok(workers) => {
                    let in_zone = workers.iter().filter(|w| w.pool_id == pool && w.zone == zone);
                    match zone_workers_state(in_zone) {
                        WORKER_FAILED => {
                            PollResult::failed(workers, WORKER_FAILED, "worker failed to deploy")
                        }
                        state => PollResult::state(workers, state),
                    }
                }
                Err(e) => PollResult::error(e),
            }
        });

        let spec = self
            .ctx
            .spec(OperationKind::Create, probe, PROFILE_ZONE, Timing::default())
            .pending(["pending", "deploying"])
            .target([WORKER_DEPLOYED])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;

        tracing::info!(id = %id, "Worker pool zone attached");
        Ok(id)
    }

    /// Remove a zone from its worker pool and wait for the attachment to go
    pub async fn detach_zone(&self, id: &str) -> Result<()> {
        let parts = ZoneAttachmentId::parse(id)?;
        let subject = format!("worker pool zone {}", id);

        let removed = tolerate_missing(
            self.api
                .remove_pool_zone(&parts.cluster, &parts.pool, &parts.zone)
                .await,
        )
        .map_err(|e| ResourceError::api(&subject, e))?;
        if removed.is_none() {
            return Ok(());
        }

        let api = self.api.as_ref();
        let parts = &parts;
        let probe = poll_fn(move || async move {
            PollResult::from_fetch(
                api.list_pool_zones(&parts.cluster, &parts.pool).await,
                |zones| {
                    if zones.iter().any(|z| z.id == parts.zone) {
                        "detaching".to_string()
                    } else {
                        "detached".to_string()
                    }
                },
            )
        });

        let spec = self
            .ctx
            .spec(OperationKind::Delete, probe, PROFILE_ZONE, Timing::default())
            .pending(["detaching"])
            .target(["detached"])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;

        tracing::info!(id = %id, "Worker pool zone detached");
        Ok(())
    }

    /// Delete the cluster and wait until it can no longer be found
    pub async fn delete(&self, id: &str) -> Result<()> {
        let subject = format!("cluster {}", id);
        if tolerate_missing(self.api.delete_cluster(id).await)
            .map_err(|e| ResourceError::api(&subject, e))?
            .is_none()
        {
            return Ok(());
        }

        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            PollResult::from_fetch(api.get_cluster(id).await, |_| "deleting".to_string())
        });
        let spec = self
            .ctx
            .spec(OperationKind::Delete, probe, PROFILE_DELETE, delete_timing())
            .pending(["deleting"])
            .target(["deleted"])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;

        tracing::info!(cluster = %id, "Cluster deleted");
        Ok(())
    }
}
