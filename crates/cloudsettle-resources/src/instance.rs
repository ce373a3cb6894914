//! Virtual server instance lifecycle
//!
//! Delete runs stop → detach data volumes → delete, waiting for each step to
//! settle before issuing the next one.

use crate::api::{Instance, InstanceApi, VolumeAttachment};
use crate::context::WaitContext;
use crate::error::{ResourceError, Result, tolerate_missing};
use cloudsettle_core::{OperationKind, PollFunction, PollResult, Timing, poll_fn};
use std::sync::Arc;

pub const PROFILE_CREATE: &str = "instance_create";
pub const PROFILE_STOP: &str = "instance_stop";
pub const PROFILE_DELETE: &str = "instance_delete";
pub const PROFILE_VOLUME: &str = "instance_volume";

const STATUS_FAILED: &str = "failed";

fn instance_probe<'a, A: InstanceApi>(
    api: &'a A,
    id: &'a str,
) -> impl PollFunction<Object = Instance> + 'a {
    poll_fn(move || async move {
        match api.get_instance(id).await {
            Ok(instance) if instance.status == STATUS_FAILED => {
                let message = format!("instance {} reports status failed", id);
                PollResult::failed(instance, STATUS_FAILED, message)
            }
            other => PollResult::from_fetch(other, |i| i.status.clone()),
        }
    })
}

fn attachment_probe<'a, A: InstanceApi>(
    api: &'a A,
    instance: &'a str,
    attachment: &'a str,
) -> impl PollFunction<Object = VolumeAttachment> + 'a {
    poll_fn(move || async move {
        match api.get_volume_attachment(instance, attachment).await {
            Ok(volume) if volume.status == STATUS_FAILED => {
                let message = format!("volume attachment {} on {} failed", attachment, instance);
                PollResult::failed(volume, STATUS_FAILED, message)
            }
            other => PollResult::from_fetch(other, |v| v.status.clone()),
        }
    })
}

/// Lifecycle handle for instances
pub struct Instances<A> {
    api: Arc<A>,
    ctx: WaitContext,
}

impl<A: InstanceApi> Instances<A> {
    pub fn new(api: Arc<A>, ctx: WaitContext) -> Self {
        Self { api, ctx }
    }

    /// Wait for a freshly created instance to be running
    pub async fn wait_available(&self, id: &str) -> Result<Instance> {
        let subject = format!("instance {}", id);
        tracing::info!(instance = %id, "Waiting for instance to be available");

        let spec = self
            .ctx
            .spec(
                OperationKind::Create,
                instance_probe(self.api.as_ref(), id),
                PROFILE_CREATE,
                Timing::default(),
            )
            .pending(["pending", "starting", "provisioning"])
            .target(["running", "available"])
            .subject(subject.clone())
            .build()?;

        let instance = spec
            .converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        instance.ok_or_else(|| ResourceError::missing_snapshot(&subject))
    }

    /// Issue a stop and wait for the instance to report `stopped`
    pub async fn stop(&self, id: &str) -> Result<()> {
        let subject = format!("instance {}", id);
        self.api
            .stop_instance(id)
            .await
            .map_err(|e| ResourceError::api(&subject, e))?;

        let spec = self
            .ctx
            .spec(
                OperationKind::Update,
                instance_probe(self.api.as_ref(), id),
                PROFILE_STOP,
                Timing::default(),
            )
            .pending(["running", "pending", "stopping"])
            .target(["stopped"])
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        tracing::info!(instance = %id, "Instance stopped");
        Ok(())
    }

    /// Wait for a volume attachment to report `attached`
    pub async fn wait_volume_attached(
        &self,
        id: &str,
        attachment: &str,
    ) -> Result<VolumeAttachment> {
        let subject = format!("volume attachment {} on {}", attachment, id);

        let spec = self
            .ctx
            .spec(
                OperationKind::Update,
                attachment_probe(self.api.as_ref(), id, attachment),
                PROFILE_VOLUME,
                Timing::default(),
            )
            .pending(["attaching"])
            .target(["attached"])
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .ok_or_else(|| ResourceError::missing_snapshot(&subject))
    }

    /// Remove a volume attachment and wait until it no longer exists
    pub async fn detach_volume(&self, id: &str, attachment: &str) -> Result<()> {
        let subject = format!("volume attachment {} on {}", attachment, id);

        let removed = tolerate_missing(self.api.delete_volume_attachment(id, attachment).await)
            .map_err(|e| ResourceError::api(&subject, e))?;
        if removed.is_none() {
            tracing::debug!(attachment = %attachment, "Volume attachment already gone");
            return Ok(());
        }

        let spec = self
            .ctx
            .spec(
                OperationKind::Delete,
                attachment_probe(self.api.as_ref(), id, attachment),
                PROFILE_VOLUME,
                Timing::default(),
            )
            .pending(["attached", "detaching"])
            .target(["detached"])
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        Ok(())
    }

    /// Stop the instance, detach its data volumes, delete it and wait for it
    /// to disappear
    ///
    /// An instance that is already gone at any step counts as deleted.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let subject = format!("instance {}", id);

        match self.stop(id).await {
            Ok(()) => {}
            Err(ResourceError::Api { source, .. }) if source.is_not_found() || source.is_gone() => {
                tracing::info!(instance = %id, "Instance already gone");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let attachments = tolerate_missing(self.api.list_volume_attachments(id).await)
            .map_err(|e| ResourceError::api(&subject, e))?
            .unwrap_or_default();
        for attachment in attachments.iter().filter(|a| a.is_data()) {
            tracing::debug!(instance = %id, volume = %attachment.volume_id, "Detaching data volume");
            self.detach_volume(id, &attachment.id).await?;
        }

        if tolerate_missing(self.api.delete_instance(id).await)
            .map_err(|e| ResourceError::api(&subject, e))?
            .is_none()
        {
            return Ok(());
        }

        let spec = self
            .ctx
            .spec(
                OperationKind::Delete,
                instance_probe(self.api.as_ref(), id),
                PROFILE_DELETE,
                Timing::default(),
            )
            .pending(["deleting", "stopped", "available"])
            .target(["deleted"])
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        tracing::info!(instance = %id, "Instance deleted");
        Ok(())
    }
}
