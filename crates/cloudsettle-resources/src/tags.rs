//! Tag reconciliation on a resource CRN
//!
//! Removed tags are detached and then deleted from the account; added tags,
//! together with the environment tags, are attached. Tagging is eventually
//! consistent, so each change waits until the CRN's tag list reflects it.

use crate::api::TaggingApi;
use crate::context::WaitContext;
use crate::error::{ResourceError, Result, tolerate_missing};
use async_trait::async_trait;
use cloudsettle_core::{
    ConvergenceSpec, ElementError, ElementOps, OperationKind, Order, PollFunction, PollResult,
    ReconcileReport, Reconciler, SetDelta, Timing,
};
use std::sync::Arc;
use std::time::Duration;

pub const PROFILE_TAGS: &str = "tags";

const ATTACHED: &str = "attached";
const DETACHED: &str = "detached";

/// Tag list changes propagate in seconds
pub fn tag_timing() -> Timing {
    Timing::new(Duration::from_secs(5 * 60))
        .with_initial_delay(Duration::ZERO)
        .with_min_poll_interval(Duration::from_secs(2))
}

/// Watches whether one tag is attached to a CRN
pub struct TagProbe<A> {
    api: Arc<A>,
    crn: String,
    tag: String,
}

#[async_trait]
impl<A: TaggingApi> PollFunction for TagProbe<A> {
    type Object = Vec<String>;

    async fn poll(&self) -> PollResult<Vec<String>> {
        PollResult::from_fetch(self.api.list_attached_tags(&self.crn).await, |tags| {
            if tags.iter().any(|t| *t == self.tag) {
                ATTACHED.to_string()
            } else {
                DETACHED.to_string()
            }
        })
    }
}

/// Tag mutations for one CRN
pub struct TagOps<A> {
    api: Arc<A>,
    crn: String,
    ctx: WaitContext,
}

impl<A: TaggingApi> TagOps<A> {
    pub fn new(api: Arc<A>, crn: impl Into<String>, ctx: WaitContext) -> Self {
        Self {
            api,
            crn: crn.into(),
            ctx,
        }
    }

    fn spec(
        &self,
        operation: OperationKind,
        tag: &str,
        pending: &str,
        target: &str,
    ) -> std::result::Result<ConvergenceSpec<TagProbe<A>>, ElementError> {
        let probe = TagProbe {
            api: self.api.clone(),
            crn: self.crn.clone(),
            tag: tag.to_string(),
        };
        Ok(self
            .ctx
            .spec(operation, probe, PROFILE_TAGS, tag_timing())
            .pending([pending])
            .target([target])
            .subject(format!("tag {} on {}", tag, self.crn))
            .build()?)
    }
}

#[async_trait]
impl<A: TaggingApi> ElementOps<String> for TagOps<A> {
    type Poll = TagProbe<A>;

    async fn add(
        &self,
        tag: &String,
    ) -> std::result::Result<ConvergenceSpec<TagProbe<A>>, ElementError> {
        self.api
            .attach_tags(&self.crn, std::slice::from_ref(tag))
            .await?;
        self.spec(OperationKind::Create, tag, DETACHED, ATTACHED)
    }

    async fn remove(
        &self,
        tag: &String,
    ) -> std::result::Result<ConvergenceSpec<TagProbe<A>>, ElementError> {
        self.api
            .detach_tags(&self.crn, std::slice::from_ref(tag))
            .await?;
        // The tag may still be attached elsewhere or already deleted
        if let Err(err) = tolerate_missing(self.api.delete_tag(tag).await) {
            tracing::warn!(tag = %tag, "Could not delete detached tag: {}", err);
        }
        self.spec(OperationKind::Delete, tag, ATTACHED, DETACHED)
    }
}

/// `desired` plus every environment tag not already in it
pub fn with_env_tags(desired: &[String], env_tags: &[String]) -> Vec<String> {
    let mut tags = desired.to_vec();
    for tag in env_tags {
        if !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }
    tags
}

/// True when the only difference between `previous` and `desired` is the
/// environment tags missing from `desired`
///
/// Environment tags are attached on every update without being part of the
/// desired configuration, so that diff is not a real change.
pub fn suppress_env_tag_diff(
    previous: &[String],
    desired: &[String],
    env_tags: &[String],
) -> bool {
    if env_tags.is_empty() {
        return false;
    }
    let delta = SetDelta::between(previous.iter(), desired.iter());
    delta.to_add.is_empty()
        && !delta.to_remove.is_empty()
        && delta.to_remove.iter().all(|tag| env_tags.contains(*tag))
}

/// Reconcile the tags on `crn` from `previous` to `desired`
///
/// Environment tags are always part of the desired set.
pub async fn update_tags<A: TaggingApi>(
    api: Arc<A>,
    ctx: &WaitContext,
    crn: &str,
    previous: &[String],
    desired: &[String],
    env_tags: &[String],
) -> Result<ReconcileReport> {
    let desired = with_env_tags(desired, env_tags);
    let ops = TagOps::new(api, crn, ctx.clone());

    tracing::debug!(crn = %crn, "Updating tags");
    Reconciler::new(&ops)
        .order(Order::RemovesFirst)
        .reconcile(previous.iter().cloned(), desired)
        .await
        .map_err(|e| ResourceError::reconcile(format!("tags on {}", crn), e))
}
