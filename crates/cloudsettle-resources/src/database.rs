//! Managed database lifecycle
//!
//! Every database mutation starts a task; the mutation is complete only when
//! that task reports `completed`. Allowlist entries and users have no
//! in-place update and are reconciled element by element.

use crate::api::{DatabaseApi, DatabaseInstance, DatabaseUser, Task, WhitelistEntry};
use crate::context::WaitContext;
use crate::error::{ResourceError, Result, tolerate_missing};
use async_trait::async_trait;
use cloudsettle_core::{
    ConvergenceSpec, ElementError, ElementOps, OperationKind, Order, PollFunction, PollResult,
    ReconcileReport, Reconciler, SpecError, Timing, poll_fn,
};
use std::sync::Arc;
use std::time::Duration;

pub const PROFILE_TASK: &str = "database_task";
pub const PROFILE_CREATE: &str = "database_create";
pub const PROFILE_UPDATE: &str = "database_update";
pub const PROFILE_DELETE: &str = "database_delete";

const TASK_COMPLETED: &str = "completed";
const TASK_FAILED: &str = "failed";
const STATE_FAILED: &str = "failed";

/// Tasks are polled every 5 s for up to 15 min unless configured otherwise
pub fn task_timing() -> Timing {
    Timing::new(Duration::from_secs(15 * 60))
        .with_initial_delay(Duration::ZERO)
        .with_min_poll_interval(Duration::from_secs(5))
}

/// Probe for one database task
pub struct TaskProbe<A> {
    api: Arc<A>,
    task_id: String,
}

impl<A> TaskProbe<A> {
    pub fn new(api: Arc<A>, task_id: impl Into<String>) -> Self {
        Self {
            api,
            task_id: task_id.into(),
        }
    }
}

#[async_trait]
impl<A: DatabaseApi> PollFunction for TaskProbe<A> {
    type Object = Task;

    async fn poll(&self) -> PollResult<Task> {
        match self.api.get_task(&self.task_id).await {
            Ok(task) if task.status == TASK_FAILED => {
                let message = format!("database task {} failed: {}", task.id, task.description);
                PollResult::failed(task, TASK_FAILED, message)
            }
            // Completed tasks may come back with an empty status
            Ok(task) if task.status.is_empty() => PollResult::state(task, TASK_COMPLETED),
            other => PollResult::from_fetch(other, |t| t.status.clone()),
        }
    }
}

fn task_spec<A: DatabaseApi>(
    ctx: &WaitContext,
    api: &Arc<A>,
    operation: OperationKind,
    task: &Task,
    subject: String,
) -> std::result::Result<ConvergenceSpec<TaskProbe<A>>, SpecError> {
    ctx.spec(
        operation,
        TaskProbe::new(api.clone(), task.id.clone()),
        PROFILE_TASK,
        task_timing(),
    )
    .pending(["queued", "running"])
    .target([TASK_COMPLETED])
    .subject(subject)
    .build()
}

/// Allowlist mutations for one database
pub struct WhitelistOps<A> {
    api: Arc<A>,
    db: String,
    ctx: WaitContext,
}

#[async_trait]
impl<A: DatabaseApi> ElementOps<WhitelistEntry> for WhitelistOps<A> {
    type Poll = TaskProbe<A>;

    async fn add(
        &self,
        entry: &WhitelistEntry,
    ) -> std::result::Result<ConvergenceSpec<TaskProbe<A>>, ElementError> {
        let task = self.api.create_whitelist_entry(&self.db, entry).await?;
        let subject = format!("allowlist add {} on {}", entry.address, self.db);
        Ok(task_spec(&self.ctx, &self.api, OperationKind::Create, &task, subject)?)
    }

    async fn remove(
        &self,
        entry: &WhitelistEntry,
    ) -> std::result::Result<ConvergenceSpec<TaskProbe<A>>, ElementError> {
        let task = self
            .api
            .delete_whitelist_entry(&self.db, &entry.address)
            .await?;
        let subject = format!("allowlist remove {} on {}", entry.address, self.db);
        Ok(task_spec(&self.ctx, &self.api, OperationKind::Delete, &task, subject)?)
    }
}

/// User mutations for one database
pub struct UserOps<A> {
    api: Arc<A>,
    db: String,
    ctx: WaitContext,
}

#[async_trait]
impl<A: DatabaseApi> ElementOps<DatabaseUser> for UserOps<A> {
    type Poll = TaskProbe<A>;

    /// Create the user; if the create is rejected (the control plane does not
    /// say whether the user already exists) set the password instead
    async fn add(
        &self,
        user: &DatabaseUser,
    ) -> std::result::Result<ConvergenceSpec<TaskProbe<A>>, ElementError> {
        let task = match self.api.create_user(&self.db, user).await {
            Ok(task) => task,
            Err(create_err) => {
                tracing::debug!(
                    db = %self.db,
                    user = %user.name,
                    "Create rejected, updating password instead: {}",
                    create_err
                );
                self.api
                    .update_user_password(&self.db, &user.name, &user.password)
                    .await?
            }
        };
        let subject = format!("create {} on {}", user, self.db);
        Ok(task_spec(&self.ctx, &self.api, OperationKind::Create, &task, subject)?)
    }

    async fn remove(
        &self,
        user: &DatabaseUser,
    ) -> std::result::Result<ConvergenceSpec<TaskProbe<A>>, ElementError> {
        let task = self.api.delete_user(&self.db, &user.name).await?;
        let subject = format!("delete {} on {}", user, self.db);
        Ok(task_spec(&self.ctx, &self.api, OperationKind::Delete, &task, subject)?)
    }
}

/// Lifecycle handle for database instances
pub struct Databases<A> {
    api: Arc<A>,
    ctx: WaitContext,
}

impl<A: DatabaseApi> Databases<A> {
    pub fn new(api: Arc<A>, ctx: WaitContext) -> Self {
        Self { api, ctx }
    }

    /// Wait for a task started by some other mutation
    pub async fn wait_for_task(&self, task: &Task) -> Result<Task> {
        let subject = format!("database task {}", task.id);
        let spec = task_spec(
            &self.ctx,
            &self.api,
            OperationKind::Update,
            task,
            subject.clone(),
        )?;
        let finished = spec
            .converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        Ok(finished.unwrap_or_else(|| task.clone()))
    }

    async fn wait_for_state(
        &self,
        id: &str,
        operation: OperationKind,
        profile: &str,
        pending: &[&str],
        target: &[&str],
    ) -> Result<Option<DatabaseInstance>> {
        let subject = format!("database {}", id);
        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            match api.get_instance(id).await {
                Ok(instance) if instance.state == STATE_FAILED => {
                    let message = format!("database {} failed", id);
                    PollResult::failed(instance, STATE_FAILED, message)
                }
                other => PollResult::from_fetch(other, |i| i.state.clone()),
            }
        });

        let spec = self
            .ctx
            .spec(operation, probe, profile, Timing::default())
            .pending(pending.iter().copied())
            .target(target.iter().copied())
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))
    }

    /// Wait for a newly provisioned instance to become `active`
    pub async fn wait_available(&self, id: &str) -> Result<DatabaseInstance> {
        self.wait_for_state(
            id,
            OperationKind::Create,
            PROFILE_CREATE,
            &["in progress", "inactive", "provisioning"],
            &["active"],
        )
        .await?
        .ok_or_else(|| ResourceError::missing_snapshot(format!("database {}", id)))
    }

    /// Wait for an instance-level update to finish
    pub async fn wait_updated(&self, id: &str) -> Result<DatabaseInstance> {
        self.wait_for_state(
            id,
            OperationKind::Update,
            PROFILE_UPDATE,
            &["in progress", "inactive"],
            &["active"],
        )
        .await?
        .ok_or_else(|| ResourceError::missing_snapshot(format!("database {}", id)))
    }

    /// Set the admin user's password and wait for the task
    pub async fn update_admin_password(
        &self,
        db: &str,
        admin: &str,
        password: &str,
    ) -> Result<()> {
        let subject = format!("database {} admin password", db);
        let task = self
            .api
            .update_user_password(db, admin, password)
            .await
            .map_err(|e| ResourceError::api(&subject, e))?;
        self.wait_for_task(&task).await?;
        Ok(())
    }

    /// Reconcile the allowlist from `previous` to `desired`
    ///
    /// Entries are deleted by address, so removals run before adds: an entry
    /// whose description changed is removed and then re-created.
    pub async fn update_whitelist(
        &self,
        db: &str,
        previous: &[WhitelistEntry],
        desired: &[WhitelistEntry],
    ) -> Result<ReconcileReport> {
        let ops = WhitelistOps {
            api: self.api.clone(),
            db: db.to_string(),
            ctx: self.ctx.clone(),
        };
        Reconciler::new(&ops)
            .order(Order::RemovesFirst)
            .reconcile(previous.iter().cloned(), desired.iter().cloned())
            .await
            .map_err(|e| ResourceError::reconcile(format!("database {} allowlist", db), e))
    }

    /// Reconcile database users from `previous` to `desired`
    ///
    /// A password change shows up as remove + add of the same name; removals
    /// run first so the add re-creates the user instead of being undone.
    pub async fn update_users(
        &self,
        db: &str,
        previous: &[DatabaseUser],
        desired: &[DatabaseUser],
    ) -> Result<ReconcileReport> {
        let ops = UserOps {
            api: self.api.clone(),
            db: db.to_string(),
            ctx: self.ctx.clone(),
        };
        Reconciler::new(&ops)
            .order(Order::RemovesFirst)
            .reconcile(previous.iter().cloned(), desired.iter().cloned())
            .await
            .map_err(|e| ResourceError::reconcile(format!("database {} users", db), e))
    }

    /// Delete the instance and wait for it to be removed or reclaimed
    pub async fn delete(&self, id: &str) -> Result<()> {
        let subject = format!("database {}", id);
        if tolerate_missing(self.api.delete_instance(id).await)
            .map_err(|e| ResourceError::api(&subject, e))?
            .is_none()
        {
            tracing::info!(db = %id, "Database already gone");
            return Ok(());
        }

        self.wait_for_state(
            id,
            OperationKind::Delete,
            PROFILE_DELETE,
            &["in progress", "inactive", "active"],
            &["removed", "pending_reclamation"],
        )
        .await?;
        tracing::info!(db = %id, "Database deleted");
        Ok(())
    }
}
