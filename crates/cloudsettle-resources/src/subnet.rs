//! VPC subnet lifecycle
//!
//! Subnet creation in one VPC zone is serialised: parallel creates in the
//! same zone are rejected by the control plane.

use crate::api::{Subnet, SubnetApi, SubnetRequest};
use crate::context::WaitContext;
use crate::error::{ResourceError, Result};
use cloudsettle_core::{OperationKind, PollResult, Timing, poll_fn};
use std::sync::Arc;

pub const PROFILE_CREATE: &str = "subnet_create";
pub const PROFILE_DELETE: &str = "subnet_delete";

/// Default consecutive `available` observations before a subnet counts as
/// created; its status flaps briefly after provisioning
pub const DEFAULT_STABILITY: u32 = 2;

/// Lock key shared by every subnet create in `vpc`/`zone`
pub fn lock_key(vpc: &str, zone: &str) -> String {
    format!("subnet_key_{}_{}", vpc, zone)
}

impl SubnetRequest {
    pub fn validate(&self) -> Result<()> {
        match (&self.ipv4_cidr_block, self.total_ipv4_address_count) {
            (None, None) | (None, Some(0)) => Err(ResourceError::InvalidRequest(
                "ipv4_cidr_block or total_ipv4_address_count must be provided".to_string(),
            )),
            (Some(_), Some(count)) if count > 0 => Err(ResourceError::InvalidRequest(
                "only one of ipv4_cidr_block or total_ipv4_address_count may be provided"
                    .to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Lifecycle handle for subnets
pub struct Subnets<A> {
    api: Arc<A>,
    ctx: WaitContext,
}

impl<A: SubnetApi> Subnets<A> {
    pub fn new(api: Arc<A>, ctx: WaitContext) -> Self {
        Self { api, ctx }
    }

    /// Create a subnet and wait for it to settle in `available`
    ///
    /// Holds the VPC zone lock from the create call until the subnet is
    /// available.
    pub async fn create(&self, request: &SubnetRequest) -> Result<Subnet> {
        request.validate()?;

        let _lock = self
            .ctx
            .locks()
            .lock(lock_key(&request.vpc, &request.zone))
            .await;

        let subject = format!("subnet {}", request.name);
        let created = self
            .api
            .create_subnet(request)
            .await
            .map_err(|e| ResourceError::api(&subject, e))?;
        tracing::info!(subnet = %created.id, vpc = %request.vpc, zone = %request.zone, "Subnet created");

        self.wait_available(&created.id).await
    }

    /// Wait for `available`, requiring it to hold over consecutive probes
    pub async fn wait_available(&self, id: &str) -> Result<Subnet> {
        let subject = format!("subnet {}", id);
        let api = self.api.as_ref();
        let probe = poll_fn(move || async move {
            match api.get_subnet(id).await {
                Ok(subnet) if subnet.status == "failed" => {
                    let message = format!("subnet {} failed to provision", id);
                    PollResult::failed(subnet, "failed", message)
                }
                other => PollResult::from_fetch(other, |s| s.status.clone()),
            }
        });

        let spec = self
            .ctx
            .spec(
                OperationKind::Create,
                probe,
                PROFILE_CREATE,
                Timing::default().with_stability(DEFAULT_STABILITY),
            )
            .pending(["pending", "provisioning"])
            .target(["available"])
            .subject(subject.clone())
            .build()?;

        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .ok_or_else(|| ResourceError::missing_snapshot(&subject))
    }

    /// Delete a subnet and wait until it is gone
    ///
    /// A 409 conflict means resources are still attached; the delete is
    /// re-issued on every probe until the control plane accepts it.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let subject = format!("subnet {}", id);
        let api = self.api.as_ref();

        match api.delete_subnet(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() || e.is_gone() => {
                tracing::info!(subnet = %id, "Subnet already gone");
                return Ok(());
            }
            Err(e) if e.status == Some(409) => {
                tracing::debug!(subnet = %id, "Subnet still in use, retrying delete: {}", e);
                self.retry_delete(id).await?;
            }
            Err(e) => return Err(ResourceError::api(&subject, e)),
        }

        let gone = poll_fn(move || async move {
            match api.get_subnet(id).await {
                Err(e) if e.message.contains("detach all network interfaces") => {
                    PollResult::bare("deleting")
                }
                // Whatever its status, a subnet that can still be read is deleting
                other => PollResult::from_fetch(other, |_| "deleting".to_string()),
            }
        });
        let spec = self
            .ctx
            .spec(OperationKind::Delete, gone, PROFILE_DELETE, Timing::default())
            .pending(["deleting"])
            .target(["deleted"])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;

        tracing::info!(subnet = %id, "Subnet deleted");
        Ok(())
    }

    async fn retry_delete(&self, id: &str) -> Result<()> {
        let subject = format!("subnet {}", id);
        let api = self.api.as_ref();

        let retry = poll_fn(move || async move {
            match api.delete_subnet(id).await {
                Ok(()) => PollResult::<()>::bare("deleting"),
                Err(e) if e.status == Some(409) => PollResult::bare("resources_attached"),
                Err(e) => PollResult::error(e),
            }
        });
        let spec = self
            .ctx
            .spec(OperationKind::Delete, retry, PROFILE_DELETE, Timing::default())
            .pending(["resources_attached"])
            .target(["deleting"])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(cidr: Option<&str>, count: Option<u32>) -> SubnetRequest {
        SubnetRequest {
            name: "web".to_string(),
            vpc: "vpc-1".to_string(),
            zone: "us-south-1".to_string(),
            ipv4_cidr_block: cidr.map(str::to_string),
            total_ipv4_address_count: count,
        }
    }

    #[test]
    fn test_request_needs_exactly_one_address_option() {
        assert!(request(None, None).validate().is_err());
        assert!(request(Some("10.0.0.0/24"), Some(256)).validate().is_err());
        assert!(request(Some("10.0.0.0/24"), None).validate().is_ok());
        assert!(request(None, Some(256)).validate().is_ok());
    }

    #[test]
    fn test_lock_key_is_per_vpc_zone() {
        assert_eq!(lock_key("vpc-1", "us-south-1"), "subnet_key_vpc-1_us-south-1");
        assert_ne!(lock_key("vpc-1", "us-south-1"), lock_key("vpc-1", "us-south-2"));
    }
}
