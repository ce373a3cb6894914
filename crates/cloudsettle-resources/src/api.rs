//! Control-plane collaborators
//!
//! Each resource family talks to its service through one of these traits.
//! Implementations wrap an HTTP client or SDK; errors are reported as
//! [`ApiError`] so the convergence engine can classify them.

use async_trait::async_trait;
use cloudsettle_core::ApiError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ---------------------------------------------------------------------------
// Virtual server instances
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: String,
    pub name: String,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeAttachment {
    pub id: String,
    pub volume_id: String,
    /// "boot" or "data"
    #[serde(rename = "type")]
    pub kind: String,
    pub status: String,
}

impl VolumeAttachment {
    pub fn is_data(&self) -> bool {
        self.kind == "data"
    }
}

#[async_trait]
pub trait InstanceApi: Send + Sync {
    async fn get_instance(&self, id: &str) -> ApiResult<Instance>;

    async fn stop_instance(&self, id: &str) -> ApiResult<()>;

    async fn delete_instance(&self, id: &str) -> ApiResult<()>;

    async fn list_volume_attachments(&self, instance: &str) -> ApiResult<Vec<VolumeAttachment>>;

    async fn get_volume_attachment(
        &self,
        instance: &str,
        attachment: &str,
    ) -> ApiResult<VolumeAttachment>;

    async fn delete_volume_attachment(&self, instance: &str, attachment: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// VPC subnets
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subnet {
    pub id: String,
    pub name: String,
    pub vpc: String,
    pub zone: String,
    pub status: String,
}

/// Subnet creation request; exactly one of the address options is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetRequest {
    pub name: String,
    pub vpc: String,
    pub zone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ipv4_cidr_block: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_ipv4_address_count: Option<u32>,
}

#[async_trait]
pub trait SubnetApi: Send + Sync {
    async fn create_subnet(&self, request: &SubnetRequest) -> ApiResult<Subnet>;

    async fn get_subnet(&self, id: &str) -> ApiResult<Subnet>;

    async fn delete_subnet(&self, id: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// Managed databases
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInstance {
    pub id: String,
    pub state: String,
}

/// Asynchronous task started by a database mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    /// "queued", "running", "completed", "failed"; some backends report an
    /// empty status for completed tasks
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub description: String,
}

/// One allowlisted address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub address: String,
    #[serde(default)]
    pub description: String,
}

impl fmt::Display for WhitelistEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// Database user; the password takes part in equality so a changed password
/// is reconciled like any other change
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseUser {
    pub name: String,
    pub password: String,
}

impl fmt::Debug for DatabaseUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseUser")
            .field("name", &self.name)
            .field("password", &"********")
            .finish()
    }
}

impl fmt::Display for DatabaseUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {}", self.name)
    }
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn get_instance(&self, id: &str) -> ApiResult<DatabaseInstance>;

    async fn delete_instance(&self, id: &str) -> ApiResult<()>;

    async fn get_task(&self, task_id: &str) -> ApiResult<Task>;

    async fn create_whitelist_entry(&self, db: &str, entry: &WhitelistEntry) -> ApiResult<Task>;

    async fn delete_whitelist_entry(&self, db: &str, address: &str) -> ApiResult<Task>;

    async fn create_user(&self, db: &str, user: &DatabaseUser) -> ApiResult<Task>;

    async fn update_user_password(&self, db: &str, name: &str, password: &str)
    -> ApiResult<Task>;

    async fn delete_user(&self, db: &str, name: &str) -> ApiResult<Task>;
}

// ---------------------------------------------------------------------------
// Global tagging
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TaggingApi: Send + Sync {
    async fn list_attached_tags(&self, crn: &str) -> ApiResult<Vec<String>>;

    async fn attach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()>;

    async fn detach_tags(&self, crn: &str, tags: &[String]) -> ApiResult<()>;

    /// Delete an unattached tag from the account
    async fn delete_tag(&self, tag: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// DNS records (internet services)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub id: String,
    pub zone_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecordRequest {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub content: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
}

fn default_ttl() -> u32 {
    1
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    async fn create_record(
        &self,
        instance: &str,
        zone: &str,
        request: &DnsRecordRequest,
    ) -> ApiResult<DnsRecord>;

    async fn get_record(&self, instance: &str, zone: &str, record: &str) -> ApiResult<DnsRecord>;

    async fn delete_record(&self, instance: &str, zone: &str, record: &str) -> ApiResult<()>;
}

// ---------------------------------------------------------------------------
// Kubernetes clusters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub state: String,
    #[serde(default)]
    pub master_kube_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub pool_id: String,
    pub zone: String,
    /// Lifecycle state, e.g. "provisioning", "deployed", "deleted"
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolZone {
    pub id: String,
    #[serde(default)]
    pub worker_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneNetwork {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_vlan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_vlan: Option<String>,
}

#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn get_cluster(&self, id: &str) -> ApiResult<Cluster>;

    async fn delete_cluster(&self, id: &str) -> ApiResult<()>;

    async fn list_workers(&self, cluster: &str) -> ApiResult<Vec<Worker>>;

    async fn list_pool_zones(&self, cluster: &str, pool: &str) -> ApiResult<Vec<PoolZone>>;

    async fn add_pool_zone(
        &self,
        cluster: &str,
        pool: &str,
        zone: &str,
        network: &ZoneNetwork,
    ) -> ApiResult<()>;

    async fn remove_pool_zone(&self, cluster: &str, pool: &str, zone: &str) -> ApiResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_debug_hides_password() {
        let user = DatabaseUser {
            name: "app".to_string(),
            password: "hunter22".to_string(),
        };
        let shown = format!("{:?} {}", user, user);
        assert!(shown.contains("app"));
        assert!(!shown.contains("hunter22"));
    }

    #[test]
    fn test_models_deserialize() {
        let attachment: VolumeAttachment = serde_json::from_str(
            r#"{"id":"va-1","volume_id":"vol-1","type":"data","status":"attached"}"#,
        )
        .unwrap();
        assert!(attachment.is_data());

        let task: Task = serde_json::from_str(r#"{"id":"t-1"}"#).unwrap();
        assert_eq!(task.status, "");

        let record: DnsRecord = serde_json::from_str(
            r#"{"id":"r1","zone_id":"z1","name":"www","type":"A","content":"192.0.2.1"}"#,
        )
        .unwrap();
        assert_eq!(record.ttl, 1);
    }
}
