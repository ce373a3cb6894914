#![allow(dead_code)]

use async_trait::async_trait;
use cloudsettle_core::ApiError;
use cloudsettle_resources::api::*;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use tokio::time::Instant;

/// Replays scripted responses, repeating the last one forever
pub struct Script<T: Clone> {
    queue: Mutex<VecDeque<ApiResult<T>>>,
    last: Mutex<Option<ApiResult<T>>>,
}

impl<T: Clone> Script<T> {
    pub fn new(items: impl IntoIterator<Item = ApiResult<T>>) -> Self {
        Self {
            queue: Mutex::new(items.into_iter().collect()),
            last: Mutex::new(None),
        }
    }

    pub fn next(&self) -> ApiResult<T> {
        let next = self.queue.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(item) => {
                *last = Some(item.clone());
                item
            }
            None => last.clone().expect("script must not be empty"),
        }
    }
}

/// Ordered record of mutations with the (paused) time they were issued
#[derive(Default)]
pub struct CallLog {
    calls: Mutex<Vec<(Instant, String)>>,
}

impl CallLog {
    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push((Instant::now(), call.into()));
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn times(&self) -> Vec<(Instant, String)> {
        self.calls.lock().unwrap().clone()
    }
}

pub fn not_found() -> ApiError {
    ApiError::not_found("resource not found")
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ---------------------------------------------------------------------------

pub fn instance(status: &str) -> ApiResult<Instance> {
    Ok(Instance {
        id: "i-1".to_string(),
        name: "web-1".to_string(),
        status: status.to_string(),
    })
}

pub fn attachment(id: &str, kind: &str, status: &str) -> VolumeAttachment {
    VolumeAttachment {
        id: id.to_string(),
        volume_id: format!("vol-{}", id),
        kind: kind.to_string(),
        status: status.to_string(),
    }
}

pub struct FakeInstanceApi {
    pub instance: Script<Instance>,
    pub stop: Script<()>,
    pub attachments: Vec<VolumeAttachment>,
    pub attachment: Script<VolumeAttachment>,
    pub log: CallLog,
}

impl FakeInstanceApi {
    pub fn new(instance: Vec<ApiResult<Instance>>) -> Self {
        Self {
            instance: Script::new(instance),
            stop: Script::new([Ok(())]),
            attachments: Vec::new(),
            attachment: Script::new([Err(not_found())]),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl InstanceApi for FakeInstanceApi {
    async fn get_instance(&self, _id: &str) -> ApiResult<Instance> {
        self.instance.next()
    }

    async fn stop_instance(&self, id: &str) -> ApiResult<()> {
        self.log.record(format!("stop {}", id));
        self.stop.next()
    }

    async fn delete_instance(&self, id: &str) -> ApiResult<()> {
        self.log.record(format!("delete {}", id));
        Ok(())
    }

    async fn list_volume_attachments(&self, _instance: &str) -> ApiResult<Vec<VolumeAttachment>> {
        Ok(self.attachments.clone())
    }

    async fn get_volume_attachment(
        &self,
        _instance: &str,
        _attachment: &str,
    ) -> ApiResult<VolumeAttachment> {
        self.attachment.next()
    }

    async fn delete_volume_attachment(&self, _instance: &str, attachment: &str) -> ApiResult<()> {
        self.log.record(format!("detach {}", attachment));
        Ok(())
    }
}

// ---------------------------------------------------------------------------

pub fn subnet(status: &str) -> ApiResult<Subnet> {
    Ok(Subnet {
        id: "sn-1".to_string(),
        name: "web".to_string(),
        vpc: "vpc-1".to_string(),
        zone: "us-south-1".to_string(),
        status: status.to_string(),
    })
}

pub struct FakeSubnetApi {
    pub subnet: Script<Subnet>,
    pub delete: Script<()>,
    pub log: CallLog,
}

impl FakeSubnetApi {
    pub fn new(subnet: Vec<ApiResult<Subnet>>) -> Self {
        Self {
            subnet: Script::new(subnet),
            delete: Script::new([Ok(())]),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl SubnetApi for FakeSubnetApi {
    async fn create_subnet(&self, request: &SubnetRequest) -> ApiResult<Subnet> {
        self.log.record(format!("create {}", request.name));
        Ok(Subnet {
            id: format!("sn-{}", request.name),
            name: request.name.clone(),
            vpc: request.vpc.clone(),
            zone: request.zone.clone(),
            status: "pending".to_string(),
        })
    }

    async fn get_subnet(&self, _id: &str) -> ApiResult<Subnet> {
        self.subnet.next()
    }

    async fn delete_subnet(&self, id: &str) -> ApiResult<()> {
        self.log.record(format!("delete {}", id));
        self.delete.next()
    }
}

// ---------------------------------------------------------------------------

pub fn task(id: &str, status: &str) -> Task {
    Task {
        id: id.to_string(),
        status: status.to_string(),
        description: String::new(),
    }
}

/// Database fake whose tasks go queued → running → `final_status`
#[derive(Default)]
pub struct FakeDatabaseApi {
    pub instance: Mutex<Option<Script<DatabaseInstance>>>,
    pub task_polls: Mutex<HashMap<String, usize>>,
    pub failing_tasks: HashSet<String>,
    pub existing_users: HashSet<String>,
    pub log: CallLog,
}

impl FakeDatabaseApi {
    pub fn with_instance(states: Vec<ApiResult<DatabaseInstance>>) -> Self {
        Self {
            instance: Mutex::new(Some(Script::new(states))),
            ..Default::default()
        }
    }

    fn start(&self, call: String) -> ApiResult<Task> {
        self.log.record(call.clone());
        Ok(task(&call, "queued"))
    }
}

pub fn db_state(state: &str) -> ApiResult<DatabaseInstance> {
    Ok(DatabaseInstance {
        id: "db-1".to_string(),
        state: state.to_string(),
    })
}

#[async_trait]
impl DatabaseApi for FakeDatabaseApi {
    async fn get_instance(&self, _id: &str) -> ApiResult<DatabaseInstance> {
        self.instance
            .lock()
            .unwrap()
            .as_ref()
            .expect("no instance script")
            .next()
    }

    async fn delete_instance(&self, id: &str) -> ApiResult<()> {
        self.log.record(format!("delete {}", id));
        Ok(())
    }

    async fn get_task(&self, task_id: &str) -> ApiResult<Task> {
        let mut polls = self.task_polls.lock().unwrap();
        let count = polls.entry(task_id.to_string()).or_insert(0);
        *count += 1;
        let status = match *count {
            1 => "running",
            _ if self.failing_tasks.contains(task_id) => "failed",
            // Completed tasks come back without a status
            _ => "",
        };
        Ok(task(task_id, status))
    }

    async fn create_whitelist_entry(&self, _db: &str, entry: &WhitelistEntry) -> ApiResult<Task> {
        self.start(format!("allow {} ({})", entry.address, entry.description))
    }

    async fn delete_whitelist_entry(&self, _db: &str, address: &str) -> ApiResult<Task> {
        self.start(format!("disallow {}", address))
    }

    async fn create_user(&self, _db: &str, user: &DatabaseUser) -> ApiResult<Task> {
        if self.existing_users.contains(&user.name) {
            self.log.record(format!("create user {} rejected", user.name));
            return Err(ApiError::new(422, "unprocessable entity"));
        }
        self.start(format!("create user {}", user.name))
    }

    async fn update_user_password(
        &self,
        _db: &str,
        name: &str,
        password: &str,
    ) -> ApiResult<Task> {
        self.start(format!("password {} {}", name, password))
    }

    async fn delete_user(&self, _db: &str, name: &str) -> ApiResult<Task> {
        self.start(format!("delete user {}", name))
    }
}

// ---------------------------------------------------------------------------

/// Tagging fake whose attach/detach become visible after `lag` list calls
#[derive(Default)]
pub struct FakeTaggingApi {
    pub attached: Mutex<Vec<String>>,
    pending: Mutex<Vec<(usize, bool, String)>>,
    pub lag: usize,
    pub log: CallLog,
}

impl FakeTaggingApi {
    pub fn with_tags(tags: &[&str], lag: usize) -> Self {
        Self {
            attached: Mutex::new(tags.iter().map(|t| t.to_string()).collect()),
            lag,
            ..Default::default()
        }
    }
}

#[async_trait]
impl TaggingApi for FakeTaggingApi {
    async fn list_attached_tags(&self, _crn: &str) -> ApiResult<Vec<String>> {
        let mut pending = self.pending.lock().unwrap();
        let mut attached = self.attached.lock().unwrap();
        for (remaining, attach, tag) in pending.iter_mut() {
            if *remaining == 0 {
                continue;
            }
            *remaining -= 1;
            if *remaining == 0 {
                if *attach {
                    attached.push(tag.clone());
                } else {
                    attached.retain(|t| t != tag);
                }
            }
        }
        pending.retain(|(remaining, _, _)| *remaining > 0);
        Ok(attached.clone())
    }

    async fn attach_tags(&self, _crn: &str, tags: &[String]) -> ApiResult<()> {
        for tag in tags {
            self.log.record(format!("attach {}", tag));
            self.pending
                .lock()
                .unwrap()
                .push((self.lag.max(1), true, tag.clone()));
        }
        Ok(())
    }

    async fn detach_tags(&self, _crn: &str, tags: &[String]) -> ApiResult<()> {
        for tag in tags {
            self.log.record(format!("detach {}", tag));
            self.pending
                .lock()
                .unwrap()
                .push((self.lag.max(1), false, tag.clone()));
        }
        Ok(())
    }

    async fn delete_tag(&self, tag: &str) -> ApiResult<()> {
        self.log.record(format!("delete {}", tag));
        Ok(())
    }
}

// ---------------------------------------------------------------------------

pub fn record(id: &str) -> DnsRecord {
    DnsRecord {
        id: id.to_string(),
        zone_id: "zone-1".to_string(),
        name: "www.example.com".to_string(),
        record_type: "A".to_string(),
        content: "192.0.2.10".to_string(),
        ttl: 1,
    }
}

pub struct FakeDnsApi {
    pub get: Script<DnsRecord>,
    pub delete: Script<()>,
    pub log: CallLog,
}

impl FakeDnsApi {
    pub fn new(get: Vec<ApiResult<DnsRecord>>) -> Self {
        Self {
            get: Script::new(get),
            delete: Script::new([Ok(())]),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl DnsApi for FakeDnsApi {
    async fn create_record(
        &self,
        instance: &str,
        zone: &str,
        request: &DnsRecordRequest,
    ) -> ApiResult<DnsRecord> {
        self.log
            .record(format!("create {} in {}/{}", request.name, instance, zone));
        Ok(record("rec-1"))
    }

    async fn get_record(&self, _instance: &str, _zone: &str, _record: &str) -> ApiResult<DnsRecord> {
        self.get.next()
    }

    async fn delete_record(&self, instance: &str, zone: &str, record: &str) -> ApiResult<()> {
        self.log
            .record(format!("delete {} in {}/{}", record, instance, zone));
        self.delete.next()
    }
}

// ---------------------------------------------------------------------------

pub fn cluster(state: &str, version: &str) -> ApiResult<Cluster> {
    Ok(Cluster {
        id: "c1".to_string(),
        name: "prod".to_string(),
        state: state.to_string(),
        master_kube_version: version.to_string(),
    })
}

pub fn worker(id: &str, zone: &str, state: &str) -> Worker {
    Worker {
        id: id.to_string(),
        pool_id: "default".to_string(),
        zone: zone.to_string(),
        state: state.to_string(),
    }
}

pub struct FakeClusterApi {
    pub cluster: Script<Cluster>,
    pub workers: Script<Vec<Worker>>,
    pub zones: Script<Vec<PoolZone>>,
    pub log: CallLog,
}

impl FakeClusterApi {
    pub fn new(workers: Vec<ApiResult<Vec<Worker>>>, zones: Vec<ApiResult<Vec<PoolZone>>>) -> Self {
        Self {
            cluster: Script::new([Err(not_found())]),
            workers: Script::new(workers),
            zones: Script::new(zones),
            log: CallLog::default(),
        }
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn get_cluster(&self, _id: &str) -> ApiResult<Cluster> {
        self.cluster.next()
    }

    async fn delete_cluster(&self, id: &str) -> ApiResult<()> {
        self.log.record(format!("delete {}", id));
        Ok(())
    }

    async fn list_workers(&self, _cluster: &str) -> ApiResult<Vec<Worker>> {
        self.workers.next()
    }

    async fn list_pool_zones(&self, _cluster: &str, _pool: &str) -> ApiResult<Vec<PoolZone>> {
        self.zones.next()
    }

    async fn add_pool_zone(
        &self,
        cluster: &str,
        pool: &str,
        zone: &str,
        _network: &ZoneNetwork,
    ) -> ApiResult<()> {
        self.log.record(format!("add {}/{}/{}", cluster, pool, zone));
        Ok(())
    }

    async fn remove_pool_zone(&self, cluster: &str, pool: &str, zone: &str) -> ApiResult<()> {
        self.log
            .record(format!("remove {}/{}/{}", cluster, pool, zone));
        Ok(())
    }
}
