//! DNS records in an internet services zone
//!
//! A record is addressed by the colon-separated `record:zone:instance`
//! identifier. `instance` is the service instance CRN, which contains colons
//! itself, so it is always the last part and keeps every remaining colon.

use crate::api::{DnsApi, DnsRecord, DnsRecordRequest};
use crate::context::WaitContext;
use crate::error::{ResourceError, Result, tolerate_missing};
use cloudsettle_core::{CompositeId, IdCodec, OperationKind, PollResult, Timing, poll_fn};
use std::sync::Arc;
use std::time::Duration;

pub const PROFILE_DNS: &str = "dns_record";

/// Parts of a DNS record identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordId {
    pub record: String,
    pub zone: String,
    pub instance: String,
}

impl RecordId {
    pub fn parse(id: &str) -> Result<Self> {
        let [record, zone, instance] = IdCodec::COLON.decode_tail(id)?;
        Ok(Self {
            record,
            zone,
            instance,
        })
    }

    pub fn encode(&self) -> Result<CompositeId> {
        Ok(CompositeId::with_tail(
            IdCodec::COLON,
            [&self.record, &self.zone, &self.instance],
        )?)
    }
}

fn dns_timing() -> Timing {
    Timing::new(Duration::from_secs(5 * 60))
        .with_initial_delay(Duration::ZERO)
        .with_min_poll_interval(Duration::from_secs(5))
}

/// Lifecycle handle for DNS records
pub struct DnsRecords<A> {
    api: Arc<A>,
    ctx: WaitContext,
}

impl<A: DnsApi> DnsRecords<A> {
    pub fn new(api: Arc<A>, ctx: WaitContext) -> Self {
        Self { api, ctx }
    }

    /// Create a record and wait until it can be read back
    pub async fn create(
        &self,
        instance: &str,
        zone: &str,
        request: &DnsRecordRequest,
    ) -> Result<(CompositeId, DnsRecord)> {
        let subject = format!("dns record {} in {}", request.name, zone);
        // The parent parts must be addressable before anything is created
        IdCodec::COLON.encode_tail(&[zone, instance])?;

        let created = self
            .api
            .create_record(instance, zone, request)
            .await
            .map_err(|e| ResourceError::api(&subject, e))?;

        let id = RecordId {
            record: created.id.clone(),
            zone: zone.to_string(),
            instance: instance.to_string(),
        };
        let composite = id.encode()?;

        let api = self.api.as_ref();
        let record_id = created.id.clone();
        let record = record_id.as_str();
        let probe = poll_fn(move || async move {
            match api.get_record(instance, zone, record).await {
                // A fresh record can be invisible to reads for a short while
                Err(e) if e.is_not_found() => PollResult::bare("propagating"),
                other => PollResult::from_fetch(other, |_| "active".to_string()),
            }
        });
        let spec = self
            .ctx
            .spec(OperationKind::Create, probe, PROFILE_DNS, dns_timing())
            .pending(["propagating"])
            .target(["active"])
            .subject(subject.clone())
            .build()?;
        let record = spec
            .converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?
            .unwrap_or(created);

        tracing::info!(id = %composite, "DNS record created");
        Ok((composite, record))
    }

    /// Read a record; `None` when it no longer exists
    pub async fn get(&self, id: &str) -> Result<Option<DnsRecord>> {
        let parts = RecordId::parse(id)?;
        tolerate_missing(
            self.api
                .get_record(&parts.instance, &parts.zone, &parts.record)
                .await,
        )
        .map_err(|e| ResourceError::api(format!("dns record {}", id), e))
    }

    /// Delete a record and wait until reads stop returning it
    ///
    /// Deleting a record that is already gone succeeds.
    pub async fn delete(&self, id: &str) -> Result<()> {
        let parts = RecordId::parse(id)?;
        let subject = format!("dns record {}", id);

        let deleted = tolerate_missing(
            self.api
                .delete_record(&parts.instance, &parts.zone, &parts.record)
                .await,
        )
        .map_err(|e| ResourceError::api(&subject, e))?;
        if deleted.is_none() {
            tracing::info!(id = %id, "DNS record already gone");
            return Ok(());
        }

        let api = self.api.as_ref();
        let parts = &parts;
        let probe = poll_fn(move || async move {
            PollResult::from_fetch(
                api.get_record(&parts.instance, &parts.zone, &parts.record)
                    .await,
                |_| "deleting".to_string(),
            )
        });
        let spec = self
            .ctx
            .spec(OperationKind::Delete, probe, PROFILE_DNS, dns_timing())
            .pending(["deleting"])
            .target(["deleted"])
            .subject(subject.clone())
            .build()?;
        spec.converge()
            .await
            .map_err(|e| ResourceError::wait(&subject, e))?;

        tracing::info!(id = %id, "DNS record deleted");
        Ok(())
    }
}
