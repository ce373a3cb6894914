//! cloudsettle resource lifecycles
//!
//! Create, update and delete flows for concrete resource families. Each flow
//! issues its mutation through a collaborator trait from [`api`] and then
//! waits on the convergence engine until the control plane has settled.
//!
//! | family   | handle               | identifier           |
//! |----------|----------------------|----------------------|
//! | instance | [`Instances`]        | plain id             |
//! | subnet   | [`Subnets`]          | plain id             |
//! | database | [`Databases`]        | plain id             |
//! | tags     | [`tags::update_tags`]| CRN                  |
//! | dns      | [`DnsRecords`]       | `record:zone:instance` |
//! | cluster  | [`Clusters`]         | `cluster/pool/zone`  |

pub mod api;
pub mod cluster;
pub mod context;
pub mod database;
pub mod dns;
pub mod error;
pub mod instance;
pub mod subnet;
pub mod tags;

// Re-exports
pub use cluster::{Clusters, ZoneAttachmentId};
pub use context::WaitContext;
pub use database::{Databases, TaskProbe};
pub use dns::{DnsRecords, RecordId};
pub use error::{ResourceError, Result};
pub use instance::Instances;
pub use subnet::Subnets;
pub use tags::{suppress_env_tag_diff, update_tags};
