//! rust-netconf - server-side NETCONF datastore engine
//!
//! This library keeps the configuration datastores of a NETCONF server:
//! it loads YIN data models and consolidates them into effective schemas,
//! stores the running/startup/candidate parts of every datastore, manages
//! per-part locks, validates proposed content and routes decoded protocol
//! operations onto the datastores whose schema they concern.
//!
//! # Example
//!
//! ```no_run
//! use rust_netconf::{Datastore, Operation, Part, Registry, Session, StoreKind};
//! use serde_json::json;
//!
//! let registry = Registry::new()?;
//! let id = registry.init(
//!     Datastore::new(StoreKind::File, "models/toaster.yin").with_file("toaster.json"),
//! )?;
//! registry.consolidate()?;
//!
//! let session = Session::new("1");
//! let edit = Operation::edit_config(Part::Running, json!({"toaster:toaster": {"darkness": 4}}));
//! let outcome = registry.dispatcher().apply(id, &session, &edit);
//! assert!(outcome.is_applicable());
//!
//! // on session teardown
//! registry.break_locks(session.id());
//! # Ok::<(), rust_netconf::NetconfError>(())
//! ```

pub mod config;
mod consolidate;
pub mod datastore;
pub mod defaults;
pub mod dispatch;
pub mod edit;
mod error;
pub mod filter;
pub mod lock;
pub mod model;
pub mod models;
pub mod monitoring;
pub mod notify;
mod registry;
pub mod rpc;
pub mod schema;
pub mod session;
pub mod store;
pub mod tree;
mod types;
pub mod validation;
mod yin;

pub use config::EngineConfig;
pub use datastore::{Datastore, DatastoreEntry, DatastoreId, StateProvider};
pub use defaults::WithDefaults;
pub use dispatch::RpcDispatcher;
pub use error::{ErrorTag, NetconfError, Result, RpcError};
pub use lock::{LockInfo, LockManager, LockOutcome, ReleasedLock};
pub use model::{DataModel, Feature, ModelKey};
pub use models::ModelRegistry;
pub use notify::{EngineEvent, Subscription};
pub use registry::Registry;
pub use rpc::{
    DefaultOperation, ErrorOption, Operation, OperationKind, Outcome, Reply, RpcReply, Source,
    TestOption,
};
pub use schema::{EffectiveSchema, SchemaNode};
pub use session::{Capability, Session, SessionId};
pub use store::{CustomBackend, Part, StoreKind};
pub use types::YangType;
pub use validation::{ValidatorPaths, Validators};
