//! Kettle Runtime - Components, replication and process scheduling
//!
//! This crate contains everything that runs on a device apart from the
//! device-specific logic itself:
//!
//! - [`Component`]: observable, typed value cells with mirroring
//! - [`LocalRegistry`]: owns local components and publishes them on the bus
//! - [`RemoteCache`] / [`RemoteNetwork`]: mirrors of components owned by
//!   other devices, resolved through the bus
//! - [`Bundle`]: a consumer's declared dependencies and their resolution
//! - [`Scheduler`]: loads processes and drives their `setup`/`step`
//! - [`Bus`] / [`LocalBroker`]: the publish/subscribe transport seam

pub use kettle_types;

pub mod bus;
mod bundle;
mod component;
mod error;
mod process;
mod registry;
mod remote;
mod resolve;
mod runtime;
mod settings;

pub use bundle::*;
pub use bus::{Bus, BusConnector, BusMessage, BrokerNetwork, LocalBroker, Subscription, Topic};
pub use component::*;
pub use error::*;
pub use process::*;
pub use registry::*;
pub use remote::*;
pub use resolve::*;
pub use runtime::*;
pub use settings::*;
