// strato-cloud: the cloud API boundary
//
// Provisioning code talks to `Compute` / `Identity` / `Balancer` traits
// and never to a vendor SDK. Transport, authentication, and wire formats
// live in provider adapters behind these traits; the in-tree provider is
// `sim::SimCloud`, an in-memory cloud used by tests and dry runs.

pub mod api;
pub mod error;
pub mod sim;
pub mod types;

pub use api::{Balancer, CloudApi, Compute, Identity};
pub use error::{CloudError, CloudResult};
pub use sim::SimCloud;
pub use types::{
    Creation, IngressRule, InterfaceAddresses, InterfaceSpec, LaunchRequest, LaunchReservation,
    RuleSource,
};
