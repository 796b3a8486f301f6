//! Resource implementations

pub mod ram_policy;

pub use ram_policy::RamPolicyResource;
