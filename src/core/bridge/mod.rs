pub mod bridge_service;
pub mod operations;
pub mod result;

pub use bridge_service::{BridgeError, BridgeService};
pub use operations::{catalog, BridgeOperation, BridgeRequest, OperationKind, ParamType};
pub use result::{FailureKind, OperationResult};
