//! Service tests for the host
//!
//! Registry actor, echo handler and server queue routing against mocks.

pub mod fixtures;
pub mod server_routing;
