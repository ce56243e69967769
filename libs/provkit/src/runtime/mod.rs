//! Event dispatch: the host-facing entry point of a provider.

mod dispatcher;
mod event;

pub use dispatcher::{ProviderRuntime, RuntimeError};
pub use event::{
    AccessRequest, DescribeRequest, DescribeResponse, Event, GrantResponse, LoadRequest,
    LoadResponse, Response, TargetRef,
};
