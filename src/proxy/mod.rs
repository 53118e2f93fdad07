pub mod hooks;
pub mod server;

pub use hooks::{Hook, HookRegistry, RequestContext, ResponseBuilder, ResponseContext, UsageTrackerHook};
pub use server::{router, ProxyServer, ProxyState};
