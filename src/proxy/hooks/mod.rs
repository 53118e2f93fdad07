pub mod context;
pub mod registry;
pub mod traits;
pub mod usage_tracker;

pub use context::{RequestContext, ResponseBuilder, ResponseContext};
pub use registry::HookRegistry;
pub use traits::Hook;
pub use usage_tracker::{SessionUsage, UsageTrackerHook};
