pub mod audit;
pub mod clock;
pub mod error;
pub mod events;
pub mod gateway;
pub mod permissions;
pub mod rate_limit;
pub mod registry;
pub mod session;
pub mod tool;
pub mod validation;

pub mod test_support;

pub use audit::AuditLog;
pub use clock::{Clock, SystemClock};
pub use error::{GatewayError, RegistryError, ToolFailure};
pub use events::EventBus;
pub use gateway::{ToolGateway, ToolOutcome};
pub use permissions::{check_access, PermissionStore};
pub use rate_limit::{RateLimiter, RateScope, Throttled};
pub use registry::{RegisteredTool, ToolRegistry};
pub use session::SessionManager;
pub use tool::{CallContext, ToolContext, ToolImplementation, ValidatedParameters};
pub use validation::validate_parameters;
