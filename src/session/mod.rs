pub mod handle;
pub mod provider;

pub use handle::{Handle, SessionCredentials};
pub use provider::{role_arn, AssumedRole, RoleAssumer, SessionProvider, DEFAULT_EMULATED_ENDPOINT};
