//! Database models split into domain-specific modules.

pub mod deal;
pub mod loan_request;
pub mod profile;
pub mod session;

pub use deal::*;
pub use loan_request::*;
pub use profile::*;
pub use session::*;
