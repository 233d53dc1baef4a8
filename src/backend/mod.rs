//! Backend collaborator surface: the auth provider and the data stores.

pub mod auth;
pub mod store;

pub use auth::{
    AuthEvent, AuthEventKind, AuthProvider, AuthSubscription, SignOutScope, SignedIn,
    SqliteAuthProvider,
};
pub use store::{DealScope, DealStore, LoanRequestStore, ProfileStore, SqliteStore};
