//! Session/role gate and the route guard built on it.

pub mod gate;
pub mod guard;

pub use gate::{resolve_once, ClientHandle, GatePhase, GateState, GateView, SessionGate};
pub use guard::{Access, GuardRejection, RouteGuard, Viewer};
