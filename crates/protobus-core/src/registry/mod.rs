// ── Entity registry ──
//
// `Protocol` owns devices (and through them, items); `RootProto` owns
// bridges. Lock order: bridge map, then protocol, then device.

mod protocol;
mod root;

pub use protocol::Protocol;
pub use root::{Bridge, RootProto};
