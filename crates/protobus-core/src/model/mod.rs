// ── Domain model ──
//
// Plain records for the registry's entities. Behaviour lives in the
// registry; these types only carry identity and containment.

pub mod device;
pub mod path;

pub use device::{Device, Item, NewDevice};
pub use path::{ObjectPath, escape_element};
