//! mDNS service discovery for `_googlecast._tcp.local` (C2 + C3, spec §4.2–§4.3).

pub mod codec;
pub mod device;
pub mod discovery;

pub use device::Device;
pub use discovery::{discover, set_test_mode, test_mode_active, INET4, INET6};
