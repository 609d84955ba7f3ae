pub mod bluetooth;
pub mod bt_discovery;
pub mod memory;
pub mod traits;

pub use bluetooth::BluetoothConnector;
pub use bt_discovery::{DroidDiscovery, DroidDiscoveryConfig};
pub use memory::MemoryConnector;
pub use traits::{GattLink, LinkConnector};
