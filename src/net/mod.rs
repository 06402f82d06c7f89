pub mod discovery;
pub mod frame_processor;
pub mod framing;
pub mod sync_server;
pub mod wire;

pub use discovery::{DiscoveryBroadcaster, DiscoveryConfig, DiscoveryError, DiscoveryListener};
pub use frame_processor::{FrameOutcome, FrameProcessor};
pub use sync_server::{BoundarySyncServer, ServerState, SyncError};
pub use wire::{BoundaryWireFrame, DiscoveryAdvertisement, WireError};
