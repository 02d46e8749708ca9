pub mod channel;
pub mod collective;
pub mod comm;
pub mod config;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod reduce;
pub mod topology;
pub mod transport;
pub mod types;
pub mod work;

pub use channel::{Channel, ChannelId, ChannelProfile};
pub use collective::{BroadcastRole, LaunchGroup, LaunchHandle, ReduceRole, is_supported};
pub use comm::{CollOp, Communicator};
pub use config::RingConfig;
pub use error::{Result, RingError};
pub use memory::DeviceBuffer;
pub use protocol::{ProtoLl, ProtoLl128, ProtoSimple, WireProtocol};
pub use reduce::Element;
pub use topology::Ring;
pub use transport::{ConnFlags, NUM_STEPS};
pub use types::{Algorithm, CollFunc, DataType, Protocol, Rank, ReduceOp};
pub use work::{CollWork, DirectBuffers, WorkDescriptor};
