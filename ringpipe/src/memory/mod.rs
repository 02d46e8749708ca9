mod buffer;

pub use buffer::DeviceBuffer;
