//! Sample storage, formats and the source contracts everything else builds on.

pub mod format;
pub mod ring_buffer;
pub mod silence;
pub mod source;

pub use format::{PcmFormat, SampleEncoding};
pub use ring_buffer::RingBuffer;
pub use silence::SilenceChannel;
pub use source::{AudioSource, MixerChannel};
