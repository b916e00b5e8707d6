//! MIDI files: the codec, the on-disk store, and recording names.

pub mod codec;
pub mod naming;
pub mod store;

pub use codec::{CodecError, CreationOptions, Format, MidiFile};
pub use naming::{append_name, default_name};
pub use store::{FileStore, StoreError};
