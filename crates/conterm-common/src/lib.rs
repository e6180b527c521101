pub mod errors;
pub mod events;
pub mod id;

pub use errors::{ConsoleError, SettingsError, SnapshotError, SpawnError, TransportError};
pub use events::{ConsoleEvent, ConsoleEventBus, ExitCause};
pub use id::{new_handle, ConsoleHandle};

pub type Result<T> = std::result::Result<T, ConsoleError>;
