//! Media-session tracking: one [`SessionEntry`] per player package, a
//! debouncer per entry, and the registry that picks the gesture target.

mod events;
mod now_playing;
mod registry;
mod session;

pub use events::MediaEvent;
pub use now_playing::NowPlaying;
pub use registry::MediaSessionRegistry;
pub use session::SessionEntry;
