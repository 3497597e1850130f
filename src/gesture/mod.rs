mod controller;
mod state;

pub use controller::{GestureController, GestureTarget, POLL_INTERVAL};
pub use state::{ButtonState, PollOutcome, REFRACTORY_PERIOD};
