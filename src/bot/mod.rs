mod state;

pub use state::{BotState, BotStateValue};
