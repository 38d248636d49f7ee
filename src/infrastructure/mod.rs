pub mod core;
pub mod export;
pub mod mock;
pub mod session;

pub use mock::{MockBehavior, MockHost};
pub use session::initialize_session;
