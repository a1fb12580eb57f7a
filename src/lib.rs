pub mod dispatcher;
pub mod error;
pub mod layout;
pub mod preparer;
pub mod reconciler;
pub mod store;
pub mod tokens;
pub mod worker;

pub use error::*;
