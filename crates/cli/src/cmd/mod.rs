mod link;
mod store;

pub use link::{cmd_link, cmd_unlink};
pub use store::{StoreCommand, cmd_store};
