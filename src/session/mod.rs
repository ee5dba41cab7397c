mod store;
mod token;

pub use store::{CsrfStore, FileSessionStore, MemorySessionStore, SessionStore, StaticCsrfStore};
pub use token::SessionToken;
