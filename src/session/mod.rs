//! Session management.
//!
//! A session is one conversation tab. The pool keeps a bounded set of them
//! and routes selector strings to members.

pub mod pool;

pub use pool::{MAX_RESIDENT_SESSIONS, Session, SessionFactory, SessionPool};
