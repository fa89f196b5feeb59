//! Client-side session management for mailbox access protocols.
//!
//! This crate builds c-client style connection strings (`{host:port/flag...}mailbox`), drives
//! the open/reopen/close lifecycle of a transport handle, and enumerates messages through
//! handles that carry UIDs rather than sequence positions.
//!
//! # Usage
//!
//! Here is a basic example of using the bundled IMAP transport. The connection is made lazily,
//! by the first call that needs it.
//!
//! ```no_run
//! # fn main() -> mailsession::Result<()> {
//! use mailsession::{SessionBuilder, SortCriterion};
//!
//! let mut session = SessionBuilder::new("imap.example.com")
//!     .port(993)
//!     .credentials("me@example.com", "password")
//!     .mailbox("INBOX")
//!     .imap()?;
//!
//! println!("{} messages", session.count()?);
//!
//! // newest first
//! for message in session.sorted(SortCriterion::Arrival, true, Some(10))? {
//!     let body = session.fetch(&message)?;
//!     println!("{}: {} bytes", message, body.len());
//! }
//!
//! // handles stay valid while other messages come and go
//! for message in session.search("SEEN BEFORE 1-Jan-2020", None)? {
//!     session.delete(&message)?;
//! }
//! session.expunge()?;
//! session.close(false);
//! # Ok(())
//! # }
//! ```
//!
//! Any other backend can be driven by implementing [`MailTransport`] and handing it to
//! [`SessionBuilder::build`].

pub mod builder;
pub mod error;
pub mod flags;
pub mod imap;
pub mod locator;
pub mod mailbox;
pub mod session;
pub mod spec;
pub mod transport;

#[cfg(any(test, feature = "test_helpers"))]
pub mod testing;

pub use crate::builder::SessionBuilder;
pub use crate::error::{Error, ParseError, Result, ValidateError};
pub use crate::flags::{Flag, FlagPolicy, FlagSet, FlagValue};
pub use crate::imap::{ImapHandle, ImapTransport};
pub use crate::locator::{MessageHandle, MessageLocator};
pub use crate::mailbox::{Cursor, MailboxSession};
pub use crate::session::{SessionId, TransportSession};
pub use crate::spec::{ConnectionSpec, Service};
pub use crate::transport::{MailTransport, OpenOptions, Seq, SortCriterion, Uid};
