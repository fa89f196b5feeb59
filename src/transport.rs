//! The capability a session drives to reach a mail server.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

use crate::error::{Result, ValidateError};

/// From section [2.3.1.1 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.1).
///
/// A 32-bit value assigned to each message. Unique identifiers are assigned in a strictly
/// ascending fashion in the mailbox and, unlike message sequence numbers, do not change when
/// other messages are expunged or new ones arrive.
pub type Uid = u32;

/// From section [2.3.1.2 of RFC 3501](https://tools.ietf.org/html/rfc3501#section-2.3.1.2).
///
/// A relative position from 1 to the number of messages in the mailbox. Message sequence numbers
/// can be reassigned during the session: when a message is expunged, the sequence number of every
/// later message is decremented.
pub type Seq = u32;

/// The option bitmask handed to [`MailTransport::open`] and [`MailTransport::reopen`].
///
/// Bit values follow the classic c-client `OP_*` constants, so masks built by other clients keep
/// their meaning.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct OpenOptions(u32);

impl OpenOptions {
    /// Log protocol telemetry.
    pub const DEBUG: OpenOptions = OpenOptions(1);
    /// Open the mailbox read-only.
    pub const READONLY: OpenOptions = OpenOptions(2);
    /// Anonymous access (NNTP only).
    pub const ANONYMOUS: OpenOptions = OpenOptions(4);
    /// Short (element-only) caching.
    pub const SHORTCACHE: OpenOptions = OpenOptions(8);
    /// Don't pass up events.
    pub const SILENT: OpenOptions = OpenOptions(16);
    /// Return a driver prototype instead of a stream.
    pub const PROTOTYPE: OpenOptions = OpenOptions(32);
    /// Authenticate and connect, but do not select a mailbox.
    pub const HALFOPEN: OpenOptions = OpenOptions(64);
    /// Silently expunge the recycled stream.
    pub const EXPUNGE: OpenOptions = OpenOptions(128);
    /// Don't do non-secure authentication.
    pub const SECURE: OpenOptions = OpenOptions(256);

    /// No options set.
    pub const fn empty() -> Self {
        OpenOptions(0)
    }

    /// Build options from raw bits.
    pub const fn from_bits(bits: u32) -> Self {
        OpenOptions(bits)
    }

    /// Validate a caller-supplied bitmask.
    ///
    /// The mask must be a non-negative integer that fits in 32 bits.
    pub fn from_raw(raw: i64) -> Result<Self> {
        u32::try_from(raw)
            .map(OpenOptions)
            .map_err(|_| ValidateError::Options(raw).into())
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set in `self`.
    pub const fn contains(self, other: OpenOptions) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for OpenOptions {
    type Output = OpenOptions;

    fn bitor(self, rhs: OpenOptions) -> OpenOptions {
        OpenOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenOptions {
    fn bitor_assign(&mut self, rhs: OpenOptions) {
        self.0 |= rhs.0;
    }
}

/// The defined sort criteria for the
/// [SORT extension](https://tools.ietf.org/html/rfc5256#section-3). If the associated
/// [RFC-822](https://tools.ietf.org/html/rfc822) header for a particular criterion is absent, it
/// is treated as the empty string. The empty string always collates before non-empty strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SortCriterion {
    /// Internal date and time of the message.
    Arrival,
    /// addr-mailbox of the first "cc" address.
    Cc,
    /// Sent date and time.
    Date,
    /// addr-mailbox of the first "From" address.
    From,
    /// Size of the message in octets.
    Size,
    /// Base subject text.
    Subject,
    /// addr-mailbox of the first "To" address.
    To,
}

impl fmt::Display for SortCriterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SortCriterion::*;

        match self {
            Arrival => write!(f, "ARRIVAL"),
            Cc => write!(f, "CC"),
            Date => write!(f, "DATE"),
            From => write!(f, "FROM"),
            Size => write!(f, "SIZE"),
            Subject => write!(f, "SUBJECT"),
            To => write!(f, "TO"),
        }
    }
}

/// Primitives a mail server connection must provide.
///
/// Every method may block on network I/O. Timeouts are the implementation's business; a timed
/// out operation is reported as an error like any other failure.
///
/// A transport owns no session state beyond diagnostics: the session decides when to open,
/// reopen and close, and hands the handle back in on every call.
pub trait MailTransport {
    /// A live, authenticated connection.
    type Handle;

    /// Connect and authenticate, selecting the mailbox named by `conn` unless the options say
    /// otherwise. `retries` is the number of connection attempts.
    fn open(
        &mut self,
        conn: &str,
        username: &str,
        password: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<Self::Handle>;

    /// Point an existing handle at the mailbox named by `conn`.
    ///
    /// After a failure the handle must not be used again.
    fn reopen(
        &mut self,
        handle: &mut Self::Handle,
        conn: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<()>;

    /// Close the connection, permanently removing messages marked for deletion if `purge`.
    fn close(&mut self, handle: Self::Handle, purge: bool);

    /// The number of messages in the selected mailbox.
    fn count(&mut self, handle: &mut Self::Handle) -> Result<u32>;

    /// The UID of the message at sequence position `position`.
    fn resolve_uid(&mut self, handle: &mut Self::Handle, position: Seq) -> Result<Uid>;

    /// Search the selected mailbox, returning UIDs in the order the server reports them.
    fn search(&mut self, handle: &mut Self::Handle, criteria: &str) -> Result<Vec<Uid>>;

    /// All UIDs of the selected mailbox ordered by `criterion`.
    fn sort(
        &mut self,
        handle: &mut Self::Handle,
        criterion: SortCriterion,
        reverse: bool,
    ) -> Result<Vec<Uid>>;

    /// The raw RFC 822 text of the message with the given UID.
    fn fetch(&mut self, handle: &mut Self::Handle, uid: Uid) -> Result<Vec<u8>>;

    /// Mark the message with the given UID for deletion.
    fn mark_deleted(&mut self, handle: &mut Self::Handle, uid: Uid) -> Result<()>;

    /// Permanently remove messages marked for deletion from the selected mailbox.
    fn expunge(&mut self, handle: &mut Self::Handle) -> Result<()>;

    /// Whether the mailbox addressed by `spec` exists.
    fn mailbox_exists(&mut self, handle: &mut Self::Handle, spec: &str) -> Result<bool>;

    /// Create the mailbox addressed by `spec`.
    fn create_mailbox(&mut self, handle: &mut Self::Handle, spec: &str) -> Result<()>;

    /// The most recent diagnostic reported by the server or the connection layer.
    fn last_error(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn options_from_raw() {
        assert_eq!(OpenOptions::from_raw(0).unwrap(), OpenOptions::empty());
        assert_eq!(
            OpenOptions::from_raw(66).unwrap(),
            OpenOptions::READONLY | OpenOptions::HALFOPEN
        );
        for raw in &[-1i64, i64::from(u32::MAX) + 1] {
            match OpenOptions::from_raw(*raw) {
                Err(Error::Validate(ValidateError::Options(r))) if r == *raw => {}
                r => panic!("Wrong result: {:?}", r),
            }
        }
    }

    #[test]
    fn options_contains() {
        let mut o = OpenOptions::DEBUG;
        o |= OpenOptions::READONLY;
        assert!(o.contains(OpenOptions::READONLY));
        assert!(!o.contains(OpenOptions::HALFOPEN));
        assert_eq!(o.bits(), 3);
    }

    #[test]
    fn criterion_to_string() {
        use SortCriterion::*;

        assert_eq!("ARRIVAL", Arrival.to_string());
        assert_eq!("CC", Cc.to_string());
        assert_eq!("DATE", Date.to_string());
        assert_eq!("FROM", From.to_string());
        assert_eq!("SIZE", Size.to_string());
        assert_eq!("SUBJECT", Subject.to_string());
        assert_eq!("TO", To.to_string());
    }
}
