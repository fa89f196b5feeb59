//! The mailbox session: connection lifecycle, message lookup and a cursor.

use crate::error::{Error, Result};
use crate::locator::{MessageHandle, MessageLocator};
use crate::session::{SessionId, TransportSession};
use crate::spec::ConnectionSpec;
use crate::transport::{MailTransport, Seq, SortCriterion, Uid};

/// Position of the message cursor of a [`MailboxSession`].
///
/// The upper bound is the message count cached at the last [`MailboxSession::reset`]. It is not
/// refreshed while iterating, so a cursor over a mailbox that shrinks or grows keeps using the
/// old count until it is reset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    position: Seq,
    bound: Option<u32>,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor {
            position: 1,
            bound: None,
        }
    }
}

impl Cursor {
    /// The current sequence position.
    pub fn position(&self) -> Seq {
        self.position
    }

    /// The cached message count, if it was fetched.
    pub fn bound(&self) -> Option<u32> {
        self.bound
    }

    fn in_bounds(&self) -> bool {
        match self.bound {
            Some(bound) => self.position >= 1 && self.position <= bound,
            None => false,
        }
    }
}

/// A session with a mail server, and the object applications hold on to.
///
/// The connection is opened on first use. Messages can be enumerated through the
/// [`MessageLocator`] operations, which are also exposed directly on the session, or stepped
/// through with the session's cursor:
///
/// ```no_run
/// # use mailsession::SessionBuilder;
/// # fn main() -> mailsession::Result<()> {
/// let mut session = SessionBuilder::new("imap.example.org")
///     .port(993)
///     .credentials("bob", "hunter2")
///     .mailbox("INBOX")
///     .imap()?;
///
/// session.reset()?;
/// while session.is_valid()? {
///     if let Some(message) = session.current_value()? {
///         println!("{}: {} bytes", message, session.fetch(&message)?.len());
///     }
///     session.advance();
/// }
/// session.close(false);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MailboxSession<T: MailTransport> {
    session: TransportSession<T>,
    cursor: Cursor,
}

impl<T: MailTransport> MailboxSession<T> {
    /// Creates a new session that will connect through `transport`.
    pub fn new(transport: T, spec: ConnectionSpec) -> Self {
        MailboxSession::from_transport_session(TransportSession::new(transport, spec))
    }

    pub fn from_transport_session(session: TransportSession<T>) -> Self {
        MailboxSession {
            session,
            cursor: Cursor::default(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    /// The underlying transport session.
    pub fn session(&self) -> &TransportSession<T> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut TransportSession<T> {
        &mut self.session
    }

    /// `{host[:port][/service][/flag]*}`
    pub fn server_specification(&self) -> String {
        self.session.spec().server_specification()
    }

    /// The server specification followed by the selected mailbox.
    pub fn connection_string(&self) -> String {
        self.session.spec().connection_string()
    }

    /// Borrow the message locator.
    pub fn locator(&mut self) -> MessageLocator<'_, T> {
        MessageLocator::new(&mut self.session)
    }

    /// Selects a mailbox, reopening the connection if it is already open.
    ///
    /// The cursor is not reset.
    pub fn select_mailbox(&mut self, mailbox: &str) -> Result<()> {
        self.session.select_mailbox(mailbox)
    }

    /// Store the option bitmask used by the next open or reopen.
    pub fn set_options(&mut self, options: i64) -> Result<()> {
        self.session.set_options(options)
    }

    /// Close the connection, permanently removing deleted messages if `purge`.
    pub fn close(&mut self, purge: bool) {
        self.session.close(purge)
    }

    pub fn count(&mut self) -> Result<u32> {
        self.locator().count()
    }

    pub fn list(&mut self, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        self.locator().list(limit)
    }

    pub fn get(&mut self, position: Seq) -> Result<MessageHandle> {
        self.locator().get(position)
    }

    pub fn search(&mut self, criteria: &str, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        self.locator().search(criteria, limit)
    }

    pub fn recent(&mut self, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        self.locator().recent(limit)
    }

    pub fn sorted(
        &mut self,
        criterion: SortCriterion,
        reverse: bool,
        limit: Option<usize>,
    ) -> Result<Vec<MessageHandle>> {
        self.locator().sorted(criterion, reverse, limit)
    }

    pub fn by_uid(&mut self, uid: Uid) -> Result<MessageHandle> {
        self.locator().by_uid(uid)
    }

    /// The raw RFC 822 text of `message`.
    pub fn fetch(&mut self, message: &MessageHandle) -> Result<Vec<u8>> {
        self.check_owner(message)?;
        let uid = message.uid();
        self.session.call(|transport, handle| transport.fetch(handle, uid))
    }

    /// Mark `message` for deletion. It is removed by the next expunge or purging close.
    pub fn delete(&mut self, message: &MessageHandle) -> Result<()> {
        self.check_owner(message)?;
        let uid = message.uid();
        self.session
            .call(|transport, handle| transport.mark_deleted(handle, uid))
    }

    pub fn expunge(&mut self) -> Result<()> {
        self.session.expunge()
    }

    pub fn has_mailbox(&mut self, mailbox: &str) -> Result<bool> {
        self.session.has_mailbox(mailbox)
    }

    pub fn create_mailbox(&mut self, mailbox: &str) -> Result<()> {
        self.session.create_mailbox(mailbox)
    }

    fn check_owner(&self, message: &MessageHandle) -> Result<()> {
        if message.session() == self.session.id() {
            Ok(())
        } else {
            Err(Error::NotFound(format!(
                "{} was issued by another session",
                message
            )))
        }
    }

    /// A snapshot of the cursor.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Refresh the cached message count and move the cursor to the first message.
    pub fn reset(&mut self) -> Result<()> {
        let count = self.count()?;
        self.cursor = Cursor {
            position: 1,
            bound: Some(count),
        };
        Ok(())
    }

    /// Whether the cursor points at a message, by the cached count.
    ///
    /// The count is fetched if it was never cached; the position is left alone.
    pub fn is_valid(&mut self) -> Result<bool> {
        if self.cursor.bound.is_none() {
            self.cursor.bound = Some(self.count()?);
        }
        Ok(self.cursor.in_bounds())
    }

    /// The current sequence position, if the cursor is valid.
    pub fn current_key(&mut self) -> Result<Option<Seq>> {
        Ok(if self.is_valid()? {
            Some(self.cursor.position)
        } else {
            None
        })
    }

    /// The message at the current position, if the cursor is valid.
    pub fn current_value(&mut self) -> Result<Option<MessageHandle>> {
        if !self.is_valid()? {
            return Ok(None);
        }
        let position = self.cursor.position;
        self.get(position).map(Some)
    }

    /// Step to the next position. Running off the end is detected by the next
    /// [`is_valid`](Self::is_valid).
    pub fn advance(&mut self) {
        self.cursor.position = self.cursor.position.saturating_add(1);
    }
}
