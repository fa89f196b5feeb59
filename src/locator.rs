//! Message addressing.
//!
//! A [`MessageHandle`] carries the message's UID, never its sequence position, so it keeps
//! pointing at the same message when other messages are expunged or new ones arrive.

use std::fmt;

use crate::error::{Error, Result};
use crate::session::{SessionId, TransportSession};
use crate::transport::{MailTransport, Seq, SortCriterion, Uid};

/// The criteria [`MessageLocator::recent`] searches for.
pub const RECENT: &str = "RECENT";

/// A message on the server, identified by UID.
///
/// The handle remembers which session issued it, but does not keep that session alive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageHandle {
    uid: Uid,
    session: SessionId,
}

impl MessageHandle {
    pub(crate) fn new(uid: Uid, session: SessionId) -> Self {
        MessageHandle { uid, session }
    }

    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// The session that issued this handle.
    pub fn session(&self) -> SessionId {
        self.session
    }
}

impl fmt::Display for MessageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UID {}", self.uid)
    }
}

/// Resolves positions, searches and sort orders into [`MessageHandle`]s.
#[derive(Debug)]
pub struct MessageLocator<'a, T: MailTransport> {
    session: &'a mut TransportSession<T>,
}

impl<'a, T: MailTransport> MessageLocator<'a, T> {
    pub fn new(session: &'a mut TransportSession<T>) -> Self {
        MessageLocator { session }
    }

    /// The number of messages in the selected mailbox.
    pub fn count(&mut self) -> Result<u32> {
        self.session.call(|transport, handle| transport.count(handle))
    }

    /// Handles for the first `limit` messages (all of them if `None`), in ascending sequence
    /// order.
    ///
    /// Every position is resolved to its UID, so the result stays meaningful after the mailbox
    /// changes.
    pub fn list(&mut self, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        let count = self.count()?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let last = match limit {
            Some(limit) => count.min(u32::try_from(limit).unwrap_or(u32::MAX)),
            None => count,
        };

        let id = self.session.id();
        self.session.call(|transport, handle| {
            (1..=last)
                .map(|position| {
                    transport
                        .resolve_uid(handle, position)
                        .map(|uid| MessageHandle::new(uid, id))
                })
                .collect()
        })
    }

    /// The message currently at sequence position `position`.
    pub fn get(&mut self, position: Seq) -> Result<MessageHandle> {
        if position == 0 {
            return Err(Error::NotFound("no message at position 0".to_string()));
        }
        let id = self.session.id();
        match self
            .session
            .call(|transport, handle| transport.resolve_uid(handle, position))
        {
            Ok(uid) => Ok(MessageHandle::new(uid, id)),
            Err(Error::NotFound(e)) => Err(Error::NotFound(e)),
            Err(Error::No(e)) | Err(Error::Bad(e)) => {
                Err(Error::NotFound(format!("position {}: {}", position, e)))
            }
            Err(e) => Err(e),
        }
    }

    /// Handles for the messages matching `criteria`, truncated to the first `limit` results in
    /// server order.
    ///
    /// `criteria` uses the IMAP SEARCH grammar, e.g. `UNSEEN FROM "alice"`. A search the server
    /// rejects is reported as finding nothing; a lost connection is still an error.
    pub fn search(&mut self, criteria: &str, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        let id = self.session.id();
        let uids = match self
            .session
            .call(|transport, handle| transport.search(handle, criteria))
        {
            Ok(uids) => uids,
            Err(e @ Error::Connection(_)) => return Err(e),
            Err(e) => {
                tracing::warn!(session = ?id, criteria, error = %e, "search failed");
                Vec::new()
            }
        };
        Ok(to_handles(uids, limit, id))
    }

    /// Handles for the messages flagged `\Recent`.
    pub fn recent(&mut self, limit: Option<usize>) -> Result<Vec<MessageHandle>> {
        self.search(RECENT, limit)
    }

    /// Handles for every message, ordered by `criterion` and truncated to `limit`.
    pub fn sorted(
        &mut self,
        criterion: SortCriterion,
        reverse: bool,
        limit: Option<usize>,
    ) -> Result<Vec<MessageHandle>> {
        let id = self.session.id();
        let uids = self
            .session
            .call(|transport, handle| transport.sort(handle, criterion, reverse))?;
        Ok(to_handles(uids, limit, id))
    }

    /// The message with the given UID, if it is in the selected mailbox.
    pub fn by_uid(&mut self, uid: Uid) -> Result<MessageHandle> {
        let id = self.session.id();
        let criteria = format!("UID {}", uid);
        let found = self
            .session
            .call(|transport, handle| transport.search(handle, &criteria))?;
        if found.contains(&uid) {
            Ok(MessageHandle::new(uid, id))
        } else {
            Err(Error::NotFound(format!("no message with UID {}", uid)))
        }
    }
}

fn to_handles(uids: Vec<Uid>, limit: Option<usize>, id: SessionId) -> Vec<MessageHandle> {
    let limit = limit.unwrap_or(usize::MAX);
    uids.into_iter()
        .take(limit)
        .map(|uid| MessageHandle::new(uid, id))
        .collect()
}
