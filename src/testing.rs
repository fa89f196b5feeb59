//! Enable the test_helpers feature to expose an in-memory [`MailTransport`] for testing code
//! that drives a [`MailboxSession`](crate::MailboxSession).
//!
//! To use add a dev-dependency on mailsession adding the feature "test_helpers"
//! e.g.
//!
//! ```toml
//! [dependencies]
//! mailsession = { version = "0.1" }
//!
//! [dev-dependencies]
//! # mirror the same configuration your dependencies and add test_helpers
//! mailsession = { version = "0.1", features = ["test_helpers"] }
//! ```
//!
//! [`MemoryTransport`] records every call it receives, so tests can assert on the exact
//! connection strings and options a session produced.

use crate::error::{Error, Result};
use crate::spec::ConnectionSpec;
use crate::transport::{MailTransport, OpenOptions, Seq, SortCriterion, Uid};

/// One call received by a [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Open {
        conn: String,
        username: String,
        options: u32,
        retries: u32,
    },
    Reopen {
        conn: String,
        options: u32,
        retries: u32,
    },
    Close {
        purge: bool,
    },
    Count,
    ResolveUid(Seq),
    Search(String),
    Sort(SortCriterion, bool),
    Fetch(Uid),
    MarkDeleted(Uid),
    Expunge,
    MailboxExists(String),
    CreateMailbox(String),
}

#[derive(Clone, Debug)]
struct Message {
    uid: Uid,
    body: Vec<u8>,
    recent: bool,
    deleted: bool,
}

impl Message {
    fn new(uid: Uid) -> Self {
        Message {
            uid,
            body: format!("Subject: message {}\r\n\r\nbody of {}\r\n", uid, uid).into_bytes(),
            recent: false,
            deleted: false,
        }
    }
}

#[derive(Clone, Debug)]
struct Mailbox {
    name: String,
    messages: Vec<Message>,
}

/// Handle issued by a [`MemoryTransport`].
#[derive(Debug)]
pub struct MemoryHandle {
    mailbox: Option<String>,
}

impl MemoryHandle {
    /// The mailbox this handle has selected, if any.
    pub fn mailbox(&self) -> Option<&str> {
        self.mailbox.as_deref()
    }
}

/// A mail server held in memory.
///
/// Messages are addressed by sequence position in insertion order. Mailboxes that were never
/// added cannot be opened. An empty mailbox name in a connection string selects `INBOX`.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    mailboxes: Vec<Mailbox>,
    calls: Vec<Call>,
    last_error: Option<String>,
    refuse_open: Option<String>,
    fail_search: bool,
    broken: Option<std::io::ErrorKind>,
    open_handles: usize,
}

impl MemoryTransport {
    pub fn new() -> Self {
        MemoryTransport::default()
    }

    /// Add a mailbox holding messages with the given UIDs, in sequence order.
    pub fn with_mailbox(mut self, name: &str, uids: &[Uid]) -> Self {
        self.mailboxes.push(Mailbox {
            name: name.to_string(),
            messages: uids.iter().copied().map(Message::new).collect(),
        });
        self
    }

    /// Mark the given UIDs of `mailbox` as recent.
    pub fn with_recent(mut self, mailbox: &str, uids: &[Uid]) -> Self {
        if let Some(m) = self.find_mut(mailbox) {
            for msg in m.messages.iter_mut().filter(|msg| uids.contains(&msg.uid)) {
                msg.recent = true;
            }
        }
        self
    }

    /// Replace the body of a message.
    pub fn with_body(mut self, mailbox: &str, uid: Uid, body: &[u8]) -> Self {
        if let Some(m) = self.find_mut(mailbox) {
            if let Some(msg) = m.messages.iter_mut().find(|msg| msg.uid == uid) {
                msg.body = body.to_vec();
            }
        }
        self
    }

    /// Make every open fail with `diagnostic` as the last error.
    pub fn refuse_open(mut self, diagnostic: &str) -> Self {
        self.refuse_open = Some(diagnostic.to_string());
        self
    }

    /// Make every search fail.
    pub fn fail_search(mut self) -> Self {
        self.fail_search = true;
        self
    }

    /// Make every call on an open handle fail with an I/O error of the given kind, as a dropped
    /// or stalled connection would.
    pub fn break_connection(&mut self, kind: std::io::ErrorKind) {
        self.broken = Some(kind);
    }

    /// Deliver a new message, as another client would.
    pub fn deliver(&mut self, mailbox: &str, uid: Uid) {
        if let Some(m) = self.find_mut(mailbox) {
            let mut msg = Message::new(uid);
            msg.recent = true;
            m.messages.push(msg);
        }
    }

    /// Remove a message immediately, as another client's expunge would.
    pub fn remove(&mut self, mailbox: &str, uid: Uid) {
        if let Some(m) = self.find_mut(mailbox) {
            m.messages.retain(|msg| msg.uid != uid);
        }
    }

    /// UIDs currently stored in `mailbox`, in sequence order.
    pub fn uids(&self, mailbox: &str) -> Vec<Uid> {
        self.find(mailbox)
            .map(|m| m.messages.iter().map(|msg| msg.uid).collect())
            .unwrap_or_default()
    }

    /// Whether the message is marked for deletion.
    pub fn is_deleted(&self, mailbox: &str, uid: Uid) -> bool {
        self.find(mailbox)
            .and_then(|m| m.messages.iter().find(|msg| msg.uid == uid))
            .map(|msg| msg.deleted)
            .unwrap_or(false)
    }

    /// Every call received so far.
    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    /// Number of handles opened and not yet closed.
    pub fn open_handles(&self) -> usize {
        self.open_handles
    }

    fn find(&self, name: &str) -> Option<&Mailbox> {
        self.mailboxes.iter().find(|m| m.name == name)
    }

    fn find_mut(&mut self, name: &str) -> Option<&mut Mailbox> {
        self.mailboxes.iter_mut().find(|m| m.name == name)
    }

    fn fail<T>(&mut self, e: Error) -> Result<T> {
        self.last_error = Some(e.to_string());
        Err(e)
    }

    fn target(&mut self, conn: &str, options: OpenOptions) -> Result<Option<String>> {
        if options.contains(OpenOptions::HALFOPEN) {
            return Ok(None);
        }
        let spec = ConnectionSpec::parse(conn)?;
        let name = spec.mailbox().unwrap_or("INBOX").to_string();
        if self.find(&name).is_none() {
            return self.fail(Error::No(format!("Mailbox doesn't exist: {}", name)));
        }
        Ok(Some(name))
    }

    fn selected(&mut self, handle: &MemoryHandle) -> Result<&mut Mailbox> {
        if let Some(kind) = self.broken {
            return self.fail(Error::Io(std::io::Error::from(kind)));
        }
        let name = match handle.mailbox {
            Some(ref name) => name.clone(),
            None => return self.fail(Error::Bad("No mailbox selected".to_string())),
        };
        match self.mailboxes.iter_mut().find(|m| m.name == name) {
            Some(m) => Ok(m),
            None => Err(Error::No(format!("Mailbox doesn't exist: {}", name))),
        }
    }

    fn matches(msg: &Message, criteria: &str) -> Result<bool> {
        let upper = criteria.trim().to_ascii_uppercase();
        let mut words = upper.split_whitespace();
        match (words.next(), words.next()) {
            (Some("ALL"), None) => Ok(true),
            (Some("RECENT"), None) => Ok(msg.recent),
            (Some("DELETED"), None) => Ok(msg.deleted),
            (Some("UNDELETED"), None) => Ok(!msg.deleted),
            (Some("UID"), Some(uid)) => Ok(uid.parse::<Uid>().ok() == Some(msg.uid)),
            _ => Err(Error::Bad(format!("Unknown search criterion: {}", criteria))),
        }
    }
}

impl MailTransport for MemoryTransport {
    type Handle = MemoryHandle;

    fn open(
        &mut self,
        conn: &str,
        username: &str,
        _password: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<MemoryHandle> {
        self.calls.push(Call::Open {
            conn: conn.to_string(),
            username: username.to_string(),
            options: options.bits(),
            retries,
        });
        if let Some(diagnostic) = self.refuse_open.clone() {
            self.last_error = Some(diagnostic.clone());
            return Err(Error::No(diagnostic));
        }
        let mailbox = self.target(conn, options)?;
        self.open_handles += 1;
        Ok(MemoryHandle { mailbox })
    }

    fn reopen(
        &mut self,
        handle: &mut MemoryHandle,
        conn: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<()> {
        self.calls.push(Call::Reopen {
            conn: conn.to_string(),
            options: options.bits(),
            retries,
        });
        handle.mailbox = self.target(conn, options)?;
        Ok(())
    }

    fn close(&mut self, handle: MemoryHandle, purge: bool) {
        self.calls.push(Call::Close { purge });
        if purge {
            if let Ok(m) = self.selected(&handle) {
                m.messages.retain(|msg| !msg.deleted);
            }
        }
        self.open_handles -= 1;
    }

    fn count(&mut self, handle: &mut MemoryHandle) -> Result<u32> {
        self.calls.push(Call::Count);
        let m = self.selected(handle)?;
        Ok(m.messages.len() as u32)
    }

    fn resolve_uid(&mut self, handle: &mut MemoryHandle, position: Seq) -> Result<Uid> {
        self.calls.push(Call::ResolveUid(position));
        let uid = {
            let m = self.selected(handle)?;
            position
                .checked_sub(1)
                .and_then(|i| m.messages.get(i as usize))
                .map(|msg| msg.uid)
        };
        match uid {
            Some(uid) => Ok(uid),
            None => self.fail(Error::NotFound(format!("no message at position {}", position))),
        }
    }

    fn search(&mut self, handle: &mut MemoryHandle, criteria: &str) -> Result<Vec<Uid>> {
        self.calls.push(Call::Search(criteria.to_string()));
        if self.fail_search {
            return self.fail(Error::Bad("SEARCH not available".to_string()));
        }
        let result: Result<Vec<Uid>> = {
            let m = self.selected(handle)?;
            m.messages
                .iter()
                .filter_map(|msg| match MemoryTransport::matches(msg, criteria) {
                    Ok(true) => Some(Ok(msg.uid)),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                })
                .collect()
        };
        match result {
            Ok(uids) => Ok(uids),
            Err(e) => self.fail(e),
        }
    }

    fn sort(
        &mut self,
        handle: &mut MemoryHandle,
        criterion: SortCriterion,
        reverse: bool,
    ) -> Result<Vec<Uid>> {
        self.calls.push(Call::Sort(criterion, reverse));
        let mut messages = self.selected(handle)?.messages.clone();
        match criterion {
            SortCriterion::Arrival => {}
            SortCriterion::Size => messages.sort_by_key(|msg| msg.body.len()),
            c => return self.fail(Error::No(format!("Unsupported sort criterion {}", c))),
        }
        if reverse {
            messages.reverse();
        }
        Ok(messages.into_iter().map(|msg| msg.uid).collect())
    }

    fn fetch(&mut self, handle: &mut MemoryHandle, uid: Uid) -> Result<Vec<u8>> {
        self.calls.push(Call::Fetch(uid));
        let body = self
            .selected(handle)?
            .messages
            .iter()
            .find(|msg| msg.uid == uid)
            .map(|msg| msg.body.clone());
        match body {
            Some(body) => Ok(body),
            None => self.fail(Error::NotFound(format!("no message with UID {}", uid))),
        }
    }

    fn mark_deleted(&mut self, handle: &mut MemoryHandle, uid: Uid) -> Result<()> {
        self.calls.push(Call::MarkDeleted(uid));
        if let Some(msg) = self
            .selected(handle)?
            .messages
            .iter_mut()
            .find(|msg| msg.uid == uid)
        {
            msg.deleted = true;
        }
        Ok(())
    }

    fn expunge(&mut self, handle: &mut MemoryHandle) -> Result<()> {
        self.calls.push(Call::Expunge);
        self.selected(handle)?.messages.retain(|msg| !msg.deleted);
        Ok(())
    }

    fn mailbox_exists(&mut self, _handle: &mut MemoryHandle, spec: &str) -> Result<bool> {
        self.calls.push(Call::MailboxExists(spec.to_string()));
        let spec = ConnectionSpec::parse(spec)?;
        Ok(spec.mailbox().map(|m| self.find(m).is_some()).unwrap_or(false))
    }

    fn create_mailbox(&mut self, _handle: &mut MemoryHandle, spec: &str) -> Result<()> {
        self.calls.push(Call::CreateMailbox(spec.to_string()));
        let spec = ConnectionSpec::parse(spec)?;
        let name = match spec.mailbox() {
            Some(name) => name.to_string(),
            None => return self.fail(Error::Bad("Missing mailbox name".to_string())),
        };
        if self.find(&name).is_some() {
            return self.fail(Error::No(format!("Mailbox already exists: {}", name)));
        }
        self.mailboxes.push(Mailbox {
            name,
            messages: Vec::new(),
        });
        Ok(())
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
