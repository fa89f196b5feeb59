//! Lifecycle of the transport handle.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Error, Result};
use crate::spec::ConnectionSpec;
use crate::transport::{MailTransport, OpenOptions};

/// Connection attempts requested from the transport on open and reopen.
const RETRIES: u32 = 1;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a [`TransportSession`].
///
/// Message handles refer back to the session that issued them through this id rather than
/// through a reference, so sessions can be dropped while handles are still around.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Owns at most one live transport handle.
///
/// The handle is opened lazily by [`TransportSession::handle`]. Selecting another mailbox while
/// the handle is open reopens that same handle; it never creates a second one.
pub struct TransportSession<T: MailTransport> {
    id: SessionId,
    spec: ConnectionSpec,
    username: String,
    password: String,
    options: OpenOptions,
    transport: T,
    handle: Option<T::Handle>,
}

impl<T: MailTransport> TransportSession<T> {
    /// Creates a new unopened session.
    pub fn new(transport: T, spec: ConnectionSpec) -> Self {
        TransportSession {
            id: SessionId::next(),
            spec,
            username: String::new(),
            password: String::new(),
            options: OpenOptions::empty(),
            transport,
            handle: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn spec(&self) -> &ConnectionSpec {
        &self.spec
    }

    /// Access the connection spec, e.g. to change flags before the next open or reopen.
    pub fn spec_mut(&mut self) -> &mut ConnectionSpec {
        &mut self.spec
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn options(&self) -> OpenOptions {
        self.options
    }

    pub fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    /// Credentials used by the next open.
    pub fn set_credentials(&mut self, username: impl Into<String>, password: impl Into<String>) {
        self.username = username.into();
        self.password = password.into();
    }

    /// Store an option bitmask for future opens and reopens.
    ///
    /// An already open handle is not affected until it is reopened.
    pub fn set_options(&mut self, options: i64) -> Result<()> {
        self.options = OpenOptions::from_raw(options)?;
        Ok(())
    }

    /// The live handle, connecting first if there is none.
    pub fn handle(&mut self) -> Result<&mut T::Handle> {
        if self.handle.is_none() {
            self.open()?;
        }
        self.handle
            .as_mut()
            .ok_or_else(|| Error::Connection("no transport handle".to_string()))
    }

    /// Run `op` against the live handle, connecting first if needed.
    ///
    /// I/O, TLS and lost-connection failures come back as [`Error::Connection`] carrying the
    /// transport's last diagnostic. Protocol-level errors are passed through.
    pub(crate) fn call<R, F>(&mut self, op: F) -> Result<R>
    where
        F: FnOnce(&mut T, &mut T::Handle) -> Result<R>,
    {
        let result = {
            let (transport, handle) = self.parts()?;
            op(transport, handle)
        };
        result.map_err(|e| match e {
            Error::Io(_) | Error::ConnectionLost | Error::Tls(_) | Error::TlsHandshake(_) => {
                self.connection_error(e)
            }
            e => e,
        })
    }

    fn parts(&mut self) -> Result<(&mut T, &mut T::Handle)> {
        if self.handle.is_none() {
            self.open()?;
        }
        match self.handle {
            Some(ref mut handle) => Ok((&mut self.transport, handle)),
            None => Err(Error::Connection("no transport handle".to_string())),
        }
    }

    /// Select `mailbox`. An open handle is reopened against it straight away.
    pub fn select_mailbox(&mut self, mailbox: &str) -> Result<()> {
        self.spec.set_mailbox(Some(mailbox.to_string()));
        tracing::debug!(session = self.id.0, mailbox, "selecting mailbox");
        if self.handle.is_some() {
            self.reopen()?;
        }
        Ok(())
    }

    fn open(&mut self) -> Result<()> {
        if self.handle.is_some() {
            return Ok(());
        }
        let conn = self.spec.connection_string();
        tracing::debug!(session = self.id.0, %conn, "opening transport");
        match self.transport.open(
            &conn,
            &self.username,
            &self.password,
            self.options,
            RETRIES,
        ) {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => Err(self.connection_error(e)),
        }
    }

    fn reopen(&mut self) -> Result<()> {
        let conn = self.spec.connection_string();
        let handle = match self.handle {
            Some(ref mut handle) => handle,
            None => return Ok(()),
        };
        tracing::debug!(session = self.id.0, %conn, "reopening transport");
        if let Err(e) = self
            .transport
            .reopen(handle, &conn, self.options, RETRIES)
        {
            // the transport gives no guarantee about a handle it failed to reopen
            self.handle = None;
            return Err(self.connection_error(e));
        }
        Ok(())
    }

    /// Close the handle, if any, optionally purging messages marked for deletion.
    pub fn close(&mut self, purge: bool) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(session = self.id.0, purge, "closing transport");
            self.transport.close(handle, purge);
        }
    }

    /// Permanently remove messages marked for deletion from the selected mailbox.
    pub fn expunge(&mut self) -> Result<()> {
        self.call(|transport, handle| transport.expunge(handle))
    }

    /// Whether `mailbox` exists on the server.
    pub fn has_mailbox(&mut self, mailbox: &str) -> Result<bool> {
        let spec = self.spec.mailbox_specification(mailbox);
        self.call(|transport, handle| transport.mailbox_exists(handle, &spec))
    }

    /// Create `mailbox` on the server.
    pub fn create_mailbox(&mut self, mailbox: &str) -> Result<()> {
        let spec = self.spec.mailbox_specification(mailbox);
        self.call(|transport, handle| transport.create_mailbox(handle, &spec))
    }

    fn connection_error(&self, e: Error) -> Error {
        let message = self
            .transport
            .last_error()
            .unwrap_or_else(|| e.to_string());
        tracing::debug!(session = self.id.0, %message, "transport failure");
        Error::Connection(message)
    }
}

impl<T: MailTransport> fmt::Debug for TransportSession<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportSession")
            .field("id", &self.id)
            .field("spec", &self.spec)
            .field("username", &self.username)
            .field("options", &self.options)
            .field("open", &self.handle.is_some())
            .finish()
    }
}

impl<T: MailTransport> Drop for TransportSession<T> {
    fn drop(&mut self) {
        self.close(false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ValidateError;
    use crate::flags::FlagPolicy;
    use crate::spec::Service;
    use crate::testing::{Call, MemoryTransport};

    fn session(transport: MemoryTransport) -> TransportSession<MemoryTransport> {
        let policy = FlagPolicy::default();
        let spec =
            ConnectionSpec::new("mail.example.org", Some(993), Service::Imap, policy).unwrap();
        let mut s = TransportSession::new(transport, spec);
        s.set_credentials("bob", "hunter2");
        s
    }

    #[test]
    fn opens_lazily_once() {
        let mut s = session(MemoryTransport::new().with_mailbox("INBOX", &[10, 11]));
        assert!(!s.is_open());
        s.handle().unwrap();
        s.handle().unwrap();
        assert!(s.is_open());
        assert_eq!(
            s.transport().calls(),
            &[Call::Open {
                conn: "{mail.example.org:993/ssl}".to_string(),
                username: "bob".to_string(),
                options: 0,
                retries: 1,
            }]
        );
    }

    #[test]
    fn select_before_open_does_not_connect() {
        let mut s = session(MemoryTransport::new().with_mailbox("Archive", &[]));
        s.select_mailbox("Archive").unwrap();
        assert!(s.transport().calls().is_empty());
        s.handle().unwrap();
        assert_eq!(
            s.transport().calls()[0],
            Call::Open {
                conn: "{mail.example.org:993/ssl}Archive".to_string(),
                username: "bob".to_string(),
                options: 0,
                retries: 1,
            }
        );
    }

    #[test]
    fn select_while_open_reopens() {
        let mut s = session(
            MemoryTransport::new()
                .with_mailbox("INBOX", &[1])
                .with_mailbox("Archive", &[2, 3]),
        );
        s.select_mailbox("INBOX").unwrap();
        s.handle().unwrap();
        s.select_mailbox("Archive").unwrap();

        let calls = s.transport().calls();
        assert_eq!(calls.len(), 2);
        match calls[1] {
            Call::Reopen { ref conn, .. } => assert!(conn.ends_with("}Archive")),
            ref c => panic!("expected reopen, got {:?}", c),
        }
        assert_eq!(s.transport().open_handles(), 1);
    }

    #[test]
    fn open_failure_carries_diagnostic() {
        let transport =
            MemoryTransport::new().refuse_open("[AUTHENTICATIONFAILED] Invalid credentials");
        let mut s = session(transport);
        match s.handle() {
            Err(Error::Connection(msg)) => {
                assert_eq!(msg, "[AUTHENTICATIONFAILED] Invalid credentials")
            }
            r => panic!("Wrong result: {:?}", r.map(|_| ())),
        }
        assert!(!s.is_open());
    }

    #[test]
    fn failed_reopen_drops_handle() {
        let mut s = session(MemoryTransport::new().with_mailbox("INBOX", &[1]));
        s.handle().unwrap();
        match s.select_mailbox("Missing") {
            Err(Error::Connection(msg)) => assert!(msg.contains("Missing")),
            r => panic!("Wrong result: {:?}", r),
        }
        assert!(!s.is_open());
    }

    #[test]
    fn close_is_noop_without_handle() {
        let mut s = session(MemoryTransport::new().with_mailbox("INBOX", &[1]));
        s.close(true);
        assert!(s.transport().calls().is_empty());
        s.handle().unwrap();
        s.close(true);
        s.close(true);
        assert_eq!(s.transport().calls().len(), 2);
        assert_eq!(s.transport().calls()[1], Call::Close { purge: true });
        assert!(!s.is_open());
    }

    #[test]
    fn options_validated_and_applied_on_next_open() {
        let mut s = session(MemoryTransport::new().with_mailbox("INBOX", &[1]));
        match s.set_options(-2) {
            Err(Error::Validate(ValidateError::Options(-2))) => {}
            r => panic!("Wrong result: {:?}", r),
        }
        s.set_options(2).unwrap();
        s.handle().unwrap();
        match s.transport().calls()[0] {
            Call::Open { options, .. } => assert_eq!(options, 2),
            ref c => panic!("expected open, got {:?}", c),
        }
    }

    #[test]
    fn changed_options_reach_the_next_reopen() {
        let mut s = session(
            MemoryTransport::new()
                .with_mailbox("INBOX", &[1])
                .with_mailbox("Archive", &[2]),
        );
        s.handle().unwrap();
        s.set_options(2).unwrap();
        assert_eq!(s.transport().calls().len(), 1);
        assert_eq!(s.options(), OpenOptions::READONLY);

        s.select_mailbox("Archive").unwrap();
        assert_eq!(s.transport().calls().len(), 2);
        match s.transport().calls()[1] {
            Call::Reopen {
                ref conn,
                options: 2,
                retries: 1,
            } => assert_eq!(conn, "{mail.example.org:993/ssl}Archive"),
            ref c => panic!("expected reopen, got {:?}", c),
        }
    }

    #[test]
    fn mailbox_administration_uses_server_specification() {
        let mut s = session(MemoryTransport::new().with_mailbox("INBOX", &[1]));
        s.select_mailbox("INBOX").unwrap();
        assert!(!s.has_mailbox("Archive").unwrap());
        s.create_mailbox("Archive").unwrap();
        assert!(s.has_mailbox("Archive").unwrap());
        assert!(s
            .transport()
            .calls()
            .contains(&Call::CreateMailbox("{mail.example.org:993/ssl}Archive".to_string())));
    }

    #[test]
    fn ids_are_unique() {
        let a = session(MemoryTransport::new());
        let b = session(MemoryTransport::new());
        assert_ne!(a.id(), b.id());
    }
}
