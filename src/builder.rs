//! Building a [`MailboxSession`](crate::MailboxSession) from server settings.

use crate::error::Result;
use crate::flags::{FlagPolicy, FlagValue};
use crate::imap::ImapTransport;
use crate::mailbox::MailboxSession;
use crate::session::TransportSession;
use crate::spec::{ConnectionSpec, Service};
use crate::transport::MailTransport;

/// A convenience builder for [`MailboxSession`] structs.
///
/// Connecting to an IMAP server with the bundled transport is straightforward:
/// ```no_run
/// # use mailsession::SessionBuilder;
/// # fn main() -> Result<(), mailsession::Error> {
/// let session = SessionBuilder::new("imap.example.com")
///     .port(993)
///     .credentials("bob", "hunter2")
///     .imap()?;
/// # Ok(())
/// # }
/// ```
///
/// Flags are applied in the order they are given, after the `ssl` flag implied by port 993, so a
/// later flag can evict an earlier one:
/// ```
/// # use mailsession::{FlagValue, SessionBuilder};
/// # fn main() -> Result<(), mailsession::Error> {
/// let session = SessionBuilder::new("imap.example.com")
///     .port(143)
///     .flag("tls", FlagValue::On)
///     .flag("notls", FlagValue::On)
///     .mailbox("Archive")
///     .imap()?;
/// assert_eq!(session.connection_string(), "{imap.example.com:143/notls}Archive");
/// # Ok(())
/// # }
/// ```
///
/// Any other [`MailTransport`] can be plugged in with [`build`](Self::build).
pub struct SessionBuilder<D>
where
    D: AsRef<str>,
{
    host: D,
    port: Option<u16>,
    service: Service,
    flags: Vec<(String, FlagValue)>,
    username: String,
    password: String,
    mailbox: Option<String>,
    options: i64,
    policy: Option<FlagPolicy>,
}

impl<D> SessionBuilder<D>
where
    D: AsRef<str>,
{
    /// Make a new `SessionBuilder` for the given host.
    pub fn new(host: D) -> Self {
        SessionBuilder {
            host,
            port: None,
            service: Service::Imap,
            flags: Vec::new(),
            username: String::new(),
            password: String::new(),
            mailbox: None,
            options: 0,
            policy: None,
        }
    }

    /// Connect to this port instead of the protocol default. Port 993 implies `ssl`.
    pub fn port(&mut self, port: u16) -> &mut Self {
        self.port = Some(port);
        self
    }

    pub fn service(&mut self, service: Service) -> &mut Self {
        self.service = service;
        self
    }

    /// Add, replace or remove a connection flag.
    pub fn flag(&mut self, flag: &str, value: impl Into<FlagValue>) -> &mut Self {
        self.flags.push((flag.to_string(), value.into()));
        self
    }

    pub fn credentials(&mut self, username: &str, password: &str) -> &mut Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    /// The mailbox to select on open.
    pub fn mailbox(&mut self, mailbox: &str) -> &mut Self {
        self.mailbox = Some(mailbox.to_string());
        self
    }

    /// The option bitmask, validated by [`build`](Self::build).
    pub fn options(&mut self, options: i64) -> &mut Self {
        self.options = options;
        self
    }

    /// Use `policy` instead of the process-wide [`FlagPolicy`].
    pub fn policy(&mut self, policy: FlagPolicy) -> &mut Self {
        self.policy = Some(policy);
        self
    }

    /// Return a new, unopened [`MailboxSession`] using the bundled IMAP transport.
    pub fn imap(&self) -> Result<MailboxSession<ImapTransport>> {
        self.build(ImapTransport::new())
    }

    /// Make a [`MailboxSession`] over a custom transport.
    ///
    /// Nothing is sent to the server until the session is first used.
    pub fn build<T: MailTransport>(&self, transport: T) -> Result<MailboxSession<T>> {
        let policy = self.policy.clone().unwrap_or_else(FlagPolicy::global);
        let mut spec = ConnectionSpec::new(self.host.as_ref(), self.port, self.service, policy)?;
        for (flag, value) in &self.flags {
            spec.flags_mut().set(flag, value.clone())?;
        }
        spec.set_mailbox(self.mailbox.clone());

        let mut session = TransportSession::new(transport, spec);
        session.set_credentials(self.username.as_str(), self.password.as_str());
        session.set_options(self.options)?;
        Ok(MailboxSession::from_transport_session(session))
    }
}
