//! The bundled [`MailTransport`] speaking IMAP4rev1 over TCP, optionally wrapped in TLS.
//!
//! Connection flags steer how the socket is set up:
//!
//!  - `ssl` connects with implicit TLS (port 993 unless another is given).
//!  - `tls` requires `STARTTLS` on a plain connection, `notls` never attempts it.
//!  - `novalidate-cert` accepts invalid certificates and host names.
//!  - `readonly` selects the mailbox with `EXAMINE`.
//!
//! Other flags are carried in the connection string but have no effect here.

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use native_tls::TlsConnector;

use crate::error::{Error, Result};
use crate::flags::FlagSet;
use crate::spec::{ConnectionSpec, Service, IMAPS_PORT};
use crate::transport::{MailTransport, OpenOptions, Seq, SortCriterion, Uid};

mod client;
mod conn;
mod handle;
#[cfg(test)]
mod mock_stream;
mod parse;

use client::Client;
pub use conn::{Connection, ImapConnection};
pub use handle::ImapHandle;

/// The default port for plain IMAP.
pub const IMAP_PORT: u16 = 143;

/// Flags this transport acts on or knowingly accepts.
const KNOWN_FLAGS: &[&str] = &[
    "ssl",
    "tls",
    "notls",
    "validate-cert",
    "novalidate-cert",
    "readonly",
    "secure",
];

/// Talks to IMAP servers. One transport can serve any number of handles.
#[derive(Debug, Default)]
pub struct ImapTransport {
    timeout: Option<Duration>,
    last_error: Option<String>,
}

impl ImapTransport {
    pub fn new() -> Self {
        ImapTransport::default()
    }

    /// Give up on connecting, reading or writing when a step takes longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            self.last_error = Some(e.to_string());
        }
        result
    }

    fn establish(
        &self,
        conn: &str,
        username: &str,
        password: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<ImapHandle> {
        let spec = ConnectionSpec::parse(conn)?;
        if spec.service() != Service::Imap {
            return Err(Error::Connection(format!(
                "{} is not supported by the IMAP transport",
                spec.service()
            )));
        }

        let debug = options.contains(OpenOptions::DEBUG);
        let attempts = retries.max(1);
        let mut attempt = 1;
        let client = loop {
            match self.connect(&spec, debug) {
                Ok(client) => break client,
                Err(e) if attempt < attempts => {
                    tracing::debug!(
                        attempt,
                        host = spec.host(),
                        error = %e,
                        "connect failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        };

        let mut handle = ImapHandle::new(client, &spec, username, password);
        handle.login()?;
        select_for(&mut handle, &spec, options)?;
        Ok(handle)
    }

    fn connect(&self, spec: &ConnectionSpec, debug: bool) -> Result<Client<Connection>> {
        let flags = spec.flags();
        let domain = spec.host().trim_start_matches('[').trim_end_matches(']');
        for flag in flags.iter().filter(|f| !KNOWN_FLAGS.iter().any(|k| *k == f.key())) {
            tracing::debug!(%flag, "ignoring connection flag");
        }
        let ssl = flags.contains("ssl");
        let port = spec
            .port()
            .unwrap_or(if ssl { IMAPS_PORT } else { IMAP_PORT });

        tracing::debug!(domain, port, ssl, "connecting");
        let tcp = tcp_connect(domain, port, self.timeout)?;

        if ssl {
            let tls = tls_connector(flags)?.connect(domain, tcp)?;
            let mut client = new_client(Box::new(tls) as Connection, debug);
            client.read_greeting()?;
            Ok(client)
        } else if flags.contains("tls") && !flags.contains("notls") {
            let mut plain = new_client(tcp, debug);
            plain.read_greeting()?;
            plain.run_command_and_check_ok("STARTTLS")?;
            let tls = tls_connector(flags)?.connect(domain, plain.into_inner()?)?;
            Ok(new_client(Box::new(tls) as Connection, debug))
        } else {
            let mut client = new_client(Box::new(tcp) as Connection, debug);
            client.read_greeting()?;
            Ok(client)
        }
    }
}

/// Connect to the first reachable address of `domain`, bounding each attempt and every later
/// read and write by `timeout`.
fn tcp_connect(domain: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let tcp = match timeout {
        None => TcpStream::connect((domain, port))?,
        Some(timeout) => {
            let mut last = None;
            let mut connected = None;
            for addr in (domain, port).to_socket_addrs()? {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(tcp) => {
                        connected = Some(tcp);
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%addr, error = %e, "address unreachable");
                        last = Some(e);
                    }
                }
            }
            match (connected, last) {
                (Some(tcp), _) => tcp,
                (None, Some(e)) => return Err(e.into()),
                (None, None) => {
                    return Err(Error::Connection(format!(
                        "{} did not resolve to any address",
                        domain
                    )))
                }
            }
        }
    };
    tcp.set_read_timeout(timeout)?;
    tcp.set_write_timeout(timeout)?;
    Ok(tcp)
}

fn new_client<S: Read + Write>(stream: S, debug: bool) -> Client<S> {
    let mut client = Client::new(stream);
    client.debug = debug;
    client
}

fn tls_connector(flags: &FlagSet) -> Result<TlsConnector> {
    let novalidate = flags.contains("novalidate-cert");
    Ok(TlsConnector::builder()
        .danger_accept_invalid_certs(novalidate)
        .danger_accept_invalid_hostnames(novalidate)
        .build()?)
}

/// Select the mailbox `spec` names, or `INBOX`, unless the options ask for a half-open handle.
fn select_for<S: Read + Write>(
    handle: &mut ImapHandle<S>,
    spec: &ConnectionSpec,
    options: OpenOptions,
) -> Result<()> {
    if options.contains(OpenOptions::HALFOPEN) {
        handle.deselect();
        return Ok(());
    }
    let readonly = options.contains(OpenOptions::READONLY) || spec.flags().contains("readonly");
    handle.select(spec.mailbox().unwrap_or("INBOX"), readonly)
}

/// The mailbox name addressed by `spec`, which must be on the server `handle` is connected to.
fn mailbox_name<S: Read + Write>(handle: &ImapHandle<S>, spec: &str) -> Result<String> {
    let spec = ConnectionSpec::parse(spec)?;
    if spec.server_specification() != handle.server() {
        return Err(Error::Connection(format!(
            "{} is not on {}",
            spec,
            handle.server()
        )));
    }
    Ok(spec.mailbox().unwrap_or("INBOX").to_string())
}

impl MailTransport for ImapTransport {
    type Handle = ImapHandle;

    fn open(
        &mut self,
        conn: &str,
        username: &str,
        password: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<ImapHandle> {
        let result = self.establish(conn, username, password, options, retries);
        self.record(result)
    }

    fn reopen(
        &mut self,
        handle: &mut ImapHandle,
        conn: &str,
        options: OpenOptions,
        retries: u32,
    ) -> Result<()> {
        let result = ConnectionSpec::parse(conn).and_then(|spec| {
            handle.client.debug = options.contains(OpenOptions::DEBUG);
            if spec.server_specification() == handle.server() {
                return select_for(handle, &spec, options);
            }
            let fresh =
                self.establish(conn, handle.username(), handle.password(), options, retries)?;
            let mut stale = std::mem::replace(handle, fresh);
            if let Err(e) = stale.logout(false) {
                tracing::debug!(server = stale.server(), error = %e, "logout failed");
            }
            Ok(())
        });
        self.record(result)
    }

    fn close(&mut self, mut handle: ImapHandle, purge: bool) {
        if let Err(e) = handle.logout(purge) {
            tracing::debug!(server = handle.server(), error = %e, "logout failed");
            self.last_error = Some(e.to_string());
        }
    }

    fn count(&mut self, handle: &mut ImapHandle) -> Result<u32> {
        let result = handle.count();
        self.record(result)
    }

    fn resolve_uid(&mut self, handle: &mut ImapHandle, position: Seq) -> Result<Uid> {
        let result = handle.uid_at(position);
        self.record(result)
    }

    fn search(&mut self, handle: &mut ImapHandle, criteria: &str) -> Result<Vec<Uid>> {
        let result = handle.search(criteria);
        self.record(result)
    }

    fn sort(
        &mut self,
        handle: &mut ImapHandle,
        criterion: SortCriterion,
        reverse: bool,
    ) -> Result<Vec<Uid>> {
        let result = handle.sort(criterion, reverse);
        self.record(result)
    }

    fn fetch(&mut self, handle: &mut ImapHandle, uid: Uid) -> Result<Vec<u8>> {
        let result = handle.fetch_body(uid);
        self.record(result)
    }

    fn mark_deleted(&mut self, handle: &mut ImapHandle, uid: Uid) -> Result<()> {
        let result = handle.store_deleted(uid);
        self.record(result)
    }

    fn expunge(&mut self, handle: &mut ImapHandle) -> Result<()> {
        let result = handle.expunge();
        self.record(result)
    }

    fn mailbox_exists(&mut self, handle: &mut ImapHandle, spec: &str) -> Result<bool> {
        let result = mailbox_name(handle, spec).and_then(|name| handle.list_contains(&name));
        self.record(result)
    }

    fn create_mailbox(&mut self, handle: &mut ImapHandle, spec: &str) -> Result<()> {
        let result = mailbox_name(handle, spec).and_then(|name| handle.create(&name));
        self.record(result)
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.clone()
    }
}
