//! Connection strings.
//!
//! Every operation that crosses into a [`MailTransport`](crate::MailTransport) is addressed by a
//! string of the form
//!
//! ```text
//! {host[:port][/service][/flag]*}[mailbox]
//! ```
//!
//! The brace-delimited part is the *server specification*; the mailbox name follows the closing
//! brace directly, without a separator.

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use nom::branch::alt;
use nom::bytes::complete::take_while1;
use nom::character::complete::{char, digit1};
use nom::combinator::{map_res, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, preceded};
use nom::IResult;
use regex::Regex;

use crate::error::{Error, ParseError, Result, ValidateError};
use crate::flags::{FlagPolicy, FlagSet, FlagValue};

/// The IMAP-over-TLS port. Configuring it switches on the `ssl` flag.
pub const IMAPS_PORT: u16 = 993;

lazy_static! {
    static ref HOST_REGEX: Regex =
        Regex::new(r"^(\[[0-9A-Fa-f:.]+\]|[^\s{}/:\[\]]+)$").unwrap();
}

/// The mail access protocol spoken to the server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum Service {
    /// IMAP4rev1. The default, never written into the server specification.
    #[default]
    Imap,
    /// POP3.
    Pop3,
    /// NNTP.
    Nntp,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Service::Imap => write!(f, "imap"),
            Service::Pop3 => write!(f, "pop3"),
            Service::Nntp => write!(f, "nntp"),
        }
    }
}

impl FromStr for Service {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "imap" | "imap4" | "imap4rev1" => Ok(Service::Imap),
            "pop3" | "pop" => Ok(Service::Pop3),
            "nntp" => Ok(Service::Nntp),
            _ => Err(ParseError::Unexpected(format!("unknown service {:?}", s)).into()),
        }
    }
}

/// Everything needed to address a server and, optionally, one of its mailboxes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSpec {
    host: String,
    port: Option<u16>,
    service: Service,
    flags: FlagSet,
    mailbox: Option<String>,
}

impl ConnectionSpec {
    /// Describe a server. Connecting to [`IMAPS_PORT`] sets the `ssl` flag, unless the policy
    /// disables secure transport.
    pub fn new(
        host: impl Into<String>,
        port: Option<u16>,
        service: Service,
        policy: FlagPolicy,
    ) -> Result<Self> {
        let host = host.into();
        if !HOST_REGEX.is_match(&host) {
            return Err(ValidateError::Host(host).into());
        }
        if port == Some(0) {
            return Err(ValidateError::Port(0).into());
        }

        let mut spec = ConnectionSpec {
            host,
            port,
            service,
            flags: FlagSet::with_policy(policy),
            mailbox: None,
        };
        if port == Some(IMAPS_PORT) {
            spec.flags.set("ssl", FlagValue::On)?;
        }
        Ok(spec)
    }

    /// Parse a connection string back into its parts.
    ///
    /// Flags are taken verbatim: no policy is applied to them.
    pub fn parse(s: &str) -> Result<Self> {
        let (rest, (host, port, segments)) = server_specification(s)
            .map_err(|_| Error::Parse(ParseError::ConnectionString(s.to_string())))?;

        let mut segments = segments.into_iter().peekable();
        let service = match segments.peek().map(|seg| seg.parse::<Service>()) {
            Some(Ok(service)) => {
                segments.next();
                service
            }
            _ => Service::Imap,
        };

        let mut flags = FlagSet::with_policy(FlagPolicy::empty());
        for token in segments {
            flags.insert_token(token)?;
        }

        Ok(ConnectionSpec {
            host: host.to_string(),
            port,
            service,
            flags,
            mailbox: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn service(&self) -> Service {
        self.service
    }

    pub fn flags(&self) -> &FlagSet {
        &self.flags
    }

    pub fn flags_mut(&mut self) -> &mut FlagSet {
        &mut self.flags
    }

    /// The selected mailbox, if any.
    pub fn mailbox(&self) -> Option<&str> {
        self.mailbox.as_deref()
    }

    /// Select a mailbox. An empty name clears the selection.
    pub fn set_mailbox(&mut self, mailbox: Option<String>) {
        self.mailbox = mailbox.filter(|m| !m.is_empty());
    }

    /// `{host[:port][/service][/flag]*}`
    pub fn server_specification(&self) -> String {
        let mut s = format!("{{{}", self.host);
        if let Some(port) = self.port {
            s.push_str(&format!(":{}", port));
        }
        if self.service != Service::Imap {
            s.push_str(&format!("/{}", self.service));
        }
        s.push_str(&self.flags.to_string());
        s.push('}');
        s
    }

    /// The server specification followed by the selected mailbox.
    pub fn connection_string(&self) -> String {
        match self.mailbox {
            Some(ref mailbox) => self.mailbox_specification(mailbox),
            None => self.server_specification(),
        }
    }

    /// The server specification followed by an arbitrary mailbox name.
    pub fn mailbox_specification(&self, mailbox: &str) -> String {
        format!("{}{}", self.server_specification(), mailbox)
    }
}

impl fmt::Display for ConnectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.connection_string())
    }
}

fn host(input: &str) -> IResult<&str, &str> {
    alt((
        recognize(delimited(char('['), take_while1(|c| c != ']'), char(']'))),
        take_while1(|c| c != ':' && c != '/' && c != '}'),
    ))(input)
}

fn port(input: &str) -> IResult<&str, u16> {
    preceded(char(':'), map_res(digit1, |d: &str| d.parse::<u16>()))(input)
}

fn segment(input: &str) -> IResult<&str, &str> {
    preceded(char('/'), take_while1(|c| c != '/' && c != '}'))(input)
}

#[allow(clippy::type_complexity)]
fn server_specification(input: &str) -> IResult<&str, (&str, Option<u16>, Vec<&str>)> {
    let (input, _) = char('{')(input)?;
    let (input, host) = host(input)?;
    let (input, port) = opt(port)(input)?;
    let (input, segments) = many0(segment)(input)?;
    let (input, _) = char('}')(input)?;
    Ok((input, (host, port, segments)))
}
