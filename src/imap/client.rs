use bufstream::BufStream;
use std::io::{self, BufRead, Read, Write};

use imap_proto::{Response, Status};

use crate::error::{Error, ParseError, Result, ValidateError};

static TAG_PREFIX: &str = "a";
const INITIAL_TAG: u32 = 0;
const CR: u8 = 0x0d;
const LF: u8 = 0x0a;

macro_rules! quote {
    ($x:expr) => {
        format!("\"{}\"", $x.replace(r"\", r"\\").replace("\"", "\\\""))
    };
}

/// Quote `value` as an IMAP string, rejecting characters a quoted string cannot carry.
pub(crate) fn validate_str(value: &str) -> Result<String> {
    let quoted = quote!(value);
    if quoted.contains('\n') {
        return Err(Error::Validate(ValidateError::Char('\n')));
    }
    if quoted.contains('\r') {
        return Err(Error::Validate(ValidateError::Char('\r')));
    }
    Ok(quoted)
}

/// Tagged command/response exchange over a byte stream.
#[derive(Debug)]
pub(crate) struct Client<T: Read + Write> {
    pub(crate) stream: BufStream<T>,
    tag: u32,
    /// Log wire lines at debug instead of trace.
    pub(crate) debug: bool,
}

impl<T: Read + Write> Client<T> {
    /// Creates a new client with the underlying stream.
    pub(crate) fn new(stream: T) -> Client<T> {
        Client {
            stream: BufStream::new(stream),
            tag: INITIAL_TAG,
            debug: false,
        }
    }

    /// Give back the underlying stream, e.g. to wrap it in TLS after `STARTTLS`.
    pub(crate) fn into_inner(self) -> Result<T> {
        self.stream
            .into_inner()
            .map_err(|e| Error::Io(io::Error::from(e)))
    }

    /// Runs a command and checks if it returns OK.
    pub(crate) fn run_command_and_check_ok(&mut self, command: &str) -> Result<()> {
        self.run_command_and_read_response(command).map(|_| ())
    }

    /// Runs a command and returns the untagged lines of its response.
    pub(crate) fn run_command_and_read_response(
        &mut self,
        untagged_command: &str,
    ) -> Result<Vec<u8>> {
        self.run_command(untagged_command)?;
        self.read_response()
    }

    pub(crate) fn run_command(&mut self, untagged_command: &str) -> Result<()> {
        let command = self.create_command(untagged_command);
        self.write_line(command.as_bytes())
    }

    pub(crate) fn read_response(&mut self) -> Result<Vec<u8>> {
        let mut v = Vec::new();
        self.read_response_onto(&mut v)?;
        Ok(v)
    }

    fn read_response_onto(&mut self, data: &mut Vec<u8>) -> Result<()> {
        let mut continue_from = None;
        let mut try_first = !data.is_empty();
        let match_tag = format!("{}{}", TAG_PREFIX, self.tag);
        loop {
            let line_start = if try_first {
                try_first = false;
                0
            } else {
                let start_new = data.len();
                self.readline(data)?;
                continue_from.take().unwrap_or(start_new)
            };

            let break_with = {
                let line = &data[line_start..];

                match imap_proto::parser::parse_response(line) {
                    Ok((
                        _,
                        Response::Done {
                            tag,
                            status,
                            information,
                            ..
                        },
                    )) => {
                        if tag.0 != match_tag {
                            Some(Err((
                                Status::Bad,
                                Some(format!(
                                    "response tagged {} while waiting for {}",
                                    tag.0, match_tag
                                )),
                            )))
                        } else {
                            Some(match status {
                                Status::Bad | Status::No => {
                                    Err((status, information.map(|s| s.to_string())))
                                }
                                Status::Ok => Ok(()),
                                status => Err((status, None)),
                            })
                        }
                    }
                    Ok(..) => None,
                    Err(nom::Err::Incomplete(..)) => {
                        continue_from = Some(line_start);
                        None
                    }
                    Err(_) => Some(Err((Status::Bye, None))),
                }
            };

            match break_with {
                Some(Ok(_)) => {
                    data.truncate(line_start);
                    break Ok(());
                }
                Some(Err((status, expl))) => match status {
                    Status::Bad => {
                        break Err(Error::Bad(
                            expl.unwrap_or_else(|| "no explanation given".to_string()),
                        ))
                    }
                    Status::No => {
                        break Err(Error::No(
                            expl.unwrap_or_else(|| "no explanation given".to_string()),
                        ))
                    }
                    _ => break Err(Error::Parse(ParseError::Invalid(data.split_off(0)))),
                },
                None => {}
            }
        }
    }

    /// Read and discard the server greeting.
    pub(crate) fn read_greeting(&mut self) -> Result<()> {
        let mut v = Vec::new();
        self.readline(&mut v)?;
        if v.starts_with(b"* BYE") {
            return Err(Error::Connection(
                String::from_utf8_lossy(&v).trim_end().to_string(),
            ));
        }
        Ok(())
    }

    fn readline(&mut self, into: &mut Vec<u8>) -> Result<usize> {
        let read = self.stream.read_until(LF, into)?;
        if read == 0 {
            return Err(Error::ConnectionLost);
        }

        let line = String::from_utf8_lossy(&into[into.len() - read..]);
        let line = line.trim_end();
        if self.debug {
            tracing::debug!("S: {}", line);
        } else {
            tracing::trace!("S: {}", line);
        }

        Ok(read)
    }

    fn create_command(&mut self, command: &str) -> String {
        self.tag += 1;
        format!("{}{} {}", TAG_PREFIX, self.tag, command)
    }

    fn write_line(&mut self, buf: &[u8]) -> Result<()> {
        self.stream.write_all(buf)?;
        self.stream.write_all(&[CR, LF])?;
        self.stream.flush()?;
        let line = String::from_utf8_lossy(buf);
        // never log credentials
        let line = if line.contains(" LOGIN ") {
            std::borrow::Cow::Borrowed("LOGIN <redacted>")
        } else {
            line
        };
        if self.debug {
            tracing::debug!("C: {}", line);
        } else {
            tracing::trace!("C: {}", line);
        }
        Ok(())
    }
}
