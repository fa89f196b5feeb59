use imap_proto::{AttributeValue, MailboxDatum, Response};
use nom::bytes::complete::{tag, tag_no_case};
use nom::character::complete::{crlf, digit1, space0, space1};
use nom::combinator::map_res;
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};
use nom::IResult;

use crate::transport::{Seq, Uid};

fn number(input: &[u8]) -> IResult<&[u8], u32> {
    map_res(digit1, |d: &[u8]| {
        std::str::from_utf8(d)
            .map_err(|_| ())
            .and_then(|s| s.parse::<u32>().map_err(|_| ()))
    })(input)
}

// * SEARCH 2 84 882
// * SORT 5 3 4 1 2
fn id_line<'i>(input: &'i [u8], keyword: &'static str) -> IResult<&'i [u8], Vec<u32>> {
    delimited(
        pair(tag(&b"* "[..]), tag_no_case(keyword.as_bytes())),
        many0(preceded(space1, number)),
        pair(space0, crlf),
    )(input)
}

fn skip_line(lines: &[u8]) -> &[u8] {
    match lines.iter().position(|b| *b == b'\n') {
        Some(end) => &lines[end + 1..],
        None => &[],
    }
}

/// Apply the mailbox size changes a response announces.
fn track(resp: &Response<'_>, exists: &mut u32) {
    match resp {
        Response::MailboxData(MailboxDatum::Exists(n)) => *exists = *n,
        Response::Expunge(_) => *exists = exists.saturating_sub(1),
        _ => {}
    }
}

/// Feed every response in `lines` to `f`, keeping `exists` current along the way.
///
/// Lines `imap_proto` cannot make sense of are skipped.
fn each_response<'a, F>(mut lines: &'a [u8], exists: &mut u32, mut f: F)
where
    F: FnMut(Response<'a>),
{
    while !lines.is_empty() {
        match imap_proto::parser::parse_response(lines) {
            Ok((rest, resp)) => {
                lines = rest;
                track(&resp, exists);
                f(resp);
            }
            Err(_) => {
                let rest = skip_line(lines);
                tracing::trace!(
                    line = %String::from_utf8_lossy(&lines[..lines.len() - rest.len()]).trim_end(),
                    "skipping unrecognized response"
                );
                lines = rest;
            }
        }
    }
}

/// Track unilateral responses only, e.g. after `SELECT`, `NOOP` or `EXPUNGE`.
pub(crate) fn parse_unilateral(lines: &[u8], exists: &mut u32) {
    each_response(lines, exists, |_| {});
}

/// Collect the IDs of every `* <keyword>` line, in server order.
pub(crate) fn parse_ids(mut lines: &[u8], keyword: &'static str, exists: &mut u32) -> Vec<u32> {
    let mut ids = Vec::new();
    while !lines.is_empty() {
        if let Ok((rest, found)) = id_line(lines, keyword) {
            ids.extend(found);
            lines = rest;
            continue;
        }
        let end = lines.len() - skip_line(lines).len();
        parse_unilateral(&lines[..end], exists);
        lines = &lines[end..];
    }
    ids
}

/// The UID reported for sequence number `position`.
pub(crate) fn parse_uid(lines: &[u8], position: Seq, exists: &mut u32) -> Option<Uid> {
    let mut found = None;
    each_response(lines, exists, |resp| {
        if let Response::Fetch(seq, attrs) = resp {
            if seq != position {
                return;
            }
            for attr in attrs {
                if let AttributeValue::Uid(uid) = attr {
                    found = Some(uid);
                }
            }
        }
    });
    found
}

/// The full message text returned for `uid` by `BODY.PEEK[]`.
pub(crate) fn parse_body(lines: &[u8], uid: Uid, exists: &mut u32) -> Option<Vec<u8>> {
    let mut found = None;
    each_response(lines, exists, |resp| {
        if let Response::Fetch(_, attrs) = resp {
            let mut body = None;
            let mut matches = true;
            for attr in attrs {
                match attr {
                    AttributeValue::Uid(u) => matches = u == uid,
                    AttributeValue::BodySection {
                        data: Some(data), ..
                    } => body = Some(data.into_owned()),
                    AttributeValue::Rfc822(Some(data)) => body = Some(data.into_owned()),
                    _ => {}
                }
            }
            if matches && body.is_some() {
                found = body;
            }
        }
    });
    found
}

/// Whether a `LIST` response names `mailbox`. `INBOX` is matched case-insensitively.
pub(crate) fn parse_list_contains(lines: &[u8], mailbox: &str, exists: &mut u32) -> bool {
    let mut found = false;
    each_response(lines, exists, |resp| {
        if let Response::MailboxData(MailboxDatum::List { name, .. }) = resp {
            let inbox = name.eq_ignore_ascii_case("INBOX") && mailbox.eq_ignore_ascii_case("INBOX");
            found |= inbox || name == mailbox;
        }
    });
    found
}
