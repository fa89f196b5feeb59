//! Drives a `MailboxSession` through a transport implemented outside the crate, the way a
//! downstream backend would plug in.

use std::cell::RefCell;
use std::rc::Rc;

use mailsession::{
    Error, FlagValue, MailTransport, OpenOptions, Result, Seq, SessionBuilder, SortCriterion, Uid,
};

#[derive(Debug, Default)]
struct Server {
    uids: Vec<Uid>,
    log: Vec<String>,
}

#[derive(Clone, Debug, Default)]
struct Scripted(Rc<RefCell<Server>>);

#[derive(Debug)]
struct Conn {
    mailbox: String,
}

impl Scripted {
    fn with_uids(uids: &[Uid]) -> Self {
        let server = Server {
            uids: uids.to_vec(),
            log: Vec::new(),
        };
        Scripted(Rc::new(RefCell::new(server)))
    }

    fn log(&self) -> Vec<String> {
        self.0.borrow().log.clone()
    }

    fn push(&self, entry: String) {
        self.0.borrow_mut().log.push(entry);
    }
}

fn mailbox_of(conn: &str) -> String {
    conn.rsplit('}').next().unwrap_or_default().to_string()
}

impl MailTransport for Scripted {
    type Handle = Conn;

    fn open(&mut self, conn: &str, _: &str, _: &str, _: OpenOptions, _: u32) -> Result<Conn> {
        self.push(format!("open {}", conn));
        Ok(Conn {
            mailbox: mailbox_of(conn),
        })
    }

    fn reopen(&mut self, handle: &mut Conn, conn: &str, _: OpenOptions, _: u32) -> Result<()> {
        self.push(format!("reopen {}", conn));
        handle.mailbox = mailbox_of(conn);
        Ok(())
    }

    fn close(&mut self, _: Conn, purge: bool) {
        self.push(format!("close {}", purge));
    }

    fn count(&mut self, _: &mut Conn) -> Result<u32> {
        Ok(self.0.borrow().uids.len() as u32)
    }

    fn resolve_uid(&mut self, _: &mut Conn, position: Seq) -> Result<Uid> {
        self.push(format!("resolve {}", position));
        self.0
            .borrow()
            .uids
            .get(position as usize - 1)
            .copied()
            .ok_or_else(|| Error::NotFound(position.to_string()))
    }

    fn search(&mut self, _: &mut Conn, criteria: &str) -> Result<Vec<Uid>> {
        let uids = self.0.borrow().uids.clone();
        match criteria.strip_prefix("UID ") {
            Some(uid) => Ok(uids.into_iter().filter(|u| u.to_string() == uid).collect()),
            None if criteria == "ALL" => Ok(uids),
            None => Ok(Vec::new()),
        }
    }

    fn sort(&mut self, _: &mut Conn, _: SortCriterion, reverse: bool) -> Result<Vec<Uid>> {
        let mut uids = self.0.borrow().uids.clone();
        if reverse {
            uids.reverse();
        }
        Ok(uids)
    }

    fn fetch(&mut self, _: &mut Conn, uid: Uid) -> Result<Vec<u8>> {
        Ok(format!("Subject: {}\r\n\r\n", uid).into_bytes())
    }

    fn mark_deleted(&mut self, _: &mut Conn, _: Uid) -> Result<()> {
        Ok(())
    }

    fn expunge(&mut self, _: &mut Conn) -> Result<()> {
        Ok(())
    }

    fn mailbox_exists(&mut self, handle: &mut Conn, spec: &str) -> Result<bool> {
        Ok(mailbox_of(spec) == handle.mailbox)
    }

    fn create_mailbox(&mut self, _: &mut Conn, _: &str) -> Result<()> {
        Ok(())
    }
}

#[test]
fn imaps_port_implies_ssl() {
    let session = SessionBuilder::new("mail.example.org")
        .port(993)
        .build(Scripted::default())
        .unwrap();
    assert_eq!(session.server_specification(), "{mail.example.org:993/ssl}");
}

#[test]
fn notls_evicts_tls() {
    let session = SessionBuilder::new("mail.example.org")
        .flag("tls", FlagValue::On)
        .flag("notls", FlagValue::On)
        .build(Scripted::default())
        .unwrap();
    let flags = session.session().spec().flags();
    assert!(flags.contains("notls"));
    assert!(!flags.contains("tls"));
    assert_eq!(flags.len(), 1);
}

#[test]
fn list_resolves_first_positions() {
    let transport = Scripted::with_uids(&[101, 102, 105, 109, 110]);
    let mut session = SessionBuilder::new("mail.example.org")
        .build(transport.clone())
        .unwrap();

    let handles = session.list(Some(3)).unwrap();
    let uids: Vec<Uid> = handles.iter().map(|h| h.uid()).collect();
    assert_eq!(uids, vec![101, 102, 105]);
    assert_eq!(
        transport.log(),
        vec!["open {mail.example.org}", "resolve 1", "resolve 2", "resolve 3"]
    );
}

#[test]
fn select_while_open_reopens() {
    let transport = Scripted::with_uids(&[1, 2]);
    let mut session = SessionBuilder::new("mail.example.org")
        .port(993)
        .build(transport.clone())
        .unwrap();

    session.count().unwrap();
    session.select_mailbox("Archive").unwrap();
    session.count().unwrap();

    let log = transport.log();
    assert_eq!(log.iter().filter(|l| l.starts_with("open ")).count(), 1);
    assert_eq!(log.last().unwrap(), "reopen {mail.example.org:993/ssl}Archive");
    assert!(session.has_mailbox("Archive").unwrap());
}

#[test]
fn handles_stay_on_their_message() {
    let transport = Scripted::with_uids(&[7, 8, 9]);
    let mut session = SessionBuilder::new("mail.example.org")
        .build(transport.clone())
        .unwrap();

    let last = session.get(3).unwrap();
    transport.0.borrow_mut().uids.remove(0);

    assert_eq!(session.fetch(&last).unwrap(), b"Subject: 9\r\n\r\n".to_vec());
    assert_eq!(session.by_uid(9).unwrap(), last);
    assert!(session.get(3).is_err());
}

#[test]
fn iteration_and_close() {
    let transport = Scripted::with_uids(&[3, 4]);
    let mut session = SessionBuilder::new("mail.example.org")
        .build(transport.clone())
        .unwrap();

    let mut seen = Vec::new();
    session.reset().unwrap();
    while session.is_valid().unwrap() {
        seen.push(session.current_value().unwrap().unwrap().uid());
        session.advance();
    }
    assert_eq!(seen, vec![3, 4]);
    assert!(session.search("FLAGGED", None).unwrap().is_empty());

    session.close(true);
    assert_eq!(transport.log().last().unwrap(), "close true");
    drop(session);
    assert_eq!(
        transport.log().iter().filter(|l| l.starts_with("close")).count(),
        1
    );
}
