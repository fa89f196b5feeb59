use std::fmt;
use std::io::{Read, Write};

use super::client::{validate_str, Client};
use super::conn::Connection;
use super::parse;
use crate::error::{Error, Result, ValidateError};
use crate::spec::ConnectionSpec;
use crate::transport::{Seq, SortCriterion, Uid};

/// An authenticated IMAP connection, issued by [`ImapTransport`](super::ImapTransport).
pub struct ImapHandle<S: Read + Write = Connection> {
    pub(crate) client: Client<S>,
    server: String,
    username: String,
    password: String,
    selected: Option<String>,
    readonly: bool,
    exists: u32,
}

impl<S: Read + Write> ImapHandle<S> {
    pub(crate) fn new(
        client: Client<S>,
        spec: &ConnectionSpec,
        username: &str,
        password: &str,
    ) -> Self {
        ImapHandle {
            client,
            server: spec.server_specification(),
            username: username.to_string(),
            password: password.to_string(),
            selected: None,
            readonly: false,
            exists: 0,
        }
    }

    /// The server specification this handle is connected to.
    pub fn server(&self) -> &str {
        &self.server
    }

    /// The selected mailbox, `None` for a half-open connection.
    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Whether the selected mailbox was opened with `EXAMINE`.
    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub(crate) fn username(&self) -> &str {
        &self.username
    }

    pub(crate) fn password(&self) -> &str {
        &self.password
    }

    pub(crate) fn login(&mut self) -> Result<()> {
        let command = format!(
            "LOGIN {} {}",
            validate_str(&self.username)?,
            validate_str(&self.password)?
        );
        self.client.run_command_and_check_ok(&command)
    }

    /// `SELECT`, or `EXAMINE` if `readonly`, the given mailbox.
    pub(crate) fn select(&mut self, mailbox: &str, readonly: bool) -> Result<()> {
        let verb = if readonly { "EXAMINE" } else { "SELECT" };
        self.selected = None;
        let lines = self
            .client
            .run_command_and_read_response(&format!("{} {}", verb, validate_str(mailbox)?))?;
        self.exists = 0;
        parse::parse_unilateral(&lines, &mut self.exists);
        self.selected = Some(mailbox.to_string());
        self.readonly = readonly;
        tracing::debug!(mailbox, readonly, exists = self.exists, "mailbox selected");
        Ok(())
    }

    pub(crate) fn deselect(&mut self) {
        self.selected = None;
        self.exists = 0;
    }

    fn require_selected(&self) -> Result<()> {
        match self.selected {
            Some(_) => Ok(()),
            None => Err(Error::No("no mailbox selected".to_string())),
        }
    }

    fn run(&mut self, command: &str) -> Result<Vec<u8>> {
        self.client.run_command_and_read_response(command)
    }

    pub(crate) fn count(&mut self) -> Result<u32> {
        self.require_selected()?;
        let lines = self.run("NOOP")?;
        parse::parse_unilateral(&lines, &mut self.exists);
        Ok(self.exists)
    }

    pub(crate) fn uid_at(&mut self, position: Seq) -> Result<Uid> {
        self.require_selected()?;
        let not_found = || Error::NotFound(format!("no message at position {}", position));
        if position == 0 {
            return Err(not_found());
        }
        let lines = match self.run(&format!("FETCH {} (UID)", position)) {
            Ok(lines) => lines,
            Err(Error::No(_)) | Err(Error::Bad(_)) => return Err(not_found()),
            Err(e) => return Err(e),
        };
        parse::parse_uid(&lines, position, &mut self.exists).ok_or_else(not_found)
    }

    pub(crate) fn search(&mut self, criteria: &str) -> Result<Vec<Uid>> {
        self.require_selected()?;
        if let Some(c) = criteria.chars().find(|c| *c == '\r' || *c == '\n') {
            return Err(Error::Validate(ValidateError::Char(c)));
        }
        let lines = self.run(&format!("UID SEARCH {}", criteria))?;
        Ok(parse::parse_ids(&lines, "SEARCH", &mut self.exists))
    }

    pub(crate) fn sort(&mut self, criterion: SortCriterion, reverse: bool) -> Result<Vec<Uid>> {
        self.require_selected()?;
        let reverse = if reverse { "REVERSE " } else { "" };
        let lines = self.run(&format!("UID SORT ({}{}) UTF-8 ALL", reverse, criterion))?;
        Ok(parse::parse_ids(&lines, "SORT", &mut self.exists))
    }

    pub(crate) fn fetch_body(&mut self, uid: Uid) -> Result<Vec<u8>> {
        self.require_selected()?;
        let lines = self.run(&format!("UID FETCH {} BODY.PEEK[]", uid))?;
        parse::parse_body(&lines, uid, &mut self.exists)
            .ok_or_else(|| Error::NotFound(format!("no message with UID {}", uid)))
    }

    pub(crate) fn store_deleted(&mut self, uid: Uid) -> Result<()> {
        self.require_selected()?;
        let lines = self.run(&format!("UID STORE {} +FLAGS.SILENT (\\Deleted)", uid))?;
        parse::parse_unilateral(&lines, &mut self.exists);
        Ok(())
    }

    pub(crate) fn expunge(&mut self) -> Result<()> {
        self.require_selected()?;
        let lines = self.run("EXPUNGE")?;
        parse::parse_unilateral(&lines, &mut self.exists);
        Ok(())
    }

    pub(crate) fn list_contains(&mut self, mailbox: &str) -> Result<bool> {
        let lines = self.run(&format!("LIST \"\" {}", validate_str(mailbox)?))?;
        Ok(parse::parse_list_contains(&lines, mailbox, &mut self.exists))
    }

    pub(crate) fn create(&mut self, mailbox: &str) -> Result<()> {
        self.client
            .run_command_and_check_ok(&format!("CREATE {}", validate_str(mailbox)?))
    }

    /// `CLOSE` the selected mailbox if purging a writable one, then `LOGOUT`.
    pub(crate) fn logout(&mut self, purge: bool) -> Result<()> {
        if purge && self.selected.is_some() && !self.readonly {
            self.client.run_command_and_check_ok("CLOSE")?;
            self.deselect();
        }
        self.client.run_command_and_check_ok("LOGOUT")
    }
}

impl<S: Read + Write> fmt::Debug for ImapHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapHandle")
            .field("server", &self.server)
            .field("username", &self.username)
            .field("selected", &self.selected)
            .field("readonly", &self.readonly)
            .field("exists", &self.exists)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::mock_stream::MockStream;
    use super::*;
    use crate::flags::FlagPolicy;
    use crate::spec::Service;

    fn handle(script: &str) -> ImapHandle<MockStream> {
        let policy = FlagPolicy::default();
        let spec =
            ConnectionSpec::new("mail.example.org", Some(993), Service::Imap, policy).unwrap();
        let client = Client::new(MockStream::new(script.as_bytes().to_vec()));
        ImapHandle::new(client, &spec, "bob", "hunter2")
    }

    fn selected(script: &str) -> ImapHandle<MockStream> {
        let mut h = handle(&format!("* 3 EXISTS\r\na1 OK [READ-WRITE] done\r\n{}", script));
        h.select("INBOX", false).unwrap();
        h
    }

    fn written(h: &ImapHandle<MockStream>) -> Vec<String> {
        h.client.stream.get_ref().written_lines()
    }

    #[test]
    fn login_and_select() {
        let mut h = handle(
            "a1 OK Logged in\r\n\
             * FLAGS (\\Answered \\Deleted \\Seen)\r\n\
             * 5 EXISTS\r\n\
             * 1 RECENT\r\n\
             * OK [UIDVALIDITY 1257842737] UIDs valid\r\n\
             a2 OK [READ-WRITE] Select completed\r\n",
        );
        h.login().unwrap();
        h.select("INBOX", false).unwrap();
        assert_eq!(h.selected(), Some("INBOX"));
        assert_eq!(h.exists, 5);
        assert_eq!(
            written(&h),
            vec!["a1 LOGIN \"bob\" \"hunter2\"", "a2 SELECT \"INBOX\""]
        );
        assert_eq!(h.server(), "{mail.example.org:993/ssl}");
    }

    #[test]
    fn readonly_select_examines() {
        let mut h = handle("* 0 EXISTS\r\na1 OK [READ-ONLY] done\r\n");
        h.select("Archive", true).unwrap();
        assert!(h.is_readonly());
        assert_eq!(written(&h), vec!["a1 EXAMINE \"Archive\""]);
    }

    #[test]
    fn failed_select_leaves_nothing_selected() {
        let mut h = handle("a1 NO Mailbox doesn't exist: Nope\r\n");
        assert!(h.select("Nope", false).is_err());
        assert_eq!(h.selected(), None);
        match h.count() {
            Err(Error::No(_)) => {}
            r => panic!("Wrong result: {:?}", r),
        }
    }

    #[test]
    fn login_rejects_newlines() {
        let spec = ConnectionSpec::parse("{mail.example.org}").unwrap();
        let client = Client::new(MockStream::default());
        let mut h = ImapHandle::new(client, &spec, "bob\r\nA1 LOGOUT", "x");
        assert!(h.login().is_err());
        assert!(written(&h).is_empty());
    }

    #[test]
    fn count_follows_unilateral_updates() {
        let mut h = selected(
            "* 4 EXISTS\r\na2 OK NOOP completed\r\n\
             * 2 EXPUNGE\r\na3 OK NOOP completed\r\n",
        );
        assert_eq!(h.count().unwrap(), 4);
        assert_eq!(h.count().unwrap(), 3);
        assert_eq!(&written(&h)[1..], &["a2 NOOP", "a3 NOOP"]);
    }

    #[test]
    fn uid_at_position() {
        let mut h = selected(
            "* 2 FETCH (UID 48)\r\na2 OK FETCH completed\r\n\
             a3 BAD Error in IMAP command FETCH: Invalid messageset\r\n",
        );
        assert_eq!(h.uid_at(2).unwrap(), 48);
        match h.uid_at(9) {
            Err(Error::NotFound(_)) => {}
            r => panic!("Wrong result: {:?}", r),
        }
        match h.uid_at(0) {
            Err(Error::NotFound(_)) => {}
            r => panic!("Wrong result: {:?}", r),
        }
        assert_eq!(&written(&h)[1..], &["a2 FETCH 2 (UID)", "a3 FETCH 9 (UID)"]);
    }

    #[test]
    fn search_and_sort_commands() {
        let mut h = selected(
            "* SEARCH 12 7\r\na2 OK SEARCH completed\r\n\
             * SORT 9 12 7\r\na3 OK SORT completed\r\n",
        );
        assert_eq!(h.search("UNSEEN").unwrap(), vec![12, 7]);
        assert_eq!(h.sort(SortCriterion::Date, true).unwrap(), vec![9, 12, 7]);
        assert_eq!(
            &written(&h)[1..],
            &["a2 UID SEARCH UNSEEN", "a3 UID SORT (REVERSE DATE) UTF-8 ALL"]
        );
    }

    #[test]
    fn search_criteria_cannot_break_lines() {
        let mut h = selected("* SEARCH 3\r\na2 OK SEARCH completed\r\n");
        for criteria in &["ALL\r\na9 DELETE \"INBOX\"", "ALL\na9 EXPUNGE"] {
            match h.search(criteria) {
                Err(Error::Validate(ValidateError::Char(_))) => {}
                r => panic!("Wrong result: {:?}", r),
            }
        }
        assert_eq!(written(&h).len(), 1);
        assert_eq!(h.search("ALL").unwrap(), vec![3]);
        assert_eq!(&written(&h)[1..], &["a2 UID SEARCH ALL"]);
    }

    #[test]
    fn fetch_body_peeks() {
        let mut h = selected(
            "* 1 FETCH (UID 7 BODY[] {8}\r\nhi there)\r\na2 OK FETCH completed\r\n\
             a3 OK FETCH completed\r\n",
        );
        assert_eq!(h.fetch_body(7).unwrap(), b"hi there".to_vec());
        match h.fetch_body(8) {
            Err(Error::NotFound(_)) => {}
            r => panic!("Wrong result: {:?}", r),
        }
        assert_eq!(written(&h)[1], "a2 UID FETCH 7 BODY.PEEK[]");
    }

    #[test]
    fn delete_and_expunge() {
        let mut h = selected(
            "a2 OK STORE completed\r\n\
             * 1 EXPUNGE\r\na3 OK EXPUNGE completed\r\n",
        );
        h.store_deleted(7).unwrap();
        h.expunge().unwrap();
        assert_eq!(h.exists, 2);
        assert_eq!(
            &written(&h)[1..],
            &["a2 UID STORE 7 +FLAGS.SILENT (\\Deleted)", "a3 EXPUNGE"]
        );
    }

    #[test]
    fn list_and_create() {
        let mut h = handle(
            "a1 OK LIST completed\r\n\
             a2 OK CREATE completed\r\n\
             * LIST (\\HasNoChildren) \"/\" \"Archive\"\r\na3 OK LIST completed\r\n",
        );
        assert!(!h.list_contains("Archive").unwrap());
        h.create("Archive").unwrap();
        assert!(h.list_contains("Archive").unwrap());
        assert_eq!(
            written(&h),
            vec![
                "a1 LIST \"\" \"Archive\"",
                "a2 CREATE \"Archive\"",
                "a3 LIST \"\" \"Archive\""
            ]
        );
    }

    #[test]
    fn logout_with_purge_closes_first() {
        let mut h = selected(
            "a2 OK CLOSE completed\r\n* BYE Logging out\r\na3 OK Logout completed\r\n",
        );
        h.logout(true).unwrap();
        assert_eq!(&written(&h)[1..], &["a2 CLOSE", "a3 LOGOUT"]);
    }

    #[test]
    fn logout_without_purge() {
        let mut h = selected("* BYE Logging out\r\na2 OK Logout completed\r\n");
        h.logout(false).unwrap();
        assert_eq!(&written(&h)[1..], &["a2 LOGOUT"]);
    }

    #[test]
    fn readonly_purge_skips_close() {
        let mut h = handle(
            "* 1 EXISTS\r\na1 OK [READ-ONLY] done\r\n\
             * BYE Logging out\r\na2 OK Logout completed\r\n",
        );
        h.select("INBOX", true).unwrap();
        h.logout(true).unwrap();
        assert_eq!(written(&h), vec!["a1 EXAMINE \"INBOX\"", "a2 LOGOUT"]);
    }

    #[test]
    fn debug_hides_password() {
        let h = handle("");
        let debug = format!("{:?}", h);
        assert!(debug.contains("bob"));
        assert!(!debug.contains("hunter2"));
    }
}
