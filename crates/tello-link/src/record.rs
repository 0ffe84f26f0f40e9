use std::fmt;
use std::io::{self, Write};

use time::OffsetDateTime;

/// How a command record was resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    /// Reply text, trimmed.
    Reply(String),
    TimedOut,
    DecodeError,
    /// The request datagram never left the socket.
    SendFailed,
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Reply(text) => f.write_str(text),
            Response::TimedOut => f.write_str("TIMED OUT"),
            Response::DecodeError => f.write_str("Decode Error"),
            Response::SendFailed => f.write_str("SEND FAILED"),
        }
    }
}

/// One request/reply exchange. `response` is written exactly once.
#[derive(Debug, Clone)]
pub struct CommandRecord {
    pub text: String,
    pub sent_at: OffsetDateTime,
    pub response: Option<Response>,
}

impl CommandRecord {
    pub fn is_pending(&self) -> bool {
        self.response.is_none()
    }
}

/// Append-only history of request/reply exchanges.
#[derive(Debug, Default)]
pub struct CommandLog {
    records: Vec<CommandRecord>,
    in_flight: usize,
    peak_in_flight: usize,
}

impl CommandLog {
    pub fn push(&mut self, text: &str) -> usize {
        self.records.push(CommandRecord {
            text: text.to_string(),
            sent_at: OffsetDateTime::now_utc(),
            response: None,
        });
        self.in_flight += 1;
        self.peak_in_flight = self.peak_in_flight.max(self.in_flight);
        self.records.len() - 1
    }

    /// Fills record `idx` if it is still pending.
    pub fn resolve(&mut self, idx: usize, response: Response) -> bool {
        match self.records.get_mut(idx) {
            Some(rec) if rec.is_pending() => {
                rec.response = Some(response);
                self.in_flight -= 1;
                true
            }
            _ => false,
        }
    }

    /// Replies carry no id; the newest record is the one awaiting them.
    pub fn resolve_latest(&mut self, response: Response) -> bool {
        match self.records.len() {
            0 => false,
            n => self.resolve(n - 1, response),
        }
    }

    pub fn get(&self, idx: usize) -> Option<&CommandRecord> {
        self.records.get(idx)
    }

    pub fn records(&self) -> &[CommandRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight
    }

    pub fn write_to(&self, mut w: impl Write) -> io::Result<()> {
        for (i, rec) in self.records.iter().enumerate() {
            let response = rec.response.as_ref().map_or_else(|| "PENDING".to_string(), |r| r.to_string());
            writeln!(w, "Message[{i}]: {}", rec.text)?;
            writeln!(w, "Response[{i}]: {response}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_once() {
        let mut log = CommandLog::default();
        let idx = log.push("takeoff");
        assert_eq!(log.in_flight(), 1);
        assert!(log.resolve(idx, Response::Reply("ok".into())));
        assert!(!log.resolve(idx, Response::TimedOut));
        assert_eq!(log.get(idx).unwrap().response, Some(Response::Reply("ok".into())));
        assert_eq!(log.in_flight(), 0);
    }

    #[test]
    fn stray_reply_does_not_overwrite() {
        let mut log = CommandLog::default();
        assert!(!log.resolve_latest(Response::Reply("ok".into())));

        let idx = log.push("battery?");
        assert!(log.resolve(idx, Response::TimedOut));
        assert!(!log.resolve_latest(Response::Reply("87".into())));
        assert_eq!(log.get(idx).unwrap().response, Some(Response::TimedOut));
    }

    #[test]
    fn audit_format() {
        let mut log = CommandLog::default();
        let a = log.push("command");
        log.resolve(a, Response::Reply("ok".into()));
        let b = log.push("takeoff");
        log.resolve(b, Response::TimedOut);
        let c = log.push("sdk?");
        log.resolve(c, Response::DecodeError);

        let mut out = Vec::new();
        log.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Message[0]: command\nResponse[0]: ok\n\
             Message[1]: takeoff\nResponse[1]: TIMED OUT\n\
             Message[2]: sdk?\nResponse[2]: Decode Error\n"
        );
        assert_eq!(log.peak_in_flight(), 1);
    }
}
