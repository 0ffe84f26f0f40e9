use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::ProtoError;

pub const DISTANCE_CM: (i32, i32) = (20, 500);
pub const ROTATION_DEG: (i32, i32) = (1, 360);
pub const GO_SPEED: (i32, i32) = (10, 100);
pub const CURVE_SPEED: (i32, i32) = (10, 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlipDir {
    Forward,
    Back,
    Left,
    Right,
}

impl FlipDir {
    fn code(self) -> char {
        match self {
            FlipDir::Forward => 'f',
            FlipDir::Back => 'b',
            FlipDir::Left => 'l',
            FlipDir::Right => 'r',
        }
    }
}

impl FromStr for FlipDir {
    type Err = ProtoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "f" | "forward" => Ok(FlipDir::Forward),
            "b" | "back" | "backward" => Ok(FlipDir::Back),
            "l" | "left" => Ok(FlipDir::Left),
            "r" | "right" => Ok(FlipDir::Right),
            other => Err(ProtoError::UnknownVerb(format!("flip {}", other))),
        }
    }
}

/// Read-only queries. The device answers with a value instead of `ok`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Query {
    Battery,
    Speed,
    Time,
    Wifi,
    Sdk,
    Serial,
}

impl Query {
    pub fn verb(self) -> &'static str {
        match self {
            Query::Battery => "battery?",
            Query::Speed => "speed?",
            Query::Time => "time?",
            Query::Wifi => "wifi?",
            Query::Sdk => "sdk?",
            Query::Serial => "sn?",
        }
    }
}

/// One-shot commands of the text protocol. Distances are cm, angles degrees,
/// speeds cm/s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// Switches the device into SDK mode.
    Handshake,
    Takeoff,
    Land,
    Emergency,
    StreamOn,
    StreamOff,
    Up(i32),
    Down(i32),
    Left(i32),
    Right(i32),
    Forward(i32),
    Back(i32),
    Cw(i32),
    Ccw(i32),
    Flip(FlipDir),
    Go { x: i32, y: i32, z: i32, speed: i32 },
    Curve { p1: [i32; 3], p2: [i32; 3], speed: i32 },
    Query(Query),
}

fn check(what: &'static str, value: i32, (min, max): (i32, i32)) -> Result<(), ProtoError> {
    if value < min || value > max {
        return Err(ProtoError::OutOfRange { what, value, min, max });
    }
    Ok(())
}

impl Command {
    /// Checks numeric arguments against the ranges the device accepts.
    pub fn validate(&self) -> Result<(), ProtoError> {
        match *self {
            Command::Up(d)
            | Command::Down(d)
            | Command::Left(d)
            | Command::Right(d)
            | Command::Forward(d)
            | Command::Back(d) => check("distance", d, DISTANCE_CM),
            Command::Cw(deg) | Command::Ccw(deg) => check("rotation", deg, ROTATION_DEG),
            Command::Go { x, y, z, speed } => {
                // strictly between the distance bounds
                let reach = x.saturating_abs().max(y.saturating_abs()).max(z.saturating_abs());
                check("go distance", reach, (DISTANCE_CM.0 + 1, DISTANCE_CM.1 - 1))?;
                check("go speed", speed, GO_SPEED)
            }
            Command::Curve { p1, p2, speed } => {
                for c in p1.iter().chain(p2.iter()) {
                    check("curve coordinate", c.saturating_abs(), DISTANCE_CM)?;
                }
                check("curve speed", speed, CURVE_SPEED)
            }
            _ => Ok(()),
        }
    }

    /// False for commands whose reply is a value (queries) or that get no reply.
    pub fn expects_ok(&self) -> bool {
        !matches!(self, Command::Query(_) | Command::Emergency)
    }

    pub fn verb(&self) -> &'static str {
        match self {
            Command::Handshake => "command",
            Command::Takeoff => "takeoff",
            Command::Land => "land",
            Command::Emergency => "emergency",
            Command::StreamOn => "streamon",
            Command::StreamOff => "streamoff",
            Command::Up(_) => "up",
            Command::Down(_) => "down",
            Command::Left(_) => "left",
            Command::Right(_) => "right",
            Command::Forward(_) => "forward",
            Command::Back(_) => "back",
            Command::Cw(_) => "cw",
            Command::Ccw(_) => "ccw",
            Command::Flip(_) => "flip",
            Command::Go { .. } => "go",
            Command::Curve { .. } => "curve",
            Command::Query(q) => q.verb(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        match self {
            Command::Up(v)
            | Command::Down(v)
            | Command::Left(v)
            | Command::Right(v)
            | Command::Forward(v)
            | Command::Back(v)
            | Command::Cw(v)
            | Command::Ccw(v) => write!(f, "{} {}", verb, v),
            Command::Flip(dir) => write!(f, "flip {}", dir.code()),
            Command::Go { x, y, z, speed } => write!(f, "go {} {} {} {}", x, y, z, speed),
            Command::Curve { p1, p2, speed } => write!(
                f,
                "curve {} {} {} {} {} {} {}",
                p1[0], p1[1], p1[2], p2[0], p2[1], p2[2], speed
            ),
            _ => f.write_str(verb),
        }
    }
}

fn num(args: &[&str], idx: usize, what: &'static str) -> Result<i32, ProtoError> {
    let raw = args.get(idx).ok_or(ProtoError::MissingArgument(what))?;
    raw.parse().map_err(|_| ProtoError::BadNumber(raw.to_string()))
}

impl FromStr for Command {
    type Err = ProtoError;

    /// Parses the operator command language (`up 50`, `rotate cw 90`,
    /// `flip f`, `go 30 0 0 50`, ...). The parsed command is validated.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        let words: Vec<&str> = lower.split_whitespace().collect();
        let Some((&verb, args)) = words.split_first() else {
            return Err(ProtoError::UnknownVerb(String::new()));
        };

        let cmd = match verb {
            "command" => Command::Handshake,
            "takeoff" => Command::Takeoff,
            "land" => Command::Land,
            "emergency" => Command::Emergency,
            "streamon" => Command::StreamOn,
            "streamoff" => Command::StreamOff,
            "stream" => match args.first().copied() {
                Some("on") => Command::StreamOn,
                Some("off") => Command::StreamOff,
                Some(other) => return Err(ProtoError::UnknownVerb(format!("stream {}", other))),
                None => return Err(ProtoError::MissingArgument("stream")),
            },
            "up" => Command::Up(num(args, 0, "up")?),
            "down" => Command::Down(num(args, 0, "down")?),
            "left" => Command::Left(num(args, 0, "left")?),
            "right" => Command::Right(num(args, 0, "right")?),
            "forward" => Command::Forward(num(args, 0, "forward")?),
            "back" | "backward" => Command::Back(num(args, 0, "back")?),
            "cw" => Command::Cw(num(args, 0, "cw")?),
            "ccw" => Command::Ccw(num(args, 0, "ccw")?),
            "rotate" => match args.first().copied() {
                Some("cw") => Command::Cw(num(args, 1, "rotate")?),
                Some("ccw") => Command::Ccw(num(args, 1, "rotate")?),
                Some(other) => return Err(ProtoError::UnknownVerb(format!("rotate {}", other))),
                None => return Err(ProtoError::MissingArgument("rotate")),
            },
            "flip" => {
                let dir = args.first().ok_or(ProtoError::MissingArgument("flip"))?;
                Command::Flip(dir.parse()?)
            }
            "go" | "move" => Command::Go {
                x: num(args, 0, "go")?,
                y: num(args, 1, "go")?,
                z: num(args, 2, "go")?,
                speed: num(args, 3, "go")?,
            },
            "curve" => Command::Curve {
                p1: [num(args, 0, "curve")?, num(args, 1, "curve")?, num(args, 2, "curve")?],
                p2: [num(args, 3, "curve")?, num(args, 4, "curve")?, num(args, 5, "curve")?],
                speed: num(args, 6, "curve")?,
            },
            "battery?" => Command::Query(Query::Battery),
            "speed?" => Command::Query(Query::Speed),
            "time?" => Command::Query(Query::Time),
            "wifi?" => Command::Query(Query::Wifi),
            "sdk?" => Command::Query(Query::Sdk),
            "sn?" => Command::Query(Query::Serial),
            other => return Err(ProtoError::UnknownVerb(other.to_string())),
        };
        cmd.validate()?;
        Ok(cmd)
    }
}

/// Classification of a decoded reply datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Ok,
    Other(String),
}

impl Reply {
    pub fn classify(text: &str) -> Self {
        let t = text.trim();
        if t == "ok" { Reply::Ok } else { Reply::Other(t.to_string()) }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Reply::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_text() {
        assert_eq!(Command::Handshake.to_string(), "command");
        assert_eq!(Command::Back(40).to_string(), "back 40");
        assert_eq!(Command::Ccw(90).to_string(), "ccw 90");
        assert_eq!(Command::Flip(FlipDir::Left).to_string(), "flip l");
        assert_eq!(Command::Go { x: 30, y: -40, z: 0, speed: 50 }.to_string(), "go 30 -40 0 50");
        assert_eq!(
            Command::Curve { p1: [20, 20, 0], p2: [60, 40, 0], speed: 30 }.to_string(),
            "curve 20 20 0 60 40 0 30"
        );
        assert_eq!(Command::Query(Query::Battery).to_string(), "battery?");
    }

    #[test]
    fn distance_bounds_inclusive() {
        assert!(Command::Up(20).validate().is_ok());
        assert!(Command::Up(500).validate().is_ok());
        assert!(Command::Up(19).validate().is_err());
        assert!(Command::Forward(501).validate().is_err());
        assert!(Command::Cw(0).validate().is_err());
        assert!(Command::Cw(360).validate().is_ok());
        assert!(Command::Ccw(361).validate().is_err());
    }

    #[test]
    fn go_reach_is_strict() {
        let go = |x, y, z, speed| Command::Go { x, y, z, speed }.validate();
        assert!(go(21, 0, 0, 10).is_ok());
        assert!(go(0, -499, 0, 100).is_ok());
        assert!(go(20, 0, 0, 50).is_err());
        assert!(go(0, 0, 500, 50).is_err());
        assert!(go(10, 10, 10, 50).is_err());
        assert!(go(100, 0, 0, 9).is_err());
        assert!(go(100, 0, 0, 101).is_err());
    }

    #[test]
    fn curve_components_and_speed() {
        let ok = Command::Curve { p1: [20, -20, 30], p2: [500, 40, -60], speed: 60 };
        assert!(ok.validate().is_ok());
        let small = Command::Curve { p1: [20, 0, 30], p2: [50, 40, 60], speed: 30 };
        assert!(matches!(small.validate(), Err(ProtoError::OutOfRange { what: "curve coordinate", .. })));
        let fast = Command::Curve { p1: [20, 20, 30], p2: [50, 40, 60], speed: 61 };
        assert!(matches!(fast.validate(), Err(ProtoError::OutOfRange { what: "curve speed", .. })));
    }

    #[test]
    fn extreme_coordinates_are_rejected() {
        let go = Command::Go { x: i32::MIN, y: 0, z: 0, speed: 50 };
        assert!(matches!(go.validate(), Err(ProtoError::OutOfRange { what: "go distance", .. })));
        let curve = Command::Curve { p1: [i32::MIN, 20, 20], p2: [50, 40, 60], speed: 30 };
        assert!(matches!(curve.validate(), Err(ProtoError::OutOfRange { what: "curve coordinate", .. })));
        assert!(matches!(
            "go -2147483648 0 0 50".parse::<Command>(),
            Err(ProtoError::OutOfRange { .. })
        ));
        assert!(matches!(
            "curve 20 20 20 -2147483648 40 60 30".parse::<Command>(),
            Err(ProtoError::OutOfRange { .. })
        ));
    }

    #[test]
    fn parse_operator_language() {
        assert_eq!("TAKEOFF".parse::<Command>().unwrap(), Command::Takeoff);
        assert_eq!("rotate cw 90".parse::<Command>().unwrap(), Command::Cw(90));
        assert_eq!("backward 30".parse::<Command>().unwrap(), Command::Back(30));
        assert_eq!("stream on".parse::<Command>().unwrap(), Command::StreamOn);
        assert_eq!("flip b".parse::<Command>().unwrap(), Command::Flip(FlipDir::Back));
        assert_eq!(
            "go 100 0 -30 50".parse::<Command>().unwrap(),
            Command::Go { x: 100, y: 0, z: -30, speed: 50 }
        );
        assert_eq!("sn?".parse::<Command>().unwrap(), Command::Query(Query::Serial));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(matches!("up".parse::<Command>(), Err(ProtoError::MissingArgument("up"))));
        assert!(matches!("up ten".parse::<Command>(), Err(ProtoError::BadNumber(_))));
        assert!(matches!("up 5".parse::<Command>(), Err(ProtoError::OutOfRange { .. })));
        assert!(matches!("hover".parse::<Command>(), Err(ProtoError::UnknownVerb(_))));
        assert!("".parse::<Command>().is_err());
    }

    #[test]
    fn reply_classification() {
        assert!(Reply::classify("ok").is_ok());
        assert!(Reply::classify("ok\r\n").is_ok());
        assert_eq!(Reply::classify("error Motor stop"), Reply::Other("error Motor stop".into()));
        assert!(!Reply::classify("OK!").is_ok());
        assert!(!Command::Query(Query::Battery).expects_ok());
        assert!(Command::Land.expects_ok());
    }
}
