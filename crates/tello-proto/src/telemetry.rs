use std::str::FromStr;
use std::time::Duration;

use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// One parsed telemetry datagram. Field order is the order the device sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    fields: Vec<(String, String)>,
}

impl Snapshot {
    /// Parses `key:value;key:value;...;`.
    ///
    /// Empty segments are ignored and segments without a `:` are skipped, so a
    /// partially corrupted packet still yields the fields that survived.
    pub fn parse(text: &str) -> Self {
        let fields = text
            .trim()
            .split(';')
            .filter(|seg| !seg.is_empty())
            .filter_map(|seg| seg.split_once(':'))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn parse_field<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get(key)?.parse().ok()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn pitch(&self) -> Option<i32> { self.parse_field("pitch") }
    pub fn roll(&self) -> Option<i32> { self.parse_field("roll") }
    pub fn yaw(&self) -> Option<i32> { self.parse_field("yaw") }

    /// Height above takeoff point, cm.
    pub fn height_cm(&self) -> Option<i32> { self.parse_field("h") }

    /// Battery percentage.
    pub fn battery_pct(&self) -> Option<u8> { self.parse_field("bat") }

    /// Time-of-flight ground distance, cm.
    pub fn tof_cm(&self) -> Option<i32> { self.parse_field("tof") }

    /// Barometric altitude, m.
    pub fn baro_m(&self) -> Option<f32> { self.parse_field("baro") }

    /// Motor-on time, s.
    pub fn flight_time_s(&self) -> Option<u32> { self.parse_field("time") }
}

impl Serialize for Snapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// A snapshot tagged with the time since the telemetry channel started.
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryRecord {
    pub mission_time: Duration,
    pub snapshot: Snapshot,
}

impl Serialize for TelemetryRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let secs = (self.mission_time.as_secs_f64() * 1000.0).round() / 1000.0;
        let mut st = serializer.serialize_struct("TelemetryRecord", 2)?;
        st.serialize_field("mission_time_s", &secs)?;
        st.serialize_field("state", &self.snapshot)?;
        st.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_packet() {
        let s = Snapshot::parse("pitch:3;roll:-2;bat:87;");
        let fields: Vec<_> = s.fields().collect();
        assert_eq!(fields, vec![("pitch", "3"), ("roll", "-2"), ("bat", "87")]);
        assert_eq!(s.roll(), Some(-2));
        assert_eq!(s.battery_pct(), Some(87));
    }

    #[test]
    fn malformed_segment_is_dropped() {
        let s = Snapshot::parse("pitch:3;garbage;bat:87;");
        let fields: Vec<_> = s.fields().collect();
        assert_eq!(fields, vec![("pitch", "3"), ("bat", "87")]);
    }

    #[test]
    fn splits_on_first_colon_and_trims_packet() {
        let s = Snapshot::parse("mid:-1;agx:-3.00;x:1:2;\r\n");
        assert_eq!(s.get("x"), Some("1:2"));
        assert_eq!(s.get("agx"), Some("-3.00"));
        assert_eq!(s.len(), 3);
    }

    #[test]
    fn empty_and_garbage_packets() {
        assert!(Snapshot::parse("").is_empty());
        assert!(Snapshot::parse(";;;").is_empty());
        assert!(Snapshot::parse("nothing here").is_empty());
    }

    #[test]
    fn typed_accessors_tolerate_bad_values() {
        let s = Snapshot::parse("h:abc;baro:12.5;tof:10;");
        assert_eq!(s.height_cm(), None);
        assert_eq!(s.baro_m(), Some(12.5));
        assert_eq!(s.tof_cm(), Some(10));
        assert_eq!(s.pitch(), None);
    }

    #[test]
    fn record_serializes_in_field_order() {
        let rec = TelemetryRecord {
            mission_time: Duration::from_millis(1234),
            snapshot: Snapshot::parse("pitch:3;bat:87;"),
        };
        let json = serde_json::to_string(&rec).unwrap();
        assert_eq!(json, r#"{"mission_time_s":1.234,"state":{"pitch":"3","bat":"87"}}"#);
    }
}
