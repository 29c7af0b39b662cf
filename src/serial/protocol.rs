//! Text protocol spoken by USB-TnH / USB-PA sensors.
//!
//! Every frame is ASCII terminated by `\r\n`. Reads are a bare opcode
//! (`GT\r\n`), writes carry a value (`N=lab1\r\n`) and are acknowledged
//! with `OK\n`.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{Result, SensorError};

const FRAME_TRAILER: &str = "\r\n";
const MAX_NAME_LEN: usize = 8;

/// Every request the sensor firmware understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetIdentity,
    GetVersion,
    GetTemperature,
    GetHumidity,
    GetPressure,
    GetName,
    GetJson,
    SetName(DeviceName),
    SetLight(bool),
}

impl Command {
    /// Build a command from an untyped opcode/value pair.
    ///
    /// Unknown opcodes and misplaced values are rejected with
    /// [`SensorError::InvalidCommand`]; a value that breaks a field
    /// constraint is rejected with [`SensorError::Validation`].
    pub fn parse(opcode: &str, value: Option<&str>) -> Result<Self> {
        let read = |command: Command| match value {
            None => Ok(command),
            Some(v) => Err(SensorError::InvalidCommand(format!(
                "{} does not take a value (got {:?})",
                opcode, v
            ))),
        };
        let required = || {
            value.ok_or_else(|| SensorError::InvalidCommand(format!("{} requires a value", opcode)))
        };

        match opcode {
            "GI" => read(Command::GetIdentity),
            "GV" => read(Command::GetVersion),
            "GT" => read(Command::GetTemperature),
            "GH" => read(Command::GetHumidity),
            "GP" => read(Command::GetPressure),
            "GN" => read(Command::GetName),
            "GJSON" => read(Command::GetJson),
            "N" => Ok(Command::SetName(DeviceName::new(required()?)?)),
            "I" => Ok(Command::SetLight(parse_light(required()?)?)),
            other => Err(SensorError::InvalidCommand(format!("unknown opcode {:?}", other))),
        }
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            Command::GetIdentity => "GI",
            Command::GetVersion => "GV",
            Command::GetTemperature => "GT",
            Command::GetHumidity => "GH",
            Command::GetPressure => "GP",
            Command::GetName => "GN",
            Command::GetJson => "GJSON",
            Command::SetName(_) => "N",
            Command::SetLight(_) => "I",
        }
    }

    pub fn is_write(&self) -> bool {
        matches!(self, Command::SetName(_) | Command::SetLight(_))
    }

    /// Reads whose answer is a single float.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Command::GetTemperature | Command::GetHumidity | Command::GetPressure
        )
    }

    /// Wire frame for this command.
    pub fn encode(&self) -> Vec<u8> {
        let line = match self {
            Command::SetName(name) => format!("{}={}{}", self.opcode(), name, FRAME_TRAILER),
            Command::SetLight(on) => {
                format!("{}={}{}", self.opcode(), if *on { "1" } else { "0" }, FRAME_TRAILER)
            }
            _ => format!("{}{}", self.opcode(), FRAME_TRAILER),
        };
        line.into_bytes()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::SetName(name) => write!(f, "{}={}", self.opcode(), name),
            Command::SetLight(on) => write!(f, "{}={}", self.opcode(), u8::from(*on)),
            _ => f.write_str(self.opcode()),
        }
    }
}

fn parse_light(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "on" => Ok(true),
        "0" | "false" | "off" => Ok(false),
        _ => Err(SensorError::Validation(format!(
            "light can only be turned on or off, got {:?}",
            value
        ))),
    }
}

/// Sensor name, 1 to 8 characters without control characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: &str) -> Result<Self> {
        let len = name.chars().count();
        if len == 0 || len > MAX_NAME_LEN {
            return Err(SensorError::Validation(format!(
                "name must be 1 to {} characters, got {}",
                MAX_NAME_LEN, len
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(SensorError::Validation(
                "name cannot contain control characters".to_string(),
            ));
        }
        Ok(Self(name.to_string()))
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response text with the frame trailer removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawResponse {
    Text(String),
    /// Nothing arrived before the read timeout.
    NoData,
}

/// Strip leading/trailing `\r` and `\n`. Empty text becomes
/// [`RawResponse::NoData`].
pub fn strip_trailer(raw: &[u8]) -> std::result::Result<RawResponse, std::str::Utf8Error> {
    let text = std::str::from_utf8(raw)?.trim_matches(|c| c == '\r' || c == '\n');
    if text.is_empty() {
        Ok(RawResponse::NoData)
    } else {
        Ok(RawResponse::Text(text.to_string()))
    }
}

/// A value inside the JSON aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Number(v) => write!(f, "{}", v),
            FieldValue::Text(s) => f.write_str(s),
        }
    }
}

/// How text that should be a number is handled.
///
/// The scalar reads (`GT`, `GH`, `GP`) are [`Strict`](Self::Strict): a
/// value that does not parse is a malformed response. Sub-fields of the
/// `GJSON` aggregate are [`Lenient`](Self::Lenient): the firmware is known
/// to report partial or placeholder values there, so anything that does
/// not parse is kept as text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericPolicy {
    Strict,
    Lenient,
}

impl NumericPolicy {
    /// `None` only under [`Strict`](Self::Strict) when `text` is not a
    /// float.
    pub fn coerce(self, text: &str) -> Option<FieldValue> {
        match text.trim().parse::<f64>() {
            Ok(value) => Some(FieldValue::Number(value)),
            Err(_) => match self {
                NumericPolicy::Strict => None,
                NumericPolicy::Lenient => Some(FieldValue::Text(text.to_string())),
            },
        }
    }
}

/// `GJSON` answer with the single-letter keys expanded. Fields the sensor
/// did not report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReading {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<FieldValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<FieldValue>,
}

/// Decoded answer to a read command.
#[derive(Debug, Clone, PartialEq)]
pub enum Reading {
    Number(f64),
    Text(String),
    Aggregate(AggregateReading),
    NoData,
}

fn malformed(command: &Command, raw: &[u8]) -> SensorError {
    SensorError::MalformedResponse {
        command: command.opcode(),
        response: String::from_utf8_lossy(raw).into_owned(),
    }
}

/// Decode the answer to a read command.
pub fn decode_read(command: &Command, raw: &[u8]) -> Result<Reading> {
    if command.is_write() {
        return Err(SensorError::InvalidCommand(format!(
            "{} is a write command",
            command.opcode()
        )));
    }
    if *command == Command::GetJson {
        return Ok(decode_json(raw)?.map_or(Reading::NoData, Reading::Aggregate));
    }

    let text = match strip_trailer(raw).map_err(|_| malformed(command, raw))? {
        RawResponse::NoData => return Ok(Reading::NoData),
        RawResponse::Text(text) => text,
    };

    if command.is_numeric() {
        match NumericPolicy::Strict.coerce(&text) {
            Some(FieldValue::Number(value)) => Ok(Reading::Number(value)),
            _ => Err(malformed(command, raw)),
        }
    } else {
        Ok(Reading::Text(text))
    }
}

/// Whether a write was acknowledged. Only `OK\n` (or `OK\r\n`) counts.
pub fn decode_write(raw: &[u8]) -> bool {
    if matches!(raw, b"OK\n" | b"OK\r\n") {
        return true;
    }
    log::error!(
        "Write command failed with result: {:?}",
        String::from_utf8_lossy(raw)
    );
    false
}

/// Decode the `GJSON` aggregate. `Ok(None)` when the sensor stayed silent.
pub fn decode_json(raw: &[u8]) -> Result<Option<AggregateReading>> {
    let text = match strip_trailer(raw).map_err(|_| malformed(&Command::GetJson, raw))? {
        RawResponse::NoData => return Ok(None),
        RawResponse::Text(text) => text,
    };

    let value: Value =
        serde_json::from_str(&text).map_err(|_| malformed(&Command::GetJson, raw))?;
    let object = value
        .as_object()
        .ok_or_else(|| malformed(&Command::GetJson, raw))?;

    Ok(Some(AggregateReading {
        temperature: json_field(object, "T"),
        humidity: json_field(object, "H"),
        pressure: json_field(object, "P"),
    }))
}

fn json_field(object: &Map<String, Value>, key: &str) -> Option<FieldValue> {
    match object.get(key)? {
        Value::Null => None,
        Value::Number(n) => n.as_f64().map(FieldValue::Number),
        Value::String(s) => NumericPolicy::Lenient.coerce(s),
        other => Some(FieldValue::Text(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_read_and_write_frames() {
        assert_eq!(Command::GetTemperature.encode(), b"GT\r\n");
        assert_eq!(Command::GetJson.encode(), b"GJSON\r\n");
        assert_eq!(Command::SetLight(true).encode(), b"I=1\r\n");
        assert_eq!(Command::SetLight(false).encode(), b"I=0\r\n");
        let name = DeviceName::new("lab1").unwrap();
        assert_eq!(Command::SetName(name).encode(), b"N=lab1\r\n");
    }

    #[test]
    fn test_parse_rejects_unknown_opcode() {
        for opcode in ["GX", "gt", "", "GSJON", "RESET"] {
            match Command::parse(opcode, None) {
                Err(SensorError::InvalidCommand(_)) => {}
                other => panic!("{:?} should be invalid, got {:?}", opcode, other),
            }
        }
    }

    #[test]
    fn test_parse_checks_value_shape() {
        assert!(matches!(
            Command::parse("GT", Some("1")),
            Err(SensorError::InvalidCommand(_))
        ));
        assert!(matches!(
            Command::parse("N", None),
            Err(SensorError::InvalidCommand(_))
        ));
        assert_eq!(Command::parse("GH", None).unwrap(), Command::GetHumidity);
        assert_eq!(Command::parse("I", Some("0")).unwrap(), Command::SetLight(false));
    }

    #[test]
    fn test_light_value_must_be_boolean() {
        assert!(matches!(
            Command::parse("I", Some("not-a-bool")),
            Err(SensorError::Validation(_))
        ));
        assert_eq!(Command::parse("I", Some("true")).unwrap(), Command::SetLight(true));
    }

    #[test]
    fn test_device_name_length() {
        assert!(DeviceName::new("").is_err());
        assert!(DeviceName::new("toolong123").is_err());
        assert!(DeviceName::new("eight888").is_ok());
        assert!(DeviceName::new("a\r\nb").is_err());
    }

    #[test]
    fn test_decode_read_temperature() {
        assert_eq!(
            decode_read(&Command::GetTemperature, b"21.50\r\n").unwrap(),
            Reading::Number(21.5)
        );
    }

    #[test]
    fn test_decode_read_silence_is_no_data() {
        assert_eq!(decode_read(&Command::GetTemperature, b"").unwrap(), Reading::NoData);
        assert_eq!(decode_read(&Command::GetName, b"\r\n").unwrap(), Reading::NoData);
        assert_eq!(decode_read(&Command::GetJson, b"").unwrap(), Reading::NoData);
    }

    #[test]
    fn test_decode_read_numeric_is_strict() {
        match decode_read(&Command::GetHumidity, b"abc\r\n") {
            Err(SensorError::MalformedResponse { command, response }) => {
                assert_eq!(command, "GH");
                assert_eq!(response, "abc\r\n");
            }
            other => panic!("expected malformed response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_read_text() {
        assert_eq!(
            decode_read(&Command::GetIdentity, b"USB-TnH\r\n").unwrap(),
            Reading::Text("USB-TnH".to_string())
        );
        assert!(matches!(
            decode_read(&Command::SetLight(true), b"OK\n"),
            Err(SensorError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_decode_write_exact_ack() {
        assert!(decode_write(b"OK\r\n"));
        assert!(decode_write(b"OK\n"));
        assert!(!decode_write(b"ERR\r\n"));
        assert!(!decode_write(b"OK"));
        assert!(!decode_write(b"OKAY\n"));
        assert!(!decode_write(b""));
    }

    #[test]
    fn test_decode_json_lenient_fields() {
        let reading = decode_json(br#"{"T":"21.5","H":"not-a-number","P":null}"#)
            .unwrap()
            .unwrap();
        assert_eq!(reading.temperature, Some(FieldValue::Number(21.5)));
        assert_eq!(reading.humidity, Some(FieldValue::Text("not-a-number".to_string())));
        assert_eq!(reading.pressure, None);
    }

    #[test]
    fn test_decode_json_numbers_and_missing_keys() {
        let reading = decode_json(b"{\"T\":19.25,\"P\":1013.2}\r\n").unwrap().unwrap();
        assert_eq!(reading.temperature, Some(FieldValue::Number(19.25)));
        assert_eq!(reading.humidity, None);
        assert_eq!(reading.pressure, Some(FieldValue::Number(1013.2)));
    }

    #[test]
    fn test_decode_json_rejects_non_object() {
        assert!(matches!(
            decode_json(b"[1,2]\r\n"),
            Err(SensorError::MalformedResponse { .. })
        ));
        assert!(matches!(
            decode_json(b"{\"T\":\r\n"),
            Err(SensorError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_numeric_policy() {
        assert_eq!(NumericPolicy::Strict.coerce("x"), None);
        assert_eq!(
            NumericPolicy::Lenient.coerce("x"),
            Some(FieldValue::Text("x".to_string()))
        );
        assert_eq!(NumericPolicy::Strict.coerce(" 3.5 "), Some(FieldValue::Number(3.5)));
    }

    #[test]
    fn test_aggregate_serializes_without_missing_fields() {
        let reading = AggregateReading {
            temperature: Some(FieldValue::Number(21.5)),
            humidity: Some(FieldValue::Text("n/a".to_string())),
            pressure: None,
        };
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(json, r#"{"temperature":21.5,"humidity":"n/a"}"#);
    }
}
