//! The non-scalar, non-collection destinations: duration, URL, IP, regexp,
//! big integer/float, byte sequence, and name/value pair.

use std::any::Any;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;

use super::{Value, ValueKind};
use crate::error::ValueError;

/// Parses Go-`time.ParseDuration`-style literals: a sequence of
/// `<number><unit>` pairs (`ns`, `us`/`µs`, `ms`, `s`, `m`, `h`), e.g.
/// `"1h2m3s"`. No crate in the retrieval pack offers this (see DESIGN.md),
/// so it is hand-rolled in the style of the teacher's other recursive
/// mini-parsers.
fn parse_duration(raw: &str) -> Result<Duration, ()> {
    if raw.is_empty() {
        return Err(());
    }
    let mut total = Duration::ZERO;
    let mut chars = raw.chars().peekable();
    let mut any = false;
    while chars.peek().is_some() {
        let mut number = String::new();
        while matches!(chars.peek(), Some(c) if c.is_ascii_digit() || *c == '.') {
            number.push(chars.next().unwrap());
        }
        if number.is_empty() {
            return Err(());
        }
        let mut unit = String::new();
        while matches!(chars.peek(), Some(c) if c.is_alphabetic() || *c == '\u{b5}') {
            unit.push(chars.next().unwrap());
        }
        let value: f64 = number.parse().map_err(|_| ())?;
        let seconds = match unit.as_str() {
            "ns" => value / 1_000_000_000.0,
            "us" | "\u{b5}s" => value / 1_000_000.0,
            "ms" => value / 1_000.0,
            "s" => value,
            "m" => value * 60.0,
            "h" => value * 3600.0,
            _ => return Err(()),
        };
        total += Duration::from_secs_f64(seconds.max(0.0));
        any = true;
    }
    if any {
        Ok(total)
    } else {
        Err(())
    }
}

fn format_duration(d: &Duration) -> String {
    let secs = d.as_secs_f64();
    if secs == 0.0 {
        return "0s".to_string();
    }
    if secs < 1.0 {
        return format!("{}ms", (secs * 1000.0).round() as i64);
    }
    let hours = (secs / 3600.0).floor();
    let rem = secs - hours * 3600.0;
    let minutes = (rem / 60.0).floor();
    let seconds = rem - minutes * 60.0;
    let mut out = String::new();
    if hours > 0.0 {
        out.push_str(&format!("{}h", hours as i64));
    }
    if minutes > 0.0 {
        out.push_str(&format!("{}m", minutes as i64));
    }
    if seconds > 0.0 || out.is_empty() {
        if seconds.fract() == 0.0 {
            out.push_str(&format!("{}s", seconds as i64));
        } else {
            out.push_str(&format!("{seconds}s"));
        }
    }
    out
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DurationValue(pub Duration);

impl Value for DurationValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        self.0 = parse_duration(raw)
            .map_err(|_| ValueError::InvalidLiteral { kind: "duration", raw: raw.to_string() })?;
        Ok(())
    }

    fn set_default(&mut self) -> Result<(), ValueError> {
        self.0 = Duration::from_secs(1);
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = Duration::ZERO;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(DurationValue::default())
    }

    fn display(&self) -> String {
        format_duration(&self.0)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Duration
    }

    fn allows_optional(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct UrlValue(pub Option<url::Url>);

impl Value for UrlValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        let parsed = url::Url::parse(raw)
            .map_err(|_| ValueError::InvalidLiteral { kind: "url", raw: raw.to_string() })?;
        self.0 = Some(parsed);
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = None;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(UrlValue::default())
    }

    fn display(&self) -> String {
        self.0.as_ref().map(|u| u.to_string()).unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Url
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct IpValue(pub Option<IpAddr>);

impl Value for IpValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        self.0 = Some(
            raw.parse::<IpAddr>()
                .map_err(|_| ValueError::InvalidLiteral { kind: "ip", raw: raw.to_string() })?,
        );
        Ok(())
    }

    fn set_default(&mut self) -> Result<(), ValueError> {
        self.0 = Some(IpAddr::from_str("127.0.0.1").unwrap());
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = None;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(IpValue::default())
    }

    fn display(&self) -> String {
        self.0.map(|ip| ip.to_string()).unwrap_or_default()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Ip
    }

    fn allows_optional(&self) -> bool {
        true
    }
}

/// Regex compiled via `regex-lite`, the same crate the teacher already
/// depends on for `grep`/`sed`/`find -regex`. `regex_lite::Regex` does not
/// implement `Clone`, so the source pattern is kept alongside the compiled
/// form to make `zero_clone` possible.
#[derive(Debug, Clone, Default)]
pub struct RegexpValue {
    pattern: String,
    compiled: Option<CompiledRegex>,
}

#[derive(Clone)]
struct CompiledRegex(regex_lite::Regex);

impl std::fmt::Debug for CompiledRegex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Regex({})", self.0.as_str())
    }
}

impl RegexpValue {
    pub fn get(&self) -> Option<&regex_lite::Regex> {
        self.compiled.as_ref().map(|c| &c.0)
    }
}

impl Value for RegexpValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        let compiled = regex_lite::Regex::new(raw)
            .map_err(|_| ValueError::InvalidLiteral { kind: "regexp", raw: raw.to_string() })?;
        self.pattern = raw.to_string();
        self.compiled = Some(CompiledRegex(compiled));
        Ok(())
    }

    fn reset(&mut self) {
        self.pattern.clear();
        self.compiled = None;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(RegexpValue::default())
    }

    fn display(&self) -> String {
        self.pattern.clone()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Regexp
    }
}

/// Backed by `i128`, not an arbitrary-precision type: no bigint crate
/// appears anywhere in the retrieval pack (see DESIGN.md).
#[derive(Debug, Clone, Copy, Default)]
pub struct BigIntValue(pub i128);

impl Value for BigIntValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        self.0 = raw
            .parse::<i128>()
            .map_err(|_| ValueError::InvalidLiteral { kind: "bigint", raw: raw.to_string() })?;
        Ok(())
    }

    fn set_default(&mut self) -> Result<(), ValueError> {
        self.0 = 1;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = 0;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(BigIntValue::default())
    }

    fn display(&self) -> String {
        self.0.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::BigInt
    }

    fn allows_optional(&self) -> bool {
        true
    }
}

/// Backed by `f64` (see `BigIntValue` for why no arbitrary-precision crate
/// is used).
#[derive(Debug, Clone, Copy, Default)]
pub struct BigFloatValue(pub f64);

impl Value for BigFloatValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        self.0 = raw
            .parse::<f64>()
            .map_err(|_| ValueError::InvalidLiteral { kind: "bigfloat", raw: raw.to_string() })?;
        Ok(())
    }

    fn set_default(&mut self) -> Result<(), ValueError> {
        self.0 = 1.0;
        Ok(())
    }

    fn reset(&mut self) {
        self.0 = 0.0;
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(BigFloatValue::default())
    }

    fn display(&self) -> String {
        self.0.to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::BigFloat
    }

    fn allows_optional(&self) -> bool {
        true
    }
}

/// A raw byte sequence. A `base64:`-prefixed literal is decoded; anything
/// else is taken as UTF-8 bytes verbatim.
#[derive(Debug, Clone, Default)]
pub struct BytesValue(pub Vec<u8>);

impl Value for BytesValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        self.0 = match raw.strip_prefix("base64:") {
            Some(encoded) => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(encoded)
                    .map_err(|_| ValueError::InvalidLiteral { kind: "bytes", raw: raw.to_string() })?
            }
            None => raw.as_bytes().to_vec(),
        };
        Ok(())
    }

    fn reset(&mut self) {
        self.0.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(BytesValue::default())
    }

    fn display(&self) -> String {
        String::from_utf8_lossy(&self.0).to_string()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Bytes
    }
}

/// A single `name=value` pair, distinct from `MapValue` in that it holds
/// exactly one entry and is meant for destinations like `--define key=val`
/// used once per occurrence rather than accumulated.
#[derive(Debug, Clone, Default)]
pub struct NameValueValue {
    pub name: String,
    pub value: String,
}

impl Value for NameValueValue {
    fn set(&mut self, raw: &[String], _reset_first: bool) -> Result<(), ValueError> {
        let raw = raw.last().map(|s| s.as_str()).unwrap_or_default();
        match raw.split_once('=') {
            Some((name, value)) => {
                self.name = name.to_string();
                self.value = value.to_string();
                Ok(())
            }
            None => Err(ValueError::InvalidLiteral { kind: "name=value pair", raw: raw.to_string() }),
        }
    }

    fn reset(&mut self) {
        self.name.clear();
        self.value.clear();
    }

    fn zero_clone(&self) -> Box<dyn Value> {
        Box::new(NameValueValue::default())
    }

    fn display(&self) -> String {
        format!("{}={}", self.name, self.value)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn kind(&self) -> ValueKind {
        ValueKind::NameValue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parses_compound_literal() {
        let mut v = DurationValue::default();
        v.set(&["1h2m3s".to_string()], true).unwrap();
        assert_eq!(v.0, Duration::from_secs(3723));
    }

    #[test]
    fn duration_smart_default_is_one_second() {
        let mut v = DurationValue::default();
        v.set_default().unwrap();
        assert_eq!(v.0, Duration::from_secs(1));
    }

    #[test]
    fn ip_smart_default_is_loopback() {
        let mut v = IpValue::default();
        v.set_default().unwrap();
        assert_eq!(v.0, Some(IpAddr::from_str("127.0.0.1").unwrap()));
    }

    #[test]
    fn regexp_matches_after_set() {
        let mut v = RegexpValue::default();
        v.set(&["^a+$".to_string()], true).unwrap();
        assert!(v.get().unwrap().is_match("aaa"));
    }

    #[test]
    fn bytes_value_decodes_base64_prefix() {
        let mut v = BytesValue::default();
        v.set(&["base64:aGk=".to_string()], true).unwrap();
        assert_eq!(v.0, b"hi");
    }

    #[test]
    fn name_value_splits_on_first_equals() {
        let mut v = NameValueValue::default();
        v.set(&["key=a=b".to_string()], true).unwrap();
        assert_eq!(v.name, "key");
        assert_eq!(v.value, "a=b");
    }
}
