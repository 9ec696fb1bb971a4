// Payload parsing for the incubator sensor topic. Devices publish plain text
// like `ext=22.5, axil=25.0, hum=60.3`. Parsing is positional: the keys are
// never checked, so a device that reorders its fields will have its values
// forwarded under the wrong field numbers.

/// One set of readings taken from a single MQTT message.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub external_temperature: f64,
    pub axial_temperature: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("expected 3 fields, payload has {found}")]
    MissingField { found: usize },
    #[error("field {index} (`{token}`) has no `=`")]
    MissingValue { index: usize, token: String },
    #[error("field {index} value `{value}` is not a number")]
    InvalidNumber { index: usize, value: String },
}

const FIELD_SEPARATOR: &str = ", ";
const FIELD_COUNT: usize = 3;

/// Decode a raw MQTT payload and parse it. Invalid UTF-8 is rejected rather
/// than replaced, since a lossy decode could turn garbage into a number.
pub fn parse_bytes(payload: &[u8]) -> Result<SensorReading, ParseError> {
    let text = std::str::from_utf8(payload).map_err(|_| ParseError::InvalidUtf8)?;
    parse(text)
}

pub fn parse(payload: &str) -> Result<SensorReading, ParseError> {
    let tokens: Vec<&str> = payload.split(FIELD_SEPARATOR).collect();
    if tokens.len() < FIELD_COUNT {
        return Err(ParseError::MissingField { found: tokens.len() });
    }

    Ok(SensorReading {
        external_temperature: field_value(&tokens, 0)?,
        axial_temperature: field_value(&tokens, 1)?,
        humidity: field_value(&tokens, 2)?,
    })
}

// Second `=` segment of the token at `index`; anything after a further `=`
// is ignored.
fn field_value(tokens: &[&str], index: usize) -> Result<f64, ParseError> {
    let token = tokens[index];
    let raw = token.split('=').nth(1).ok_or_else(|| ParseError::MissingValue {
        index,
        token: token.to_string(),
    })?;

    let invalid = || ParseError::InvalidNumber { index, value: raw.to_string() };
    let digits = strip_digit_separators(raw.trim()).ok_or_else(invalid)?;
    digits.parse::<f64>().map_err(|_| invalid())
}

// Drop `_` digit-group separators (`1_000.5`). Each one must sit between two
// ASCII digits; anything else makes the value invalid.
fn strip_digit_separators(raw: &str) -> Option<String> {
    if !raw.contains('_') {
        return Some(raw.to_string());
    }
    let bytes = raw.as_bytes();
    for (i, b) in bytes.iter().enumerate() {
        if *b == b'_' {
            let before = i.checked_sub(1).and_then(|j| bytes.get(j));
            let after = bytes.get(i + 1);
            match (before, after) {
                (Some(l), Some(r)) if l.is_ascii_digit() && r.is_ascii_digit() => {}
                _ => return None,
            }
        }
    }
    Some(raw.replace('_', ""))
}

/// Render a reading value the way the ingestion API expects to see it:
/// integral values keep a trailing `.0`, and magnitudes of 1e16 and above or
/// below 1e-4 switch to exponent form with a signed, two-digit exponent
/// (`1e+20`, `1e-05`).
pub fn format_field(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf".to_string() } else { "-inf".to_string() };
    }

    let shortest = format!("{:?}", value);
    match shortest.split_once('e') {
        Some((mantissa, exp)) => {
            let (sign, digits) = match exp.strip_prefix('-') {
                Some(d) => ('-', d),
                None => ('+', exp),
            };
            format!("{}e{}{:0>2}", mantissa, sign, digits)
        }
        None => shortest,
    }
}


//   TESTS
//
