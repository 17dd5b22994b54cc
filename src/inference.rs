//! Request/response payloads for the ML inference server.
//!
//! The device POSTs its latest readings as JSON:
//!
//! ```text
//! {"device_id":"rockshield-01","readings":{"temperature":21.50,"humidity":40.00}}
//! ```
//!
//! and expects a JSON object back carrying a `prediction` (or `label`)
//! member, string or integer, and optionally a finite numeric
//! `confidence`. Other members are ignored.

use core::fmt::Write;

use heapless::String;
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

use crate::constants::{INFERENCE_PAYLOAD_MAX, PREDICTION_LABEL_MAX};
use crate::readings::Readings;

pub const CONTENT_TYPE: &str = "application/json";

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    PayloadTooLarge,
    InvalidUtf8,
    MalformedJson,
    MissingPrediction,
    InvalidConfidence,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    pub label: String<PREDICTION_LABEL_MAX>,
    pub confidence: Option<f32>,
}

pub fn encode_request(device_id: &str, readings: &Readings) -> Result<String<INFERENCE_PAYLOAD_MAX>, Error> {
    let mut payload: String<INFERENCE_PAYLOAD_MAX> = String::new();
    write!(payload, "{{\"device_id\":").map_err(|_| Error::PayloadTooLarge)?;
    push_json_string(&mut payload, device_id)?;
    write!(payload, ",\"readings\":{{").map_err(|_| Error::PayloadTooLarge)?;
    for (i, (quantity, value)) in readings.iter().enumerate() {
        if i > 0 {
            payload.push(',').map_err(|_| Error::PayloadTooLarge)?;
        }
        write!(payload, "\"{}\":{:.2}", quantity.key(), value).map_err(|_| Error::PayloadTooLarge)?;
    }
    write!(payload, "}}}}").map_err(|_| Error::PayloadTooLarge)?;
    Ok(payload)
}

/// Decodes the server's reply. Only top-level members count; nested
/// objects such as `{"details":{"confidence":0.2}}` are skipped whole.
pub fn parse_response(body: &[u8]) -> Result<Prediction, Error> {
    core::str::from_utf8(body).map_err(|_| Error::InvalidUtf8)?;

    let (response, _) =
        serde_json_core::from_slice::<InferenceResponse>(body).map_err(|_| Error::MalformedJson)?;

    let label = response
        .prediction
        .or(response.label)
        .map(|Label(text)| text)
        .filter(|text| !text.is_empty())
        .ok_or(Error::MissingPrediction)?;

    // "1e39" decodes to infinity
    let confidence = match response.confidence {
        Some(value) if !value.is_finite() => return Err(Error::InvalidConfidence),
        other => other,
    };

    Ok(Prediction { label, confidence })
}

#[derive(Deserialize)]
struct InferenceResponse {
    prediction: Option<Label>,
    label: Option<Label>,
    confidence: Option<f32>,
}

/// A label sent either as a string or as an integer class index.
struct Label(String<PREDICTION_LABEL_MAX>);

impl<'de> Deserialize<'de> for Label {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(LabelVisitor)
    }
}

struct LabelVisitor;

impl LabelVisitor {
    fn display<E: de::Error>(value: impl core::fmt::Display) -> Result<Label, E> {
        let mut text = String::new();
        write!(text, "{}", value).map_err(|_| E::custom("label too long"))?;
        Ok(Label(text))
    }
}

impl<'de> Visitor<'de> for LabelVisitor {
    type Value = Label;

    fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str("a string or integer label")
    }

    fn visit_str<E: de::Error>(self, value: &str) -> Result<Label, E> {
        // long labels are cut at a char boundary
        let mut text = String::new();
        for c in value.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        Ok(Label(text))
    }

    fn visit_u64<E: de::Error>(self, value: u64) -> Result<Label, E> {
        Self::display(value)
    }

    fn visit_i64<E: de::Error>(self, value: i64) -> Result<Label, E> {
        Self::display(value)
    }

    fn visit_f64<E: de::Error>(self, value: f64) -> Result<Label, E> {
        Self::display(value)
    }
}

fn push_json_string<const N: usize>(out: &mut String<N>, value: &str) -> Result<(), Error> {
    out.push('"').map_err(|_| Error::PayloadTooLarge)?;
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32).map_err(|_| ()),
            c => out.push(c).map_err(|_| ()),
        }
        .map_err(|_| Error::PayloadTooLarge)?;
    }
    out.push('"').map_err(|_| Error::PayloadTooLarge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readings::Quantity;

    #[test]
    fn request_carries_device_and_readings() {
        let mut readings = Readings::new();
        readings.add(Quantity::Temperature, 21.5);
        readings.add(Quantity::Co2, 612.0);

        let payload = encode_request("rockshield-01", &readings).unwrap();
        assert_eq!(
            payload.as_str(),
            r#"{"device_id":"rockshield-01","readings":{"temperature":21.50,"co2":612.00}}"#
        );
    }

    #[test]
    fn request_escapes_device_id() {
        let payload = encode_request("a\"b\\c\n", &Readings::new()).unwrap();
        assert_eq!(
            payload.as_str(),
            r#"{"device_id":"a\"b\\c\u000a","readings":{}}"#
        );
    }

    #[test]
    fn string_prediction_with_confidence() {
        let body = br#"{ "prediction" : "landslide risk", "confidence": 0.93 }"#;
        let prediction = parse_response(body).unwrap();
        assert_eq!(prediction.label.as_str(), "landslide risk");
        assert_eq!(prediction.confidence, Some(0.93));
    }

    #[test]
    fn numeric_label() {
        let body = br#"{"model":"v3","label":2,"confidence":1}"#;
        let prediction = parse_response(body).unwrap();
        assert_eq!(prediction.label.as_str(), "2");
        assert_eq!(prediction.confidence, Some(1.0));
    }

    #[test]
    fn nested_members_do_not_shadow_top_level() {
        let body = br#"{"prediction":"stable","details":{"confidence":0.2},"confidence":0.9}"#;
        let prediction = parse_response(body).unwrap();
        assert_eq!(prediction.label.as_str(), "stable");
        assert_eq!(prediction.confidence, Some(0.9));

        let body = br#"{"meta":{"confidence":"n/a"},"prediction":"x","confidence":0.9}"#;
        let prediction = parse_response(body).unwrap();
        assert_eq!(prediction.label.as_str(), "x");
        assert_eq!(prediction.confidence, Some(0.9));

        let body = br#"{"result":{"label":2},"prediction":"slide"}"#;
        assert_eq!(parse_response(body).unwrap().label.as_str(), "slide");
    }

    #[test]
    fn key_text_inside_values_is_not_matched() {
        let body = br#"{"note":"prediction","prediction":"stable","confidence":null}"#;
        let prediction = parse_response(body).unwrap();
        assert_eq!(prediction.label.as_str(), "stable");
        assert_eq!(prediction.confidence, None);
    }

    #[test]
    fn non_ascii_after_unicode_escape_does_not_panic() {
        let body = "{\"prediction\":\"\\u\u{e9}\u{e9}\u{e9}\u{e9}\"}";
        // either outcome is fine as long as decoding returns
        let _ = parse_response(body.as_bytes());
        let _ = parse_response(br#"{"prediction":"\u12"}"#);
    }

    #[test]
    fn non_finite_confidence_is_rejected() {
        assert_eq!(
            parse_response(br#"{"prediction":"x","confidence":1e39}"#),
            Err(Error::InvalidConfidence)
        );
    }

    #[test]
    fn long_labels_are_truncated() {
        let mut body: String<256> = String::new();
        write!(body, "{{\"prediction\":\"").unwrap();
        for _ in 0..PREDICTION_LABEL_MAX + 10 {
            body.push('a').unwrap();
        }
        write!(body, "\"}}").unwrap();
        let prediction = parse_response(body.as_bytes()).unwrap();
        assert_eq!(prediction.label.len(), PREDICTION_LABEL_MAX);
    }

    #[test]
    fn missing_or_bad_members() {
        assert_eq!(parse_response(br#"{"status":"ok"}"#), Err(Error::MissingPrediction));
        assert_eq!(parse_response(br#"{"prediction":null}"#), Err(Error::MissingPrediction));
        assert_eq!(parse_response(br#"{"prediction":""}"#), Err(Error::MissingPrediction));
        assert_eq!(
            parse_response(br#"{"prediction":"x","confidence":"high"}"#),
            Err(Error::MalformedJson)
        );
        assert_eq!(parse_response(br#"{"prediction":"x""#), Err(Error::MalformedJson));
        assert_eq!(parse_response(&[0xff, 0xfe]), Err(Error::InvalidUtf8));
    }
}
