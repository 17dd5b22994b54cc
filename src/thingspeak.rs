//! ThingSpeak channel updates over the `/update` write API.
//!
//! The server answers with the new entry id as plain text, or `0` when the
//! update was rejected (bad key, or less than 15 seconds since the last
//! update on free accounts).

use core::fmt::Write;

use heapless::String;

use crate::constants::{PREDICTION_LABEL_MAX, THINGSPEAK_PAYLOAD_MAX};
use crate::inference::Prediction;
use crate::readings::Readings;

/// Minimum spacing between updates accepted on a free ThingSpeak account
pub const MIN_UPDATE_INTERVAL_SECS: u64 = 15;

/// Channel field that carries the prediction confidence
pub const CONFIDENCE_FIELD: u8 = 7;

pub const FIELD_COUNT: usize = 8;

pub const CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    InvalidField,
    NonFiniteValue,
    PayloadTooLarge,
    Rejected,
    UnexpectedResponse,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Update {
    fields: [Option<f32>; FIELD_COUNT],
    status: Option<String<PREDICTION_LABEL_MAX>>,
}

impl Update {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `field<n>` where `n` is 1-based, as in the ThingSpeak API.
    pub fn set_field(&mut self, field: u8, value: f32) -> Result<(), Error> {
        let slot = (field as usize)
            .checked_sub(1)
            .and_then(|index| self.fields.get_mut(index))
            .ok_or(Error::InvalidField)?;
        if !value.is_finite() {
            return Err(Error::NonFiniteValue);
        }
        *slot = Some(value);
        Ok(())
    }

    pub fn field(&self, field: u8) -> Option<f32> {
        (field as usize)
            .checked_sub(1)
            .and_then(|index| self.fields.get(index).copied().flatten())
    }

    pub fn set_status(&mut self, status: &str) {
        let mut text = String::new();
        for c in status.chars() {
            if text.push(c).is_err() {
                break;
            }
        }
        self.status = Some(text);
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.iter().all(Option::is_none) && self.status.is_none()
    }

    /// Builds the update for one cycle: every reading on its own field, the
    /// prediction confidence on [`CONFIDENCE_FIELD`] and its label as the
    /// channel status.
    pub fn from_readings(readings: &Readings, prediction: Option<&Prediction>) -> Self {
        let mut update = Self::new();
        for (quantity, value) in readings.iter() {
            // quantity fields are 1..=6 by construction
            update.set_field(quantity.field(), value).ok();
        }
        if let Some(prediction) = prediction {
            if let Some(confidence) = prediction.confidence {
                update.set_field(CONFIDENCE_FIELD, confidence).ok();
            }
            update.set_status(&prediction.label);
        }
        update
    }
}

/// Form-encodes an update with its write key.
pub fn encode_form(api_key: &str, update: &Update) -> Result<String<THINGSPEAK_PAYLOAD_MAX>, Error> {
    let mut body: String<THINGSPEAK_PAYLOAD_MAX> = String::new();
    body.push_str("api_key").map_err(|_| Error::PayloadTooLarge)?;
    body.push('=').map_err(|_| Error::PayloadTooLarge)?;
    push_form_encoded(&mut body, api_key)?;

    for (index, value) in update.fields.iter().enumerate() {
        if let Some(value) = value {
            write!(body, "&field{}={:.2}", index + 1, value).map_err(|_| Error::PayloadTooLarge)?;
        }
    }

    if let Some(status) = &update.status {
        body.push_str("&status=").map_err(|_| Error::PayloadTooLarge)?;
        push_form_encoded(&mut body, status)?;
    }

    Ok(body)
}

/// Parses the plain-text body of an `/update` response.
pub fn parse_entry_id(body: &[u8]) -> Result<u32, Error> {
    let text = core::str::from_utf8(body).map_err(|_| Error::UnexpectedResponse)?;
    match text.trim().parse::<u32>() {
        Ok(0) => Err(Error::Rejected),
        Ok(entry_id) => Ok(entry_id),
        Err(_) => Err(Error::UnexpectedResponse),
    }
}

fn push_form_encoded<const N: usize>(out: &mut String<N>, value: &str) -> Result<(), Error> {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    for byte in value.bytes() {
        let pushed = match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => out.push(byte as char),
            b' ' => out.push('+'),
            _ => out
                .push('%')
                .and_then(|_| out.push(HEX[(byte >> 4) as usize] as char))
                .and_then(|_| out.push(HEX[(byte & 0x0F) as usize] as char)),
        };
        pushed.map_err(|_| Error::PayloadTooLarge)?;
    }
    Ok(())
}
