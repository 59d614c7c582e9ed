// Stream decoders
//
// One pure function per logical channel. Each takes the raw datagram bytes
// and the millisecond receipt timestamp and yields either a CSV row or
// nothing (datagram discarded). Malformed payloads are decode errors; a
// failed datagram never affects the next one.

use crate::types::{AuxMode, Field, IngestConfig, IngestError, IngestResult, Packet, Row, StreamKind};
use serde::de::DeserializeOwned;

// D11 and D12 are the input pins; the remaining aux pins are discarded.
const D11_PIN_SHALLOW: usize = 0;
const D12_PIN_DEEP: usize = 1;

fn parse<T: DeserializeOwned>(payload: &[u8]) -> IngestResult<Packet<T>> {
    serde_json::from_slice(payload)
        .map_err(|e| IngestError::Parse(format!("invalid JSON datagram: {}", e)))
}

/// Decode a datagram for the given channel.
pub fn decode(
    kind: StreamKind,
    config: &IngestConfig,
    payload: &[u8],
    ts_ms: i64,
) -> IngestResult<Option<Row>> {
    match kind {
        StreamKind::TimeSeries => time_series(payload, ts_ms),
        StreamKind::BandPower => band_power(payload, ts_ms),
        StreamKind::Auxiliary => auxiliary(payload, ts_ms, config.aux_mode),
        StreamKind::Focus => focus(payload, ts_ms),
    }
}

/// `{"type":"eeg","data":[f64...]}`, one float per channel.
///
/// The array length is not validated against the configured channel count;
/// a mismatched payload produces a row that does not line up with the
/// header. Accepted limitation of the wire contract.
pub fn time_series(payload: &[u8], ts_ms: i64) -> IngestResult<Option<Row>> {
    let packet: Packet<Vec<f64>> = parse(payload)?;
    let mut fields = Vec::with_capacity(packet.data.len() + 1);
    fields.push(Field::Int(ts_ms));
    fields.extend(packet.data.into_iter().map(Field::Float));
    Ok(Some(Row(fields)))
}

/// `{"type":"bandPower","data":[[ch1 bands],[ch2 bands],...]}`, five floats
/// per channel in fixed Delta/Theta/Alpha/Beta/Gamma order. Flattened
/// channel-major, band order preserved.
pub fn band_power(payload: &[u8], ts_ms: i64) -> IngestResult<Option<Row>> {
    let packet: Packet<Vec<Vec<f64>>> = parse(payload)?;
    let mut fields = vec![Field::Int(ts_ms)];
    for channel in packet.data {
        fields.extend(channel.into_iter().map(Field::Float));
    }
    Ok(Some(Row(fields)))
}

/// `{"type":"auxiliary","data":[0,1,0,1,0]}`, digital pin values.
///
/// Accelerometer datagrams arrive on the same port. A payload counts as
/// digital-pin data iff its type is `auxiliary` and, in dongle mode, the
/// array length is exactly 5, or, in WiFi-shield mode, every element is
/// exactly 0 or 1. Anything else is discarded. A 5-element analog reading
/// in dongle mode is misclassified as digital; known limitation, kept.
pub fn auxiliary(payload: &[u8], ts_ms: i64, mode: AuxMode) -> IngestResult<Option<Row>> {
    let packet: Packet<Vec<f64>> = parse(payload)?;
    let data = &packet.data;

    let is_digital = packet.kind == "auxiliary"
        && match mode {
            AuxMode::Dongle => data.len() == 5,
            AuxMode::WifiShield => data.iter().all(|v| *v == 0.0 || *v == 1.0),
        };
    if !is_digital {
        return Ok(None);
    }
    if data.len() <= D12_PIN_DEEP {
        return Err(IngestError::Parse(format!(
            "auxiliary payload too short: {} pin values",
            data.len()
        )));
    }

    Ok(Some(Row(vec![
        Field::Int(ts_ms),
        Field::Float(data[D11_PIN_SHALLOW]),
        Field::Float(data[D12_PIN_DEEP]),
    ])))
}

/// `{"type":"focus","data":0.0}`. The signal is a boolean delivered as a
/// float; truncate toward zero to an integer.
pub fn focus(payload: &[u8], ts_ms: i64) -> IngestResult<Option<Row>> {
    let packet: Packet<f64> = parse(payload)?;
    Ok(Some(Row(vec![
        Field::Int(ts_ms),
        Field::Int(packet.data as i64),
    ])))
}
