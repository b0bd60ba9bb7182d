use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::DeviceError;
use crate::pattern::Grid;

/// Body of `/status`.  Every field is optional: the firmware may leave out
/// anything it considers unchanged or does not implement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpm: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kit: Option<usize>,
    #[serde(rename = "kitName", skip_serializing_if = "Option::is_none")]
    pub kit_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub theme: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clients: Option<u32>,
}

/// Body of `/wifi` without params.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiStatus {
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clients: Option<u32>,
}

/// Some firmware builds send cells as 0/1 instead of booleans.
#[derive(Deserialize)]
#[serde(untagged)]
enum Cell {
    Bool(bool),
    Int(u8),
}

#[derive(Deserialize)]
struct PatternPayload {
    data: Vec<Vec<Cell>>,
}

fn parse<T: DeserializeOwned>(endpoint: &str, body: &str) -> Result<T, DeviceError> {
    serde_json::from_str(body).map_err(|e| DeviceError::MalformedResponse {
        endpoint: endpoint.to_string(),
        reason:   e.to_string(),
    })
}

pub fn parse_status(body: &str) -> Result<DeviceStatus, DeviceError> {
    parse("/status", body)
}

/// The grid shape is not checked here; `PatternBank::replace_pattern`
/// decides whether it fits.
pub fn parse_pattern(body: &str) -> Result<Grid, DeviceError> {
    let payload: PatternPayload = parse("/getpattern", body)?;
    Ok(payload
        .data
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|c| match c {
                    Cell::Bool(b) => b,
                    Cell::Int(n)  => n != 0,
                })
                .collect()
        })
        .collect())
}

pub fn parse_wifi(body: &str) -> Result<WifiStatus, DeviceError> {
    parse("/wifi", body)
}
