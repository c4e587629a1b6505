//! BLE Protocol Definitions
//!
//! Service UUID parsing and normalization, plus target-device matching.

use crate::domain::models::PeripheralRecord;
use anyhow::Result;
use uuid::Uuid;

/// Bluetooth SIG base UUID `00000000-0000-1000-8000-00805F9B34FB`
pub const BLUETOOTH_BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

const BASE_MASK: u128 = (1u128 << 96) - 1;

/// Parse a service UUID in 16-bit (`FFF0`), 32-bit or full 128-bit form.
pub fn parse_service_uuid(uuid_str: &str) -> Result<Uuid> {
    let trimmed = uuid_str.trim().trim_start_matches("0x");
    match trimmed.len() {
        4 | 8 => {
            let short = u32::from_str_radix(trimmed, 16)?;
            Ok(Uuid::from_u128(BLUETOOTH_BASE_UUID | ((short as u128) << 96)))
        }
        _ => Ok(Uuid::parse_str(trimmed)?),
    }
}

/// Shortest conventional representation of a service UUID.
///
/// UUIDs derived from the SIG base collapse to upper-case `FFF0`/`0000FFF0`
/// style; anything else stays in lower-case hyphenated form.
pub fn short_form(uuid: &Uuid) -> String {
    let value = uuid.as_u128();
    if value & BASE_MASK == BLUETOOTH_BASE_UUID {
        let short = (value >> 96) as u32;
        if short <= 0xFFFF {
            format!("{:04X}", short)
        } else {
            format!("{:08X}", short)
        }
    } else {
        uuid.hyphenated().to_string()
    }
}

/// Normalize a user-supplied UUID string so it compares equal to the
/// values stored on [`PeripheralRecord::service_uuids`].
pub fn normalize_service(uuid_str: &str) -> String {
    match parse_service_uuid(uuid_str) {
        Ok(uuid) => short_form(&uuid),
        Err(_) => uuid_str.trim().to_string(),
    }
}

/// Parse a list of service filters, skipping (and reporting) invalid ones.
pub fn parse_service_filters(filters: &[String]) -> Vec<Uuid> {
    filters
        .iter()
        .filter_map(|f| match parse_service_uuid(f) {
            Ok(uuid) => Some(uuid),
            Err(e) => {
                tracing::warn!("Ignoring invalid service filter {:?}: {}", f, e);
                None
            }
        })
        .collect()
}

/// Whether a peripheral advertises the configured target name and service.
pub fn is_target_device(record: &PeripheralRecord, name: &str, service_uuid: &str) -> bool {
    let wanted = normalize_service(service_uuid);
    record.name.as_deref() == Some(name)
        && record
            .service_uuids
            .iter()
            .any(|s| normalize_service(s) == wanted)
}
