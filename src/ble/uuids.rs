//! BLE identifiers for the LILO.
//!
//! Contains the advertised name and the characteristic UUIDs read during a gather.

use uuid::Uuid;

use crate::reading::Measurement;

/// Name the LILO advertises during discovery.
pub const LILO_DEVICE_NAME: &str = "LILO";

// LILO Custom Service characteristics
/// Time characteristic UUID (Read).
pub const TIME_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x53e1_1633_b840_4b21_93ce_081726ddc739);
/// Light mode characteristic UUID (Read).
pub const LIGHT_CHARACTERISTIC_UUID: Uuid =
    Uuid::from_u128(0x53e1_1632_b840_4b21_93ce_081726ddc739);

/// Characteristics read on every gather, in record order.
pub const MEASUREMENT_CHARACTERISTICS: [(Uuid, Measurement); 2] = [
    (TIME_CHARACTERISTIC_UUID, Measurement::Time),
    (LIGHT_CHARACTERISTIC_UUID, Measurement::Light),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        assert_eq!(
            TIME_CHARACTERISTIC_UUID.to_string(),
            "53e11633-b840-4b21-93ce-081726ddc739"
        );
        assert_eq!(
            LIGHT_CHARACTERISTIC_UUID.to_string(),
            "53e11632-b840-4b21-93ce-081726ddc739"
        );
    }

    #[test]
    fn test_measurement_order() {
        assert_eq!(MEASUREMENT_CHARACTERISTICS[0].1, Measurement::Time);
        assert_eq!(MEASUREMENT_CHARACTERISTICS[1].1, Measurement::Light);
    }
}
