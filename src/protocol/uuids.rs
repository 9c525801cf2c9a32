//! Heart rate GATT UUIDs.
//!
//! The gateway lists descriptors by their 32-bit "class" (the first eight
//! hex digits of the UUID); every UUID here lives on the Bluetooth base UUID.

use uuid::Uuid;

/// Lower 96 bits of the Bluetooth base UUID (`0000xxxx-0000-1000-8000-00805f9b34fb`).
pub const BLUETOOTH_BASE_UUID: u128 = 0x0000_0000_0000_1000_8000_00805f9b34fb;

/// Heart Rate Service UUID.
pub const HEART_RATE_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_180d_0000_1000_8000_00805f9b34fb);
/// Heart Rate Measurement characteristic UUID (Notify).
pub const HEART_RATE_MEASUREMENT_UUID: Uuid =
    Uuid::from_u128(0x0000_2a37_0000_1000_8000_00805f9b34fb);
/// Body Sensor Location characteristic UUID.
pub const BODY_SENSOR_LOCATION_UUID: Uuid =
    Uuid::from_u128(0x0000_2a38_0000_1000_8000_00805f9b34fb);
/// Client Characteristic Configuration descriptor UUID.
pub const CLIENT_CHARACTERISTIC_CONFIG_UUID: Uuid =
    Uuid::from_u128(0x0000_2902_0000_1000_8000_00805f9b34fb);

/// Build a full UUID from the 32-bit class printed by the gateway.
pub fn uuid_from_class(class: u32) -> Uuid {
    Uuid::from_u128((u128::from(class) << 96) | BLUETOOTH_BASE_UUID)
}

/// The 32-bit class of a UUID.
pub fn uuid_class(uuid: &Uuid) -> u32 {
    (uuid.as_u128() >> 96) as u32
}
