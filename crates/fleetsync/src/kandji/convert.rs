//! Conversion from Kandji devices to directory devices.

use super::types::KandjiDevice;
use crate::client::{Assignment, PlatformClass, SourceDevice};

/// Convert a Kandji device to a platform-agnostic directory device.
pub fn to_source_device(device: KandjiDevice) -> SourceDevice {
    let owner_email = device.user.email().to_string();
    let platform = PlatformClass::from_platform(device.platform.as_deref().unwrap_or_default());

    SourceDevice {
        identifier: device.serial_number.unwrap_or_default().trim().to_string(),
        display_name: device.device_name.unwrap_or_default(),
        owner_email,
        platform,
        tags: device.tags,
        assignment: Assignment {
            blueprint_id: device.blueprint_id.unwrap_or_default(),
            blueprint_name: device.blueprint_name.unwrap_or_default(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kandji::{KandjiUser, KandjiUserField};

    #[test]
    fn test_to_source_device() {
        let device = KandjiDevice {
            device_id: Some("d-1".to_string()),
            device_name: Some("Bob's iPad".to_string()),
            serial_number: Some(" DMPXYZ ".to_string()),
            platform: Some("iPad".to_string()),
            user: KandjiUserField::User(KandjiUser {
                email: Some("bob@example.com".to_string()),
                name: Some("Bob".to_string()),
            }),
            tags: vec!["loaner".to_string()],
            blueprint_id: Some("bp-2".to_string()),
            blueprint_name: Some("Kiosk".to_string()),
        };

        let source = to_source_device(device);
        assert_eq!(source.identifier, "DMPXYZ");
        assert_eq!(source.display_name, "Bob's iPad");
        assert_eq!(source.owner_email, "bob@example.com");
        assert_eq!(source.platform, PlatformClass::Mobile);
        assert_eq!(source.tags, vec!["loaner".to_string()]);
        assert_eq!(source.assignment.blueprint_name, "Kiosk");
    }

    #[test]
    fn test_to_source_device_defaults() {
        let source = to_source_device(KandjiDevice::default());
        assert_eq!(source.identifier, "");
        assert!(!source.is_owned());
        assert_eq!(source.platform, PlatformClass::Desktop);
        assert_eq!(source.assignment.blueprint_id, "");
    }
}
