//! Delivery channel names.
//!
//! Channels are open-ended strings owned by the preference store; these are
//! the ones the service knows defaults for.

pub const EMAIL: &str = "email";
pub const IN_APP: &str = "in-app";
pub const PUSH: &str = "push";
pub const WHATSAPP: &str = "whatsapp";
pub const SMS: &str = "sms";

/// Channel forced for high-priority records that would otherwise go nowhere.
pub const DEFAULT_FAILSAFE: &str = IN_APP;

/// Channel map applied to users without any stored preferences.
pub fn default_channel_map() -> std::collections::BTreeMap<String, bool> {
    [
        (EMAIL, true),
        (IN_APP, true),
        (PUSH, false),
        (WHATSAPP, false),
        (SMS, false),
    ]
    .into_iter()
    .map(|(name, enabled)| (name.to_string(), enabled))
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_channel_map() {
        let map = default_channel_map();
        assert_eq!(map.len(), 5);
        assert_eq!(map.get(EMAIL), Some(&true));
        assert_eq!(map.get(IN_APP), Some(&true));
        assert_eq!(map.get(SMS), Some(&false));
    }
}
