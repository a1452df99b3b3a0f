//! Device identity to kernel-compatibility family mapping.

/// Canonical family tags that binary variants are registered under.
pub mod families {
    pub const ASCEND310P: &str = "ascend310p";
    pub const ASCEND310B: &str = "ascend310b";
    pub const ASCEND910: &str = "ascend910";
    pub const ASCEND910B: &str = "ascend910b";
}

/// Exact identities that predate the prefix naming scheme.
const EXACT_ALIASES: &[(&str, &str)] = &[("Ascend910", families::ASCEND910)];

/// Model-string prefixes, checked in order. Each SoC name reported by the runtime
/// starts with exactly one of these.
const PREFIX_ALIASES: &[(&str, &str)] = &[
    ("Ascend310P", families::ASCEND310P),
    ("Ascend310B", families::ASCEND310B),
    ("Ascend910A", families::ASCEND910),
    ("Ascend910B", families::ASCEND910B),
    ("Ascend910C", families::ASCEND910B),
    ("Ascend910_93", families::ASCEND910B),
];

/// Returns the family a device identity belongs to, or `None` when it is unknown.
/// Unknown identities never fall back to a default family.
pub fn family_of(device: &str) -> Option<&'static str> {
    let device = device.trim();
    if let Some((_, family)) = EXACT_ALIASES.iter().find(|(name, _)| *name == device) {
        return Some(*family);
    }
    PREFIX_ALIASES
        .iter()
        .find(|(prefix, _)| device.starts_with(prefix))
        .map(|(_, family)| *family)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_models_map_to_one_family() {
        let cases = [
            ("Ascend310P1", families::ASCEND310P),
            ("Ascend310P3", families::ASCEND310P),
            ("Ascend310B1", families::ASCEND310B),
            ("Ascend910", families::ASCEND910),
            ("Ascend910A", families::ASCEND910),
            ("Ascend910B1", families::ASCEND910B),
            ("Ascend910B4", families::ASCEND910B),
            ("Ascend910_9391", families::ASCEND910B),
            ("Ascend910_9372", families::ASCEND910B),
            ("Ascend910C1", families::ASCEND910B),
        ];
        for (device, family) in cases {
            assert_eq!(family_of(device), Some(family), "device {device}");
        }
    }

    #[test]
    fn unknown_models_have_no_family() {
        for device in ["", "unrecognized", "Ascend", "Ascend310", "Ascend031", "A100"] {
            assert_eq!(family_of(device), None, "device {device}");
        }
    }

    #[test]
    fn prefixes_do_not_overlap() {
        for (i, (a, _)) in PREFIX_ALIASES.iter().enumerate() {
            for (b, _) in PREFIX_ALIASES.iter().skip(i + 1) {
                assert!(
                    !a.starts_with(b) && !b.starts_with(a),
                    "{a} and {b} overlap"
                );
            }
        }
    }
}
