use std::env;
use std::sync::OnceLock;

static KDISPATCH_DEVICE: OnceLock<Option<String>> = OnceLock::new();
static KDISPATCH_STRICT_LOAD: OnceLock<bool> = OnceLock::new();

fn parse_bool(value: &str) -> bool {
    let normalized = value.trim().to_ascii_lowercase();
    matches!(normalized.as_str(), "1" | "true" | "yes" | "on")
}

/// Device identity that replaces the one reported by the runtime.
pub(crate) fn device_override() -> Option<&'static str> {
    KDISPATCH_DEVICE
        .get_or_init(|| match env::var("KDISPATCH_DEVICE") {
            Ok(value) if !value.trim().is_empty() => Some(value.trim().to_string()),
            _ => None,
        })
        .as_deref()
}

/// An unrecognized device family invalidates the loader instead of degrading it.
pub(crate) fn strict_load() -> bool {
    *KDISPATCH_STRICT_LOAD.get_or_init(|| match env::var("KDISPATCH_STRICT_LOAD") {
        Ok(value) if !value.trim().is_empty() => parse_bool(&value),
        _ => false,
    })
}
