//! Small shared helpers for turning a module's [`ConfigMap`] into the
//! handful of knobs both demo factories recognise, and for rejecting
//! anything else as a construction-time `ConfigError` (component C's
//! "unknown configuration keys fail construction" rule).

use std::time::Duration;

use frappy_core::{ConfigMap, PropertyBag, SecopError, SecopResult};

/// Everything a factory pulls out of a module's config slice before
/// building its `ClassLevel`/`Module`. `recognised_param_defaults`
/// lists the `<param>.default` keys a concrete factory understands;
/// any other key (besides the fixed set handled here) is rejected.
pub struct CommonConfig {
    pub pollinterval: Duration,
    pub slowinterval_multiple: u32,
    pub description: Option<String>,
    pub properties: PropertyBag,
}

/// Parse the config keys every module factory accepts regardless of its
/// own parameter set (`class` is consumed by the caller's factory
/// lookup, not here). Returns the keys it did *not* recognise so the
/// caller can check its own `<param>.default` set against them and
/// reject whatever's left over.
pub fn parse_common(config: &ConfigMap) -> SecopResult<(CommonConfig, Vec<String>)> {
    let mut pollinterval = Duration::from_secs(1);
    let mut slowinterval_multiple = 4;
    let mut description = None;
    let mut properties = PropertyBag::new();
    let mut leftover = Vec::new();

    for (key, value) in config {
        if key == "class" {
            continue;
        } else if key == "description" {
            description = value.as_str().map(str::to_string);
        } else if key == "pollinterval" {
            let secs = value.as_f64().ok_or_else(|| {
                SecopError::ConfigError(format!("'pollinterval' must be numeric, got {value:?}"))
            })?;
            pollinterval = Duration::from_secs_f64(secs.max(0.01));
        } else if key == "slowinterval_multiple" {
            let n = value.as_i64().ok_or_else(|| {
                SecopError::ConfigError(format!("'slowinterval_multiple' must be an integer, got {value:?}"))
            })?;
            slowinterval_multiple = u32::try_from(n).unwrap_or(1);
        } else if let Some(prop_key) = key.strip_prefix("properties.") {
            let s = value
                .as_str()
                .ok_or_else(|| SecopError::ConfigError(format!("property '{prop_key}' must be a string")))?;
            properties.set(prop_key, s);
        } else {
            leftover.push(key.clone());
        }
    }

    Ok((
        CommonConfig {
            pollinterval,
            slowinterval_multiple,
            description,
            properties,
        },
        leftover,
    ))
}
