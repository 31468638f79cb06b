//! `ValueMapper` contract (spec.md §3, §6).
//!
//! A trait object rather than a closure pair so descriptors stay
//! `Clone + Send + Sync` for process-wide sharing (spec.md §5: "the
//! schema registry is read-only after configuration completes").
//! Nulls pass through unmapped — enforced by the caller
//! (`PropertyDescriptor::map_from_driver`/`map_to_driver`), not by each
//! mapper impl, so mapper authors never have to special-case null.

use std::fmt;

use crate::value::AppValue;

pub trait ValueMapper: Send + Sync {
    fn sql_type(&self) -> &'static str;
    fn to_driver(&self, app_value: AppValue) -> AppValue;
    fn from_driver(&self, driver_value: AppValue) -> AppValue;
}

impl fmt::Debug for dyn ValueMapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueMapper({})", self.sql_type())
    }
}

/// `minutes-since-midnight ↔ {hour, minute}` (spec.md §3 example).
/// The driver representation is a plain integer column; the application
/// representation is a `{hour, minute}` JSON object.
#[derive(Debug, Default)]
pub struct MinutesSinceMidnightMapper;

impl ValueMapper for MinutesSinceMidnightMapper {
    fn sql_type(&self) -> &'static str {
        "integer"
    }

    fn to_driver(&self, app_value: AppValue) -> AppValue {
        match app_value {
            AppValue::Json(obj) => {
                let hour = obj.get("hour").and_then(|v| v.as_i64()).unwrap_or(0);
                let minute = obj.get("minute").and_then(|v| v.as_i64()).unwrap_or(0);
                AppValue::Int(hour * 60 + minute)
            }
            other => other,
        }
    }

    fn from_driver(&self, driver_value: AppValue) -> AppValue {
        match driver_value {
            AppValue::Int(total_minutes) => AppValue::Json(serde_json::json!({
                "hour": total_minutes / 60,
                "minute": total_minutes % 60,
            })),
            other => other,
        }
    }
}

/// `seconds-since-custom-epoch ↔ instant` (spec.md §3 example). `epoch_offset`
/// is the number of Unix seconds the custom epoch sits after 1970-01-01.
#[derive(Debug)]
pub struct CustomEpochInstantMapper {
    pub epoch_offset_seconds: i64,
}

impl ValueMapper for CustomEpochInstantMapper {
    fn sql_type(&self) -> &'static str {
        "bigint"
    }

    fn to_driver(&self, app_value: AppValue) -> AppValue {
        match app_value {
            AppValue::Int(unix_seconds) => AppValue::Int(unix_seconds - self.epoch_offset_seconds),
            other => other,
        }
    }

    fn from_driver(&self, driver_value: AppValue) -> AppValue {
        match driver_value {
            AppValue::Int(custom_seconds) => AppValue::Int(custom_seconds + self.epoch_offset_seconds),
            other => other,
        }
    }
}
