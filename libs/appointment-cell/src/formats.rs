// libs/appointment-cell/src/formats.rs
//
// The front desk sends dates as DD/MM/YYYY (sometimes ISO) and times as HH:MM.
// Everything is parsed into chrono types at the boundary; raw strings are never compared.

use chrono::{NaiveDate, NaiveTime, Timelike};

pub const DISPLAY_DATE_FORMAT: &str = "%d/%m/%Y";
pub const ISO_DATE_FORMAT: &str = "%Y-%m-%d";
pub const DISPLAY_TIME_FORMAT: &str = "%H:%M";

const DATE_INPUT_FORMATS: [&str; 2] = [DISPLAY_DATE_FORMAT, ISO_DATE_FORMAT];
const TIME_INPUT_FORMATS: [&str; 2] = [DISPLAY_TIME_FORMAT, "%H:%M:%S"];

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

/// Parses a time of day and truncates it to the minute.
pub fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    TIME_INPUT_FORMATS
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(raw, format).ok())
        .map(truncate_to_minute)
}

pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    time.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(time)
}

pub fn format_time(time: NaiveTime) -> String {
    time.format(DISPLAY_TIME_FORMAT).to_string()
}

pub mod clinic_date {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&date.format(super::DISPLAY_DATE_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_date(&raw).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid date '{}', expected DD/MM/YYYY or YYYY-MM-DD",
                raw
            ))
        })
    }
}

pub mod clinic_date_opt {
    use chrono::NaiveDate;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(date: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error> {
        match date {
            Some(date) => super::clinic_date::serialize(date, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveDate>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_date(&raw).map(Some).ok_or_else(|| {
                de::Error::custom(format!(
                    "invalid date '{}', expected DD/MM/YYYY or YYYY-MM-DD",
                    raw
                ))
            }),
        }
    }
}

pub mod clinic_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format(super::DISPLAY_TIME_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw)))
    }
}

pub mod clinic_time_opt {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
        match time {
            Some(time) => super::clinic_time::serialize(time, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<NaiveTime>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            None => Ok(None),
            Some(raw) if raw.trim().is_empty() => Ok(None),
            Some(raw) => super::parse_time(&raw)
                .map(Some)
                .ok_or_else(|| de::Error::custom(format!("invalid time '{}', expected HH:MM", raw))),
        }
    }
}
