use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use serde::{Deserialize, Deserializer, Serialize};

/// Export timestamp as written into model files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl ExportDate {
    /// The current local time.
    pub fn now() -> Self {
        ExportDate::from_datetime(&Local::now())
    }

    pub fn from_datetime<Tz: TimeZone>(at: &DateTime<Tz>) -> Self {
        ExportDate {
            year: at.year(),
            month: at.month(),
            day: at.day(),
            hour: at.hour(),
            minute: at.minute(),
            second: at.second(),
        }
    }
}

/// Annotations stored beside the weights.
///
/// Gear fields are often `null` in files written by other tools; those read
/// back as empty strings. Test metrics are only present once training has
/// measured them against a held-out pair.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub gear_make: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub gear_model: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<ExportDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_test_mse: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_test_rmse: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss_test_esr: Option<f32>,
}

impl ModelMetadata {
    pub fn has_test_metrics(&self) -> bool {
        self.loss_test_mse.is_some() || self.loss_test_rmse.is_some() || self.loss_test_esr.is_some()
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn date_fields_come_from_the_timestamp() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 17, 4, 59).unwrap();
        let date = ExportDate::from_datetime(&at);
        assert_eq!(
            date,
            ExportDate { year: 2024, month: 3, day: 9, hour: 17, minute: 4, second: 59 }
        );
    }

    #[test]
    fn absent_metrics_are_omitted() {
        let json = serde_json::to_value(ModelMetadata::default()).unwrap();
        let object = json.as_object().unwrap();
        assert!(object.contains_key("gear_make"));
        assert!(!object.contains_key("loss_test_esr"));
        assert!(!object.contains_key("date"));
    }

    #[test]
    fn null_gear_fields_read_as_empty() {
        let json = r#"{"name": "Plexi", "gear_make": null, "gear_model": null, "comment": null}"#;
        let metadata: ModelMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.name, "Plexi");
        assert_eq!(metadata.gear_make, "");
        assert!(!metadata.has_test_metrics());
    }
}
