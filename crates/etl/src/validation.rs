//! 样本校验

use crate::types::{RawSample, Sample, FEATURE_NAMES, N_FEATURES};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use std::fmt;

/// 样本被拒绝的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// 特征字段缺失或不是有限数
    Feature(&'static str),
    /// AQI 标签缺失或不是有限数
    Label,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Feature(name) => write!(f, "feature {}", name),
            Rejection::Label => write!(f, "label usaqi"),
        }
    }
}

/// 校验统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub accepted: usize,
    pub rejected: usize,
}

/// 样本校验器
///
/// 只保留所有特征与标签都能解析为有限数的样本，顺序不变。
/// 被拒绝的样本以 warn 级别记录，不视为错误。
/// `todate` 不参与筛选：无法识别时记为 `None`。
pub struct SampleValidator;

impl SampleValidator {
    pub fn validate(raw: &[RawSample]) -> (Vec<Sample>, ValidationReport) {
        let mut report = ValidationReport::default();

        let samples: Vec<Sample> = raw
            .iter()
            .filter_map(|sample| match Self::validate_one(sample) {
                Ok(valid) => {
                    report.accepted += 1;
                    Some(valid)
                }
                Err(reason) => {
                    report.rejected += 1;
                    tracing::warn!(
                        "Invalid sample ({}): {}",
                        reason,
                        serde_json::to_string(sample).unwrap_or_default()
                    );
                    None
                }
            })
            .collect();

        tracing::info!(
            "Valid samples: {} (rejected {})",
            report.accepted,
            report.rejected
        );

        (samples, report)
    }

    pub fn validate_one(raw: &RawSample) -> Result<Sample, Rejection> {
        let mut features = [0.0; N_FEATURES];
        for ((slot, field), name) in features
            .iter_mut()
            .zip(raw.feature_fields())
            .zip(FEATURE_NAMES)
        {
            *slot = Self::parse_number(field).ok_or(Rejection::Feature(name))?;
        }

        let usaqi = Self::parse_number(raw.usaqi.as_ref()).ok_or(Rejection::Label)?;

        let timestamp = match &raw.todate {
            None | Some(Value::Null) => None,
            Some(value) => {
                let parsed = Self::parse_timestamp(value);
                if parsed.is_none() {
                    tracing::warn!("Unrecognized todate {}, sample kept without timestamp", value);
                }
                parsed
            }
        };

        Ok(Sample {
            timestamp,
            features,
            usaqi,
        })
    }

    /// 数字原样接受；字符串去除首尾空白后严格解析；结果必须有限
    pub fn parse_number(value: Option<&Value>) -> Option<f64> {
        let number = match value? {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => s.trim().parse::<f64>().ok()?,
            _ => return None,
        };

        number.is_finite().then_some(number)
    }

    /// 支持毫秒时间戳、RFC 3339 / RFC 2822（转换为 UTC）、
    /// `YYYY-MM-DD HH:MM[:SS]`（空格或 `T` 分隔）与纯日期
    pub fn parse_timestamp(value: &Value) -> Option<NaiveDateTime> {
        let text = match value {
            Value::Number(n) => {
                let millis = n.as_i64().or_else(|| n.as_f64().map(|x| x as i64))?;
                return DateTime::<Utc>::from_timestamp_millis(millis).map(|dt| dt.naive_utc());
            }
            Value::String(s) => s.trim(),
            _ => return None,
        };

        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Some(dt.naive_utc());
        }
        if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
            return Some(dt.naive_utc());
        }

        for format in [
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M",
            "%Y-%m-%dT%H:%M",
        ] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
                return Some(dt);
            }
        }

        NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TIMESTAMP_FORMAT;
    use serde_json::json;

    fn raw(value: Value) -> RawSample {
        serde_json::from_value(value).unwrap()
    }

    fn good(aqi: f64) -> Value {
        json!({
            "co2_ppm": "415.2", "co_ppb": 310, "r_humidity": "55.1", "pm2_5": 12.5,
            "pm10": "20", "pm1": 7.75, "pm100": "31.0", "temperature": "21.4",
            "usaqi": aqi, "todate": "2024-04-30T10:00:00.000Z"
        })
    }

    #[test]
    fn test_accepts_numbers_and_numeric_strings() {
        let sample = SampleValidator::validate_one(&raw(good(48.0))).unwrap();

        assert_eq!(sample.features, [415.2, 310.0, 55.1, 12.5, 20.0, 7.75, 31.0, 21.4]);
        assert_eq!(sample.usaqi, 48.0);
        assert_eq!(
            sample.timestamp.unwrap().format("%Y-%m-%d %H:%M").to_string(),
            "2024-04-30 10:00"
        );
    }

    #[test]
    fn test_rejects_non_numeric_feature_and_keeps_order() {
        let mut bad = good(50.0);
        bad["pm2_5"] = json!("abc");

        let input = vec![raw(good(1.0)), raw(bad), raw(good(2.0)), raw(good(3.0))];
        let (samples, report) = SampleValidator::validate(&input);

        assert_eq!(report, ValidationReport { accepted: 3, rejected: 1 });
        let labels: Vec<f64> = samples.iter().map(|s| s.usaqi).collect();
        assert_eq!(labels, vec![1.0, 2.0, 3.0]);
        assert!(samples
            .iter()
            .all(|s| s.features.iter().all(|x| x.is_finite())));
    }

    #[test]
    fn test_rejection_reasons() {
        let mut missing = good(10.0);
        missing.as_object_mut().unwrap().remove("temperature");
        assert_eq!(
            SampleValidator::validate_one(&raw(missing)),
            Err(Rejection::Feature("temperature"))
        );

        let mut infinite = good(10.0);
        infinite["co2_ppm"] = json!("inf");
        assert_eq!(
            SampleValidator::validate_one(&raw(infinite)),
            Err(Rejection::Feature("co2_ppm"))
        );

        let mut nan_label = good(10.0);
        nan_label["usaqi"] = json!("NaN");
        assert_eq!(
            SampleValidator::validate_one(&raw(nan_label)),
            Err(Rejection::Label)
        );
    }

    #[test]
    fn test_todate_never_rejects_a_sample() {
        let cases = [
            (json!("2024-04-30 10:00"), Some("2024-04-30 10:00:00")),
            (json!(1714471200000_i64), Some("2024-04-30 10:00:00")),
            (json!("Tue, 30 Apr 2024 10:00:00 GMT"), Some("2024-04-30 10:00:00")),
            (json!("2024-04-30T10:00:00"), Some("2024-04-30 10:00:00")),
            (json!("yesterday"), None),
            (json!({"$date": "2024-04-30"}), None),
        ];

        for (todate, expected) in cases {
            let mut value = good(400.0);
            value["todate"] = todate.clone();
            let sample = SampleValidator::validate_one(&raw(value))
                .unwrap_or_else(|r| panic!("todate {} rejected: {}", todate, r));

            assert_eq!(sample.usaqi, 400.0);
            assert_eq!(
                sample.timestamp.map(|t| t.format(TIMESTAMP_FORMAT).to_string()),
                expected.map(str::to_string),
                "todate {}",
                todate
            );
        }
    }

    #[test]
    fn test_trailing_garbage_is_rejected() {
        assert_eq!(SampleValidator::parse_number(Some(&json!("12abc"))), None);
        assert_eq!(SampleValidator::parse_number(Some(&json!(" 12.5 "))), Some(12.5));
        assert_eq!(SampleValidator::parse_number(Some(&json!(true))), None);
        assert_eq!(SampleValidator::parse_number(None), None);
    }

    #[test]
    fn test_missing_timestamp_is_allowed() {
        let mut value = good(10.0);
        value.as_object_mut().unwrap().remove("todate");
        let sample = SampleValidator::validate_one(&raw(value)).unwrap();
        assert!(sample.timestamp.is_none());
    }
}
