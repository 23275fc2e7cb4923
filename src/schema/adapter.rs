//! Reading and writing batches of quantity samples

use crate::error::RollupError;
use crate::schema::sample::*;

/// Adapter for quantity sample batches in JSON and NDJSON form
pub struct SampleAdapter;

impl SampleAdapter {
    /// Parse a JSON string containing an array of samples
    pub fn parse_array(json: &str) -> Result<Vec<QuantitySample>, RollupError> {
        let samples: Vec<QuantitySample> = serde_json::from_str(json)?;
        Ok(samples)
    }

    /// Parse NDJSON (newline-delimited JSON) containing samples
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<QuantitySample>, RollupError> {
        let mut samples = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<QuantitySample>(trimmed) {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    return Err(RollupError::ParseError(format!(
                        "Failed to parse line {}: {}",
                        line_num + 1,
                        e
                    )));
                }
            }
        }
        Ok(samples)
    }

    /// Serialize samples as NDJSON, one sample per line
    pub fn to_ndjson(samples: &[QuantitySample]) -> Result<String, RollupError> {
        let mut out = String::new();
        for sample in samples {
            out.push_str(&serde_json::to_string(sample)?);
            out.push('\n');
        }
        Ok(out)
    }

    /// Validate a batch of samples, returning only the failures
    pub fn validate_samples(samples: &[QuantitySample]) -> Vec<ValidationResult> {
        samples
            .iter()
            .enumerate()
            .filter_map(|(idx, sample)| {
                sample.validate().err().map(|error| ValidationResult {
                    index: idx,
                    metric: sample.metric,
                    error,
                })
            })
            .collect()
    }
}

/// A sample that failed validation
#[derive(Debug)]
pub struct ValidationResult {
    pub index: usize,
    pub metric: crate::types::MetricKind,
    pub error: SampleValidationError,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MetricKind;

    const NDJSON: &str = r#"
{"metric":"step_count","value":812.0,"start":"2024-01-15T08:00:00Z","end":"2024-01-15T09:00:00Z"}

{"metric":"distance","value":0.6,"start":"2024-01-15T08:00:00Z","end":"2024-01-15T09:00:00Z"}
"#;

    #[test]
    fn test_parse_ndjson_skips_blank_lines() {
        let samples = SampleAdapter::parse_ndjson(NDJSON).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].metric, MetricKind::Distance);
    }

    #[test]
    fn test_parse_ndjson_reports_line() {
        let err = SampleAdapter::parse_ndjson("{\"metric\":\"steps\"}\n").unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_ndjson_roundtrip() {
        let samples = SampleAdapter::parse_ndjson(NDJSON).unwrap();
        let text = SampleAdapter::to_ndjson(&samples).unwrap();
        assert_eq!(SampleAdapter::parse_ndjson(&text).unwrap(), samples);
    }

    #[test]
    fn test_validate_samples() {
        let mut samples = SampleAdapter::parse_ndjson(NDJSON).unwrap();
        samples[0].value = f64::NAN;

        let failures = SampleAdapter::validate_samples(&samples);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 0);
        assert_eq!(failures[0].metric, MetricKind::StepCount);
    }

    #[test]
    fn test_parse_array() {
        let json = r#"[{"metric":"exercise_time","value":30,"start":"2024-01-15T08:00:00Z","end":"2024-01-15T09:00:00Z"}]"#;
        let samples = SampleAdapter::parse_array(json).unwrap();
        assert_eq!(samples[0].value, 30.0);
    }
}
