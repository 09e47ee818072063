//! fastp JSON report.

use std::path::Path;
use crate::{
    ext,
    err::Error,
    pipeline::metrics::Percent,
};

/// Values from the `summary` section of the fastp report. Read counts include both mates.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastpReport {
    pub reads_before: u64,
    pub reads_after: u64,
    pub q30_after: Option<Percent>,
}

impl FastpReport {
    pub fn from_json(obj: &json::JsonValue) -> Result<Self, Error> {
        let summary = &obj["summary"];
        let reads = |section: &str| summary[section]["total_reads"].as_u64()
            .ok_or_else(|| Error::ParsingError(format!("fastp report has no summary.{}.total_reads", section)));
        Ok(Self {
            reads_before: reads("before_filtering")?,
            reads_after: reads("after_filtering")?,
            q30_after: summary["after_filtering"]["q30_rate"].as_f64()
                .filter(|rate| (0.0..=1.0).contains(rate))
                .map(|rate| Percent::from_hundredths((rate * 10_000.0).round() as u64)),
        })
    }

    pub fn load(path: &Path) -> Result<Self, Error> {
        Self::from_json(&ext::sys::load_json(path)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary() {
        let obj = json::parse(r#"{
            "summary": {
                "fastp_version": "0.23.4",
                "before_filtering": {"total_reads": 2000, "total_bases": 300000, "q30_rate": 0.91},
                "after_filtering": {"total_reads": 1900, "total_bases": 270000, "q30_rate": 0.93456}
            },
            "filtering_result": {"passed_filter_reads": 1900}
        }"#).unwrap();
        let report = FastpReport::from_json(&obj).unwrap();
        assert_eq!(report.reads_before, 2000);
        assert_eq!(report.reads_after, 1900);
        assert_eq!(report.q30_after.unwrap().to_string(), "93.46%");
        assert!(FastpReport::from_json(&json::parse("{\"summary\": {}}").unwrap()).is_err());
    }
}
