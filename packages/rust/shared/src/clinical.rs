//! Blood-pressure extraction policy.
//!
//! Prompts that mention blood pressure get a stricter system instruction and
//! their output is canonicalized to `血压{systolic}/{diastolic}mmHg`. The
//! marker list lives here so the provider and the sanitizer agree on it.

/// Case-insensitive prompt markers that switch on blood-pressure handling.
pub const BLOOD_PRESSURE_MARKERS: &[&str] = &[
    "血压",
    "收缩压",
    "舒张压",
    "blood pressure",
    "systolic",
    "diastolic",
];

/// Whether `prompt` asks for a blood-pressure value.
pub fn mentions_blood_pressure(prompt: &str) -> bool {
    let lowered = prompt.to_lowercase();
    BLOOD_PRESSURE_MARKERS.iter().any(|m| lowered.contains(m))
}

/// Canonical cell value for a `systolic/diastolic` reading.
pub fn canonical_blood_pressure(reading: &str) -> String {
    format!("血压{reading}mmHg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chinese_and_english_markers() {
        assert!(mentions_blood_pressure("请提取患者的血压"));
        assert!(mentions_blood_pressure("Extract the SYSTOLIC value"));
        assert!(mentions_blood_pressure("Blood Pressure reading"));
        assert!(!mentions_blood_pressure("Summarize the visit"));
    }

    #[test]
    fn canonical_format() {
        assert_eq!(canonical_blood_pressure("128/82"), "血压128/82mmHg");
    }
}
