//! Clinical feature types for cancer risk prediction.
//!
//! Spellings match the values the risk model was trained on and the CHECK
//! constraints of the `predictions` table.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

macro_rules! clinical_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident => $text:literal),+ $(,)? }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(
                #[serde(rename = $text)]
                $variant,
            )+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Stored / model-facing spelling.
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }

            #[must_use]
            pub fn parse(s: &str) -> Option<Self> {
                match s {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

clinical_enum! {
    /// TNM-style overall stage.
    CancerStage {
        I => "I",
        II => "II",
        III => "III",
        IV => "IV",
    }
}

clinical_enum! {
    TumorType {
        Lung => "Lung",
        Stomach => "Stomach",
        Cervical => "Cervical",
        Liver => "Liver",
        Colorectal => "Colorectal",
        Breast => "Breast",
    }
}

clinical_enum! {
    Metastasis {
        Yes => "Yes",
        No => "No",
    }
}

clinical_enum! {
    TreatmentType {
        Radiation => "Radiation",
        Chemotherapy => "Chemotherapy",
        Surgery => "Surgery",
        TargetedTherapy => "Targeted Therapy",
        Immunotherapy => "Immunotherapy",
    }
}

clinical_enum! {
    /// Comorbidity combination as recorded on the intake form.
    Comorbidities {
        None => "No Comorbidities",
        DiabetesHepatitisB => "Diabetes, Hepatitis B",
        HepatitisB => "Hepatitis B",
        Hypertension => "Hypertension",
        DiabetesHypertension => "Diabetes, Hypertension",
        HypertensionHepatitisB => "Hypertension, Hepatitis B",
    }
}

/// Tumor size bounds accepted on the prediction form, in cm.
pub const TUMOR_SIZE_RANGE_CM: (f64, f64) = (0.1, 20.0);

/// Upper bound for a plausible age in years.
pub const MAX_AGE_YEARS: u32 = 130;

/// Clinician-entered assessment inputs. Age is derived from the patient's
/// date of birth at submission time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalInput {
    pub cancer_stage: CancerStage,
    /// Tumor size in cm
    pub tumor_size: f64,
    pub tumor_type: TumorType,
    pub metastasis: Metastasis,
    pub treatment_type: TreatmentType,
    pub comorbidities: Comorbidities,
}

impl ClinicalInput {
    /// Attach the derived age, producing the full model feature set.
    #[must_use]
    pub fn with_age(self, age: u32) -> ClinicalFeatures {
        ClinicalFeatures {
            age,
            cancer_stage: self.cancer_stage,
            tumor_size: self.tumor_size,
            tumor_type: self.tumor_type,
            metastasis: self.metastasis,
            treatment_type: self.treatment_type,
            comorbidities: self.comorbidities,
        }
    }
}

/// The complete single-row feature set handed to the risk scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClinicalFeatures {
    /// Age in whole years at assessment time
    pub age: u32,
    pub cancer_stage: CancerStage,
    pub tumor_size: f64,
    pub tumor_type: TumorType,
    pub metastasis: Metastasis,
    pub treatment_type: TreatmentType,
    pub comorbidities: Comorbidities,
}

impl ClinicalFeatures {
    /// Validate that numeric features are within expected ranges.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.age > MAX_AGE_YEARS {
            errors.push(format!("Age {} out of range [0, {MAX_AGE_YEARS}]", self.age));
        }
        let (min, max) = TUMOR_SIZE_RANGE_CM;
        if !self.tumor_size.is_finite() || !(min..=max).contains(&self.tumor_size) {
            errors.push(format!(
                "Tumor size {} out of range [{min}, {max}] cm",
                self.tumor_size
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Whole years between `dob` and `today`, counting a birthday only once it
/// has been reached. Returns `None` for a date of birth in the future.
#[must_use]
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> Option<u32> {
    if dob > today {
        return None;
    }
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    u32::try_from(years).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> ClinicalInput {
        ClinicalInput {
            cancer_stage: CancerStage::II,
            tumor_size: 5.0,
            tumor_type: TumorType::Breast,
            metastasis: Metastasis::No,
            treatment_type: TreatmentType::Surgery,
            comorbidities: Comorbidities::None,
        }
    }

    #[test]
    fn test_enum_spellings() {
        assert_eq!(TreatmentType::TargetedTherapy.as_str(), "Targeted Therapy");
        assert_eq!(
            Comorbidities::parse("Hypertension, Hepatitis B"),
            Some(Comorbidities::HypertensionHepatitisB)
        );
        assert_eq!(Comorbidities::ALL.len(), 6);
        assert_eq!(TumorType::ALL.len(), 6);
        assert_eq!(CancerStage::parse("V"), None);
    }

    #[test]
    fn test_serde_uses_model_spelling() {
        let json = serde_json::to_string(&Comorbidities::DiabetesHypertension).expect("serialize");
        assert_eq!(json, "\"Diabetes, Hypertension\"");
    }

    #[test]
    fn test_age_counts_birthday() {
        let dob = NaiveDate::from_ymd_opt(1980, 6, 15).expect("date");
        let before = NaiveDate::from_ymd_opt(2025, 6, 14).expect("date");
        let on = NaiveDate::from_ymd_opt(2025, 6, 15).expect("date");
        assert_eq!(age_on(dob, before), Some(44));
        assert_eq!(age_on(dob, on), Some(45));
        assert_eq!(age_on(on, dob), None);
    }

    #[test]
    fn test_validation() {
        assert!(input().with_age(45).validate().is_ok());

        let mut too_big = input();
        too_big.tumor_size = 25.0;
        assert!(too_big.with_age(45).validate().is_err());

        let mut nan = input();
        nan.tumor_size = f64::NAN;
        assert!(nan.with_age(45).validate().is_err());

        assert!(input().with_age(200).validate().is_err());
    }
}
