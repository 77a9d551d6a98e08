//! The declarative field table itself, kept separate from the prompt/validate
//! logic in `mod.rs` so the table can be read at a glance.

use std::sync::LazyLock;

use super::normalize;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequirementLevel {
    RequiredNwb,
    RequiredDandi,
    Recommended,
    Optional,
}

#[derive(Clone, Copy, Debug)]
pub struct FieldSpec {
    pub name: &'static str,
    pub requirement: RequirementLevel,
    pub description: &'static str,
    pub normalize: fn(&str) -> String,
    pub hints: &'static [&'static str],
}

static REGISTRY: LazyLock<Vec<FieldSpec>> = LazyLock::new(|| {
    vec![
        FieldSpec {
            name: "experimenter",
            requirement: RequirementLevel::RequiredDandi,
            description: "Name of the person who ran the experiment",
            normalize: normalize::experimenter,
            hints: &["Dr.", "performed by", "experimenter"],
        },
        FieldSpec {
            name: "institution",
            requirement: RequirementLevel::RequiredDandi,
            description: "Institution where the experiment was performed",
            normalize: normalize::institution,
            hints: &["at", "university", "institute"],
        },
        FieldSpec {
            name: "species",
            requirement: RequirementLevel::RequiredDandi,
            description: "Binomial species name of the subject",
            normalize: normalize::species,
            hints: &["mouse", "rat", "species"],
        },
        FieldSpec {
            name: "sex",
            requirement: RequirementLevel::RequiredDandi,
            description: "Subject sex: M, F, U (unknown), or O (other)",
            normalize: normalize::sex,
            hints: &["male", "female", "sex"],
        },
        FieldSpec {
            name: "age",
            requirement: RequirementLevel::RequiredDandi,
            description: "Subject age as an ISO-8601 duration",
            normalize: normalize::age,
            hints: &["P60", "postnatal day", "weeks old"],
        },
        FieldSpec {
            name: "subject_id",
            requirement: RequirementLevel::RequiredDandi,
            description: "Identifier for the experimental subject",
            normalize: normalize::identity,
            hints: &["subject", "animal id", "mouse"],
        },
        FieldSpec {
            name: "session_description",
            requirement: RequirementLevel::RequiredNwb,
            description: "Short free-text description of the recording session",
            normalize: normalize::identity,
            hints: &["recording", "session"],
        },
        FieldSpec {
            name: "identifier",
            requirement: RequirementLevel::RequiredNwb,
            description: "Unique identifier for this NWB file",
            normalize: normalize::identity,
            hints: &[],
        },
        FieldSpec {
            name: "session_start_time",
            requirement: RequirementLevel::RequiredNwb,
            description: "ISO-8601 timestamp the recording session started",
            normalize: normalize::identity,
            hints: &[],
        },
        FieldSpec {
            name: "lab",
            requirement: RequirementLevel::Recommended,
            description: "Name of the lab the experiment was performed in",
            normalize: normalize::identity,
            hints: &["lab", "laboratory"],
        },
        FieldSpec {
            name: "related_publications",
            requirement: RequirementLevel::Optional,
            description: "DOIs of publications associated with this dataset",
            normalize: normalize::identity,
            hints: &["doi", "paper", "publication"],
        },
    ]
});

pub fn registry() -> &'static [FieldSpec] {
    &REGISTRY
}
