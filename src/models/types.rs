//! Linguistic types, controlled vocabularies and the flat attribute
//! records carried by an annotation document.

use serde::{Deserialize, Serialize};

/// Structural constraint stereotype of a linguistic type.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stereotype {
    /// Child annotations subdivide the parent's time interval.
    TimeSubdivision,
    /// Child annotations subdivide the parent symbolically, no time.
    SymbolicSubdivision,
    /// One-to-one symbolic association with the parent annotation.
    SymbolicAssociation,
    /// Child annotations lie within the parent's interval, with gaps.
    IncludedIn,
}

impl Stereotype {
    /// Canonical on-disk name of the stereotype.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stereotype::TimeSubdivision => "Time_Subdivision",
            Stereotype::SymbolicSubdivision => "Symbolic_Subdivision",
            Stereotype::SymbolicAssociation => "Symbolic_Association",
            Stereotype::IncludedIn => "Included_In",
        }
    }

    /// Parse an on-disk stereotype name.
    pub fn from_str(s: &str) -> Option<Stereotype> {
        match s {
            "Time_Subdivision" => Some(Stereotype::TimeSubdivision),
            "Symbolic_Subdivision" => Some(Stereotype::SymbolicSubdivision),
            "Symbolic_Association" => Some(Stereotype::SymbolicAssociation),
            "Included_In" => Some(Stereotype::IncludedIn),
            _ => None,
        }
    }
}

/// A reusable annotation-behavior profile shared by tiers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LinguisticType {
    /// Type identifier.
    pub id: String,
    /// Whether tiers of this type hold time-aligned annotations.
    pub time_alignable: bool,
    /// Structural constraint, if any.
    pub constraints: Option<Stereotype>,
    /// Controlled vocabulary restricting annotation values, if any.
    pub controlled_vocabulary: Option<String>,
    /// Whether annotations of this type may carry graphic references.
    pub graphic_references: bool,
    /// Associated lexicon service reference, if any.
    pub lexicon_ref: Option<String>,
}

impl LinguisticType {
    /// A plain time-alignable type with no constraint.
    pub fn alignable(id: &str) -> Self {
        Self {
            id: id.to_string(),
            time_alignable: true,
            constraints: None,
            controlled_vocabulary: None,
            graphic_references: false,
            lexicon_ref: None,
        }
    }
}

/// One value of a controlled-vocabulary entry, in one language.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CvEntryValue {
    /// The permitted annotation value.
    pub value: String,
    /// Language of this value.
    pub language: String,
    /// Human-readable description, if any.
    pub description: Option<String>,
}

/// An entry of a controlled vocabulary, possibly multilingual.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CvEntry {
    /// Entry identifier, `cveid<N>` style in multilingual documents.
    pub id: String,
    /// Per-language values; at least one.
    pub values: Vec<CvEntryValue>,
    /// Optional external reference.
    pub ext_ref: Option<String>,
}

/// Per-language description of a controlled vocabulary.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CvDescription {
    /// Language reference.
    pub language: String,
    /// Description text, possibly empty.
    pub description: String,
}

/// A closed, reusable set of permitted annotation values.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ControlledVocabulary {
    /// Vocabulary identifier.
    pub id: String,
    /// Per-language descriptions, in insertion order.
    pub descriptions: Vec<CvDescription>,
    /// Entries, in insertion order.
    pub entries: Vec<CvEntry>,
    /// Optional external reference.
    pub ext_ref: Option<String>,
}

/// A locale record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Locale {
    pub language_code: String,
    pub country_code: Option<String>,
    pub variant: Option<String>,
}

/// A content language record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Language {
    pub id: String,
    pub definition: Option<String>,
    pub label: Option<String>,
}

/// A constraint record mirroring one stereotype, kept for round-tripping
/// the document's constraint section.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Constraint {
    pub stereotype: String,
    pub description: Option<String>,
}

/// A license entry on the document root.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct License {
    pub url: Option<String>,
    pub text: String,
}

/// A header property (name/value, name optional on disk).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Property {
    pub name: Option<String>,
    pub value: String,
}

/// A linked media file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct MediaDescriptor {
    pub media_url: String,
    pub mime_type: String,
    pub time_origin: Option<i64>,
    pub relative_media_url: Option<String>,
    pub extracted_from: Option<String>,
}

/// A linked non-media file.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LinkedFileDescriptor {
    pub link_url: String,
    pub mime_type: String,
    pub time_origin: Option<i64>,
    pub relative_link_url: Option<String>,
    pub associated_with: Option<String>,
}

/// A lexicon service reference.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct LexiconRef {
    pub id: String,
    pub name: String,
    pub service_type: String,
    pub url: String,
    pub lexicon_id: String,
    pub lexicon_name: String,
    pub datcat_id: Option<String>,
    pub datcat_name: Option<String>,
}

/// An external reference (ISO data category, resource URL, ...).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ExternalRef {
    pub id: String,
    pub ref_type: String,
    pub value: String,
}
