//! Annotation-document parser.
//!
//! Streaming element-by-element decode over a roxmltree tree. Optional
//! attributes default to absent; elements may appear in any order except
//! that tier order of first appearance defines the serialization ordinal.
//! Malformed markup fails with a `FormatError` and no partial model.

use roxmltree::{Document as XmlDocument, Node};

use crate::error::{Error, Result};
use crate::models::tier::{AlignedAnnotation, RefAnnotation, Tier, TierAnnotations, TimeSlot};
use crate::models::types::{
    Constraint, ControlledVocabulary, CvDescription, CvEntry, CvEntryValue, ExternalRef, Language,
    LexiconRef, License, LinguisticType, LinkedFileDescriptor, Locale, MediaDescriptor, Property,
    Stereotype,
};
use crate::models::AnnotationDocument;

/// Document versions this codec knows about.
const KNOWN_VERSIONS: &[&str] = &["2.7", "2.8", "3.0"];

/// Parse options.
#[derive(Clone, Copy, Debug, Default)]
pub struct ParseOptions {
    /// Fail on an unrecognized document version instead of warning.
    pub strict: bool,
}

/// Parse an annotation document with default (lenient) options.
pub fn parse(input: &str) -> Result<AnnotationDocument> {
    parse_with(input, ParseOptions::default())
}

/// Parse an annotation document.
pub fn parse_with(input: &str, options: ParseOptions) -> Result<AnnotationDocument> {
    let xml = XmlDocument::parse(input)
        .map_err(|e| Error::FormatError(format!("unparsable markup: {}", e)))?;
    let root = xml.root_element();
    if root.tag_name().name() != "ANNOTATION_DOCUMENT" {
        return Err(Error::FormatError(format!(
            "expected ANNOTATION_DOCUMENT root, found <{}>",
            root.tag_name().name()
        )));
    }

    let mut doc = AnnotationDocument::bare();
    doc.author = root.attribute("AUTHOR").unwrap_or("").to_string();
    doc.date = root.attribute("DATE").unwrap_or("").to_string();
    doc.version = root.attribute("VERSION").unwrap_or("").to_string();
    doc.format = root
        .attribute("FORMAT")
        .map(str::to_string)
        .unwrap_or_else(|| doc.version.clone());
    if !KNOWN_VERSIONS.contains(&doc.version.as_str()) {
        if options.strict {
            return Err(Error::FormatError(format!(
                "unsupported document version '{}'",
                doc.version
            )));
        }
        log::warn!("unrecognized document version '{}', parsing anyway", doc.version);
    }

    // Non-tier sections first, so tier parsing can consult the linguistic
    // types regardless of element order in the file.
    for node in root.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "LICENSE" => doc.licenses.push(License {
                url: node.attribute("LICENSE_URL").map(str::to_string),
                text: node.text().unwrap_or("").to_string(),
            }),
            "HEADER" => parse_header(&node, &mut doc)?,
            "TIME_ORDER" => parse_time_order(&node, &mut doc)?,
            "LINGUISTIC_TYPE" => doc.linguistic_types.push(parse_linguistic_type(&node)?),
            "LOCALE" => doc.locales.push(Locale {
                language_code: required_attr(&node, "LANGUAGE_CODE")?,
                country_code: node.attribute("COUNTRY_CODE").map(str::to_string),
                variant: node.attribute("VARIANT").map(str::to_string),
            }),
            "LANGUAGE" => doc.languages.push(Language {
                id: required_attr(&node, "LANG_ID")?,
                definition: node.attribute("LANG_DEF").map(str::to_string),
                label: node.attribute("LANG_LABEL").map(str::to_string),
            }),
            "CONSTRAINT" => doc.constraints.push(Constraint {
                stereotype: required_attr(&node, "STEREOTYPE")?,
                description: node.attribute("DESCRIPTION").map(str::to_string),
            }),
            "CONTROLLED_VOCABULARY" => {
                let cv = parse_controlled_vocabulary(&node)?;
                doc.controlled_vocabularies.push(cv);
            }
            "LEXICON_REF" => doc.lexicon_refs.push(LexiconRef {
                id: required_attr(&node, "LEX_REF_ID")?,
                name: required_attr(&node, "NAME")?,
                service_type: required_attr(&node, "TYPE")?,
                url: required_attr(&node, "URL")?,
                lexicon_id: required_attr(&node, "LEXICON_ID")?,
                lexicon_name: required_attr(&node, "LEXICON_NAME")?,
                datcat_id: node.attribute("DATCAT_ID").map(str::to_string),
                datcat_name: node.attribute("DATCAT_NAME").map(str::to_string),
            }),
            "EXTERNAL_REF" => doc.external_refs.push(ExternalRef {
                id: required_attr(&node, "EXT_REF_ID")?,
                ref_type: required_attr(&node, "TYPE")?,
                value: required_attr(&node, "VALUE")?,
            }),
            "TIER" => {} // second pass
            other => log::debug!("ignoring unknown element <{}>", other),
        }
    }

    for (ordinal, node) in root
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "TIER")
        .enumerate()
    {
        let tier = parse_tier(&node, ordinal, &doc)?;
        doc.tiers.push(tier);
    }

    // Every timeslot reference must resolve.
    for tier in &doc.tiers {
        if let TierAnnotations::Aligned(anns) = &tier.annotations {
            for ann in anns {
                for slot in [&ann.start_slot, &ann.end_slot] {
                    if doc.time_slot(slot).is_none() {
                        return Err(Error::FormatError(format!(
                            "annotation '{}' references missing timeslot '{}'",
                            ann.id, slot
                        )));
                    }
                }
            }
        }
    }

    doc.rebuild_index();
    Ok(doc)
}

fn required_attr(node: &Node, name: &str) -> Result<String> {
    node.attribute(name).map(str::to_string).ok_or_else(|| {
        Error::FormatError(format!(
            "<{}> is missing required attribute {}",
            node.tag_name().name(),
            name
        ))
    })
}

fn parse_header(node: &Node, doc: &mut AnnotationDocument) -> Result<()> {
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "MEDIA_DESCRIPTOR" => doc.media_descriptors.push(MediaDescriptor {
                media_url: required_attr(&child, "MEDIA_URL")?,
                mime_type: required_attr(&child, "MIME_TYPE")?,
                time_origin: parse_opt_int(&child, "TIME_ORIGIN")?,
                relative_media_url: child.attribute("RELATIVE_MEDIA_URL").map(str::to_string),
                extracted_from: child.attribute("EXTRACTED_FROM").map(str::to_string),
            }),
            "LINKED_FILE_DESCRIPTOR" => doc.linked_file_descriptors.push(LinkedFileDescriptor {
                link_url: required_attr(&child, "LINK_URL")?,
                mime_type: required_attr(&child, "MIME_TYPE")?,
                time_origin: parse_opt_int(&child, "TIME_ORIGIN")?,
                relative_link_url: child.attribute("RELATIVE_LINK_URL").map(str::to_string),
                associated_with: child.attribute("ASSOCIATED_WITH").map(str::to_string),
            }),
            "PROPERTY" => doc.properties.push(Property {
                name: child.attribute("NAME").map(str::to_string),
                value: child.text().unwrap_or("").to_string(),
            }),
            other => log::debug!("ignoring unknown header element <{}>", other),
        }
    }
    Ok(())
}

fn parse_opt_int(node: &Node, name: &str) -> Result<Option<i64>> {
    match node.attribute(name) {
        None => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            Error::FormatError(format!("{} value '{}' is not an integer", name, raw))
        }),
    }
}

fn parse_time_order(node: &Node, doc: &mut AnnotationDocument) -> Result<()> {
    for child in node.children().filter(Node::is_element) {
        if child.tag_name().name() != "TIME_SLOT" {
            continue;
        }
        doc.time_slots.push(TimeSlot {
            id: required_attr(&child, "TIME_SLOT_ID")?,
            time: parse_opt_int(&child, "TIME_VALUE")?,
        });
    }
    Ok(())
}

fn parse_linguistic_type(node: &Node) -> Result<LinguisticType> {
    let constraints = match node.attribute("CONSTRAINTS") {
        None => None,
        Some(raw) => Some(Stereotype::from_str(raw).ok_or_else(|| {
            Error::FormatError(format!("unknown constraint stereotype '{}'", raw))
        })?),
    };
    Ok(LinguisticType {
        id: required_attr(node, "LINGUISTIC_TYPE_ID")?,
        time_alignable: node.attribute("TIME_ALIGNABLE") == Some("true"),
        constraints,
        controlled_vocabulary: node
            .attribute("CONTROLLED_VOCABULARY_REF")
            .map(str::to_string),
        graphic_references: node.attribute("GRAPHIC_REFERENCES") == Some("true"),
        lexicon_ref: node.attribute("LEXICON_REF").map(str::to_string),
    })
}

fn parse_controlled_vocabulary(node: &Node) -> Result<ControlledVocabulary> {
    let mut cv = ControlledVocabulary {
        id: required_attr(node, "CV_ID")?,
        descriptions: Vec::new(),
        entries: Vec::new(),
        ext_ref: node.attribute("EXT_REF").map(str::to_string),
    };
    // Single-language legacy description attribute.
    if let Some(desc) = node.attribute("DESCRIPTION") {
        cv.descriptions.push(CvDescription {
            language: "und".to_string(),
            description: desc.to_string(),
        });
    }
    for child in node.children().filter(Node::is_element) {
        match child.tag_name().name() {
            "DESCRIPTION" => cv.descriptions.push(CvDescription {
                language: child.attribute("LANG_REF").unwrap_or("und").to_string(),
                description: child.text().unwrap_or("").to_string(),
            }),
            // Legacy single-language entry: the text is the value.
            "CV_ENTRY" => {
                let value = child.text().unwrap_or("").to_string();
                cv.entries.push(CvEntry {
                    id: value.clone(),
                    values: vec![CvEntryValue {
                        value,
                        language: "und".to_string(),
                        description: child.attribute("DESCRIPTION").map(str::to_string),
                    }],
                    ext_ref: child.attribute("EXT_REF").map(str::to_string),
                });
            }
            "CV_ENTRY_ML" => {
                let mut entry = CvEntry {
                    id: required_attr(&child, "CVE_ID")?,
                    values: Vec::new(),
                    ext_ref: child.attribute("EXT_REF").map(str::to_string),
                };
                for value in child
                    .children()
                    .filter(|n| n.is_element() && n.tag_name().name() == "CVE_VALUE")
                {
                    entry.values.push(CvEntryValue {
                        value: value.text().unwrap_or("").to_string(),
                        language: value.attribute("LANG_REF").unwrap_or("und").to_string(),
                        description: value.attribute("DESCRIPTION").map(str::to_string),
                    });
                }
                cv.entries.push(entry);
            }
            other => log::debug!("ignoring unknown vocabulary element <{}>", other),
        }
    }
    Ok(cv)
}

fn parse_tier(node: &Node, ordinal: usize, doc: &AnnotationDocument) -> Result<Tier> {
    let id = required_attr(node, "TIER_ID")?;
    let linguistic_type = required_attr(node, "LINGUISTIC_TYPE_REF")?;

    let mut aligned: Vec<AlignedAnnotation> = Vec::new();
    let mut references: Vec<RefAnnotation> = Vec::new();
    for wrapper in node
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "ANNOTATION")
    {
        let inner = wrapper
            .children()
            .find(Node::is_element)
            .ok_or_else(|| Error::FormatError(format!("empty <ANNOTATION> on tier '{}'", id)))?;
        let value = inner
            .children()
            .find(|n| n.is_element() && n.tag_name().name() == "ANNOTATION_VALUE")
            .and_then(|n| n.text())
            .unwrap_or("")
            .to_string();
        match inner.tag_name().name() {
            "ALIGNABLE_ANNOTATION" => aligned.push(AlignedAnnotation {
                id: required_attr(&inner, "ANNOTATION_ID")?,
                start_slot: required_attr(&inner, "TIME_SLOT_REF1")?,
                end_slot: required_attr(&inner, "TIME_SLOT_REF2")?,
                value,
                svg_ref: inner.attribute("SVG_REF").map(str::to_string),
            }),
            "REF_ANNOTATION" => references.push(RefAnnotation {
                id: required_attr(&inner, "ANNOTATION_ID")?,
                annotation_ref: required_attr(&inner, "ANNOTATION_REF")?,
                value,
                previous: inner.attribute("PREVIOUS_ANNOTATION").map(str::to_string),
                svg_ref: inner.attribute("SVG_REF").map(str::to_string),
            }),
            other => {
                return Err(Error::FormatError(format!(
                    "unknown annotation kind <{}> on tier '{}'",
                    other, id
                )))
            }
        }
    }
    if !aligned.is_empty() && !references.is_empty() {
        return Err(Error::FormatError(format!(
            "tier '{}' mixes aligned and reference annotations",
            id
        )));
    }

    // An empty tier takes its mode from the linguistic type; unknown
    // types keep their reference for round-tripping and default aligned.
    let annotations = if !references.is_empty() {
        TierAnnotations::Reference(references)
    } else if !aligned.is_empty() {
        TierAnnotations::Aligned(aligned)
    } else {
        let alignable = match doc.linguistic_type(&linguistic_type) {
            Some(lt) => lt.time_alignable,
            None => {
                log::warn!(
                    "tier '{}' references unknown linguistic type '{}'",
                    id,
                    linguistic_type
                );
                true
            }
        };
        if alignable {
            TierAnnotations::Aligned(Vec::new())
        } else {
            TierAnnotations::Reference(Vec::new())
        }
    };

    Ok(Tier {
        id,
        ordinal,
        linguistic_type,
        parent: node.attribute("PARENT_REF").map(str::to_string),
        locale: node.attribute("DEFAULT_LOCALE").map(str::to_string),
        participant: node.attribute("PARTICIPANT").map(str::to_string),
        annotator: node.attribute("ANNOTATOR").map(str::to_string),
        language: node.attribute("LANG_REF").map(str::to_string),
        annotations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_markup_is_rejected() {
        let err = parse("<ANNOTATION_DOCUMENT><TIER>").unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_wrong_root_is_rejected() {
        let err = parse("<SOMETHING_ELSE/>").unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_strict_mode_rejects_unknown_version() {
        let xml = r#"<ANNOTATION_DOCUMENT AUTHOR="" DATE="" FORMAT="9.9" VERSION="9.9">
            <TIME_ORDER/>
        </ANNOTATION_DOCUMENT>"#;
        assert!(parse(xml).is_ok());
        let err = parse_with(xml, ParseOptions { strict: true }).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_missing_timeslot_reference_is_rejected() {
        let xml = r#"<ANNOTATION_DOCUMENT AUTHOR="" DATE="" FORMAT="3.0" VERSION="3.0">
            <TIME_ORDER><TIME_SLOT TIME_SLOT_ID="ts1" TIME_VALUE="0"/></TIME_ORDER>
            <TIER TIER_ID="t" LINGUISTIC_TYPE_REF="default-lt">
                <ANNOTATION>
                    <ALIGNABLE_ANNOTATION ANNOTATION_ID="a1" TIME_SLOT_REF1="ts1" TIME_SLOT_REF2="ts99">
                        <ANNOTATION_VALUE>x</ANNOTATION_VALUE>
                    </ALIGNABLE_ANNOTATION>
                </ANNOTATION>
            </TIER>
        </ANNOTATION_DOCUMENT>"#;
        let err = parse(xml).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_mixed_annotation_kinds_rejected() {
        let xml = r#"<ANNOTATION_DOCUMENT AUTHOR="" DATE="" FORMAT="3.0" VERSION="3.0">
            <TIME_ORDER>
                <TIME_SLOT TIME_SLOT_ID="ts1" TIME_VALUE="0"/>
                <TIME_SLOT TIME_SLOT_ID="ts2" TIME_VALUE="10"/>
            </TIME_ORDER>
            <TIER TIER_ID="t" LINGUISTIC_TYPE_REF="default-lt">
                <ANNOTATION>
                    <ALIGNABLE_ANNOTATION ANNOTATION_ID="a1" TIME_SLOT_REF1="ts1" TIME_SLOT_REF2="ts2">
                        <ANNOTATION_VALUE>x</ANNOTATION_VALUE>
                    </ALIGNABLE_ANNOTATION>
                </ANNOTATION>
                <ANNOTATION>
                    <REF_ANNOTATION ANNOTATION_ID="a2" ANNOTATION_REF="a1">
                        <ANNOTATION_VALUE>y</ANNOTATION_VALUE>
                    </REF_ANNOTATION>
                </ANNOTATION>
            </TIER>
        </ANNOTATION_DOCUMENT>"#;
        let err = parse(xml).unwrap_err();
        assert!(matches!(err, Error::FormatError(_)));
    }

    #[test]
    fn test_counters_resume_above_parsed_ids() {
        let xml = r#"<ANNOTATION_DOCUMENT AUTHOR="" DATE="" FORMAT="3.0" VERSION="3.0">
            <TIME_ORDER>
                <TIME_SLOT TIME_SLOT_ID="ts41" TIME_VALUE="0"/>
                <TIME_SLOT TIME_SLOT_ID="ts42" TIME_VALUE="10"/>
            </TIME_ORDER>
            <TIER TIER_ID="t" LINGUISTIC_TYPE_REF="default-lt">
                <ANNOTATION>
                    <ALIGNABLE_ANNOTATION ANNOTATION_ID="a17" TIME_SLOT_REF1="ts41" TIME_SLOT_REF2="ts42">
                        <ANNOTATION_VALUE>x</ANNOTATION_VALUE>
                    </ALIGNABLE_ANNOTATION>
                </ANNOTATION>
            </TIER>
            <LINGUISTIC_TYPE LINGUISTIC_TYPE_ID="default-lt" TIME_ALIGNABLE="true" GRAPHIC_REFERENCES="false"/>
        </ANNOTATION_DOCUMENT>"#;
        let mut doc = parse(xml).unwrap();
        let slot = doc.new_time_slot(None);
        assert_eq!(slot, "ts43");
        let id = doc.add_aligned_annotation("t", 100, 200, "y", None).unwrap();
        assert_eq!(id, "a18");
    }

    #[test]
    fn test_legacy_cv_entries() {
        let xml = r#"<ANNOTATION_DOCUMENT AUTHOR="" DATE="" FORMAT="2.7" VERSION="2.7">
            <TIME_ORDER/>
            <CONTROLLED_VOCABULARY CV_ID="moods" DESCRIPTION="speaker mood">
                <CV_ENTRY DESCRIPTION="positive">happy</CV_ENTRY>
                <CV_ENTRY>sad</CV_ENTRY>
            </CONTROLLED_VOCABULARY>
        </ANNOTATION_DOCUMENT>"#;
        let doc = parse(xml).unwrap();
        let cv = &doc.controlled_vocabularies()[0];
        assert_eq!(cv.id, "moods");
        assert_eq!(cv.entries.len(), 2);
        assert_eq!(cv.entries[0].values[0].value, "happy");
        assert_eq!(cv.entries[0].values[0].description.as_deref(), Some("positive"));
    }
}
