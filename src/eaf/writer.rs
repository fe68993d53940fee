//! Annotation-document serializer.
//!
//! Output is deterministic: timeslots sorted by numeric id, tiers sorted
//! by stored ordinal, attributes in a fixed per-element order, optional
//! attributes omitted entirely when absent. Pretty-printing only changes
//! whitespace, never the parsed-back model.

use crate::models::tier::{TierAnnotations, TimeSlot};
use crate::models::AnnotationDocument;

/// Escape the five XML special characters for attribute and text content.
pub fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// Schema location advertised on the root, fixed per format version.
fn schema_location(version: &str) -> String {
    format!("http://www.mpi.nl/tools/elan/EAFv{}.xsd", version)
}

/// Line-oriented XML assembly with optional indentation.
struct XmlWriter {
    buffer: String,
    pretty: bool,
    level: usize,
}

impl XmlWriter {
    fn new(pretty: bool) -> Self {
        Self {
            buffer: String::new(),
            pretty,
            level: 0,
        }
    }

    fn line(&mut self, content: &str) {
        if self.pretty {
            for _ in 0..self.level {
                self.buffer.push_str("    ");
            }
        }
        self.buffer.push_str(content);
        if self.pretty {
            self.buffer.push('\n');
        }
    }

    fn open(&mut self, tag: &str, attrs: &[(&str, Option<String>)]) {
        self.line(&format!("<{}{}>", tag, render_attrs(attrs)));
        self.level += 1;
    }

    fn close(&mut self, tag: &str) {
        self.level -= 1;
        self.line(&format!("</{}>", tag));
    }

    fn empty(&mut self, tag: &str, attrs: &[(&str, Option<String>)]) {
        self.line(&format!("<{}{}/>", tag, render_attrs(attrs)));
    }

    fn text_element(&mut self, tag: &str, attrs: &[(&str, Option<String>)], text: &str) {
        self.line(&format!(
            "<{}{}>{}</{}>",
            tag,
            render_attrs(attrs),
            xml_escape(text),
            tag
        ));
    }
}

fn render_attrs(attrs: &[(&str, Option<String>)]) -> String {
    let mut out = String::new();
    for (name, value) in attrs {
        if let Some(value) = value {
            out.push_str(&format!(" {}=\"{}\"", name, xml_escape(value)));
        }
    }
    out
}

fn req(value: &str) -> Option<String> {
    Some(value.to_string())
}

/// Serialize a document with four-space indentation.
pub fn serialize(doc: &AnnotationDocument) -> String {
    serialize_with(doc, true)
}

/// Serialize a document; `pretty` selects indentation only.
pub fn serialize_with(doc: &AnnotationDocument, pretty: bool) -> String {
    let mut w = XmlWriter::new(pretty);
    w.buffer.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>");
    if pretty {
        w.buffer.push('\n');
    }
    w.open(
        "ANNOTATION_DOCUMENT",
        &[
            ("AUTHOR", req(&doc.author)),
            ("DATE", req(&doc.date)),
            ("FORMAT", req(&doc.format)),
            ("VERSION", req(&doc.version)),
            ("xmlns:xsi", req("http://www.w3.org/2001/XMLSchema-instance")),
            (
                "xsi:noNamespaceSchemaLocation",
                Some(schema_location(&doc.format)),
            ),
        ],
    );

    for license in &doc.licenses {
        w.text_element("LICENSE", &[("LICENSE_URL", license.url.clone())], &license.text);
    }

    w.open(
        "HEADER",
        &[("MEDIA_FILE", req("")), ("TIME_UNITS", req("milliseconds"))],
    );
    for md in &doc.media_descriptors {
        w.empty(
            "MEDIA_DESCRIPTOR",
            &[
                ("MEDIA_URL", req(&md.media_url)),
                ("MIME_TYPE", req(&md.mime_type)),
                ("TIME_ORIGIN", md.time_origin.map(|t| t.to_string())),
                ("RELATIVE_MEDIA_URL", md.relative_media_url.clone()),
                ("EXTRACTED_FROM", md.extracted_from.clone()),
            ],
        );
    }
    for lf in &doc.linked_file_descriptors {
        w.empty(
            "LINKED_FILE_DESCRIPTOR",
            &[
                ("LINK_URL", req(&lf.link_url)),
                ("MIME_TYPE", req(&lf.mime_type)),
                ("TIME_ORIGIN", lf.time_origin.map(|t| t.to_string())),
                ("RELATIVE_LINK_URL", lf.relative_link_url.clone()),
                ("ASSOCIATED_WITH", lf.associated_with.clone()),
            ],
        );
    }
    for prop in &doc.properties {
        w.text_element("PROPERTY", &[("NAME", prop.name.clone())], &prop.value);
    }
    w.close("HEADER");

    // Timeslots ordered by numeric id for stable output.
    let mut slots: Vec<&TimeSlot> = doc.time_slots.iter().collect();
    slots.sort_by_key(|ts| (TimeSlot::numeric_suffix(&ts.id).unwrap_or(u64::MAX), ts.id.clone()));
    w.open("TIME_ORDER", &[]);
    for ts in slots {
        w.empty(
            "TIME_SLOT",
            &[
                ("TIME_SLOT_ID", req(&ts.id)),
                ("TIME_VALUE", ts.time.map(|t| t.to_string())),
            ],
        );
    }
    w.close("TIME_ORDER");

    let mut tiers: Vec<_> = doc.tiers.iter().collect();
    tiers.sort_by_key(|t| t.ordinal);
    for tier in tiers {
        w.open(
            "TIER",
            &[
                ("TIER_ID", req(&tier.id)),
                ("LINGUISTIC_TYPE_REF", req(&tier.linguistic_type)),
                ("PARENT_REF", tier.parent.clone()),
                ("DEFAULT_LOCALE", tier.locale.clone()),
                ("PARTICIPANT", tier.participant.clone()),
                ("ANNOTATOR", tier.annotator.clone()),
                ("LANG_REF", tier.language.clone()),
            ],
        );
        match &tier.annotations {
            TierAnnotations::Aligned(anns) => {
                for ann in anns {
                    w.open("ANNOTATION", &[]);
                    w.open(
                        "ALIGNABLE_ANNOTATION",
                        &[
                            ("ANNOTATION_ID", req(&ann.id)),
                            ("TIME_SLOT_REF1", req(&ann.start_slot)),
                            ("TIME_SLOT_REF2", req(&ann.end_slot)),
                            ("SVG_REF", ann.svg_ref.clone()),
                        ],
                    );
                    w.text_element("ANNOTATION_VALUE", &[], &ann.value);
                    w.close("ALIGNABLE_ANNOTATION");
                    w.close("ANNOTATION");
                }
            }
            TierAnnotations::Reference(anns) => {
                for ann in anns {
                    w.open("ANNOTATION", &[]);
                    w.open(
                        "REF_ANNOTATION",
                        &[
                            ("ANNOTATION_ID", req(&ann.id)),
                            ("ANNOTATION_REF", req(&ann.annotation_ref)),
                            ("PREVIOUS_ANNOTATION", ann.previous.clone()),
                            ("SVG_REF", ann.svg_ref.clone()),
                        ],
                    );
                    w.text_element("ANNOTATION_VALUE", &[], &ann.value);
                    w.close("REF_ANNOTATION");
                    w.close("ANNOTATION");
                }
            }
        }
        w.close("TIER");
    }

    for lt in &doc.linguistic_types {
        w.empty(
            "LINGUISTIC_TYPE",
            &[
                ("LINGUISTIC_TYPE_ID", req(&lt.id)),
                ("TIME_ALIGNABLE", req(if lt.time_alignable { "true" } else { "false" })),
                ("CONSTRAINTS", lt.constraints.map(|s| s.as_str().to_string())),
                ("CONTROLLED_VOCABULARY_REF", lt.controlled_vocabulary.clone()),
                (
                    "GRAPHIC_REFERENCES",
                    req(if lt.graphic_references { "true" } else { "false" }),
                ),
                ("LEXICON_REF", lt.lexicon_ref.clone()),
            ],
        );
    }

    for locale in &doc.locales {
        w.empty(
            "LOCALE",
            &[
                ("LANGUAGE_CODE", req(&locale.language_code)),
                ("COUNTRY_CODE", locale.country_code.clone()),
                ("VARIANT", locale.variant.clone()),
            ],
        );
    }

    for lang in &doc.languages {
        w.empty(
            "LANGUAGE",
            &[
                ("LANG_ID", req(&lang.id)),
                ("LANG_DEF", lang.definition.clone()),
                ("LANG_LABEL", lang.label.clone()),
            ],
        );
    }

    for constraint in &doc.constraints {
        w.empty(
            "CONSTRAINT",
            &[
                ("STEREOTYPE", req(&constraint.stereotype)),
                ("DESCRIPTION", constraint.description.clone()),
            ],
        );
    }

    for cv in &doc.controlled_vocabularies {
        w.open(
            "CONTROLLED_VOCABULARY",
            &[("CV_ID", req(&cv.id)), ("EXT_REF", cv.ext_ref.clone())],
        );
        for desc in &cv.descriptions {
            w.text_element(
                "DESCRIPTION",
                &[("LANG_REF", req(&desc.language))],
                &desc.description,
            );
        }
        for entry in &cv.entries {
            w.open(
                "CV_ENTRY_ML",
                &[("CVE_ID", req(&entry.id)), ("EXT_REF", entry.ext_ref.clone())],
            );
            for value in &entry.values {
                w.text_element(
                    "CVE_VALUE",
                    &[
                        ("LANG_REF", req(&value.language)),
                        ("DESCRIPTION", value.description.clone()),
                    ],
                    &value.value,
                );
            }
            w.close("CV_ENTRY_ML");
        }
        w.close("CONTROLLED_VOCABULARY");
    }

    for lex in &doc.lexicon_refs {
        w.empty(
            "LEXICON_REF",
            &[
                ("LEX_REF_ID", req(&lex.id)),
                ("NAME", req(&lex.name)),
                ("TYPE", req(&lex.service_type)),
                ("URL", req(&lex.url)),
                ("LEXICON_ID", req(&lex.lexicon_id)),
                ("LEXICON_NAME", req(&lex.lexicon_name)),
                ("DATCAT_ID", lex.datcat_id.clone()),
                ("DATCAT_NAME", lex.datcat_name.clone()),
            ],
        );
    }

    for ext in &doc.external_refs {
        w.empty(
            "EXTERNAL_REF",
            &[
                ("EXT_REF_ID", req(&ext.id)),
                ("TYPE", req(&ext.ref_type)),
                ("VALUE", req(&ext.value)),
            ],
        );
    }

    w.close("ANNOTATION_DOCUMENT");
    w.buffer
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(xml_escape("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(xml_escape("plain"), "plain");
    }

    #[test]
    fn test_serialize_is_deterministic() {
        let mut doc = AnnotationDocument::new();
        doc.add_aligned_annotation("default", 0, 100, "x", None).unwrap();
        assert_eq!(serialize(&doc), serialize(&doc));
    }

    #[test]
    fn test_absent_optionals_are_omitted() {
        let doc = AnnotationDocument::new();
        let xml = serialize(&doc);
        assert!(!xml.contains("PARENT_REF"));
        assert!(!xml.contains("DEFAULT_LOCALE"));
        assert!(xml.contains("LINGUISTIC_TYPE_ID=\"default-lt\""));
    }
}
