//! DOCX text extraction: walks `word/document.xml` in body order.
//!
//! Paragraphs become lines. Tables are flattened row-major with cells joined
//! by ` | ` so skill matrices survive as readable rows. Hyperlink targets are
//! resolved through `word/_rels/document.xml.rels`.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use zip::result::ZipError;
use zip::ZipArchive;

use super::{corrupt, DocumentFormat, ExtractionError, Hyperlink};

const DOCUMENT_PART: &str = "word/document.xml";
const RELS_PART: &str = "word/_rels/document.xml.rels";
/// Upper bound on an uncompressed XML part; guards against zip bombs.
const MAX_PART_BYTES: u64 = 32 * 1024 * 1024;
const CELL_SEPARATOR: &str = " | ";

#[derive(Debug, Default)]
pub struct DocxText {
    pub text: String,
    pub hyperlinks: Vec<Hyperlink>,
}

pub fn extract(bytes: &[u8]) -> Result<DocxText, ExtractionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| corrupt(DocumentFormat::Docx, format!("not a zip container: {e}")))?;

    let document = read_part(&mut archive, DOCUMENT_PART)?
        .ok_or_else(|| corrupt(DocumentFormat::Docx, format!("missing {DOCUMENT_PART}")))?;
    let relationships = match read_part(&mut archive, RELS_PART)? {
        Some(xml) => parse_relationships(&xml)?,
        None => HashMap::new(),
    };

    BodyWalker::new(&relationships).walk(&document)
}

fn read_part(
    archive: &mut ZipArchive<Cursor<&[u8]>>,
    name: &str,
) -> Result<Option<String>, ExtractionError> {
    let file = match archive.by_name(name) {
        Ok(file) => file,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(corrupt(DocumentFormat::Docx, format!("{name}: {e}"))),
    };
    if file.size() > MAX_PART_BYTES {
        return Err(corrupt(DocumentFormat::Docx, format!("{name} is too large")));
    }
    let mut xml = String::new();
    file.take(MAX_PART_BYTES)
        .read_to_string(&mut xml)
        .map_err(|e| corrupt(DocumentFormat::Docx, format!("{name}: {e}")))?;
    Ok(Some(xml))
}

/// Maps relationship ids (`rId7`) to their targets.
fn parse_relationships(xml: &str) -> Result<HashMap<String, String>, ExtractionError> {
    let mut reader = Reader::from_str(xml);
    let mut rels = HashMap::new();
    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"Relationship" => {
                if let (Some(id), Some(target)) = (attr(&e, "Id")?, attr(&e, "Target")?) {
                    rels.insert(id, target);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(rels)
}

#[derive(Default)]
struct Table {
    rows: Vec<String>,
    row: Vec<String>,
    cell: Vec<String>,
}

impl Table {
    fn render(&self) -> String {
        self.rows.join("\n")
    }
}

struct PendingLink {
    target: Option<String>,
    text: String,
}

struct BodyWalker<'a> {
    relationships: &'a HashMap<String, String>,
    blocks: Vec<String>,
    tables: Vec<Table>,
    paragraph: String,
    paragraph_depth: usize,
    /// Depth inside `w:r`. Tabs and breaks only count inside a run; a
    /// `w:tab` under `w:pPr/w:tabs` is a tab-stop definition.
    run_depth: usize,
    in_text: bool,
    /// Depth inside `mc:Fallback`, whose content duplicates `mc:Choice`.
    skip_depth: usize,
    link: Option<PendingLink>,
    hyperlinks: Vec<Hyperlink>,
}

impl<'a> BodyWalker<'a> {
    fn new(relationships: &'a HashMap<String, String>) -> Self {
        Self {
            relationships,
            blocks: Vec::new(),
            tables: Vec::new(),
            paragraph: String::new(),
            paragraph_depth: 0,
            run_depth: 0,
            in_text: false,
            skip_depth: 0,
            link: None,
            hyperlinks: Vec::new(),
        }
    }

    fn walk(mut self, xml: &str) -> Result<DocxText, ExtractionError> {
        let mut reader = Reader::from_str(xml);
        loop {
            let event = reader.read_event().map_err(xml_error)?;
            if self.skip_depth > 0 {
                match event {
                    Event::Start(_) => self.skip_depth += 1,
                    Event::End(_) => self.skip_depth -= 1,
                    Event::Eof => break,
                    _ => {}
                }
                continue;
            }
            match event {
                Event::Start(e) => self.open(&e)?,
                Event::Empty(e) => self.empty(&e),
                Event::End(e) => self.close(e.local_name().as_ref()),
                Event::Text(t) if self.in_text => {
                    let text = t.unescape().map_err(xml_error)?;
                    self.push_text(&text);
                }
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(DocxText {
            text: self.blocks.join("\n"),
            hyperlinks: self.hyperlinks,
        })
    }

    fn open(&mut self, e: &BytesStart<'_>) -> Result<(), ExtractionError> {
        match e.local_name().as_ref() {
            b"Fallback" => self.skip_depth = 1,
            b"p" => self.paragraph_depth += 1,
            b"r" => self.run_depth += 1,
            b"t" => self.in_text = true,
            b"tbl" => self.tables.push(Table::default()),
            b"hyperlink" => {
                let target = attr(e, "r:id")?.and_then(|id| self.relationships.get(&id).cloned());
                self.link = Some(PendingLink {
                    target,
                    text: String::new(),
                });
            }
            _ => {}
        }
        Ok(())
    }

    fn empty(&mut self, e: &BytesStart<'_>) {
        if self.run_depth == 0 {
            return;
        }
        match e.local_name().as_ref() {
            b"tab" => self.push_text("\t"),
            b"br" | b"cr" => self.push_text("\n"),
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        match name {
            b"t" => self.in_text = false,
            b"r" => self.run_depth = self.run_depth.saturating_sub(1),
            b"p" => {
                self.paragraph_depth = self.paragraph_depth.saturating_sub(1);
                if self.paragraph_depth == 0 {
                    let paragraph = std::mem::take(&mut self.paragraph);
                    self.finish_paragraph(paragraph);
                }
            }
            b"hyperlink" => {
                if let Some(PendingLink {
                    target: Some(url),
                    text,
                }) = self.link.take()
                {
                    self.hyperlinks.push(Hyperlink {
                        text: text.trim().to_string(),
                        url,
                    });
                }
            }
            b"tc" => {
                if let Some(table) = self.tables.last_mut() {
                    let cell = std::mem::take(&mut table.cell).join(" ");
                    table.row.push(cell.trim().to_string());
                }
            }
            b"tr" => {
                if let Some(table) = self.tables.last_mut() {
                    let cells: Vec<String> = std::mem::take(&mut table.row)
                        .into_iter()
                        .filter(|c| !c.is_empty())
                        .collect();
                    if !cells.is_empty() {
                        table.rows.push(cells.join(CELL_SEPARATOR));
                    }
                }
            }
            b"tbl" => {
                if let Some(table) = self.tables.pop() {
                    let rendered = table.render();
                    if !rendered.is_empty() {
                        self.finish_paragraph(rendered);
                    }
                }
            }
            _ => {}
        }
    }

    fn push_text(&mut self, text: &str) {
        self.paragraph.push_str(text);
        if let Some(link) = self.link.as_mut() {
            link.text.push_str(text);
        }
    }

    /// Routes a finished paragraph (or a nested table) into the enclosing
    /// table cell, or into the body when no table is open.
    fn finish_paragraph(&mut self, text: String) {
        if text.trim().is_empty() {
            return;
        }
        match self.tables.last_mut() {
            Some(table) => table.cell.push(text),
            None => self.blocks.push(text),
        }
    }
}

fn attr(e: &BytesStart<'_>, name: &str) -> Result<Option<String>, ExtractionError> {
    let attribute = e
        .try_get_attribute(name)
        .map_err(|err| corrupt(DocumentFormat::Docx, format!("bad attribute {name}: {err}")))?;
    attribute
        .map(|a| a.unescape_value().map(|v| v.into_owned()))
        .transpose()
        .map_err(xml_error)
}

fn xml_error(e: quick_xml::Error) -> ExtractionError {
    corrupt(DocumentFormat::Docx, format!("malformed XML: {e}"))
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use crate::extraction::extract_as;

    #[test]
    fn test_paragraphs_and_tables_keep_body_order() {
        let body = format!(
            "{}{}{}",
            paragraph("Jane Doe"),
            table(&[&["Rust", "Go"], &["Docker", "Kubernetes"]]),
            paragraph("Education")
        );
        let doc = extract(&docx_with_body(&body)).unwrap();
        assert_eq!(doc.text, "Jane Doe\nRust | Go\nDocker | Kubernetes\nEducation");
    }

    #[test]
    fn test_runs_tabs_and_breaks_are_joined() {
        let body = r#"<w:p><w:r><w:t>Senior</w:t></w:r><w:r><w:tab/><w:t>Engineer</w:t><w:br/><w:t>Acme &amp; Co</w:t></w:r></w:p>"#;
        let doc = extract(&docx_with_body(body)).unwrap();
        assert_eq!(doc.text, "Senior\tEngineer\nAcme & Co");
    }

    #[test]
    fn test_tab_stop_definitions_are_not_text() {
        let body = r#"<w:p><w:pPr><w:tabs><w:tab w:val="left" w:pos="2880"/><w:tab w:val="right" w:pos="9360"/></w:tabs></w:pPr><w:r><w:t>Jane Doe</w:t><w:tab/><w:t>2021</w:t></w:r></w:p>"#;
        let doc = extract(&docx_with_body(body)).unwrap();
        assert_eq!(doc.text, "Jane Doe\t2021");
    }

    #[test]
    fn test_empty_cells_are_skipped_in_rows() {
        let body = table(&[&["Python", "", "SQL"], &["", ""]]);
        let doc = extract(&docx_with_body(&body)).unwrap();
        assert_eq!(doc.text, "Python | SQL");
    }

    #[test]
    fn test_hyperlinks_resolve_through_relationships() {
        let body = r#"<w:p><w:r><w:t>Profile: </w:t></w:r><w:hyperlink r:id="rId9"><w:r><w:t>LinkedIn</w:t></w:r></w:hyperlink></w:p>"#;
        let rels = r#"<?xml version="1.0" encoding="UTF-8"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId9" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/hyperlink" Target="https://linkedin.com/in/janedoe" TargetMode="External"/></Relationships>"#;
        let bytes = docx_from_parts(&[
            ("word/document.xml", document_xml(body).as_str()),
            ("word/_rels/document.xml.rels", rels),
        ]);
        let doc = extract(&bytes).unwrap();
        assert_eq!(doc.text, "Profile: LinkedIn");
        assert_eq!(
            doc.hyperlinks,
            vec![Hyperlink {
                text: "LinkedIn".to_string(),
                url: "https://linkedin.com/in/janedoe".to_string(),
            }]
        );
    }

    #[test]
    fn test_fallback_content_is_not_duplicated() {
        let body = r#"<w:p><w:r><mc:AlternateContent><mc:Choice Requires="wps"><w:t>Boxed</w:t></mc:Choice><mc:Fallback><w:t>Boxed</w:t></mc:Fallback></mc:AlternateContent></w:r></w:p>"#;
        let doc = extract(&docx_with_body(body)).unwrap();
        assert_eq!(doc.text, "Boxed");
    }

    #[test]
    fn test_document_without_text_is_empty() {
        let bytes = docx_with_body("<w:p/><w:p><w:r></w:r></w:p>");
        let err = extract_as(&bytes, DocumentFormat::Docx).unwrap_err();
        assert!(matches!(err, ExtractionError::EmptyDocument { format: DocumentFormat::Docx }));
    }

    #[test]
    fn test_non_zip_is_corrupt() {
        let err = extract(b"definitely not a zip").unwrap_err();
        assert!(matches!(err, ExtractionError::CorruptDocument { format: DocumentFormat::Docx, .. }));
    }

    #[test]
    fn test_zip_without_document_part_is_corrupt() {
        let bytes = docx_from_parts(&[("word/styles.xml", "<w:styles/>")]);
        let err = extract(&bytes).unwrap_err();
        assert!(
            matches!(err, ExtractionError::CorruptDocument { ref detail, .. } if detail.contains("document.xml"))
        );
    }
}
