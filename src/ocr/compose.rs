//! Searchable PDF composition
//!
//! Builds a synthetic text-only PDF from sanitized OCR page text: Helvetica
//! at a fixed size, fixed wrap width, one output page per source page with
//! overflow continuing onto extra pages.

use crate::error::{Error, Result};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;

const FONT_SIZE: i64 = 12;
const LINE_HEIGHT: f32 = 14.0;
/// US Letter in PDF points
const PAGE_WIDTH: f32 = 612.0;
const PAGE_HEIGHT: f32 = 792.0;
const MARGIN: f32 = 50.0;
/// Characters per wrapped line at the fixed font size
const WRAP_WIDTH: usize = 90;

/// Lines that fit on one page between margins
fn lines_per_page() -> usize {
    ((PAGE_HEIGHT - 2.0 * MARGIN) / LINE_HEIGHT) as usize
}

/// Wrap sanitized text at word boundaries to the fixed column width
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current = word.to_string();
        } else if current.len() + 1 + word.len() <= width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            current = word.to_string();
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Compose a searchable PDF from per-page sanitized text and write it to
/// `out_path`. Nothing is written unless every page encodes successfully.
pub fn compose_searchable_pdf(page_texts: &[String], out_path: &Path) -> Result<()> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();

    for text in page_texts {
        let wrapped = wrap_text(text, WRAP_WIDTH);
        // One output page per source page; long pages spill onto extra pages
        let pages: Vec<&[String]> = if wrapped.is_empty() {
            vec![&[][..]]
        } else {
            wrapped.chunks(lines_per_page()).collect()
        };

        for lines in pages {
            let content = page_content(lines)?;
            let content_id = doc.add_object(Stream::new(dictionary! {}, content));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![
                0.into(),
                0.into(),
                Object::Real(PAGE_WIDTH),
                Object::Real(PAGE_HEIGHT),
            ],
        }),
    );

    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    doc.save(out_path)
        .map_err(|e| Error::Ocr(format!("Failed to write {}: {}", out_path.display(), e)))?;
    Ok(())
}

/// Encode one page's text operations
fn page_content(lines: &[String]) -> Result<Vec<u8>> {
    let mut operations = vec![
        Operation::new("BT", vec![]),
        Operation::new("Tf", vec!["F1".into(), FONT_SIZE.into()]),
        Operation::new("TL", vec![Object::Real(LINE_HEIGHT)]),
        Operation::new(
            "Td",
            vec![
                Object::Real(MARGIN),
                Object::Real(PAGE_HEIGHT - MARGIN - LINE_HEIGHT),
            ],
        ),
    ];

    for line in lines {
        operations.push(Operation::new(
            "Tj",
            vec![Object::string_literal(line.as_str())],
        ));
        operations.push(Operation::new("T*", vec![]));
    }
    operations.push(Operation::new("ET", vec![]));

    Content { operations }
        .encode()
        .map_err(|e| Error::Ocr(format!("Failed to encode page content: {}", e)))
}
