use std::io::{Cursor, Read};
use std::path::Path;

use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::fs;
use tokio::process::Command;

/// Returned verbatim for extensions outside the allow-list.
pub const UNSUPPORTED_FILE_TYPE: &str = "Unsupported file type";

pub const ALLOWED_EXTENSIONS: [&str; 7] = ["txt", "md", "pdf", "doc", "docx", "ppt", "pptx"];

pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default()
}

pub fn is_supported(filename: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&file_extension(filename).as_str())
}

/// Reduce an uploaded document to plain text.
///
/// Never fails past this boundary: a broken document becomes explanatory
/// text inline, so the other files in the request still go through.
pub async fn extract_text(filename: &str, data: &[u8]) -> String {
    let ext = file_extension(filename);
    let result = match ext.as_str() {
        "txt" | "md" => Ok(String::from_utf8_lossy(data).into_owned()),
        "pdf" => pdf_text(data).await,
        "docx" => docx_text(data),
        "doc" => match convert_with_libreoffice(data, "doc", "docx").await {
            Ok(converted) => docx_text(&converted),
            Err(e) => Err(e),
        },
        "pptx" => pptx_text(data),
        "ppt" => match convert_with_libreoffice(data, "ppt", "pptx").await {
            Ok(converted) => pptx_text(&converted),
            Err(e) => Err(e),
        },
        _ => return UNSUPPORTED_FILE_TYPE.to_string(),
    };

    match result {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Text extraction failed for {}: {}", filename, e);
            format!("[Could not extract text from {}: {}]", filename, e)
        }
    }
}

async fn pdf_text(data: &[u8]) -> anyhow::Result<String> {
    let temp_path = format!("/tmp/study_doc_{}.pdf", uuid::Uuid::new_v4());
    fs::write(&temp_path, data).await?;

    let output = Command::new("pdftotext")
        .arg("-layout")
        .arg(&temp_path)
        .arg("-")
        .output()
        .await;
    let _ = fs::remove_file(&temp_path).await;

    let out = output.map_err(|e| anyhow::anyhow!("pdftotext not available: {}", e))?;
    if !out.status.success() {
        anyhow::bail!(
            "pdftotext failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        );
    }

    // pdftotext separates pages with form feeds.
    let raw = String::from_utf8_lossy(&out.stdout).into_owned();
    let pages: Vec<String> = raw
        .split('\u{c}')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect();
    Ok(pages.join("\n\n"))
}

fn docx_text(data: &[u8]) -> anyhow::Result<String> {
    let docx = docx_rs::read_docx(data).map_err(|e| anyhow::anyhow!("invalid docx: {:?}", e))?;

    let mut paragraphs: Vec<String> = Vec::new();
    for child in &docx.document.children {
        if let docx_rs::DocumentChild::Paragraph(paragraph) = child {
            let mut text = String::new();
            for pc in &paragraph.children {
                if let docx_rs::ParagraphChild::Run(run) = pc {
                    for rc in &run.children {
                        if let docx_rs::RunChild::Text(t) = rc {
                            text.push_str(&t.text);
                        }
                    }
                }
            }
            let text = text.trim().to_string();
            if !text.is_empty() {
                paragraphs.push(text);
            }
        }
    }
    Ok(paragraphs.join("\n\n"))
}

fn pptx_text(data: &[u8]) -> anyhow::Result<String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;

    let mut slide_names: Vec<(usize, String)> = archive
        .file_names()
        .filter_map(|name| {
            let number = name
                .strip_prefix("ppt/slides/slide")?
                .strip_suffix(".xml")?
                .parse::<usize>()
                .ok()?;
            Some((number, name.to_string()))
        })
        .collect();
    slide_names.sort_by_key(|(number, _)| *number);

    if slide_names.is_empty() {
        anyhow::bail!("no slides found");
    }

    let mut slides = Vec::new();
    for (number, name) in slide_names {
        let mut xml = String::new();
        archive.by_name(&name)?.read_to_string(&mut xml)?;
        slides.push(format!("--- Slide {} ---\n{}", number, slide_text(&xml)));
    }
    Ok(slides.join("\n\n"))
}

/// Pull the text out of one slide's XML: shape paragraphs become lines,
/// table rows become their cells joined with " | ".
fn slide_text(xml: &str) -> String {
    let mut reader = Reader::from_str(xml);

    let mut lines: Vec<String> = Vec::new();
    let mut paragraph = String::new();
    let mut cell = String::new();
    let mut row: Vec<String> = Vec::new();
    let mut in_text = false;
    let mut in_cell = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => match e.name().as_ref() {
                b"a:tr" => row.clear(),
                b"a:tc" => {
                    in_cell = true;
                    cell.clear();
                }
                b"a:t" => in_text = true,
                b"a:p" if !in_cell => paragraph.clear(),
                _ => {}
            },
            Ok(Event::Text(t)) => {
                if in_text {
                    if let Ok(piece) = t.unescape() {
                        if in_cell {
                            cell.push_str(&piece);
                        } else {
                            paragraph.push_str(&piece);
                        }
                    }
                }
            }
            Ok(Event::End(e)) => match e.name().as_ref() {
                b"a:t" => in_text = false,
                b"a:p" => {
                    if in_cell {
                        if !cell.is_empty() && !cell.ends_with(' ') {
                            cell.push(' ');
                        }
                    } else {
                        let line = paragraph.trim();
                        if !line.is_empty() {
                            lines.push(line.to_string());
                        }
                        paragraph.clear();
                    }
                }
                b"a:tc" => {
                    row.push(cell.trim().to_string());
                    in_cell = false;
                }
                b"a:tr" => {
                    if row.iter().any(|c| !c.is_empty()) {
                        lines.push(row.join(" | "));
                    }
                    row.clear();
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            // Tolerate malformed slide XML; keep whatever was read so far.
            Err(_) => break,
            _ => {}
        }
    }

    lines.join("\n")
}

/// Legacy office formats go through a headless LibreOffice conversion into
/// their XML counterpart first.
async fn convert_with_libreoffice(
    data: &[u8],
    source_ext: &str,
    target_ext: &str,
) -> anyhow::Result<Vec<u8>> {
    let temp_dir = format!("/tmp/study_convert_{}", uuid::Uuid::new_v4());
    fs::create_dir_all(&temp_dir).await?;
    let input_path = format!("{}/input.{}", temp_dir, source_ext);
    fs::write(&input_path, data).await?;

    let output = Command::new("libreoffice")
        .arg("--headless")
        .arg("--norestore")
        .arg("--convert-to")
        .arg(target_ext)
        .arg("--outdir")
        .arg(&temp_dir)
        .arg(&input_path)
        .output()
        .await;

    let result = match output {
        Ok(out) if out.status.success() => {
            fs::read(format!("{}/input.{}", temp_dir, target_ext))
                .await
                .map_err(|e| anyhow::anyhow!("LibreOffice produced no output: {}", e))
        }
        Ok(out) => Err(anyhow::anyhow!(
            "LibreOffice conversion failed: {}",
            String::from_utf8_lossy(&out.stderr).trim()
        )),
        Err(e) => Err(anyhow::anyhow!("Failed to run libreoffice: {}", e)),
    };

    let _ = fs::remove_dir_all(&temp_dir).await;
    result
}
