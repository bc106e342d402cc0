//! PPTX renderer: captures one PNG per step (never written to disk),
//! assembles a minimal OOXML presentation package with one slide per image.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::{BytesText, Event};
use quick_xml::Writer;
use zip::write::{FileOptions, SimpleFileOptions};
use zip::ZipWriter;

use super::{expand_steps, resolve_indices, RenderContext, RenderStrategy};
use crate::error::ExportError;
use crate::services::browser::{build_slide_url, BrowserBackend, PageHandle};
use crate::types::request::ExportRequest;

const EMU_PER_INCH: i64 = 914_400;
const PX_PER_INCH: f64 = 96.0;

struct CapturedSlide {
    png: Vec<u8>,
    notes: Option<String>,
}

pub struct PptxRenderer;

#[async_trait]
impl RenderStrategy for PptxRenderer {
    async fn render(&self, ctx: &RenderContext<'_>, req: &ExportRequest, output: &Path) -> Result<(), ExportError> {
        let indices = resolve_indices(req, ctx.slides.len() as u32)?;
        let with_clicks = req.with_clicks();
        let steps = expand_steps(&ctx.slides, &indices, with_clicks);

        let mut captured = Vec::with_capacity(steps.len());
        for (no, clicks) in steps {
            let page = ctx.browser.new_page(req.width, req.height, req.scale as f64).await?;
            let url = build_slide_url(&ctx.base_url, req.router_mode, no, Some("true"), None, clicks, false);
            page.goto(&url, req.wait_until, req.wait, Duration::from_millis(req.timeout)).await?;
            page.set_color_scheme(req.dark).await?;
            page.wait_for_selector(&format!("[data-slidev-no=\"{no}\"]"), Duration::from_millis(req.timeout))
                .await?;
            crate::services::stabilizer::stabilize(page.as_ref(), Duration::from_millis(req.timeout)).await?;
            let clip = page.element_bounding_box(&format!("[data-slidev-no=\"{no}\"]")).await?;
            let png = page.screenshot(clip, req.omit_background).await?;
            page.close().await?;

            let notes = ctx.slides.iter().find(|s| s.index == no).and_then(|s| s.note.clone());
            captured.push(CapturedSlide { png, notes });
            ctx.progress.inc(1);
        }

        let first_frontmatter = ctx.slides.first().map(|s| s.frontmatter.clone());
        let file = std::fs::File::create(output)?;
        write_pptx(file, &captured, req.width, req.height, first_frontmatter)
    }
}

fn start_file(
    zip: &mut ZipWriter<std::fs::File>,
    name: impl Into<String>,
    options: SimpleFileOptions,
) -> Result<(), ExportError> {
    zip.start_file(name, options)
        .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
}

fn write_pptx(
    file: std::fs::File,
    slides: &[CapturedSlide],
    width_px: u32,
    height_px: u32,
    frontmatter: Option<crate::types::slide::Frontmatter>,
) -> Result<(), ExportError> {
    let mut zip = ZipWriter::new(file);
    let options: SimpleFileOptions = FileOptions::default();

    let layout_name = format!("{width_px}x{height_px}");
    let width_emu = (width_px as f64 / PX_PER_INCH * EMU_PER_INCH as f64) as i64;
    let height_emu = (height_px as f64 / PX_PER_INCH * EMU_PER_INCH as f64) as i64;

    start_file(&mut zip, "[Content_Types].xml", options)?;
    zip.write_all(content_types_xml(slides.len()).as_bytes())?;

    start_file(&mut zip, "_rels/.rels", options)?;
    zip.write_all(ROOT_RELS.as_bytes())?;

    start_file(&mut zip, "docProps/core.xml", options)?;
    zip.write_all(core_props_xml(&frontmatter)?.as_bytes())?;

    start_file(&mut zip, "docProps/app.xml", options)?;
    zip.write_all(app_props_xml(slides.len()).as_bytes())?;

    start_file(&mut zip, "ppt/presentation.xml", options)?;
    zip.write_all(presentation_xml(slides.len(), width_emu, height_emu)?.as_bytes())?;

    start_file(&mut zip, "ppt/_rels/presentation.xml.rels", options)?;
    zip.write_all(presentation_rels_xml(slides.len()).as_bytes())?;

    start_file(&mut zip, "ppt/slideLayouts/slideLayout1.xml", options)?;
    zip.write_all(slide_layout_xml(&layout_name)?.as_bytes())?;

    start_file(&mut zip, "ppt/slideMasters/slideMaster1.xml", options)?;
    zip.write_all(SLIDE_MASTER_XML.as_bytes())?;

    for (i, slide) in slides.iter().enumerate() {
        let n = i + 1;
        start_file(&mut zip, format!("ppt/media/image{n}.png"), options)?;
        zip.write_all(&slide.png)?;

        start_file(&mut zip, format!("ppt/slides/slide{n}.xml"), options)?;
        zip.write_all(slide_xml(width_emu, height_emu)?.as_bytes())?;

        start_file(&mut zip, format!("ppt/slides/_rels/slide{n}.xml.rels"), options)?;
        zip.write_all(slide_rels_xml(n, slide.notes.is_some()).as_bytes())?;

        if let Some(notes) = &slide.notes {
            start_file(&mut zip, format!("ppt/notesSlides/notesSlide{n}.xml"), options)?;
            zip.write_all(notes_slide_xml(notes)?.as_bytes())?;
        }
    }

    zip.finish().map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
    Ok(())
}

fn content_types_xml(slide_count: usize) -> String {
    let mut overrides = String::new();
    for i in 1..=slide_count {
        overrides.push_str(&format!(
            "<Override PartName=\"/ppt/slides/slide{i}.xml\" ContentType=\"application/vnd.openxmlformats-officedocument.presentationml.slide+xml\"/>"
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">
<Default Extension="png" ContentType="image/png"/>
<Default Extension="xml" ContentType="application/xml"/>
<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>
<Override PartName="/ppt/presentation.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.presentation.main+xml"/>
<Override PartName="/ppt/slideMasters/slideMaster1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideMaster+xml"/>
<Override PartName="/ppt/slideLayouts/slideLayout1.xml" ContentType="application/vnd.openxmlformats-officedocument.presentationml.slideLayout+xml"/>
<Override PartName="/docProps/core.xml" ContentType="application/vnd.openxmlformats-package.core-properties+xml"/>
<Override PartName="/docProps/app.xml" ContentType="application/vnd.openxmlformats-officedocument.extended-properties+xml"/>
{overrides}
</Types>"#
    )
}

const ROOT_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="ppt/presentation.xml"/>
<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/package/2006/relationships/metadata/core-properties" Target="docProps/core.xml"/>
<Relationship Id="rId3" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/extended-properties" Target="docProps/app.xml"/>
</Relationships>"#;

fn core_props_xml(frontmatter: &Option<crate::types::slide::Frontmatter>) -> Result<String, ExportError> {
    let (title, author, keywords) = match frontmatter {
        Some(fm) => (fm.info.clone(), fm.author.clone(), fm.keywords_list().join(", ")),
        None => (None, None, String::new()),
    };
    let mut buf = Vec::new();
    {
        let mut writer = Writer::new(&mut buf);
        writer
            .create_element("cp:coreProperties")
            .with_attribute(("xmlns:cp", "http://schemas.openxmlformats.org/package/2006/metadata/core-properties"))
            .with_attribute(("xmlns:dc", "http://purl.org/dc/elements/1.1/"))
            .write_inner_content::<_, quick_xml::Error>(|w| {
                if let Some(title) = &title {
                    w.create_element("dc:title").write_text_content(BytesText::new(title))?;
                }
                if let Some(author) = &author {
                    w.create_element("dc:creator").write_text_content(BytesText::new(author))?;
                }
                if !keywords.is_empty() {
                    w.create_element("cp:keywords").write_text_content(BytesText::new(&keywords))?;
                }
                Ok(())
            })
            .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
    }
    String::from_utf8(buf).map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))
}

fn app_props_xml(slide_count: usize) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Properties xmlns="http://schemas.openxmlformats.org/officeDocument/2006/extended-properties">
<Slides>{slide_count}</Slides>
</Properties>"#
    )
}

fn presentation_xml(slide_count: usize, width_emu: i64, height_emu: i64) -> Result<String, ExportError> {
    let mut ids = String::new();
    for i in 1..=slide_count {
        let rid = i + 1; // rId1 is the slide master
        ids.push_str(&format!(r#"<p:sldId id="{}" r:id="rId{}"/>"#, 255 + i, rid));
    }
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:presentation xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:sldMasterIdLst><p:sldMasterId id="2147483648" r:id="rId1"/></p:sldMasterIdLst>
<p:sldIdLst>{ids}</p:sldIdLst>
<p:sldSz cx="{width_emu}" cy="{height_emu}"/>
</p:presentation>"#
    ))
}

fn presentation_rels_xml(slide_count: usize) -> String {
    let mut rels = String::new();
    rels.push_str(r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slideMaster" Target="slideMasters/slideMaster1.xml"/>"#);
    for i in 1..=slide_count {
        let rid = i + 1;
        rels.push_str(&format!(
            r#"<Relationship Id="rId{rid}" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/slide" Target="slides/slide{i}.xml"/>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

fn slide_layout_xml(layout_name: &str) -> Result<String, ExportError> {
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldLayout xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main" name="{layout_name}">
<p:cSld name="{layout_name}"><p:spTree/></p:cSld>
</p:sldLayout>"#
    ))
}

const SLIDE_MASTER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sldMaster xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:cSld><p:spTree/></p:cSld>
</p:sldMaster>"#;

/// One full-bleed picture per slide, using the captured PNG as background.
fn slide_xml(width_emu: i64, height_emu: i64) -> Result<String, ExportError> {
    Ok(format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<p:sld xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" xmlns:p="http://schemas.openxmlformats.org/presentationml/2006/main">
<p:cSld>
<p:spTree>
<p:pic>
<p:nvPicPr>
<p:cNvPr id="2" name="Background"/>
<p:cNvPicPr><a:picLocks noChangeAspect="1"/></p:cNvPicPr>
<p:nvPr/>
</p:nvPicPr>
<p:blipFill><a:blip r:embed="rId1"/><a:stretch><a:fillRect/></a:stretch></p:blipFill>
<p:spPr>
<a:xfrm><a:off x="0" y="0"/><a:ext cx="{width_emu}" cy="{height_emu}"/></a:xfrm>
<a:prstGeom prst="rect"><a:avLst/></a:prstGeom>
</p:spPr>
</p:pic>
</p:spTree>
</p:cSld>
</p:sld>"#
    ))
}

fn slide_rels_xml(n: usize, has_notes: bool) -> String {
    let mut rels = format!(
        r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/image" Target="../media/image{n}.png"/>"#
    );
    if has_notes {
        rels.push_str(&format!(
            r#"<Relationship Id="rId2" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/notesSlide" Target="../notesSlides/notesSlide{n}.xml"/>"#
        ));
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">{rels}</Relationships>"#
    )
}

fn notes_slide_xml(notes: &str) -> Result<String, ExportError> {
    let mut buf = Vec::new();
    {
        let mut writer = Writer::new(&mut buf);
        writer
            .create_element("p:notes")
            .with_attribute(("xmlns:a", "http://schemas.openxmlformats.org/drawingml/2006/main"))
            .with_attribute(("xmlns:p", "http://schemas.openxmlformats.org/presentationml/2006/main"))
            .write_inner_content::<_, quick_xml::Error>(|w| {
                w.create_element("p:cSld").write_inner_content::<_, quick_xml::Error>(|w| {
                    w.create_element("p:spTree").write_inner_content::<_, quick_xml::Error>(|w| {
                        w.create_element("p:sp").write_inner_content::<_, quick_xml::Error>(|w| {
                            w.create_element("p:txBody").write_inner_content::<_, quick_xml::Error>(|w| {
                                w.create_element("a:p").write_inner_content::<_, quick_xml::Error>(|w| {
                                    w.create_element("a:t").write_text_content(BytesText::new(notes))?;
                                    Ok(())
                                })?;
                                Ok(())
                            })
                        })
                    })
                })
            })
            .map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
    }
    let body = String::from_utf8(buf).map_err(|e| ExportError::Io(std::io::Error::other(e.to_string())))?;
    Ok(format!(r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>{body}"#))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_name_is_widthxheight() {
        let name = format!("{}x{}", 1920, 1080);
        assert_eq!(name, "1920x1080");
    }

    #[test]
    fn width_in_emu_matches_96_dpi_conversion() {
        let emu = (1920.0 / PX_PER_INCH * EMU_PER_INCH as f64) as i64;
        assert_eq!(emu, 20 * EMU_PER_INCH);
    }

    #[test]
    fn content_types_lists_one_override_per_slide() {
        let xml = content_types_xml(2);
        assert_eq!(xml.matches("ppt/slides/slide").count(), 2);
    }
}
