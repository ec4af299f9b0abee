use crate::canvas::{Command, Document, Page};
use crate::font::FontFace;
use crate::images::LoadedImage;
use crate::metrics::PageMetrics;
use crate::types::{Color, Pt, Size};
use fixed::types::I32F32;
use image::GenericImageView;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::{self, Write};

const PRODUCER: &str = "evidence-report";

#[derive(Debug, Clone, Default)]
pub struct PdfOptions {
    pub title: Option<String>,
}

struct FontResource {
    resource: String,
    base_font: &'static str,
}

struct ImageData {
    width: u32,
    height: u32,
    color_space: &'static str,
    filter: &'static str,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

pub fn document_to_pdf(document: &Document, options: &PdfOptions) -> io::Result<Vec<u8>> {
    document_to_pdf_with_metrics(document, options).map(|(bytes, _)| bytes)
}

pub fn document_to_pdf_with_metrics(
    document: &Document,
    options: &PdfOptions,
) -> io::Result<(Vec<u8>, Vec<PageMetrics>)> {
    let mut out = Vec::new();
    let pages = write_document(&mut out, document, options)?;
    Ok((out, pages))
}

/// Serializes `document` as a PDF 1.7 file into `writer`.
pub fn write_document<W: Write>(
    writer: &mut W,
    document: &Document,
    options: &PdfOptions,
) -> io::Result<Vec<PageMetrics>> {
    // Fixed objects: 1 catalog, 2 page tree, 3 info, 4 shared resources.
    let catalog_id = 1usize;
    let pages_id = 2usize;
    let info_id = 3usize;
    let resources_id = 4usize;
    let mut next_id = 5usize;
    let mut objects: Vec<(usize, String)> = Vec::new();

    let font_map = build_font_map(document);
    let mut font_refs = Vec::new();
    for font in font_map.values() {
        objects.push((next_id, font_object(font.base_font)));
        font_refs.push((font.resource.clone(), next_id));
        next_id += 1;
    }

    let (gs_objects, gs_refs, gs_map, after_gs) = build_extgstate_objects(document, next_id);
    objects.extend(gs_objects);
    next_id = after_gs;

    let (image_objects, image_refs, image_map, after_images) =
        build_image_objects(&document.images, next_id)?;
    objects.extend(image_objects);
    next_id = after_images;

    objects.push((
        resources_id,
        format!(
            "<< /ProcSet [/PDF /Text /ImageB /ImageC]{}{}{} >>",
            resource_dict("Font", &font_refs),
            resource_dict("ExtGState", &gs_refs),
            resource_dict("XObject", &image_refs),
        ),
    ));

    let mut page_ids = Vec::with_capacity(document.pages.len());
    let mut page_metrics = Vec::with_capacity(document.pages.len());
    for (idx0, page) in document.pages.iter().enumerate() {
        let content = render_page(page, document.page_size.height, &font_map, &image_map, &gs_map);
        let content_id = next_id;
        let page_id = next_id + 1;
        next_id += 2;
        page_metrics.push(PageMetrics {
            page_number: idx0 + 1,
            command_count: page.commands.len(),
            content_bytes: content.len(),
        });
        objects.push((content_id, stream_object(&content)));
        objects.push((
            page_id,
            page_object(pages_id, content_id, resources_id, document.page_size),
        ));
        page_ids.push(page_id);
    }

    let kids = page_ids
        .iter()
        .map(|id| format!("{} 0 R", id))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push((
        pages_id,
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids, page_ids.len()),
    ));
    objects.push((
        catalog_id,
        format!("<< /Type /Catalog /Pages {} 0 R >>", pages_id),
    ));
    objects.push((info_id, info_object(options.title.as_deref())));
    objects.sort_by_key(|(id, _)| *id);

    let object_count = next_id;
    let mut offsets = vec![0usize; object_count];
    let mut offset = 0usize;
    write_bytes(writer, b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n", &mut offset)?;
    for (obj_id, body) in &objects {
        write_pdf_object(writer, &mut offset, &mut offsets, *obj_id, body)?;
    }

    let xref_start = offset;
    write_str(writer, &format!("xref\n0 {}\n", object_count), &mut offset)?;
    write_str(writer, "0000000000 65535 f \n", &mut offset)?;
    for obj_offset in offsets.iter().skip(1) {
        write_str(writer, &format!("{:010} 00000 n \n", obj_offset), &mut offset)?;
    }
    write_str(
        writer,
        &format!(
            "trailer\n<< /Size {} /Root {} 0 R /Info {} 0 R >>\nstartxref\n{}\n%%EOF\n",
            object_count, catalog_id, info_id, xref_start
        ),
        &mut offset,
    )?;
    writer.flush()?;
    Ok(page_metrics)
}

fn build_font_map(document: &Document) -> BTreeMap<String, FontResource> {
    let mut names: BTreeSet<&'static str> = BTreeSet::new();
    // Pages start in Helvetica, so it is always registered.
    names.insert(FontFace::Helvetica.base_name());
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::SetFontName(name) = cmd {
                if let Some(face) = FontFace::from_base_name(name) {
                    names.insert(face.base_name());
                }
            }
        }
    }
    names
        .into_iter()
        .enumerate()
        .map(|(idx, base_font)| {
            (
                base_font.to_string(),
                FontResource {
                    resource: format!("F{}", idx + 1),
                    base_font,
                },
            )
        })
        .collect()
}

fn quantize_opacity(value: f32) -> u16 {
    ((value * 1000.0).round() as i32).clamp(0, 1000) as u16
}

fn build_extgstate_objects(
    document: &Document,
    start_id: usize,
) -> (
    Vec<(usize, String)>,
    Vec<(String, usize)>,
    HashMap<(u16, u16), String>,
    usize,
) {
    // Map (fill_alpha, stroke_alpha) -> /GSn resource.
    let mut pairs: BTreeSet<(u16, u16)> = BTreeSet::new();
    for page in &document.pages {
        for cmd in &page.commands {
            if let Command::SetOpacity { fill, stroke } = cmd {
                pairs.insert((quantize_opacity(*fill), quantize_opacity(*stroke)));
            }
        }
    }

    let mut objects = Vec::new();
    let mut resources = Vec::new();
    let mut name_map = HashMap::new();
    let mut next_id = start_id;
    for (index, (f, s)) in pairs.into_iter().enumerate() {
        let name = format!("GS{}", index + 1);
        objects.push((
            next_id,
            format!(
                "<< /Type /ExtGState /ca {} /CA {} >>",
                fmt(f as f32 / 1000.0),
                fmt(s as f32 / 1000.0)
            ),
        ));
        resources.push((name.clone(), next_id));
        name_map.insert((f, s), name);
        next_id += 1;
    }
    (objects, resources, name_map, next_id)
}

fn build_image_objects(
    images: &BTreeMap<String, std::sync::Arc<LoadedImage>>,
    start_id: usize,
) -> io::Result<(
    Vec<(usize, String)>,
    Vec<(String, usize)>,
    HashMap<String, String>,
    usize,
)> {
    let mut objects = Vec::new();
    let mut resources = Vec::new();
    let mut name_map = HashMap::new();
    let mut next_id = start_id;

    for (index, (resource_id, image)) in images.iter().enumerate() {
        let data = image_data(image)?;
        let smask_id = data.alpha.as_ref().map(|alpha| {
            let id = next_id;
            next_id += 1;
            objects.push((id, image_smask_object(data.width, data.height, alpha)));
            id
        });
        let obj_id = next_id;
        next_id += 1;
        let name = format!("Im{}", index + 1);
        objects.push((obj_id, image_object(&data, smask_id)));
        resources.push((name.clone(), obj_id));
        name_map.insert(resource_id.clone(), name);
    }
    Ok((objects, resources, name_map, next_id))
}

fn image_data(image: &LoadedImage) -> io::Result<ImageData> {
    let (width, height) = image.pixels().dimensions();
    let passthrough = image
        .jpeg_bytes()
        .and_then(|jpeg| jpeg_color_space(jpeg).map(|color_space| (jpeg, color_space)));
    if let Some((jpeg, color_space)) = passthrough {
        return Ok(ImageData {
            width,
            height,
            color_space,
            filter: "/DCTDecode",
            data: jpeg.to_vec(),
            alpha: None,
        });
    }

    let rgba = image.pixels().to_rgba8();
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    let mut alpha = Vec::with_capacity((width * height) as usize);
    let mut has_alpha = false;
    for pixel in rgba.pixels() {
        let [r, g, b, a] = pixel.0;
        if a != 255 {
            has_alpha = true;
        }
        rgb.extend_from_slice(&[r, g, b]);
        alpha.push(a);
    }
    let alpha = if has_alpha {
        Some(flate_compress(&alpha)?)
    } else {
        None
    };
    Ok(ImageData {
        width,
        height,
        color_space: "/DeviceRGB",
        filter: "/FlateDecode",
        data: flate_compress(&rgb)?,
        alpha,
    })
}

/// Color space for embedding `jpeg` unchanged, read from its frame header.
/// Only 1- and 3-component JPEGs qualify; CMYK/YCCK and unreadable headers
/// return `None` and are re-encoded from the decoded pixels instead.
fn jpeg_color_space(jpeg: &[u8]) -> Option<&'static str> {
    match jpeg_component_count(jpeg)? {
        1 => Some("/DeviceGray"),
        3 => Some("/DeviceRGB"),
        _ => None,
    }
}

fn jpeg_component_count(jpeg: &[u8]) -> Option<u8> {
    if jpeg.get(..2)? != [0xFF, 0xD8] {
        return None;
    }
    let mut pos = 2;
    loop {
        if *jpeg.get(pos)? != 0xFF {
            return None;
        }
        let marker = *jpeg.get(pos + 1)?;
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            // Standalone markers carry no length.
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => return None,
            _ => {}
        }
        let length = u16::from_be_bytes([*jpeg.get(pos + 2)?, *jpeg.get(pos + 3)?]) as usize;
        // SOF0..SOF15, minus DHT (C4), JPG (C8) and DAC (CC).
        if matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC) {
            // length(2) precision(1) height(2) width(2) components(1)
            return jpeg.get(pos + 9).copied();
        }
        pos += 2 + length;
    }
}

fn flate_compress(data: &[u8]) -> io::Result<Vec<u8>> {
    use flate2::Compression;
    use flate2::write::ZlibEncoder;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

fn image_object(image: &ImageData, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.data);
    let smask = smask_id
        .map(|id| format!(" /SMask {} 0 R", id))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace {} /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode {}]{} >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        image.color_space,
        stream_data.len(),
        image.filter,
        smask,
        stream_data
    )
}

fn image_smask_object(width: u32, height: u32, alpha: &[u8]) -> String {
    let stream_data = encode_stream_data(alpha);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        width,
        height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut hex = ascii_hex_encode(data);
    hex.push('>');
    hex
}

fn ascii_hex_encode(data: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32);
    for (idx, byte) in data.iter().enumerate() {
        if idx > 0 && idx % 64 == 0 {
            out.push('\n');
        }
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0F) as usize] as char);
    }
    out
}

fn font_object(base_font: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        base_font
    )
}

fn resource_dict(kind: &str, entries: &[(String, usize)]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let items = entries
        .iter()
        .map(|(name, id)| format!("/{} {} 0 R", name, id))
        .collect::<Vec<_>>()
        .join(" ");
    format!(" /{} << {} >>", kind, items)
}

fn page_object(pages_id: usize, content_id: usize, resources_id: usize, size: Size) -> String {
    format!(
        "<< /Type /Page /Parent {} 0 R /MediaBox [0 0 {} {}] /Resources {} 0 R /Contents {} 0 R >>",
        pages_id,
        fmt_pt(size.width),
        fmt_pt(size.height),
        resources_id,
        content_id
    )
}

fn info_object(title: Option<&str>) -> String {
    let mut entries = vec![format!("/Producer ({})", PRODUCER)];
    if let Some(title) = title {
        entries.push(format!("/Title ({})", encode_winansi_pdf_string(title)));
    }
    format!("<< {} >>", entries.join(" "))
}

#[derive(Clone)]
struct TextState {
    font_name: String,
    font_size: Pt,
}

fn render_page(
    page: &Page,
    page_height: Pt,
    font_map: &BTreeMap<String, FontResource>,
    image_map: &HashMap<String, String>,
    gs_map: &HashMap<(u16, u16), String>,
) -> String {
    let mut out = String::new();
    // Font selection is not part of the PDF graphics state outside BT/ET, so
    // q/Q are mirrored here to keep it in step with the canvas.
    let mut state = TextState {
        font_name: FontFace::Helvetica.base_name().to_string(),
        font_size: Pt::from_f32(12.0),
    };
    let mut saved: Vec<TextState> = Vec::new();

    for cmd in &page.commands {
        match cmd {
            Command::SaveState => {
                saved.push(state.clone());
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some(previous) = saved.pop() {
                    state = previous;
                }
                out.push_str("Q\n");
            }
            Command::Translate(x, y) => {
                out.push_str(&format!("1 0 0 1 {} {} cm\n", fmt_pt(*x), fmt_pt(*y)));
            }
            Command::Rotate(angle) => {
                let sin = libm::sinf(*angle);
                let cos = libm::cosf(*angle);
                out.push_str(&format!(
                    "{} {} {} {} 0 0 cm\n",
                    fmt(cos),
                    fmt(sin),
                    fmt(-sin),
                    fmt(cos)
                ));
            }
            Command::Meta { .. } => {}
            Command::BeginArtifact { subtype } => {
                if let Some(subtype) = subtype.as_deref() {
                    out.push_str(&format!(
                        "/Artifact <</Subtype /{}>> BDC\n",
                        escape_pdf_name(subtype)
                    ));
                } else {
                    out.push_str("/Artifact BMC\n");
                }
            }
            Command::EndMarkedContent => out.push_str("EMC\n"),
            Command::SetFillColor(color) => out.push_str(&color_to_pdf_fill(*color)),
            Command::SetOpacity { fill, stroke } => {
                let key = (quantize_opacity(*fill), quantize_opacity(*stroke));
                if let Some(name) = gs_map.get(&key) {
                    out.push_str(&format!("/{} gs\n", name));
                }
            }
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::DrawString { x, y, text } => {
                let resource = font_map
                    .get(&state.font_name)
                    .map(|font| font.resource.as_str())
                    .unwrap_or("F1");
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(state.font_size)));
                // y is the top of the text box; PDF wants the baseline from the bottom.
                out.push_str(&format!(
                    "{} {} Td\n",
                    fmt_pt(*x),
                    fmt_pt(page_height - *y - state.font_size)
                ));
                out.push_str(&format!("({}) Tj\n", encode_winansi_pdf_string(text)));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_map.get(resource_id) {
                    let draw_y = page_height - *y - *height;
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(draw_y)
                    ));
                    out.push_str(&format!("/{} Do\n", name));
                    out.push_str("Q\n");
                }
            }
        }
    }
    out
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn write_pdf_object<W: Write>(
    writer: &mut W,
    offset: &mut usize,
    offsets: &mut [usize],
    obj_id: usize,
    body: &str,
) -> io::Result<()> {
    if let Some(slot) = offsets.get_mut(obj_id) {
        *slot = *offset;
    }
    write_str(writer, &format!("{} 0 obj\n", obj_id), offset)?;
    write_bytes(writer, body.as_bytes(), offset)?;
    write_bytes(writer, b"\nendobj\n", offset)?;
    Ok(())
}

fn write_bytes<W: Write>(writer: &mut W, data: &[u8], offset: &mut usize) -> io::Result<()> {
    writer.write_all(data)?;
    *offset += data.len();
    Ok(())
}

fn write_str<W: Write>(writer: &mut W, data: &str, offset: &mut usize) -> io::Result<()> {
    write_bytes(writer, data.as_bytes(), offset)
}

/// Encodes `input` as the body of a WinAnsi literal string. Characters
/// outside the code page become `?`.
fn encode_winansi_pdf_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        let byte = match ch {
            '\u{0000}'..='\u{007F}' => ch as u8,
            '\u{00A0}'..='\u{00FF}' => ch as u8,
            // cp1252 extensions
            '\u{20AC}' => 0x80,
            '\u{201A}' => 0x82,
            '\u{0192}' => 0x83,
            '\u{201E}' => 0x84,
            '\u{2026}' => 0x85,
            '\u{2020}' => 0x86,
            '\u{2021}' => 0x87,
            '\u{02C6}' => 0x88,
            '\u{2030}' => 0x89,
            '\u{0160}' => 0x8A,
            '\u{2039}' => 0x8B,
            '\u{0152}' => 0x8C,
            '\u{017D}' => 0x8E,
            '\u{2018}' => 0x91,
            '\u{2019}' => 0x92,
            '\u{201C}' => 0x93,
            '\u{201D}' => 0x94,
            '\u{2022}' => 0x95,
            '\u{2013}' => 0x96,
            '\u{2014}' => 0x97,
            '\u{02DC}' => 0x98,
            '\u{2122}' => 0x99,
            '\u{0161}' => 0x9A,
            '\u{203A}' => 0x9B,
            '\u{0153}' => 0x9C,
            '\u{017E}' => 0x9E,
            '\u{0178}' => 0x9F,
            _ => b'?',
        };
        match byte {
            b'\\' => out.push_str("\\\\"),
            b'(' => out.push_str("\\("),
            b')' => out.push_str("\\)"),
            b'\n' => out.push_str("\\n"),
            b'\r' => out.push_str("\\r"),
            b if b < 0x20 || b >= 0x7f => out.push_str(&format!("\\{:03o}", b)),
            b => out.push(b as char),
        }
    }
    out
}

fn escape_pdf_name(input: &str) -> String {
    let mut out = String::new();
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' {
            out.push(ch);
        } else {
            let mut buf = [0u8; 4];
            for b in ch.encode_utf8(&mut buf).as_bytes() {
                out.push_str(&format!("#{:02X}", b));
            }
        }
    }
    out
}

fn fmt(value: f32) -> String {
    if !value.is_finite() {
        return "0".to_string();
    }
    let fixed = I32F32::from_num(value);
    let scaled = (fixed * I32F32::from_num(1000)).round();
    let milli: i64 = scaled.to_num();
    format_milli(milli)
}

fn format_milli(milli: i64) -> String {
    if milli == 0 {
        return "0".to_string();
    }
    let sign = if milli < 0 { "-" } else { "" };
    let abs = milli.abs();
    let int_part = abs / 1000;
    let frac_part = abs % 1000;
    if frac_part == 0 {
        format!("{}{}", sign, int_part)
    } else {
        let mut s = format!("{}{}.{:03}", sign, int_part, frac_part);
        while s.ends_with('0') {
            s.pop();
        }
        s
    }
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

fn color_to_pdf_fill(color: Color) -> String {
    format!(
        "{} {} {} rg\n",
        fmt(clamp_unit(color.r)),
        fmt(clamp_unit(color.g)),
        fmt(clamp_unit(color.b))
    )
}
