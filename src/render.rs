//
// render.rs
// Dicom2Pdf-rs
//
// Quantises display grids to 8-bit gray and lays them out as captioned pages of a PDF document.
//

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma};
use miniz_oxide::deflate::compress_to_vec_zlib;
use ndarray::Array2;
use pdf_writer::{Content, Filter, Finish, Name, Pdf, Rect, Ref, Str, TextStr};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("a document needs at least one page")]
    NoPages,
    #[error("page resolution must be positive")]
    InvalidResolution,
    #[error("display grid of {0}x{1} cannot become an image")]
    InvalidGrid(usize, usize),
}

/// Square page edge in points (10 inches).
pub const PAGE_SIZE_PT: f32 = 720.0;
const POINTS_PER_INCH: f32 = 72.0;
const SIDE_MARGIN_PT: f32 = 18.0;
const CAPTION_BAND_PT: f32 = 48.0;
const FOOTER_BAND_PT: f32 = 32.0;
const CAPTION_SIZE_PT: f32 = 12.0;
const FOOTER_SIZE_PT: f32 = 10.0;
// Rough average Helvetica advance, used only to centre text.
const AVERAGE_GLYPH_EM: f32 = 0.5;
const FLATE_LEVEL: u8 = 6;

/// A rendered page: the quantised image and its caption.
#[derive(Debug, Clone)]
pub struct PageImage {
    pub image: GrayImage,
    pub caption: String,
}

#[derive(Debug, Clone)]
pub struct DocumentOptions {
    /// Caps the embedded raster at this many pixels per inch of drawable area.
    pub dpi: u32,
    pub title: Option<String>,
    pub footer: Option<String>,
}

impl Default for DocumentOptions {
    fn default() -> Self {
        Self {
            dpi: 100,
            title: None,
            footer: None,
        }
    }
}

/// Map a `[0, 1]` display grid onto 8-bit gray, rounding to the nearest level.
pub fn to_gray8(display: &Array2<f64>) -> Result<GrayImage, RenderError> {
    let (rows, columns) = display.dim();
    let (width, height) = match (u32::try_from(columns), u32::try_from(rows)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(RenderError::InvalidGrid(rows, columns)),
    };

    Ok(GrayImage::from_fn(width, height, |x, y| {
        let v = display[[y as usize, x as usize]];
        Luma([(v.clamp(0.0, 1.0) * 255.0).round() as u8])
    }))
}

/// Lay out one page per image on black square pages, caption on top, in the given order.
pub fn render_document(pages: &[PageImage], options: &DocumentOptions) -> Result<Vec<u8>, RenderError> {
    if pages.is_empty() {
        return Err(RenderError::NoPages);
    }
    if options.dpi == 0 {
        return Err(RenderError::InvalidResolution);
    }

    let mut pdf = Pdf::new();
    let mut alloc = Ref::new(1);
    let catalog_id = alloc.bump();
    let pages_id = alloc.bump();
    let font_id = alloc.bump();

    let page_ids: Vec<Ref> = pages.iter().map(|_| alloc.bump()).collect();

    pdf.catalog(catalog_id).pages(pages_id);
    pdf.pages(pages_id)
        .kids(page_ids.iter().copied())
        .count(pages.len() as i32);
    pdf.type1_font(font_id)
        .base_font(Name(b"Helvetica"))
        .encoding_predefined(Name(b"WinAnsiEncoding"));

    if let Some(title) = &options.title {
        pdf.document_info(alloc.bump()).title(TextStr(title));
    }

    for (page, &page_id) in pages.iter().zip(&page_ids) {
        let contents_id = alloc.bump();
        let image_id = alloc.bump();
        write_page(
            &mut pdf,
            page,
            PageRefs {
                page: page_id,
                parent: pages_id,
                contents: contents_id,
                image: image_id,
                font: font_id,
            },
            options,
        );
    }

    Ok(pdf.finish())
}

struct PageRefs {
    page: Ref,
    parent: Ref,
    contents: Ref,
    image: Ref,
    font: Ref,
}

fn write_page(pdf: &mut Pdf, page: &PageImage, refs: PageRefs, options: &DocumentOptions) {
    let box_width = PAGE_SIZE_PT - 2.0 * SIDE_MARGIN_PT;
    let box_height = PAGE_SIZE_PT - CAPTION_BAND_PT - FOOTER_BAND_PT;

    let raster = fit_resolution(&page.image, box_width, box_height, options.dpi);
    let (width, height) = raster.dimensions();

    let compressed = compress_to_vec_zlib(raster.as_raw(), FLATE_LEVEL);
    let mut image = pdf.image_xobject(refs.image, &compressed);
    image.filter(Filter::FlateDecode);
    image.width(width as i32);
    image.height(height as i32);
    image.color_space().device_gray();
    image.bits_per_component(8);
    image.finish();

    // Aspect-preserving fit, centred in the drawable box.
    let scale = (box_width / width as f32).min(box_height / height as f32);
    let draw_width = width as f32 * scale;
    let draw_height = height as f32 * scale;
    let x = SIDE_MARGIN_PT + (box_width - draw_width) / 2.0;
    let y = FOOTER_BAND_PT + (box_height - draw_height) / 2.0;

    let mut content = Content::new();
    content.set_fill_gray(0.0);
    content.rect(0.0, 0.0, PAGE_SIZE_PT, PAGE_SIZE_PT);
    content.fill_nonzero();

    content.save_state();
    content.transform([draw_width, 0.0, 0.0, draw_height, x, y]);
    content.x_object(Name(b"Im0"));
    content.restore_state();

    content.set_fill_gray(1.0);
    centred_text(
        &mut content,
        &page.caption,
        CAPTION_SIZE_PT,
        PAGE_SIZE_PT - CAPTION_BAND_PT / 2.0 - CAPTION_SIZE_PT / 3.0,
    );
    if let Some(footer) = &options.footer {
        centred_text(&mut content, footer, FOOTER_SIZE_PT, FOOTER_BAND_PT / 3.0);
    }
    let content_data = content.finish();
    pdf.stream(refs.contents, &content_data);

    let mut pdf_page = pdf.page(refs.page);
    pdf_page.parent(refs.parent);
    pdf_page.media_box(Rect::new(0.0, 0.0, PAGE_SIZE_PT, PAGE_SIZE_PT));
    pdf_page.contents(refs.contents);
    let mut resources = pdf_page.resources();
    resources.x_objects().pair(Name(b"Im0"), refs.image);
    resources.fonts().pair(Name(b"F1"), refs.font);
    resources.finish();
    pdf_page.finish();
}

fn centred_text(content: &mut Content, text: &str, size: f32, baseline: f32) {
    let encoded = win_ansi(text);
    let width = encoded.len() as f32 * size * AVERAGE_GLYPH_EM;
    let x = ((PAGE_SIZE_PT - width) / 2.0).max(SIDE_MARGIN_PT);

    content.begin_text();
    content.set_font(Name(b"F1"), size);
    content.next_line(x, baseline);
    content.show(Str(&encoded));
    content.end_text();
}

/// Latin-1 characters map onto WinAnsi directly; anything else becomes `?`.
fn win_ansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|c| match u32::from(c) {
            0x20..=0x7E | 0xA0..=0xFF => c as u32 as u8,
            _ => b'?',
        })
        .collect()
}

/// Downsample when the image holds more pixels than `dpi` allows in the drawable box.
fn fit_resolution(image: &GrayImage, box_width_pt: f32, box_height_pt: f32, dpi: u32) -> GrayImage {
    let max_width = (box_width_pt / POINTS_PER_INCH * dpi as f32).floor().max(1.0);
    let max_height = (box_height_pt / POINTS_PER_INCH * dpi as f32).floor().max(1.0);
    let (width, height) = image.dimensions();

    let scale = (max_width / width as f32).min(max_height / height as f32);
    if scale >= 1.0 {
        return image.clone();
    }

    let target_width = ((width as f32 * scale).round() as u32).max(1);
    let target_height = ((height as f32 * scale).round() as u32).max(1);
    imageops::resize(image, target_width, target_height, FilterType::Triangle)
}
