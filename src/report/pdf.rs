use printpdf::image_crate::{self, DynamicImage};
use printpdf::path::{PaintMode, WindingOrder};
use printpdf::*;
use std::path::Path;

use crate::report::ReportBuildError;
use crate::report::layout::{
    DETECTIONS_HEADER, IMAGE_HEIGHT_MM, IMAGE_WIDTH_MM, ReportLayout,
};

const A4_WIDTH_MM: f32 = 210.0;
const A4_HEIGHT_MM: f32 = 297.0;
const MARGIN_MM: f32 = 20.0;

const TITLE_SIZE: f32 = 18.0;
const TEXT_SIZE: f32 = 10.0;
const ROW_HEIGHT_MM: f32 = 7.0;
const CELL_PADDING_MM: f32 = 2.0;
const TITLE_GAP_MM: f32 = 4.2;
const BLOCK_GAP_MM: f32 = 7.0;
const IMAGE_DPI: f32 = 300.0;

/// Column widths (mm) of the summary table: 2.5in + 3in.
const SUMMARY_COLUMNS: [f32; 2] = [63.5, 76.2];
/// Column widths (mm) of the detections table: 3in + 2in.
const DETECTION_COLUMNS: [f32; 2] = [76.2, 50.8];

const PT_TO_MM: f32 = 0.352_778;

fn grey(level: f32) -> Color {
    Color::Greyscale(Greyscale::new(level, None))
}

/// Tracks the current page and the vertical write position.
struct PageCursor<'a> {
    doc: &'a PdfDocumentReference,
    layer: PdfLayerReference,
    y: f32,
    pages: usize,
}

impl<'a> PageCursor<'a> {
    fn new(doc: &'a PdfDocumentReference, layer: PdfLayerReference) -> Self {
        Self {
            doc,
            layer,
            y: A4_HEIGHT_MM - MARGIN_MM,
            pages: 1,
        }
    }

    /// Start a new page if fewer than `height` mm remain.
    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN_MM {
            self.pages += 1;
            let (page, layer) = self.doc.add_page(
                Mm(A4_WIDTH_MM),
                Mm(A4_HEIGHT_MM),
                format!("Page {} Layer 1", self.pages),
            );
            self.layer = self.doc.get_page(page).get_layer(layer);
            self.y = A4_HEIGHT_MM - MARGIN_MM;
        }
    }
}

fn rect_points(x: f32, y: f32, w: f32, h: f32) -> Vec<(Point, bool)> {
    vec![
        (Point::new(Mm(x), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y)), false),
        (Point::new(Mm(x + w), Mm(y + h)), false),
        (Point::new(Mm(x), Mm(y + h)), false),
    ]
}

/// Draw one table row with its grid, `y_top` being the row's upper edge.
fn draw_row(
    layer: &PdfLayerReference,
    cells: [&str; 2],
    columns: &[f32; 2],
    x0: f32,
    y_top: f32,
    shaded: bool,
    font: &IndirectFontRef,
) {
    let width: f32 = columns.iter().sum();
    let y_bottom = y_top - ROW_HEIGHT_MM;

    if shaded {
        layer.set_fill_color(grey(0.83));
        layer.add_polygon(Polygon {
            rings: vec![rect_points(x0, y_bottom, width, ROW_HEIGHT_MM)],
            mode: PaintMode::Fill,
            winding_order: WindingOrder::NonZero,
        });
    }

    layer.set_outline_color(grey(0.5));
    layer.set_outline_thickness(0.5);
    layer.add_line(Line {
        points: rect_points(x0, y_bottom, width, ROW_HEIGHT_MM),
        is_closed: true,
    });
    layer.add_line(Line {
        points: vec![
            (Point::new(Mm(x0 + columns[0]), Mm(y_bottom)), false),
            (Point::new(Mm(x0 + columns[0]), Mm(y_top)), false),
        ],
        is_closed: false,
    });

    layer.set_fill_color(grey(0.0));
    let baseline = y_bottom + (ROW_HEIGHT_MM - TEXT_SIZE * PT_TO_MM) / 2.0 + 0.5;
    layer.use_text(cells[0], TEXT_SIZE, Mm(x0 + CELL_PADDING_MM), Mm(baseline), font);
    layer.use_text(
        cells[1],
        TEXT_SIZE,
        Mm(x0 + columns[0] + CELL_PADDING_MM),
        Mm(baseline),
        font,
    );
}

fn table_x(columns: &[f32; 2]) -> f32 {
    (A4_WIDTH_MM - columns.iter().sum::<f32>()) / 2.0
}

/// Decode the annotated image for embedding, with its pixel size.
/// Missing or unreadable files are a build error.
fn load_image(path: &Path) -> Result<(DynamicImage, u32, u32), ReportBuildError> {
    if !path.is_file() {
        return Err(ReportBuildError::MissingImage(path.to_path_buf()));
    }
    let img = image_crate::open(path).map_err(|e| ReportBuildError::ImageDecode {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    // alpha channels become soft masks in printpdf; flatten to RGB
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok((DynamicImage::ImageRgb8(rgb), width, height))
}

/// Render `layout` as an A4 PDF and return the file bytes.
pub fn render(layout: &ReportLayout) -> Result<Vec<u8>, ReportBuildError> {
    let (picture, pixel_width, pixel_height) = load_image(&layout.image)?;

    let (doc, page1, layer1) = PdfDocument::new(
        layout.title,
        Mm(A4_WIDTH_MM),
        Mm(A4_HEIGHT_MM),
        "Layer 1",
    );

    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ReportBuildError::Render(format!("font: {:?}", e)))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ReportBuildError::Render(format!("font: {:?}", e)))?;

    let mut cursor = PageCursor::new(&doc, doc.get_page(page1).get_layer(layer1));

    // Title, roughly centred (builtin fonts carry no metrics here)
    let title_height = TITLE_SIZE * PT_TO_MM;
    let title_width = layout.title.len() as f32 * TITLE_SIZE * 0.55 * PT_TO_MM;
    cursor.y -= title_height;
    cursor.layer.use_text(
        layout.title,
        TITLE_SIZE,
        Mm((A4_WIDTH_MM - title_width) / 2.0),
        Mm(cursor.y),
        &bold,
    );
    cursor.y -= TITLE_GAP_MM;

    // Summary table, first row shaded
    let x0 = table_x(&SUMMARY_COLUMNS);
    for (idx, row) in layout.summary.iter().enumerate() {
        cursor.ensure_space(ROW_HEIGHT_MM);
        draw_row(
            &cursor.layer,
            [row.label, &row.value],
            &SUMMARY_COLUMNS,
            x0,
            cursor.y,
            idx == 0,
            &regular,
        );
        cursor.y -= ROW_HEIGHT_MM;
    }
    cursor.y -= BLOCK_GAP_MM;

    // Detections table, only when something was found
    if let Some(rows) = &layout.detections {
        let x0 = table_x(&DETECTION_COLUMNS);
        cursor.ensure_space(ROW_HEIGHT_MM * 2.0);
        draw_row(&cursor.layer, DETECTIONS_HEADER, &DETECTION_COLUMNS, x0, cursor.y, false, &bold);
        cursor.y -= ROW_HEIGHT_MM;

        for row in rows {
            cursor.ensure_space(ROW_HEIGHT_MM);
            draw_row(
                &cursor.layer,
                [&row.class_label, &row.confidence],
                &DETECTION_COLUMNS,
                x0,
                cursor.y,
                false,
                &regular,
            );
            cursor.y -= ROW_HEIGHT_MM;
        }
        cursor.y -= BLOCK_GAP_MM;
    }

    // Annotated image at a fixed print size
    cursor.ensure_space(IMAGE_HEIGHT_MM);
    let natural_width_mm = pixel_width as f32 / IMAGE_DPI * 25.4;
    let natural_height_mm = pixel_height as f32 / IMAGE_DPI * 25.4;
    let image = Image::from_dynamic_image(&picture);
    image.add_to_layer(
        cursor.layer.clone(),
        ImageTransform {
            translate_x: Some(Mm((A4_WIDTH_MM - IMAGE_WIDTH_MM) / 2.0)),
            translate_y: Some(Mm(cursor.y - IMAGE_HEIGHT_MM)),
            scale_x: Some(IMAGE_WIDTH_MM / natural_width_mm),
            scale_y: Some(IMAGE_HEIGHT_MM / natural_height_mm),
            dpi: Some(IMAGE_DPI),
            ..Default::default()
        },
    );

    doc.save_to_bytes()
        .map_err(|e| ReportBuildError::Render(format!("save: {:?}", e)))
}
