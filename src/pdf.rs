use std::{io::BufWriter, mem};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use lopdf::{Dictionary, Object, StringFormat};

use crate::error::{ContextError, ServiceError};
use crate::form::FormRecord;
use crate::layout::{self, PlannedField, IMAGE_POSITION, IMAGE_SIZE, PAGE_HEIGHT, PAGE_WIDTH};

/// The decoded canvas image, as 8-bit RGB pixel data ready to be wrapped into an XObject.
struct CanvasImage {
    width: u32,
    height: u32,
    pixel_data: Vec<u8>,
}

/// Build the complete claim form as a PDF byte buffer.
///
/// The document carries one interactive text widget per planned field, pre-filled with the
/// record values, and the canvas image (when one is attached) drawn on the last page of the
/// document. Every widget references the standard Helvetica font through the AcroForm
/// resource dictionary; `NeedAppearances` is set so that viewers regenerate the widget
/// appearances from the field values.
///
/// The only failure modes are a canvas payload which does not decode (`ImageDecode`) and a
/// PDF serialization failure (`Render`); both abort the request they belong to.
pub fn build_form_pdf(record: &FormRecord) -> Result<Vec<u8>, ServiceError> {
    let plan = layout::plan_document(record);

    // Decode the image before touching the document so a malformed payload never leaves
    // a half-built page behind.
    let canvas_image = match &record.canvas_image {
        Some(payload) => Some(decode_canvas_image(payload)?),
        None => None,
    };

    let mut document = lopdf::Document::with_version("1.5");
    let pages_id = document.new_object_id();

    // The one font of the form. Helvetica is one of the standard fonts every PDF viewer
    // ships, so no font program needs to be embedded.
    let helvetica_id = document.add_object(Dictionary::from_iter(vec![
        ("Type", "Font".into()),
        ("Subtype", "Type1".into()),
        ("BaseFont", "Helvetica".into()),
        ("Encoding", "WinAnsiEncoding".into()),
    ]));

    // Insert one widget annotation per planned field, collecting the references both into
    // the AcroForm field list and into the annotation array of the owning page.
    let mut field_references = Vec::<Object>::new();
    let mut page_annotations: Vec<Vec<Object>> = vec![Vec::new(); plan.page_count];
    for field in &plan.fields {
        let widget_id = document.add_object(widget_dictionary(field));
        field_references.push(Object::Reference(widget_id));
        page_annotations[field.page_index].push(Object::Reference(widget_id));
    }

    let mut page_references = Vec::<Object>::new();
    for (page_index, annotations) in page_annotations.into_iter().enumerate() {
        let mut resources = Dictionary::from_iter(vec![(
            "Font",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Helv",
                Object::Reference(helvetica_id),
            )])),
        )]);

        let mut page_dictionary = Dictionary::from_iter(vec![
            ("Type", "Page".into()),
            ("Parent", Object::Reference(pages_id)),
            (
                "MediaBox",
                vec![
                    0.into(),
                    0.into(),
                    PAGE_WIDTH.into(),
                    PAGE_HEIGHT.into(),
                ]
                .into(),
            ),
            ("Annots", annotations.into()),
        ]);

        // The canvas image always lands on the last page of the document, whether the
        // tables paginated or not.
        if page_index == plan.page_count - 1 {
            if let Some(image) = &canvas_image {
                let image_id = document.add_object(image_xobject(image));
                resources.set(
                    "XObject",
                    Object::Dictionary(Dictionary::from_iter(vec![(
                        "Im1",
                        Object::Reference(image_id),
                    )])),
                );
                let content_id = document.add_object(image_content_stream()?);
                page_dictionary.set("Contents", Object::Reference(content_id));
            }
        }

        let resources_id = document.add_object(resources);
        page_dictionary.set("Resources", Object::Reference(resources_id));

        let page_id = document.add_object(page_dictionary);
        page_references.push(Object::Reference(page_id));
    }

    // The interactive form dictionary referenced by the catalog, holding every field of
    // the document and the default resources the appearance strings resolve against.
    let acro_form_id = document.add_object(Dictionary::from_iter(vec![
        ("Fields", field_references.into()),
        ("NeedAppearances", Object::Boolean(true)),
        (
            "DA",
            Object::String(b"/Helv 0 Tf 0 g".to_vec(), StringFormat::Literal),
        ),
        (
            "DR",
            Object::Dictionary(Dictionary::from_iter(vec![(
                "Font",
                Object::Dictionary(Dictionary::from_iter(vec![(
                    "Helv",
                    Object::Reference(helvetica_id),
                )])),
            )])),
        ),
    ]));

    let pages_dictionary = Dictionary::from_iter(vec![
        ("Type", "Pages".into()),
        ("Count", Object::Integer(plan.page_count as i64)),
        ("Kids", page_references.into()),
    ]);
    document
        .objects
        .insert(pages_id, Object::Dictionary(pages_dictionary));

    let catalog_id = document.add_object(Dictionary::from_iter(vec![
        ("Type", "Catalog".into()),
        ("Pages", Object::Reference(pages_id)),
        ("AcroForm", Object::Reference(acro_form_id)),
    ]));
    document.trailer.set("Root", Object::Reference(catalog_id));

    document.compress();
    save_to_bytes(&mut document)
}

/// Construct the widget annotation dictionary of a single planned field.
fn widget_dictionary(field: &PlannedField) -> Dictionary {
    Dictionary::from_iter(vec![
        ("Type", "Annot".into()),
        ("Subtype", "Widget".into()),
        ("FT", "Tx".into()),
        ("T", pdf_text_string(&field.name)),
        ("V", pdf_text_string(&field.value)),
        (
            "DA",
            Object::String(
                format!("/Helv {} Tf 0 g", field.font_size).into_bytes(),
                StringFormat::Literal,
            ),
        ),
        (
            "Rect",
            vec![
                field.x.into(),
                field.y.into(),
                (field.x + field.width).into(),
                (field.y + field.height).into(),
            ]
            .into(),
        ),
        // Bit 3 of the annotation flags: the widget is printed along with the page.
        ("F", Object::Integer(4)),
    ])
}

/// Encode a text string for a PDF string object. ASCII values are written as plain literal
/// bytes; anything else becomes UTF-16BE with a byte-order mark, since a text string
/// without one is read as PDFDocEncoding and would garble accented values.
fn pdf_text_string(value: &str) -> Object {
    if value.is_ascii() {
        Object::String(value.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in value.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Wrap the decoded canvas image into an image XObject stream.
fn image_xobject(image: &CanvasImage) -> lopdf::Stream {
    lopdf::Stream::new(
        Dictionary::from_iter(vec![
            ("Type", "XObject".into()),
            ("Subtype", "Image".into()),
            ("Width", Object::Integer(image.width as i64)),
            ("Height", Object::Integer(image.height as i64)),
            ("ColorSpace", "DeviceRGB".into()),
            ("BitsPerComponent", Object::Integer(8)),
        ]),
        image.pixel_data.clone(),
    )
}

/// The content stream which paints the canvas image at its fixed position and size.
fn image_content_stream() -> Result<lopdf::Stream, ServiceError> {
    let (x, y) = IMAGE_POSITION;
    let (width, height) = IMAGE_SIZE;
    let content = lopdf::content::Content {
        operations: vec![
            lopdf::content::Operation::new("q", vec![]),
            lopdf::content::Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    x.into(),
                    y.into(),
                ],
            ),
            lopdf::content::Operation::new("Do", vec![Object::Name(b"Im1".to_vec())]),
            lopdf::content::Operation::new("Q", vec![]),
        ],
    };
    let encoded = content.encode().map_err(|error| {
        ServiceError::Render(ContextError::with_error(
            "Failed to encode the image content stream",
            &error,
        ))
    })?;

    // Page contents should not be compressed.
    Ok(lopdf::Stream::new(Dictionary::new(), encoded).with_compression(false))
}

/// Decode the data-URL payload posted by the canvas frontend into raw RGB pixel data.
fn decode_canvas_image(payload: &str) -> Result<CanvasImage, ServiceError> {
    // Everything up to the first comma is the data-URL header; a payload without one is
    // treated as bare base64.
    let encoded = payload
        .split_once(',')
        .map(|(_, body)| body)
        .unwrap_or(payload);
    let raw_image_data = BASE64.decode(encoded.trim()).map_err(|error| {
        ServiceError::ImageDecode(ContextError::with_error(
            "Unable to decode the canvas image payload as base64",
            &error,
        ))
    })?;
    let decoded_image = image::load_from_memory(&raw_image_data).map_err(|error| {
        ServiceError::ImageDecode(ContextError::with_error(
            "Unable to decode the canvas image data as a raster image",
            &error,
        ))
    })?;

    // Canvas payloads carry their strokes over a transparent background, so the alpha
    // channel is composited onto white instead of being dropped.
    let rgba_image = decoded_image.to_rgba8();
    let mut pixel_data = Vec::with_capacity(3 * rgba_image.pixels().len());
    for pixel in rgba_image.pixels() {
        let [red, green, blue, alpha] = pixel.0;
        for channel in [red, green, blue] {
            let alpha = u16::from(alpha);
            let composited = (u16::from(channel) * alpha + 255 * (255 - alpha)) / 255;
            pixel_data.push(composited as u8);
        }
    }

    Ok(CanvasImage {
        width: rgba_image.width(),
        height: rgba_image.height(),
        pixel_data,
    })
}

/// Save the document to bytes in order for it to be uploaded or further processed.
fn save_to_bytes(document: &mut lopdf::Document) -> Result<Vec<u8>, ServiceError> {
    let mut pdf_document_bytes = Vec::new();
    let mut writer = BufWriter::new(&mut pdf_document_bytes);
    document.save_to(&mut writer).map_err(|error| {
        ServiceError::Render(ContextError::with_error(
            "Error while saving the PDF document to bytes",
            &error,
        ))
    })?;
    mem::drop(writer);

    Ok(pdf_document_bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::FormRow;

    fn widget_names(document: &lopdf::Document) -> Vec<String> {
        document
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dictionary| {
                dictionary
                    .get(b"Subtype")
                    .ok()
                    .and_then(|object| object.as_name().ok())
                    == Some(b"Widget".as_ref())
            })
            .filter_map(|dictionary| {
                dictionary
                    .get(b"T")
                    .ok()
                    .and_then(|object| object.as_str().ok())
                    .map(|name| String::from_utf8_lossy(name).into_owned())
            })
            .collect()
    }

    fn tiny_png_data_url() -> String {
        let mut png_bytes = Vec::new();
        let image = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]));
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        format!("data:image/png;base64,{}", BASE64.encode(png_bytes))
    }

    #[test]
    fn empty_record_produces_a_single_page_with_the_header_fields() {
        let bytes = build_form_pdf(&FormRecord::default()).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();

        assert_eq!(document.get_pages().len(), 1);
        let names = widget_names(&document);
        assert_eq!(names.len(), 5);
        for name in ["taller", "serieNumero", "fecha", "siniestro", "observaciones"] {
            assert!(names.iter().any(|candidate| candidate == name));
        }
    }

    #[test]
    fn table_rows_become_three_widgets_each() {
        let record = FormRecord {
            tabla1: vec![
                FormRow {
                    pieza: "puerta".into(),
                    chapa: "si".into(),
                    pintura: "no".into(),
                },
                FormRow::default(),
            ],
            ..FormRecord::default()
        };
        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();

        let names = widget_names(&document);
        assert_eq!(names.len(), 5 + 6);
        assert!(names.iter().any(|name| name == "pieza_0"));
        assert!(names.iter().any(|name| name == "pintura_1"));
    }

    #[test]
    fn long_tables_produce_more_than_one_page() {
        let record = FormRecord {
            tabla1: vec![FormRow::default(); 60],
            ..FormRecord::default()
        };
        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();
        assert!(document.get_pages().len() > 1);
    }

    #[test]
    fn a_valid_canvas_image_is_embedded_into_the_document() {
        let record = FormRecord {
            canvas_image: Some(tiny_png_data_url()),
            ..FormRecord::default()
        };
        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();

        let image_count = document
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .filter(|stream| {
                stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|object| object.as_name().ok())
                    == Some(b"Image".as_ref())
            })
            .count();
        assert_eq!(image_count, 1);
    }

    #[test]
    fn a_transparent_canvas_background_is_composited_onto_white() {
        let mut png_bytes = Vec::new();
        let image = image::RgbaImage::from_pixel(4, 4, image::Rgba([0, 0, 0, 0]));
        image
            .write_to(
                &mut std::io::Cursor::new(&mut png_bytes),
                image::ImageFormat::Png,
            )
            .unwrap();
        let record = FormRecord {
            canvas_image: Some(format!("data:image/png;base64,{}", BASE64.encode(png_bytes))),
            ..FormRecord::default()
        };

        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();
        let image_stream = document
            .objects
            .values()
            .filter_map(|object| object.as_stream().ok())
            .find(|stream| {
                stream
                    .dict
                    .get(b"Subtype")
                    .ok()
                    .and_then(|object| object.as_name().ok())
                    == Some(b"Image".as_ref())
            })
            .unwrap();

        // lopdf refuses to decompress Image XObject streams, so inflate manually.
        let pixel_data = match image_stream
            .dict
            .get(b"Filter")
            .ok()
            .and_then(|object| object.as_name().ok())
        {
            Some(b"FlateDecode") => {
                let mut decoder =
                    flate2::read::ZlibDecoder::new(image_stream.content.as_slice());
                let mut data = Vec::new();
                std::io::Read::read_to_end(&mut decoder, &mut data).unwrap();
                data
            }
            _ => image_stream.content.clone(),
        };
        assert_eq!(pixel_data.len(), 4 * 4 * 3);
        assert!(pixel_data.iter().all(|&channel| channel == 255));
    }

    #[test]
    fn a_paginated_document_draws_the_canvas_image_on_the_last_page() {
        let record = FormRecord {
            tabla1: vec![FormRow::default(); 60],
            canvas_image: Some(tiny_png_data_url()),
            ..FormRecord::default()
        };
        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();

        // Only the page the image is painted on carries a content stream.
        let page_ids: Vec<_> = document.get_pages().values().copied().collect();
        assert!(page_ids.len() > 1);
        let has_contents = |page_id: lopdf::ObjectId| {
            document
                .get_object(page_id)
                .and_then(|object| object.as_dict())
                .map(|dictionary| dictionary.get(b"Contents").is_ok())
                .unwrap_or(false)
        };
        let (last_page, earlier_pages) = page_ids.split_last().unwrap();
        assert!(has_contents(*last_page));
        assert!(earlier_pages.iter().all(|page_id| !has_contents(*page_id)));
    }

    #[test]
    fn accented_field_values_are_encoded_as_utf16_with_a_byte_order_mark() {
        let record = FormRecord {
            observaciones: "instalación".into(),
            ..FormRecord::default()
        };
        let bytes = build_form_pdf(&record).unwrap();
        let document = lopdf::Document::load_mem(&bytes).unwrap();

        let value_bytes = document
            .objects
            .values()
            .filter_map(|object| object.as_dict().ok())
            .filter(|dictionary| {
                dictionary
                    .get(b"T")
                    .ok()
                    .and_then(|object| object.as_str().ok())
                    == Some(b"observaciones".as_ref())
            })
            .find_map(|dictionary| {
                dictionary
                    .get(b"V")
                    .ok()
                    .and_then(|object| object.as_str().ok())
            })
            .unwrap();

        assert_eq!(&value_bytes[..2], &[0xFE, 0xFF]);
        let code_units: Vec<u16> = value_bytes[2..]
            .chunks(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        assert_eq!(String::from_utf16(&code_units).unwrap(), "instalación");
    }

    #[test]
    fn a_malformed_canvas_payload_is_an_image_decode_error() {
        let record = FormRecord {
            canvas_image: Some("data:image/png;base64,@@not-base64@@".into()),
            ..FormRecord::default()
        };
        let error = build_form_pdf(&record).unwrap_err();
        assert!(matches!(error, ServiceError::ImageDecode(_)));
    }

    #[test]
    fn valid_base64_which_is_not_an_image_is_an_image_decode_error() {
        let record = FormRecord {
            canvas_image: Some(format!(
                "data:image/png;base64,{}",
                BASE64.encode(b"plainly not a png")
            )),
            ..FormRecord::default()
        };
        let error = build_form_pdf(&record).unwrap_err();
        assert!(matches!(error, ServiceError::ImageDecode(_)));
    }
}
