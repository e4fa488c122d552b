//! The declarative layout of the claim form.
//!
//! The header fields, the table schema and the image placement are all data here, so the
//! whole form can be reshaped by editing the descriptor tables instead of the rendering
//! code. The planner walks the descriptors and assigns every field a page index and a
//! position, which is the only place where pagination is decided: the PDF construction
//! in the `pdf` module renders the plan without moving anything.

use crate::form::{FormRecord, FormRow};

/// The width of an A4 page expressed in points.
pub const PAGE_WIDTH: f32 = 595.0;
/// The height of an A4 page expressed in points.
pub const PAGE_HEIGHT: f32 = 842.0;

/// The font size shared by every text field of the form.
pub const FIELD_FONT_SIZE: f32 = 10.0;

/// The vertical position of the first table row on the first page.
pub const TABLE_START_Y: f32 = 720.0;
/// The vertical distance between two consecutive table rows.
pub const ROW_HEIGHT: f32 = 20.0;
/// The height of a single table cell widget.
pub const ROW_FIELD_HEIGHT: f32 = 16.0;
/// Rows are never placed below this vertical coordinate; reaching it appends a new page.
pub const LOW_WATER_MARK: f32 = 80.0;
/// The vertical position the cursor resets to at the top of an appended page.
pub const TOP_OF_PAGE: f32 = 760.0;

/// The position of the lower-left corner of the embedded canvas image.
pub const IMAGE_POSITION: (f32, f32) = (50.0, 450.0);
/// The size the embedded canvas image is scaled to.
pub const IMAGE_SIZE: (f32, f32) = (500.0, 200.0);

/// A named, positioned text widget resolved against a concrete record.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedField {
    pub name: String,
    pub value: String,
    /// The page the field is placed on, starting from zero.
    pub page_index: usize,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub font_size: f32,
}

/// The complete field plan of one document.
#[derive(Debug, Clone)]
pub struct DocumentPlan {
    pub fields: Vec<PlannedField>,
    pub page_count: usize,
}

/// One fixed-position header field, valued by an accessor into the record.
struct HeaderFieldDescriptor {
    name: &'static str,
    x: f32,
    y: f32,
    width: f32,
    height: f32,
    value: fn(&FormRecord) -> String,
}

const HEADER_FIELDS: &[HeaderFieldDescriptor] = &[
    HeaderFieldDescriptor {
        name: "taller",
        x: 50.0,
        y: 790.0,
        width: 200.0,
        height: 18.0,
        value: taller_value,
    },
    HeaderFieldDescriptor {
        name: "serieNumero",
        x: 300.0,
        y: 790.0,
        width: 200.0,
        height: 18.0,
        value: serie_numero_value,
    },
    HeaderFieldDescriptor {
        name: "fecha",
        x: 50.0,
        y: 760.0,
        width: 200.0,
        height: 18.0,
        value: fecha_value,
    },
    HeaderFieldDescriptor {
        name: "siniestro",
        x: 300.0,
        y: 760.0,
        width: 200.0,
        height: 18.0,
        value: siniestro_value,
    },
    HeaderFieldDescriptor {
        name: "observaciones",
        x: 50.0,
        y: 240.0,
        width: 500.0,
        height: 60.0,
        value: observaciones_value,
    },
];

fn taller_value(record: &FormRecord) -> String {
    record.taller.clone()
}

fn serie_numero_value(record: &FormRecord) -> String {
    record.serie_numero.clone()
}

fn fecha_value(record: &FormRecord) -> String {
    record.fecha.clone()
}

fn siniestro_value(record: &FormRecord) -> String {
    record.siniestro()
}

fn observaciones_value(record: &FormRecord) -> String {
    record.observaciones.clone()
}

/// One column of the damage tables, valued by an accessor into the row.
struct ColumnDescriptor {
    name: &'static str,
    x: f32,
    width: f32,
    cell: fn(&FormRow) -> &str,
}

const ROW_COLUMNS: &[ColumnDescriptor] = &[
    ColumnDescriptor {
        name: "pieza",
        x: 50.0,
        width: 200.0,
        cell: pieza_cell,
    },
    ColumnDescriptor {
        name: "chapa",
        x: 260.0,
        width: 100.0,
        cell: chapa_cell,
    },
    ColumnDescriptor {
        name: "pintura",
        x: 370.0,
        width: 100.0,
        cell: pintura_cell,
    },
];

fn pieza_cell(row: &FormRow) -> &str {
    &row.pieza
}

fn chapa_cell(row: &FormRow) -> &str {
    &row.chapa
}

fn pintura_cell(row: &FormRow) -> &str {
    &row.pintura
}

/// One damage table together with the prefix which namespaces its field names. The first
/// table keeps the bare `pieza_0` scheme the form frontends already rely on; every further
/// table is prefixed so two tables can never produce two fields with the same name.
struct TableDescriptor {
    field_prefix: &'static str,
    rows: fn(&FormRecord) -> &[FormRow],
}

const TABLES: &[TableDescriptor] = &[
    TableDescriptor {
        field_prefix: "",
        rows: tabla1_rows,
    },
    TableDescriptor {
        field_prefix: "tabla2_",
        rows: tabla2_rows,
    },
];

fn tabla1_rows(record: &FormRecord) -> &[FormRow] {
    &record.tabla1
}

fn tabla2_rows(record: &FormRecord) -> &[FormRow] {
    &record.tabla2
}

/// Resolve the layout descriptors against a record, producing every field of the document
/// together with the number of pages needed to hold them.
///
/// The tables share one vertical cursor which starts below the header block and descends
/// by a fixed step per row. Whenever the cursor would drop below the low-water mark the
/// plan switches to a fresh page and the cursor resets to its top-of-page value, so no
/// field ever sits below the mark on any page.
pub fn plan_document(record: &FormRecord) -> DocumentPlan {
    let mut fields = Vec::new();

    for descriptor in HEADER_FIELDS {
        fields.push(PlannedField {
            name: descriptor.name.into(),
            value: (descriptor.value)(record),
            page_index: 0,
            x: descriptor.x,
            y: descriptor.y,
            width: descriptor.width,
            height: descriptor.height,
            font_size: FIELD_FONT_SIZE,
        });
    }

    let mut page_index = 0;
    let mut cursor_y = TABLE_START_Y;

    for table in TABLES {
        for (row_index, row) in (table.rows)(record).iter().enumerate() {
            if cursor_y < LOW_WATER_MARK {
                page_index += 1;
                cursor_y = TOP_OF_PAGE;
            }

            for column in ROW_COLUMNS {
                fields.push(PlannedField {
                    name: format!("{}{}_{}", table.field_prefix, column.name, row_index),
                    value: (column.cell)(row).into(),
                    page_index,
                    x: column.x,
                    y: cursor_y,
                    width: column.width,
                    height: ROW_FIELD_HEIGHT,
                    font_size: FIELD_FONT_SIZE,
                });
            }

            cursor_y -= ROW_HEIGHT;
        }
    }

    DocumentPlan {
        fields,
        page_count: page_index + 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with_rows(count: usize) -> FormRecord {
        FormRecord {
            tabla1: (0..count)
                .map(|index| FormRow {
                    pieza: format!("pieza {}", index),
                    chapa: "si".into(),
                    pintura: "no".into(),
                })
                .collect(),
            ..FormRecord::default()
        }
    }

    #[test]
    fn empty_record_plans_exactly_the_header_fields_on_one_page() {
        let plan = plan_document(&FormRecord::default());
        assert_eq!(plan.page_count, 1);
        assert_eq!(plan.fields.len(), HEADER_FIELDS.len());
        assert!(plan.fields.iter().all(|field| field.page_index == 0));
        assert!(plan.fields.iter().all(|field| field.value.is_empty()
            || field.name == "siniestro" && field.value == "-"));
    }

    #[test]
    fn header_fields_carry_the_record_values() {
        let record = FormRecord {
            taller: "Taller A".into(),
            siniestro1: "123".into(),
            siniestro2: "45".into(),
            ..FormRecord::default()
        };
        let plan = plan_document(&record);
        let value_of = |name: &str| {
            plan.fields
                .iter()
                .find(|field| field.name == name)
                .map(|field| field.value.clone())
                .unwrap()
        };
        assert_eq!(value_of("taller"), "Taller A");
        assert_eq!(value_of("siniestro"), "123-45");
        assert_eq!(value_of("fecha"), "");
    }

    #[test]
    fn each_row_produces_three_indexed_fields() {
        let plan = plan_document(&record_with_rows(4));
        let row_fields: Vec<_> = plan
            .fields
            .iter()
            .filter(|field| field.name.contains('_'))
            .collect();
        assert_eq!(row_fields.len(), 12);
        for index in 0..4 {
            for stem in ["pieza", "chapa", "pintura"] {
                let name = format!("{}_{}", stem, index);
                assert!(row_fields.iter().any(|field| field.name == name));
            }
        }
    }

    #[test]
    fn second_table_fields_are_namespaced() {
        let record = FormRecord {
            tabla1: vec![FormRow::default()],
            tabla2: vec![FormRow::default()],
            ..FormRecord::default()
        };
        let plan = plan_document(&record);
        assert!(plan.fields.iter().any(|field| field.name == "pieza_0"));
        assert!(plan
            .fields
            .iter()
            .any(|field| field.name == "tabla2_pieza_0"));
    }

    #[test]
    fn field_names_are_unique_within_the_document() {
        let record = FormRecord {
            tabla1: vec![FormRow::default(); 3],
            tabla2: vec![FormRow::default(); 3],
            ..FormRecord::default()
        };
        let plan = plan_document(&record);
        let mut names: Vec<_> = plan.fields.iter().map(|field| &field.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), plan.fields.len());
    }

    #[test]
    fn long_tables_paginate_and_never_drop_below_the_low_water_mark() {
        let plan = plan_document(&record_with_rows(60));
        assert!(plan.page_count > 1);
        assert!(plan
            .fields
            .iter()
            .all(|field| field.y >= LOW_WATER_MARK));

        // The first row of an appended page sits at the top-of-page position.
        let first_on_second_page = plan
            .fields
            .iter()
            .find(|field| field.page_index == 1)
            .unwrap();
        assert_eq!(first_on_second_page.y, TOP_OF_PAGE);
    }

    #[test]
    fn the_cursor_is_shared_across_both_tables() {
        let record = FormRecord {
            tabla1: vec![FormRow::default(); 2],
            tabla2: vec![FormRow::default()],
            ..FormRecord::default()
        };
        let plan = plan_document(&record);
        let y_of = |name: &str| {
            plan.fields
                .iter()
                .find(|field| field.name == name)
                .map(|field| field.y)
                .unwrap()
        };
        assert_eq!(y_of("pieza_0"), TABLE_START_Y);
        assert_eq!(y_of("pieza_1"), TABLE_START_Y - ROW_HEIGHT);
        assert_eq!(y_of("tabla2_pieza_0"), TABLE_START_Y - 2.0 * ROW_HEIGHT);
    }
}
