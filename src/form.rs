use serde::{Deserialize, Serialize};

/// The structured input driving the PDF generation, as posted to the generate endpoint.
///
/// The shape is lenient on purpose: every scalar defaults to the empty string and both row
/// tables default to empty, so a caller may post only the fields it has filled in. A table
/// row which is not an object with string cells however fails the deserialization of the
/// whole record and is reported as a validation error instead of being silently coerced.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormRecord {
    /// The name of the workshop filing the claim.
    #[serde(default)]
    pub taller: String,
    /// The serial number of the vehicle.
    #[serde(default)]
    pub serie_numero: String,
    #[serde(default)]
    pub fecha: String,
    /// The first part of the claim number.
    #[serde(default)]
    pub siniestro1: String,
    /// The second part of the claim number.
    #[serde(default)]
    pub siniestro2: String,
    /// Free-text notes from the workshop.
    #[serde(default)]
    pub observaciones: String,
    /// The first table of damaged parts.
    #[serde(default)]
    pub tabla1: Vec<FormRow>,
    /// The second table of damaged parts.
    #[serde(default)]
    pub tabla2: Vec<FormRow>,
    /// A base64-encoded raster image of the damage sketch, prefixed with a data-URL header.
    #[serde(default)]
    pub canvas_image: Option<String>,
}

/// One row of a damage table: the part name and the sheet-metal and paint annotations.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FormRow {
    #[serde(default)]
    pub pieza: String,
    #[serde(default)]
    pub chapa: String,
    #[serde(default)]
    pub pintura: String,
}

impl FormRecord {
    /// The combined claim number, as rendered into the `siniestro` header field.
    pub fn siniestro(&self) -> String {
        format!("{}-{}", self.siniestro1, self.siniestro2)
    }

    /// Derive the name of the uploaded file from the claim-number parts and the given
    /// timestamp in milliseconds. An absent first part falls back to a fixed placeholder
    /// and an absent second part is skipped so the name never carries empty segments.
    pub fn derive_filename(&self, timestamp_milliseconds: i128) -> String {
        let first_part = if self.siniestro1.is_empty() {
            "PRUEBA"
        } else {
            self.siniestro1.as_str()
        };
        if self.siniestro2.is_empty() {
            format!("{}_{}_EDITABLE.pdf", first_part, timestamp_milliseconds)
        } else {
            format!(
                "{}_{}_{}_EDITABLE.pdf",
                first_part, self.siniestro2, timestamp_milliseconds
            )
        }
    }
}
