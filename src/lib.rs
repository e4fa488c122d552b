//! The Extra Seguro backend accepts either a pre-made PDF file or the structured data of a
//! workshop claim form, renders the latter into an editable PDF document and uploads the
//! resulting bytes into a SharePoint drive through the Microsoft Graph API, authenticating
//! with an OAuth2 client-credentials grant.
//!
//! Each request is one straight-line pipeline: validate the input, build the PDF when the
//! input is structured data, fetch a fresh bearer token, PUT the bytes to the drive and
//! relay the answer of the drive to the caller. Nothing is shared mutably between requests,
//! no token is cached and no step is retried: a failure anywhere aborts the request and is
//! reported through one JSON error envelope.

/// The configuration of the backend, sourced from the process environment at startup.
pub mod configuration;

/// This module contains the `ContextError` type, which uniforms the error reporting of the
/// crate, and the `ServiceError` taxonomy which maps every failure of the pipeline onto the
/// HTTP status it is answered with.
pub mod error;

/// The structured input of the form pipeline: the claim record posted by the frontends,
/// with its lenient defaulting and the filename derivation of the generated documents.
pub mod form;

/// The declarative layout of the claim form: the header-field descriptors, the table
/// schema and the planner which assigns every field its page and position, including the
/// pagination of unbounded tables.
pub mod layout;

/// The module where the PDF construction lives. A planned layout is turned into an
/// AcroForm document with one interactive text widget per field, and the canvas image of
/// the form, when present, is embedded as an image XObject on the last page.
pub mod pdf;

/// The clients for the two outbound collaborators: the identity provider exchanged with
/// through the client-credentials grant and the Graph drive the files are PUT into.
pub mod graph;

/// The HTTP surface: the router, the two POST endpoints with their shared response
/// envelopes, the CORS layer and the request-body limit.
pub mod server;
