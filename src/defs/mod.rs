//! Definition-file layer: raw serde trees and the folder loader.
//!
//! Everything here is per-file and order-independent. The catalog module
//! merges these raw trees and resolves cross-namespace references; the locale
//! module pairs the discovered resource files by stem.

pub mod loader;
pub mod model;

pub use loader::{
    DEFINITION_SUFFIX, DefinitionSource, LoadedDefinitions, STRINGS_SUFFIX, is_locale_tag,
    language_of, load_definition_folder, parse_definition_file, parse_strings_file,
};
pub use model::{
    DEFINITION_SCHEMA_VERSION, RawClass, RawDefinitionFile, RawElement, RawEnumItem, RawNamespace,
    RawPolicy, RawStoreRecord, RawStringsFile, STRINGS_SCHEMA_VERSION,
};
