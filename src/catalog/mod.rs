mod entities;
mod params;
mod service;
mod validation;

pub use entities::{AlbumView, CatalogEntity, FilterKind, TrackView};
pub use params::{
    parse_filters, ListParams, PageLimits, ParsedFilter, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use service::{CatalogService, CatalogSettings, ParentDeletePolicy};
pub use validation::{ValidationError, ValidationResult};
