//! Data-path stages
//!
//! - `query`: work command → raw SPARQL results
//! - `sitemap`: raw results → sitemap
//! - `render`: sitemap → artifact tree in the staging area

pub mod catalog;
pub mod query;
pub mod render;
pub mod sitemap;
mod workspace;

pub use catalog::{QueryCatalog, QueryDefinition};
pub use query::QueryStage;
pub use render::RenderStage;
pub use sitemap::SitemapStage;
pub use workspace::RunWorkspace;
