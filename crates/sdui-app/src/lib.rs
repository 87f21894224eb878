pub mod error;
pub mod events;
pub mod generator;
pub mod history;

pub use error::AppError;
pub use events::{GenEvent, Outcome};
pub use generator::Generator;
pub use generator::artifact::ArtifactWriter;
pub use generator::config::GeneratorConfig;
pub use generator::db::{ImageDatabase, MetadataStore, SortOrder};
pub use generator::handle::RequestHandle;
pub use generator::migrate::{load_legacy_export, migrate_legacy, MigrationReport};
pub use history::HistoryIndex;
