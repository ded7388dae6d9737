pub mod ids;
pub mod language;
pub mod record;
pub mod thresholds;
pub mod track;

pub use ids::{PlaylistId, RunId, TrackId};
pub use language::Language;
pub use record::{ClassificationRecord, Lyrics, Status};
pub use thresholds::{Band, Classification, Thresholds};
pub use track::Track;
