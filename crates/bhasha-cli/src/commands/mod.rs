pub mod config;
pub mod export;
pub mod review;
pub mod run;
pub mod score;
pub mod status;

pub use export::export_reports;
pub use review::show_review;
pub use run::run_pipeline;
pub use score::score_text;
pub use status::show_status;
